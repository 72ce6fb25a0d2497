use crate::document::CommittedPage;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    pub page_number: usize,
    pub region_key: String,
    pub record_count: usize,
    pub clone_count: usize,
    pub empty_table: bool,
    pub compressed: bool,
    pub artifact_bytes: u64,
    pub render_ms: f64,
    /// Export attempts used, 1 when the first one succeeded.
    pub attempts: usize,
}

/// Outcome of a completed book run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub output_path: PathBuf,
    pub pages_written: usize,
    pub file_bytes: u64,
    pub total_ms: f64,
    pub pages: Vec<PageMetrics>,
    /// Digest ledger of the appended page artifacts, in page order.
    pub committed: Vec<CommittedPage>,
}

impl RunSummary {
    pub fn total_records(&self) -> usize {
        self.pages.iter().map(|p| p.record_count).sum()
    }

    pub fn compressed_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|p| p.compressed)
            .map(|p| p.page_number)
            .collect()
    }

    pub fn retried_pages(&self) -> Vec<usize> {
        self.pages
            .iter()
            .filter(|p| p.attempts > 1)
            .map(|p| p.page_number)
            .collect()
    }
}
