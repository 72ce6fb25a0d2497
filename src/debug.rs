use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

/// One line of the run trace.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub(crate) enum DebugEvent<'a> {
    #[serde(rename = "page.committed")]
    PageCommitted {
        page: usize,
        region: &'a str,
        records: usize,
        clones: usize,
        empty: bool,
        compressed: bool,
        bytes: u64,
        attempts: usize,
        ms: f64,
        sha256: &'a str,
    },
    #[serde(rename = "page.failed")]
    PageFailed {
        page: usize,
        region: &'a str,
        error: String,
    },
    #[serde(rename = "debug.summary")]
    Summary {
        context: &'a str,
        counts: BTreeMap<String, u64>,
    },
}

/// JSON-lines trace of a book run. Counters accumulate until [`DebugLogger::emit_summary`]
/// writes them out as a single summary line.
pub(crate) struct DebugLogger {
    state: Mutex<TraceState>,
}

struct TraceState {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl TraceState {
    fn write_line(&mut self, event: &DebugEvent<'_>) {
        if serde_json::to_writer(&mut self.writer, event).is_ok() {
            let _ = self.writer.write_all(b"\n");
        }
    }
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            state: Mutex::new(TraceState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            }),
        })
    }

    pub fn log_event(&self, event: &DebugEvent<'_>) {
        if let Ok(mut state) = self.state.lock() {
            state.write_line(event);
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.state.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    /// Writes the counters collected so far and resets them.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.state.lock() {
            let counts = std::mem::take(&mut state.counters);
            state.write_line(&DebugEvent::Summary { context, counts });
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.state.lock() {
            let _ = state.writer.flush();
        }
    }
}
