mod canvas;
mod cleanup;
mod data_source;
mod debug;
mod doc_context;
mod document;
mod element;
mod error;
mod export;
mod inspect;
mod layout;
mod metrics;
mod page_template;
mod records;
mod render;
mod template;
mod types;

pub use canvas::{Canvas, Command, Document, Page};
pub use cleanup::{CLONE_PATTERN, CleanupSummary, PageScope, cleanup_page};
pub use data_source::JsonDataSource;
use debug::{DebugEvent, DebugLogger};
pub use doc_context::DocContext;
pub use document::{
    CommittedPage, DocumentMetadata, FinalizeSummary, OutputDocument, PageMode,
};
pub use element::{
    Anchor, CLONE_SUFFIX, Element, ElementId, ElementKind, ElementOrigin, ElementSpec,
    KindFilter, LayoutCanvas,
};
pub use error::MapBookError;
pub use export::{
    META_PAGE, META_QUERY, META_REGION, PageExport, PdfPageExporter, TempArtifact, compose_page,
    document_to_pdf,
};
pub use inspect::{
    PdfInspectError, PdfInspectErrorCode, PdfInspectReport, inspect_pdf_bytes, inspect_pdf_path,
};
pub use layout::{
    HEIGHT_PER_POINT, LayoutError, LayoutGeometry, TableLayout, TableSpec, compute_table_layout,
};
pub use metrics::{PageMetrics, RunSummary};
pub use page_template::PageTemplate;
pub use records::{
    PageSource, PageSpec, Predicate, QueryFields, Record, RecordProvider, RecordSet, RecordSource,
    SortKey, SortOrder, validate_page_list,
};
pub use render::{BarSpec, ColumnTitles, ElementRenderer, RenderSummary, format_rounded};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
pub use template::{PARK_X, Role, TemplateSet};
pub use types::{Color, POINTS_PER_INCH, Pt, Size};

/// Where a book run currently is. `Finalized` is terminal for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Processing { page: usize },
    Finalized,
}

/// Drives a page template over a region page list and merges every page into one PDF.
pub struct MapBook {
    template: PageTemplate,
    output_path: PathBuf,
    work_dir: PathBuf,
    table: TableSpec,
    bars: BarSpec,
    titles: ColumnTitles,
    fields: QueryFields,
    threshold: f64,
    export_retries: usize,
    metadata: DocumentMetadata,
    page_mode: PageMode,
    debug: Option<Arc<DebugLogger>>,
    state: RunState,
}

pub struct MapBookBuilder {
    template: Option<PageTemplate>,
    template_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    work_dir: Option<PathBuf>,
    table: TableSpec,
    bars: BarSpec,
    titles: ColumnTitles,
    fields: QueryFields,
    threshold: f64,
    export_retries: usize,
    min_row_height: Option<f32>,
    metadata: DocumentMetadata,
    page_mode: PageMode,
    debug_path: Option<PathBuf>,
}

impl Default for MapBookBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MapBookBuilder {
    pub fn new() -> Self {
        Self {
            template: None,
            template_path: None,
            output_path: None,
            work_dir: None,
            table: TableSpec::default(),
            bars: BarSpec::default(),
            titles: ColumnTitles::default(),
            fields: QueryFields::default(),
            threshold: 100.0,
            export_retries: 1,
            min_row_height: None,
            metadata: DocumentMetadata::default(),
            page_mode: PageMode::default(),
            debug_path: None,
        }
    }

    /// Page template to render on. Defaults to [`PageTemplate::builtin`].
    pub fn template(mut self, template: PageTemplate) -> Self {
        self.template = Some(template);
        self.template_path = None;
        self
    }

    /// Loads the page template from a JSON file at build time.
    pub fn template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self.template = None;
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    // Temporary page artifacts go here; defaults to the output's directory.
    pub fn work_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(path.into());
        self
    }

    pub fn table(mut self, table: TableSpec) -> Self {
        self.table = table;
        self
    }

    pub fn bars(mut self, bars: BarSpec) -> Self {
        self.bars = bars;
        self
    }

    pub fn column_titles(mut self, titles: ColumnTitles) -> Self {
        self.titles = titles;
        self
    }

    pub fn query_fields(mut self, fields: QueryFields) -> Self {
        self.fields = fields;
        self
    }

    /// Records are tabulated when their value is strictly greater than this.
    pub fn predicate_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Extra attempts for a page whose export or append failed.
    pub fn export_retries(mut self, retries: usize) -> Self {
        self.export_retries = retries;
        self
    }

    pub fn min_row_height(mut self, inches: f32) -> Self {
        self.min_row_height = Some(inches);
        self
    }

    pub fn metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn page_mode(mut self, mode: PageMode) -> Self {
        self.page_mode = mode;
        self
    }

    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<MapBook, MapBookError> {
        let Some(output_path) = self.output_path else {
            return Err(MapBookError::InvalidConfiguration(
                "output_path is required".to_string(),
            ));
        };
        if !self.threshold.is_finite() {
            return Err(MapBookError::InvalidConfiguration(
                "predicate_threshold must be finite".to_string(),
            ));
        }
        let mut table = self.table;
        if let Some(min) = self.min_row_height {
            table.min_row_height = min;
        }
        table
            .validate()
            .map_err(|err| MapBookError::InvalidConfiguration(err.to_string()))?;
        if !(self.bars.domain.is_finite() && self.bars.domain > 0.0) {
            return Err(MapBookError::InvalidConfiguration(
                "bar domain must be a positive number".to_string(),
            ));
        }
        if !(self.bars.range.is_finite() && self.bars.range >= 0.0)
            || !self.bars.label_gap.is_finite()
        {
            return Err(MapBookError::InvalidConfiguration(
                "bar range and label gap must be finite, range non-negative".to_string(),
            ));
        }
        if self.fields.region_field.is_empty() || self.fields.value_field.is_empty() {
            return Err(MapBookError::InvalidConfiguration(
                "query field names cannot be empty".to_string(),
            ));
        }

        let template = match (self.template, self.template_path) {
            (Some(template), _) => template,
            (None, Some(path)) => PageTemplate::load(&path)?,
            (None, None) => PageTemplate::builtin(),
        };
        template.validate()?;

        let work_dir = self.work_dir.unwrap_or_else(|| default_work_dir(&output_path));
        let debug = if let Some(path) = self.debug_path {
            Some(Arc::new(DebugLogger::new(path)?))
        } else {
            None
        };

        Ok(MapBook {
            template,
            output_path,
            work_dir,
            table,
            bars: self.bars,
            titles: self.titles,
            fields: self.fields,
            threshold: self.threshold,
            export_retries: self.export_retries,
            metadata: self.metadata,
            page_mode: self.page_mode,
            debug,
            state: RunState::Init,
        })
    }
}

fn default_work_dir(output_path: &Path) -> PathBuf {
    match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

struct CommittedRender {
    render: RenderSummary,
    artifact_bytes: u64,
    cleanup: CleanupSummary,
}

impl MapBook {
    pub fn builder() -> MapBookBuilder {
        MapBookBuilder::new()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Renders every page of `source` and writes the merged book to the output path, with
    /// page artifacts written as PDF files into the work directory.
    pub fn run<S>(&mut self, source: &S) -> Result<RunSummary, MapBookError>
    where
        S: RecordSource + PageSource + ?Sized,
    {
        let mut exporter = PdfPageExporter::new(self.work_dir.clone());
        self.run_with(source, &mut exporter)
    }

    /// Like [`MapBook::run`], with a caller-supplied page exporter.
    ///
    /// A missing template element fails before the output is touched. Any later failure stops
    /// the run; pages committed before it are still saved as a valid book, and the error names
    /// the failing page.
    pub fn run_with<S>(
        &mut self,
        source: &S,
        exporter: &mut dyn PageExport,
    ) -> Result<RunSummary, MapBookError>
    where
        S: RecordSource + PageSource + ?Sized,
    {
        let started = Instant::now();
        self.state = RunState::Init;

        let mut canvas = self.template.instantiate()?;
        let templates = TemplateSet::resolve(&canvas)?;
        let baseline = cleanup_page(&mut canvas, &templates);
        if baseline.primitives_parked > 0 {
            log::debug!(
                "parked {} template primitives placed on the page",
                baseline.primitives_parked
            );
        }
        let pages = source.page_list()?;
        validate_page_list(&pages)?;
        let page_count = source.page_count()?;
        if page_count != pages.len() {
            return Err(MapBookError::data(
                None,
                None,
                format!(
                    "page source counts {} pages but lists {}",
                    page_count,
                    pages.len()
                ),
            ));
        }

        let mut output = OutputDocument::create(&self.output_path)?;
        let provider = RecordProvider::new(source, self.fields.clone(), self.threshold);
        let renderer = ElementRenderer::new(&templates, &self.table, &self.bars, &self.titles);
        let mut page_metrics = Vec::with_capacity(pages.len());
        log::info!(
            "building {} pages into {}",
            page_count,
            self.output_path.display()
        );

        for page in &pages {
            self.state = RunState::Processing {
                page: page.page_number,
            };
            let result = self.process_page(
                &mut canvas,
                &templates,
                &renderer,
                &provider,
                exporter,
                &mut output,
                page,
                page_count,
            );
            match result {
                Ok(metrics) => page_metrics.push(metrics),
                Err(err) => {
                    log::error!("page {} ({}) failed: {}", page.page_number, page.region_key, err);
                    self.debug_event(&DebugEvent::PageFailed {
                        page: page.page_number,
                        region: &page.region_key,
                        error: err.to_string(),
                    });
                    match output.finalize(&self.metadata, self.page_mode) {
                        Ok(saved) => log::warn!(
                            "saved {} committed pages to {}",
                            saved.pages_written,
                            saved.path.display()
                        ),
                        Err(save_err) => log::error!("could not save committed pages: {}", save_err),
                    }
                    self.state = RunState::Finalized;
                    self.emit_debug_summary("run.failed");
                    return Err(err);
                }
            }
        }

        let saved = output.finalize(&self.metadata, self.page_mode)?;
        self.state = RunState::Finalized;
        log::info!(
            "map book complete: {} pages written to {}",
            saved.pages_written,
            saved.path.display()
        );
        self.emit_debug_summary("run");

        Ok(RunSummary {
            output_path: saved.path,
            pages_written: saved.pages_written,
            file_bytes: saved.file_bytes,
            total_ms: elapsed_ms(started),
            pages: page_metrics,
            committed: saved.pages,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn process_page<S>(
        &self,
        canvas: &mut LayoutCanvas,
        templates: &TemplateSet,
        renderer: &ElementRenderer<'_>,
        provider: &RecordProvider<'_, S>,
        exporter: &mut dyn PageExport,
        output: &mut OutputDocument,
        page: &PageSpec,
        page_count: usize,
    ) -> Result<PageMetrics, MapBookError>
    where
        S: RecordSource + ?Sized,
    {
        let started = Instant::now();
        let predicate = provider.predicate_for(page);
        let ctx = DocContext::new(
            page.page_number,
            page_count,
            page.region_key.clone(),
            predicate.to_query_string(),
        );
        let records = provider.fetch(page)?;
        log::info!(
            "page {}/{}: {} ({} records)",
            page.page_number,
            page_count,
            page.region_key,
            records.len()
        );

        let layout = compute_table_layout(records.len(), &self.table).map_err(|err| {
            MapBookError::Layout {
                page: page.page_number,
                message: err.to_string(),
            }
        })?;
        if let Some(geometry) = layout.geometry().filter(|g| g.compressed) {
            log::debug!(
                "page {}: {} rows compressed to {:.4}in (header {:.4}in)",
                page.page_number,
                geometry.record_count,
                geometry.row_height,
                geometry.header_height
            );
        }

        let max_attempts = self.export_retries + 1;
        let mut attempt = 0;
        let committed = loop {
            attempt += 1;
            match self.render_and_commit(
                canvas, templates, renderer, exporter, output, page, &ctx, &layout, &records,
            ) {
                Ok(committed) => break committed,
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    log::warn!(
                        "page {}: attempt {} of {} failed: {}; retrying",
                        page.page_number,
                        attempt,
                        max_attempts,
                        err
                    );
                    if let Some(logger) = self.debug.as_deref() {
                        logger.increment("page.retries", 1);
                    }
                }
                Err(err) => return Err(err),
            }
        };

        log::debug!(
            "page {}: removed {} clones, parked {} primitives",
            page.page_number,
            committed.cleanup.clones_removed,
            committed.cleanup.primitives_parked
        );
        if canvas.clone_count() != 0 || !templates.is_parked(canvas) {
            return Err(MapBookError::InvalidConfiguration(format!(
                "template canvas did not return to baseline after page {}",
                page.page_number
            )));
        }

        let metrics = PageMetrics {
            page_number: page.page_number,
            region_key: page.region_key.clone(),
            record_count: records.len(),
            clone_count: committed.render.clones_created,
            empty_table: committed.render.empty_table,
            compressed: committed.render.compressed,
            artifact_bytes: committed.artifact_bytes,
            render_ms: elapsed_ms(started),
            attempts: attempt,
        };
        if let Some(logger) = self.debug.as_deref() {
            let sha = output
                .committed()
                .last()
                .map(|c| c.sha256.as_str())
                .unwrap_or("");
            logger.log_event(&DebugEvent::PageCommitted {
                page: metrics.page_number,
                region: &metrics.region_key,
                records: metrics.record_count,
                clones: metrics.clone_count,
                empty: metrics.empty_table,
                compressed: metrics.compressed,
                bytes: metrics.artifact_bytes,
                attempts: metrics.attempts,
                ms: metrics.render_ms,
                sha256: sha,
            });
            logger.increment("pages", 1);
            logger.increment("clones", metrics.clone_count as u64);
            if metrics.empty_table {
                logger.increment("pages.empty", 1);
            }
            if metrics.compressed {
                logger.increment("pages.compressed", 1);
            }
        }
        Ok(metrics)
    }

    // One attempt: render onto the shared canvas, export, append. The page scope parks the
    // canvas again whether or not the attempt succeeds.
    #[allow(clippy::too_many_arguments)]
    fn render_and_commit(
        &self,
        canvas: &mut LayoutCanvas,
        templates: &TemplateSet,
        renderer: &ElementRenderer<'_>,
        exporter: &mut dyn PageExport,
        output: &mut OutputDocument,
        page: &PageSpec,
        ctx: &DocContext,
        layout: &TableLayout,
        records: &RecordSet,
    ) -> Result<CommittedRender, MapBookError> {
        let mut scope = PageScope::new(canvas, templates, page.page_number);
        let render = renderer.render_page(scope.canvas_mut(), page, layout, records)?;
        let composed = compose_page(scope.canvas(), ctx);
        let artifact = exporter.export_page(&composed, page.page_number)?;
        let artifact_bytes = artifact.bytes();
        output.append_page(page.page_number, &page.region_key, artifact.path())?;
        drop(artifact);
        let cleanup = scope.finish();
        Ok(CommittedRender {
            render,
            artifact_bytes,
            cleanup,
        })
    }

    fn debug_event(&self, event: &DebugEvent<'_>) {
        if let Some(logger) = self.debug.as_deref() {
            logger.log_event(event);
        }
    }

    fn emit_debug_summary(&self, context: &str) {
        if let Some(logger) = self.debug.as_deref() {
            logger.emit_summary(context);
            logger.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!(
            "mapbook_{tag}_{}_{}",
            std::process::id(),
            nanos
        ));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    fn page(n: usize, region: &str, a: f64, b: f64) -> PageSpec {
        PageSpec {
            page_number: n,
            region_key: region.to_string(),
            indicator_a: a,
            indicator_b: b,
        }
    }

    fn rec(region: &str, label: &str, value: f64) -> (String, Record) {
        (
            region.to_string(),
            Record {
                label: label.to_string(),
                value,
            },
        )
    }

    fn sample_source() -> JsonDataSource {
        JsonDataSource::from_parts(
            vec![
                page(1, "Texas", 32.0, 37.6),
                page(2, "Vermont", 0.9, 1.3),
                page(3, "Georgia", 5.3, 8.8),
            ],
            vec![
                rec("Texas", "Harris", 250.0),
                rec("Texas", "Dallas", 120.5),
                rec("Texas", "Travis", 99.0),
                rec("Vermont", "Chittenden", 60.0),
                rec("Georgia", "Forsyth", 431.2),
            ],
        )
    }

    fn book(dir: &Path) -> MapBook {
        MapBook::builder()
            .output_path(dir.join("FinalOutput.pdf"))
            .build()
            .expect("build")
    }

    fn leftover_artifacts(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".mapbook-page-"))
            .collect()
    }

    /// Fails the first `failures` exports of `page`, then defers to the PDF exporter.
    struct FlakyExporter {
        inner: PdfPageExporter,
        page: usize,
        failures: usize,
        calls: Vec<usize>,
    }

    impl PageExport for FlakyExporter {
        fn export_page(
            &mut self,
            page: &Document,
            page_number: usize,
        ) -> Result<TempArtifact, MapBookError> {
            self.calls.push(page_number);
            if page_number == self.page && self.failures > 0 {
                self.failures -= 1;
                return Err(MapBookError::Export {
                    page: page_number,
                    message: "simulated export failure".to_string(),
                });
            }
            self.inner.export_page(page, page_number)
        }
    }

    #[test]
    fn run_merges_pages_in_order_with_metadata() {
        let dir = temp_dir("run");
        let mut book = book(&dir);
        assert_eq!(book.state(), RunState::Init);
        let summary = book.run(&sample_source()).expect("run");
        assert_eq!(book.state(), RunState::Finalized);

        assert_eq!(summary.pages_written, 3);
        assert_eq!(summary.total_records(), 3);
        assert_eq!(
            summary.committed.iter().map(|c| c.page_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(summary.pages[1].empty_table);
        assert_eq!(summary.pages[1].clone_count, 0);
        // Texas: 2 vertical + 3 horizontal + 1 header + 2 per record.
        assert_eq!(summary.pages[0].clone_count, 2 + 3 + 1 + 4);
        assert!(leftover_artifacts(&dir).is_empty());

        let report = inspect_pdf_path(&dir.join("FinalOutput.pdf")).expect("inspect");
        assert_eq!(report.page_count, 3);
        assert_eq!(report.title.as_deref(), Some("Hispanic Growth MapBook"));
        assert_eq!(report.subject.as_deref(), Some("Population"));
        assert_eq!(report.page_mode.as_deref(), Some("UseThumbs"));
        for (texts, region) in report.page_texts.iter().zip(["Texas", "Vermont", "Georgia"]) {
            assert!(texts.iter().any(|t| t == region), "{region}: {texts:?}");
        }

        let texas = &report.page_texts[0];
        for expected in ["County Name", "% Growth", "Dallas", "120.5", "Harris", "250.0", "(32.0)", "(37.6)"] {
            assert!(texas.iter().any(|t| t == expected), "missing {expected}");
        }
        assert!(!texas.iter().any(|t| t == "Travis"));
        let dallas = texas.iter().position(|t| t == "Dallas").unwrap();
        let harris = texas.iter().position(|t| t == "Harris").unwrap();
        assert!(dallas < harris);

        let vermont = &report.page_texts[1];
        assert!(vermont.iter().any(|t| t.starts_with("No counties")));
        assert!(!vermont.iter().any(|t| t == "County Name" || t == "Harris"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rerun_overwrites_previous_output() {
        let dir = temp_dir("overwrite");
        let out = dir.join("FinalOutput.pdf");
        book(&dir).run(&sample_source()).expect("first run");
        assert_eq!(inspect_pdf_path(&out).unwrap().page_count, 3);

        let smaller = JsonDataSource::from_parts(
            vec![page(1, "Utah", 9.0, 13.0)],
            vec![rec("Utah", "Utah County", 210.0)],
        );
        book(&dir).run(&smaller).expect("second run");
        let report = inspect_pdf_path(&out).unwrap();
        assert_eq!(report.page_count, 1);
        assert!(report.page_texts[0].iter().any(|t| t == "Utah"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn export_failure_is_retried_without_reordering() {
        let dir = temp_dir("retry");
        let mut exporter = FlakyExporter {
            inner: PdfPageExporter::new(&dir),
            page: 2,
            failures: 1,
            calls: Vec::new(),
        };
        let summary = book(&dir)
            .run_with(&sample_source(), &mut exporter)
            .expect("run");
        assert_eq!(exporter.calls, vec![1, 2, 2, 3]);
        assert_eq!(summary.retried_pages(), vec![2]);
        assert_eq!(summary.pages[1].attempts, 2);
        assert_eq!(
            summary.committed.iter().map(|c| c.page_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(inspect_pdf_path(&dir.join("FinalOutput.pdf")).unwrap().page_count, 3);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn persistent_export_failure_keeps_committed_pages() {
        let dir = temp_dir("fatal");
        let mut exporter = FlakyExporter {
            inner: PdfPageExporter::new(&dir),
            page: 2,
            failures: usize::MAX,
            calls: Vec::new(),
        };
        let mut book = MapBook::builder()
            .output_path(dir.join("FinalOutput.pdf"))
            .export_retries(2)
            .build()
            .unwrap();
        let err = book.run_with(&sample_source(), &mut exporter).unwrap_err();
        assert!(matches!(err, MapBookError::Export { page: 2, .. }));
        assert_eq!(exporter.calls, vec![1, 2, 2, 2]);
        assert_eq!(book.state(), RunState::Finalized);

        let report = inspect_pdf_path(&dir.join("FinalOutput.pdf")).unwrap();
        assert_eq!(report.page_count, 1);
        assert!(report.page_texts[0].iter().any(|t| t == "Texas"));
        assert!(leftover_artifacts(&dir).is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_primitive_fails_before_any_page() {
        let dir = temp_dir("missing");
        let out = dir.join("FinalOutput.pdf");
        std::fs::write(&out, b"previous run").unwrap();
        let mut template = PageTemplate::builtin();
        template.elements.retain(|spec| spec.name != "headerTxt");
        let mut book = MapBook::builder()
            .output_path(&out)
            .template(template)
            .build()
            .unwrap();
        match book.run(&sample_source()) {
            Err(MapBookError::MissingPrimitives(names)) => assert_eq!(names, vec!["headerTxt"]),
            other => panic!("expected missing primitives, got {other:?}"),
        }
        assert_eq!(book.state(), RunState::Init);
        assert_eq!(std::fs::read(&out).unwrap(), b"previous run");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn illegible_table_is_a_layout_error() {
        let dir = temp_dir("layout");
        let records: Vec<(String, Record)> = (0..30)
            .map(|i| rec("Texas", &format!("County {i}"), 150.0 + i as f64))
            .collect();
        let source = JsonDataSource::from_parts(vec![page(1, "Texas", 1.0, 2.0)], records);
        let mut book = MapBook::builder()
            .output_path(dir.join("FinalOutput.pdf"))
            .min_row_height(0.12)
            .build()
            .unwrap();
        let err = book.run(&source).unwrap_err();
        assert!(matches!(err, MapBookError::Layout { page: 1, .. }));
        assert!(!err.is_retryable());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn overflowing_table_is_compressed() {
        let dir = temp_dir("compress");
        let records: Vec<(String, Record)> = (0..20)
            .map(|i| rec("Texas", &format!("County {i}"), 150.0 + i as f64))
            .collect();
        let source = JsonDataSource::from_parts(vec![page(1, "Texas", 1.0, 2.0)], records);
        let summary = book(&dir).run(&source).unwrap();
        assert_eq!(summary.compressed_pages(), vec![1]);
        assert_eq!(summary.pages[0].clone_count, 2 + 21 + 1 + 40);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn out_of_sequence_pages_are_a_data_error() {
        let dir = temp_dir("sequence");
        let source = JsonDataSource::from_parts(
            vec![page(1, "Texas", 1.0, 1.0), page(3, "Utah", 1.0, 1.0)],
            Vec::new(),
        );
        let err = book(&dir).run(&source).unwrap_err();
        assert!(matches!(err, MapBookError::Data { page: Some(3), .. }));
        assert!(!dir.join("FinalOutput.pdf").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn primitives_placed_on_the_page_are_parked_before_page_one() {
        let dir = temp_dir("baseline");
        let mut template = PageTemplate::builtin();
        for spec in &mut template.elements {
            if spec.name == "NoGrowth" || spec.name == "horzLine" {
                spec.x = 3.0;
            }
        }
        let source = JsonDataSource::from_parts(
            vec![page(1, "Texas", 32.0, 37.6), page(2, "Georgia", 5.3, 8.8)],
            vec![rec("Texas", "Harris", 250.0), rec("Georgia", "Forsyth", 431.2)],
        );
        let mut book = MapBook::builder()
            .output_path(dir.join("FinalOutput.pdf"))
            .template(template)
            .build()
            .unwrap();
        let summary = book.run(&source).unwrap();
        // 2 vertical + (1 top + 1 row) horizontal + 1 header + 2 cells, same as page 2.
        assert_eq!(summary.pages[0].clone_count, summary.pages[1].clone_count);

        let report = inspect_pdf_path(&dir.join("FinalOutput.pdf")).unwrap();
        for texts in &report.page_texts {
            assert!(texts.iter().any(|t| t == "County Name"));
            assert!(!texts.iter().any(|t| t.starts_with("No counties")), "{texts:?}");
        }
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn unordered_page_file_is_rejected_not_sorted() {
        let dir = temp_dir("unordered");
        let source = JsonDataSource::from_json_str(
            r#"{
                "pages": [
                    {"page_number": 2, "region": "Utah", "indicator_a": 9.0, "indicator_b": 13.0},
                    {"page_number": 1, "region": "Texas", "indicator_a": 32.0, "indicator_b": 37.6}
                ],
                "records": []
            }"#,
        )
        .unwrap();
        let err = book(&dir).run(&source).unwrap_err();
        assert!(matches!(err, MapBookError::Data { page: Some(2), .. }));
        assert!(!dir.join("FinalOutput.pdf").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn builder_validates_configuration() {
        assert!(matches!(
            MapBook::builder().build(),
            Err(MapBookError::InvalidConfiguration(msg)) if msg.contains("output_path")
        ));
        assert!(
            MapBook::builder()
                .output_path("book.pdf")
                .predicate_threshold(f64::NAN)
                .build()
                .is_err()
        );
        assert!(
            MapBook::builder()
                .output_path("book.pdf")
                .bars(BarSpec {
                    domain: 0.0,
                    ..BarSpec::default()
                })
                .build()
                .is_err()
        );
        assert!(
            MapBook::builder()
                .output_path("book.pdf")
                .table(TableSpec {
                    header_height: 4.0,
                    ..TableSpec::default()
                })
                .build()
                .is_err()
        );
        let book = MapBook::builder().output_path("book.pdf").build().unwrap();
        assert_eq!(book.work_dir, PathBuf::from("."));
    }

    #[test]
    fn debug_log_records_pages_and_summary() {
        let dir = temp_dir("debug");
        let log_path = dir.join("trace.jsonl");
        let mut book = MapBook::builder()
            .output_path(dir.join("FinalOutput.pdf"))
            .debug_log(&log_path)
            .page_mode(PageMode::UseOutlines)
            .build()
            .unwrap();
        book.run(&sample_source()).unwrap();

        let raw = std::fs::read_to_string(&log_path).unwrap();
        let events: Vec<serde_json::Value> = raw
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        let committed: Vec<&serde_json::Value> = events
            .iter()
            .filter(|e| e["type"] == "page.committed")
            .collect();
        assert_eq!(committed.len(), 3);
        assert_eq!(committed[0]["region"], "Texas");
        assert_eq!(committed[0]["sha256"].as_str().map(str::len), Some(64));
        let summary = events.last().unwrap();
        assert_eq!(summary["type"], "debug.summary");
        assert_eq!(summary["counts"]["pages"], 3);
        assert_eq!(summary["counts"]["pages.empty"], 1);

        let report = inspect_pdf_path(&dir.join("FinalOutput.pdf")).unwrap();
        assert_eq!(report.page_mode.as_deref(), Some("UseOutlines"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
