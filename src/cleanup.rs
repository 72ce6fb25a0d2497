use crate::element::{ElementId, KindFilter, LayoutCanvas};
use crate::template::TemplateSet;

/// Name pattern shared by every page-scoped clone.
pub const CLONE_PATTERN: &str = "*_clone*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CleanupSummary {
    pub clones_removed: usize,
    pub primitives_parked: usize,
}

impl CleanupSummary {
    pub fn is_noop(&self) -> bool {
        self.clones_removed == 0 && self.primitives_parked == 0
    }
}

/// Returns the template canvas to its between-pages baseline: no clones, and every table and
/// notice primitive parked off the page. Running it twice is a no-op the second time.
pub fn cleanup_page(canvas: &mut LayoutCanvas, templates: &TemplateSet) -> CleanupSummary {
    let mut doomed: Vec<ElementId> = canvas.list(KindFilter::Graphic, CLONE_PATTERN);
    doomed.extend(canvas.list(KindFilter::Text, CLONE_PATTERN));
    // Clones made with a custom suffix still carry their origin tag.
    doomed.extend(canvas.elements().filter(|e| e.is_clone()).map(|e| e.id));
    doomed.sort();
    doomed.dedup();

    let clones_removed = doomed.into_iter().filter(|id| canvas.delete(*id)).count();
    let primitives_parked = templates.reset(canvas);
    CleanupSummary {
        clones_removed,
        primitives_parked,
    }
}

/// Scope of one page's render pass over the shared canvas. Dropping the scope without
/// [`PageScope::finish`] (an early `?` return) still cleans the canvas.
pub struct PageScope<'a> {
    canvas: &'a mut LayoutCanvas,
    templates: &'a TemplateSet,
    page_number: usize,
    finished: bool,
}

impl<'a> PageScope<'a> {
    pub fn new(canvas: &'a mut LayoutCanvas, templates: &'a TemplateSet, page_number: usize) -> Self {
        Self {
            canvas,
            templates,
            page_number,
            finished: false,
        }
    }

    pub fn canvas(&self) -> &LayoutCanvas {
        &*self.canvas
    }

    pub fn canvas_mut(&mut self) -> &mut LayoutCanvas {
        &mut *self.canvas
    }

    pub fn page_number(&self) -> usize {
        self.page_number
    }

    pub fn finish(mut self) -> CleanupSummary {
        self.finished = true;
        cleanup_page(&mut *self.canvas, self.templates)
    }
}

impl Drop for PageScope<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let summary = cleanup_page(&mut *self.canvas, self.templates);
        log::debug!(
            "page {} abandoned: removed {} clones, parked {} primitives",
            self.page_number,
            summary.clones_removed,
            summary.primitives_parked
        );
    }
}
