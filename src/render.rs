use crate::element::{CLONE_SUFFIX, LayoutCanvas};
use crate::error::MapBookError;
use crate::layout::{LayoutGeometry, TableLayout, TableSpec};
use crate::records::{PageSpec, RecordSet};
use crate::template::{Role, TemplateSet};

/// Linear scale from indicator values to bar heights on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct BarSpec {
    /// Indicator value drawn at full `range` height.
    pub domain: f32,
    /// Bar height in inches at `domain`.
    pub range: f32,
    /// Gap between the top of a bar and its value label.
    pub label_gap: f32,
}

impl Default for BarSpec {
    fn default() -> Self {
        Self {
            domain: 50.0,
            range: 2.0,
            label_gap: 0.1,
        }
    }
}

impl BarSpec {
    pub fn height_for(&self, value: f64) -> f32 {
        let height = (value as f32 / self.domain) * self.range;
        if height.is_finite() { height.max(0.0) } else { 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnTitles {
    pub label: String,
    pub value: String,
}

impl Default for ColumnTitles {
    fn default() -> Self {
        Self {
            label: "County Name".to_string(),
            value: "% Growth".to_string(),
        }
    }
}

/// Rounds to two decimals and prints the shortest form with at least one decimal digit:
/// `25 -> "25.0"`, `12.3456 -> "12.35"`, `100.5 -> "100.5"`.
pub fn format_rounded(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0;
    if rounded.fract() == 0.0 && rounded.abs() < 1e15 {
        format!("{:.1}", rounded)
    } else {
        format!("{}", rounded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderSummary {
    pub clones_created: usize,
    pub empty_table: bool,
    pub compressed: bool,
}

/// Realizes a page's table layout and bar chart on the shared template canvas.
pub struct ElementRenderer<'a> {
    templates: &'a TemplateSet,
    table: &'a TableSpec,
    bars: &'a BarSpec,
    titles: &'a ColumnTitles,
}

impl<'a> ElementRenderer<'a> {
    pub fn new(
        templates: &'a TemplateSet,
        table: &'a TableSpec,
        bars: &'a BarSpec,
        titles: &'a ColumnTitles,
    ) -> Self {
        Self {
            templates,
            table,
            bars,
            titles,
        }
    }

    pub fn render_page(
        &self,
        canvas: &mut LayoutCanvas,
        page: &PageSpec,
        layout: &TableLayout,
        records: &RecordSet,
    ) -> Result<RenderSummary, MapBookError> {
        let before = canvas.clones_for_page(page.page_number);
        let mut summary = RenderSummary::default();
        match layout {
            TableLayout::Empty => {
                self.render_notice(canvas)?;
                summary.empty_table = true;
            }
            TableLayout::Table(geometry) => {
                if geometry.record_count != records.len() {
                    return Err(MapBookError::Layout {
                        page: page.page_number,
                        message: format!(
                            "layout sized for {} rows but {} records were fetched",
                            geometry.record_count,
                            records.len()
                        ),
                    });
                }
                self.render_table(canvas, page.page_number, geometry, records)?;
                summary.compressed = geometry.compressed;
            }
        }
        self.render_bars(canvas, page)?;
        summary.clones_created = canvas.clones_for_page(page.page_number) - before;
        Ok(summary)
    }

    fn render_notice(&self, canvas: &mut LayoutCanvas) -> Result<(), MapBookError> {
        let notice = canvas.element_mut(self.templates.get(Role::NoGrowth))?;
        notice.x = self.table.notice_anchor[0];
        notice.y = self.table.notice_anchor[1];
        Ok(())
    }

    fn render_table(
        &self,
        canvas: &mut LayoutCanvas,
        page_number: usize,
        geometry: &LayoutGeometry,
        records: &RecordSet,
    ) -> Result<(), MapBookError> {
        let spec = self.table;

        // Vertical dividers: the template line is the left border, clones fill the rest.
        let vert = self.templates.get(Role::VertLine);
        {
            let line = canvas.element_mut(vert)?;
            line.height = geometry.used_height();
            line.x = geometry.vertical_xs[0];
            line.y = geometry.origin_y;
        }
        for x in &geometry.vertical_xs[1..] {
            let clone = canvas.clone_element(vert, CLONE_SUFFIX, page_number)?;
            canvas.element_mut(clone)?.x = *x;
        }

        // Horizontal dividers: a clone keeps the top border, the template moves under the
        // header, and one clone is added under each row.
        let horz = self.templates.get(Role::HorzLine);
        {
            let line = canvas.element_mut(horz)?;
            line.width = geometry.table_width;
            line.x = geometry.origin_x;
            line.y = geometry.horizontal_ys[0];
        }
        canvas.clone_element(horz, CLONE_SUFFIX, page_number)?;
        canvas.element_mut(horz)?.y = geometry.horizontal_ys[1];
        for y in &geometry.horizontal_ys[2..] {
            let clone = canvas.clone_element(horz, CLONE_SUFFIX, page_number)?;
            canvas.element_mut(clone)?.y = *y;
        }

        let header = self.templates.get(Role::HeaderText);
        {
            let text = canvas.element_mut(header)?;
            text.font_size = geometry.header_font_size();
            text.text = Some(self.titles.label.clone());
            text.x = geometry.origin_x + spec.header_centers[0];
            text.y = geometry.origin_y - geometry.header_height / 2.0;
        }
        let value_header = canvas.clone_element(header, CLONE_SUFFIX, page_number)?;
        {
            let text = canvas.element_mut(value_header)?;
            text.text = Some(self.titles.value.clone());
            text.x = geometry.origin_x + spec.header_centers[1];
        }

        let cell = self.templates.get(Role::CellText);
        canvas.element_mut(cell)?.font_size = geometry.cell_font_size();
        let label_x = geometry.origin_x + spec.cell_offsets[0];
        let value_x = geometry.origin_x + spec.cell_offsets[1];
        let mut y = geometry.rows_top();
        for record in records {
            let label = canvas.clone_element(cell, CLONE_SUFFIX, page_number)?;
            {
                let text = canvas.element_mut(label)?;
                text.text = Some(record.label.clone());
                text.x = label_x;
                text.y = y;
            }
            let value = canvas.clone_element(cell, CLONE_SUFFIX, page_number)?;
            {
                let text = canvas.element_mut(value)?;
                text.text = Some(format_rounded(record.value));
                text.x = value_x;
                text.y = y;
            }
            y -= geometry.row_height;
        }
        Ok(())
    }

    fn render_bars(&self, canvas: &mut LayoutCanvas, page: &PageSpec) -> Result<(), MapBookError> {
        let pairs = [
            (Role::Bar1, Role::Bar1Text, page.indicator_a),
            (Role::Bar2, Role::Bar2Text, page.indicator_b),
        ];
        for (bar_role, label_role, value) in pairs {
            let height = self.bars.height_for(value);
            let bar = canvas.element_mut(self.templates.get(bar_role))?;
            bar.height = height;
            let top = bar.y + bar.height;
            let label = canvas.element_mut(self.templates.get(label_role))?;
            label.text = Some(format!("({})", format_rounded(value)));
            label.y = top + self.bars.label_gap;
        }
        Ok(())
    }
}
