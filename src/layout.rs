use std::fmt;

/// Ratio between a text box height in inches and its font size in points.
pub const HEIGHT_PER_POINT: f32 = 0.0155;

/// Bounds and nominal sizes of the on-page table, in inches.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpec {
    pub table_height: f32,
    pub table_width: f32,
    pub header_height: f32,
    pub row_height: f32,
    pub upper_x: f32,
    pub upper_y: f32,
    /// Offsets from `upper_x` of the two dividers right of the left border.
    pub divider_offsets: [f32; 2],
    /// Horizontal centers (from `upper_x`) of the two column titles.
    pub header_centers: [f32; 2],
    /// Left edge (from `upper_x`) of the label and value cell text.
    pub cell_offsets: [f32; 2],
    /// Where the "no records" notice is placed when the table is empty.
    pub notice_anchor: [f32; 2],
    /// Smallest row height still drawn; anything tighter is rejected.
    pub min_row_height: f32,
}

impl Default for TableSpec {
    fn default() -> Self {
        Self {
            table_height: 3.0,
            table_width: 2.5,
            header_height: 0.2,
            row_height: 0.15,
            upper_x: 2.8,
            upper_y: 3.2,
            divider_offsets: [1.5, 2.5],
            header_centers: [0.75, 2.0],
            cell_offsets: [0.05, 1.8],
            notice_anchor: [3.0, 2.0],
            min_row_height: 2.0 * HEIGHT_PER_POINT,
        }
    }
}

impl TableSpec {
    pub(crate) fn validate(&self) -> Result<(), LayoutError> {
        let named = [
            ("table_height", self.table_height),
            ("table_width", self.table_width),
            ("header_height", self.header_height),
            ("row_height", self.row_height),
        ];
        for (name, value) in named {
            if !value.is_finite() || value <= 0.0 {
                return Err(LayoutError::InvalidBounds(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if !self.upper_x.is_finite() || !self.upper_y.is_finite() {
            return Err(LayoutError::InvalidBounds(
                "table origin must be finite".to_string(),
            ));
        }
        if !self.min_row_height.is_finite() || self.min_row_height < 0.0 {
            return Err(LayoutError::InvalidBounds(
                "min_row_height must be a non-negative number".to_string(),
            ));
        }
        if self.header_height >= self.table_height {
            return Err(LayoutError::InvalidBounds(format!(
                "header_height {} leaves no room for rows in table_height {}",
                self.header_height, self.table_height
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayoutError {
    InvalidBounds(String),
    RowsTooSmall {
        records: usize,
        row_height: f32,
        min_row_height: f32,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutError::InvalidBounds(message) => write!(f, "invalid table bounds: {}", message),
            LayoutError::RowsTooSmall {
                records,
                row_height,
                min_row_height,
            } => write!(
                f,
                "{} records compress rows to {:.4}in, below the {:.4}in minimum",
                records, row_height, min_row_height
            ),
        }
    }
}

impl std::error::Error for LayoutError {}

/// Concrete table geometry for one page. Horizontal divider y positions run top to bottom:
/// the top border, the line under the header, then one line under each record row.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutGeometry {
    pub header_height: f32,
    pub row_height: f32,
    pub table_height: f32,
    pub table_width: f32,
    pub origin_x: f32,
    pub origin_y: f32,
    pub record_count: usize,
    pub compressed: bool,
    pub vertical_xs: [f32; 3],
    pub horizontal_ys: Vec<f32>,
}

impl LayoutGeometry {
    /// Height actually covered by header and rows (the vertical divider length).
    pub fn used_height(&self) -> f32 {
        self.header_height + self.row_height * self.record_count as f32
    }

    /// Top edge of the first record row.
    pub fn rows_top(&self) -> f32 {
        self.origin_y - self.header_height
    }

    pub fn header_font_size(&self) -> f32 {
        self.header_height / HEIGHT_PER_POINT
    }

    pub fn cell_font_size(&self) -> f32 {
        self.row_height / HEIGHT_PER_POINT
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableLayout {
    /// No records: the page shows the notice instead of a table.
    Empty,
    Table(LayoutGeometry),
}

impl TableLayout {
    pub fn geometry(&self) -> Option<&LayoutGeometry> {
        match self {
            TableLayout::Empty => None,
            TableLayout::Table(geometry) => Some(geometry),
        }
    }
}

/// Fits `num_records` rows plus the header into the table bounds.
///
/// Rows keep their nominal height while they fit. Otherwise the header is shrunk by the same
/// ratio the rows would need, and the row height is recomputed from the shrunk header so that
/// header plus rows exactly fills `table_height`.
pub fn compute_table_layout(num_records: usize, spec: &TableSpec) -> Result<TableLayout, LayoutError> {
    spec.validate()?;
    if num_records == 0 {
        return Ok(TableLayout::Empty);
    }

    let n = num_records as f32;
    let available = spec.table_height - spec.header_height;
    let mut header_height = spec.header_height;
    let mut row_height = spec.row_height;
    let compressed = available / n < spec.row_height;
    if compressed {
        let ratio = available / n;
        header_height = spec.header_height * ratio / spec.row_height;
        row_height = (spec.table_height - header_height) / n;
    }

    if !row_height.is_finite() || row_height <= 0.0 || row_height < spec.min_row_height {
        return Err(LayoutError::RowsTooSmall {
            records: num_records,
            row_height,
            min_row_height: spec.min_row_height,
        });
    }

    let mut horizontal_ys = Vec::with_capacity(num_records + 2);
    horizontal_ys.push(spec.upper_y);
    let mut y = spec.upper_y - header_height;
    horizontal_ys.push(y);
    for _ in 0..num_records {
        y -= row_height;
        horizontal_ys.push(y);
    }

    Ok(TableLayout::Table(LayoutGeometry {
        header_height,
        row_height,
        table_height: spec.table_height,
        table_width: spec.table_width,
        origin_x: spec.upper_x,
        origin_y: spec.upper_y,
        record_count: num_records,
        compressed,
        vertical_xs: [
            spec.upper_x,
            spec.upper_x + spec.divider_offsets[0],
            spec.upper_x + spec.divider_offsets[1],
        ],
        horizontal_ys,
    }))
}
