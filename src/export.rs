use crate::canvas::{Canvas, Command, Document, Page};
use crate::doc_context::DocContext;
use crate::element::{Anchor, Element, ElementKind, LayoutCanvas};
use crate::error::MapBookError;
use crate::template::Role;
use crate::types::{Color, POINTS_PER_INCH, Pt};
use fixed::types::I32F32;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const META_PAGE: &str = "mapbook.page";
pub const META_REGION: &str = "mapbook.region";
pub const META_QUERY: &str = "mapbook.definition_query";

const DEFAULT_FONT: &str = "Helvetica";
// Average Helvetica advance, in ems. Only used to center and bottom-align text boxes.
const AVERAGE_ADVANCE_EM: f32 = 0.5;

/// Draws every on-page element of the layout canvas, in paint order, onto a single page.
///
/// Elements whose anchor lies outside the page (parked primitives) are skipped. Static
/// template text has its `{region}`/`{page}` tokens expanded from `ctx`.
pub fn compose_page(layout: &LayoutCanvas, ctx: &DocContext) -> Document {
    let page_size = layout.page_size();
    let page_height_in = page_size.height_inches();
    let mut canvas = Canvas::new(page_size);
    canvas.meta(META_PAGE, ctx.page_number.to_string());
    canvas.meta(META_REGION, ctx.region_key.clone());
    canvas.meta(META_QUERY, ctx.definition_query.clone());

    for element in layout.elements() {
        if !layout.is_on_canvas(element) {
            continue;
        }
        match element.kind {
            ElementKind::Line => draw_line(&mut canvas, element, page_height_in),
            ElementKind::Rect => draw_rect(&mut canvas, element, page_height_in),
            ElementKind::Text => {
                let Some(raw) = element.text.as_deref() else {
                    continue;
                };
                let is_static = !element.is_clone() && Role::from_element_name(&element.name).is_none();
                let text = if is_static {
                    ctx.substitute(raw)
                } else {
                    raw.to_string()
                };
                if text.is_empty() {
                    continue;
                }
                draw_text(&mut canvas, element, &text, page_height_in);
            }
        }
    }
    canvas.finish()
}

// Element geometry is in inches with y growing up from the page bottom; canvas commands are
// in points with y growing down from the page top.
fn to_canvas(x_in: f32, y_in: f32, page_height_in: f32) -> (Pt, Pt) {
    (
        Pt::from_inches(x_in),
        Pt::from_inches(page_height_in - y_in),
    )
}

/// Left and top edges of an element box of the given size, in page inches.
fn box_origin(anchor: Anchor, x: f32, y: f32, width: f32, height: f32) -> (f32, f32) {
    match anchor {
        Anchor::TopLeft => (x, y),
        Anchor::BottomLeft => (x, y + height),
        Anchor::Center => (x - width / 2.0, y + height / 2.0),
        Anchor::BottomCenter => (x - width / 2.0, y + height),
    }
}

fn draw_line(canvas: &mut Canvas, element: &Element, page_height_in: f32) {
    let (x0, y0) = to_canvas(element.x, element.y, page_height_in);
    let (x1, y1) = to_canvas(
        element.x + element.width,
        element.y - element.height,
        page_height_in,
    );
    canvas.set_stroke_color(element.stroke);
    canvas.set_line_width(Pt::from_f32(element.line_width));
    canvas.move_to(x0, y0);
    canvas.line_to(x1, y1);
    canvas.stroke();
}

fn draw_rect(canvas: &mut Canvas, element: &Element, page_height_in: f32) {
    let (left, top) = box_origin(
        element.anchor,
        element.x,
        element.y,
        element.width,
        element.height,
    );
    let (x, y) = to_canvas(left, top, page_height_in);
    let width = Pt::from_inches(element.width);
    let height = Pt::from_inches(element.height);
    if let Some(fill) = element.fill {
        if element.width > 0.0 && element.height > 0.0 {
            canvas.set_fill_color(fill);
            canvas.draw_rect(x, y, width, height);
        }
    }
    if element.line_width > 0.0 {
        canvas.set_stroke_color(element.stroke);
        canvas.set_line_width(Pt::from_f32(element.line_width));
        canvas.move_to(x, y);
        canvas.line_to(x + width, y);
        canvas.line_to(x + width, y + height);
        canvas.line_to(x, y + height);
        canvas.line_to(x, y);
        canvas.stroke();
    }
}

fn draw_text(canvas: &mut Canvas, element: &Element, text: &str, page_height_in: f32) {
    let font_size = element.font_size.max(0.0);
    let width_in = estimate_text_width(text, font_size) / POINTS_PER_INCH;
    let height_in = font_size / POINTS_PER_INCH;
    let (left, top) = box_origin(element.anchor, element.x, element.y, width_in, height_in);
    let (x, y) = to_canvas(left, top, page_height_in);
    canvas.set_fill_color(element.stroke);
    canvas.set_font_name(&element.font_name);
    canvas.set_font_size(Pt::from_f32(font_size));
    canvas.draw_string(x, y, text);
}

fn estimate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().count() as f32 * AVERAGE_ADVANCE_EM * font_size
}

/// Serializes a composed document as an uncompressed PDF 1.7 file using the standard Type1
/// fonts. Unknown font names fall back to Helvetica.
pub fn document_to_pdf(document: &Document) -> Vec<u8> {
    let fonts = collect_fonts(document);
    let font_start = 3;
    let page_start = font_start + fonts.len();

    let mut objects: Vec<String> = Vec::new();
    let kids = (0..document.pages.len())
        .map(|idx| format!("{} 0 R", page_start + idx * 2))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids,
        document.pages.len()
    ));
    for base in fonts.keys() {
        objects.push(format!(
            "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
            base
        ));
    }
    let font_resources = fonts
        .values()
        .enumerate()
        .map(|(idx, resource)| format!("/{} {} 0 R", resource, font_start + idx))
        .collect::<Vec<_>>()
        .join(" ");

    let page_height = document.page_size.height;
    for (idx, page) in document.pages.iter().enumerate() {
        let content_id = page_start + idx * 2 + 1;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] /Resources << /Font << {} >> >> /Contents {} 0 R >>",
            fmt_pt(document.page_size.width),
            fmt_pt(page_height),
            font_resources,
            content_id
        ));
        let content = render_commands(page, page_height, &fonts);
        objects.push(stream_object(&content));
    }

    build_pdf(objects, 1)
}

/// Canonical base-14 name -> resource name, Helvetica always first.
fn collect_fonts(document: &Document) -> BTreeMap<String, String> {
    let mut names: Vec<&'static str> = vec![DEFAULT_FONT];
    for page in &document.pages {
        for cmd in &page.commands {
            if let Command::SetFontName(name) = cmd {
                let base = base14_name(name);
                if !names.contains(&base) {
                    names.push(base);
                }
            }
        }
    }
    names
        .into_iter()
        .enumerate()
        .map(|(idx, name)| (name.to_string(), format!("F{}", idx + 1)))
        .collect()
}

fn base14_name(name: &str) -> &'static str {
    let n = name.trim().trim_matches('"').to_ascii_lowercase();
    match n.as_str() {
        "helvetica-bold" => "Helvetica-Bold",
        "helvetica-oblique" => "Helvetica-Oblique",
        "helvetica-boldoblique" => "Helvetica-BoldOblique",
        "times-roman" => "Times-Roman",
        "times-bold" => "Times-Bold",
        "times-italic" => "Times-Italic",
        "times-bolditalic" => "Times-BoldItalic",
        "courier" => "Courier",
        "courier-bold" => "Courier-Bold",
        "courier-oblique" => "Courier-Oblique",
        "courier-boldoblique" => "Courier-BoldOblique",
        _ => DEFAULT_FONT,
    }
}

fn render_commands(page: &Page, page_height: Pt, fonts: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    let mut font_size = Pt::from_f32(12.0);
    let mut font_resource = fonts
        .get(DEFAULT_FONT)
        .cloned()
        .unwrap_or_else(|| "F1".to_string());

    for cmd in &page.commands {
        match cmd {
            Command::Meta { .. } => {}
            Command::SetFillColor(color) => out.push_str(&color_op(*color, "rg")),
            Command::SetStrokeColor(color) => out.push_str(&color_op(*color, "RG")),
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetFontName(name) => {
                if let Some(resource) = fonts.get(base14_name(name)) {
                    font_resource = resource.clone();
                }
            }
            Command::SetFontSize(size) => font_size = *size,
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::DrawString { x, y, text } => {
                let encoded = encode_winansi_pdf_string(text);
                if encoded.replaced > 0 {
                    log::debug!(
                        "{} character(s) in {:?} have no WinAnsi code and were replaced",
                        encoded.replaced,
                        text
                    );
                }
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", font_resource, fmt_pt(font_size)));
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - font_size)
                ));
                out.push_str(&format!("({}) Tj\n", encoded.text));
                out.push_str("ET\n");
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                out.push_str(&format!(
                    "{} {} {} {} re\nf\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
        }
    }
    out
}

fn stream_object(content: &str) -> String {
    format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        content.len(),
        content
    )
}

fn build_pdf(objects: Vec<String>, catalog_id: usize) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n");
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, obj) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        out.extend_from_slice(obj.as_bytes());
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root {} 0 R >>\nstartxref\n{}\n%%EOF",
            objects.len() + 1,
            catalog_id,
            xref_start
        )
        .as_bytes(),
    );
    out
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
}

fn encode_winansi_pdf_string(input: &str) -> WinAnsiEncoded {
    let mut out = String::new();
    let mut replaced = 0usize;
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            '\u{20AC}' => 0x80,
            '\u{2026}' => 0x85,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{0160}' => 0x8A,
            '\u{0161}' => 0x9A,
            '\u{017D}' => 0x8E,
            '\u{017E}' => 0x9E,
            _ => {
                replaced += 1;
                b'?'
            }
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    WinAnsiEncoded {
        text: out,
        replaced,
    }
}

fn color_op(color: Color, op: &str) -> String {
    format!(
        "{} {} {} {}\n",
        fmt(color.r.clamp(0.0, 1.0)),
        fmt(color.g.clamp(0.0, 1.0)),
        fmt(color.b.clamp(0.0, 1.0)),
        op
    )
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

/// A single-page PDF written for one page of the book. The file is removed when the artifact
/// is dropped, whether or not it was appended.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    bytes: u64,
}

impl TempArtifact {
    /// Creates the file at `path` and fills it with `write`. The artifact owns the path from
    /// the start, so a failed or partial write leaves nothing behind.
    pub(crate) fn write_with(
        path: PathBuf,
        write: impl FnOnce(&mut std::fs::File) -> std::io::Result<()>,
    ) -> std::io::Result<Self> {
        let mut artifact = Self { path, bytes: 0 };
        let mut file = std::fs::File::create(&artifact.path)?;
        write(&mut file)?;
        file.sync_all()?;
        artifact.bytes = file.metadata()?.len();
        Ok(artifact)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => log::warn!("could not remove {}: {}", self.path.display(), err),
        }
    }
}

/// Turns a composed page into a standalone single-page artifact on disk.
pub trait PageExport {
    fn export_page(
        &mut self,
        page: &Document,
        page_number: usize,
    ) -> Result<TempArtifact, MapBookError>;
}

/// Writes page artifacts as PDF files into a working directory.
#[derive(Debug, Clone)]
pub struct PdfPageExporter {
    work_dir: PathBuf,
}

impl PdfPageExporter {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn artifact_path(&self, page_number: usize) -> PathBuf {
        self.work_dir.join(format!(
            ".mapbook-page-{:04}-{}.pdf",
            page_number,
            std::process::id()
        ))
    }
}

impl PageExport for PdfPageExporter {
    fn export_page(
        &mut self,
        page: &Document,
        page_number: usize,
    ) -> Result<TempArtifact, MapBookError> {
        if page.pages.len() != 1 {
            return Err(MapBookError::export(
                page_number,
                format!("expected one composed page, got {}", page.pages.len()),
            ));
        }
        let bytes = document_to_pdf(page);
        let path = self.artifact_path(page_number);
        TempArtifact::write_with(path.clone(), |file| file.write_all(&bytes)).map_err(|err| {
            MapBookError::export(page_number, format!("write {}: {}", path.display(), err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_template::PageTemplate;
    use crate::template::{Role, TemplateSet};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_dir(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "mapbook_export_{}_{}_{}",
            tag,
            std::process::id(),
            nanos
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn ctx() -> DocContext {
        DocContext::new(2, 5, "Texas", "\"STATE_NAME\" = 'Texas' AND \"HisPerChange\" > 100")
    }

    #[test]
    fn parked_primitives_are_not_drawn() {
        let layout = PageTemplate::builtin().instantiate().unwrap();
        let doc = compose_page(&layout, &ctx());
        assert_eq!(doc.pages.len(), 1);
        let strings: Vec<&str> = doc.pages[0].strings().collect();
        assert!(strings.contains(&"Texas"));
        assert!(strings.contains(&"Page 2"));
        assert!(!strings.iter().any(|s| s.contains("No counties")));
    }

    #[test]
    fn page_meta_records_region_and_query() {
        let layout = PageTemplate::builtin().instantiate().unwrap();
        let doc = compose_page(&layout, &ctx());
        let page = &doc.pages[0];
        assert_eq!(page.meta_value(META_REGION), Some("Texas"));
        assert_eq!(page.meta_value(META_PAGE), Some("2"));
        assert!(page.meta_value(META_QUERY).unwrap().contains("'Texas'"));
    }

    #[test]
    fn role_text_is_not_token_expanded() {
        let mut layout = PageTemplate::builtin().instantiate().unwrap();
        let set = TemplateSet::resolve(&layout).unwrap();
        let notice = layout.get_mut(set.get(Role::NoGrowth)).unwrap();
        notice.x = 3.0;
        notice.text = Some("{region}".to_string());
        let doc = compose_page(&layout, &ctx());
        let strings: Vec<&str> = doc.pages[0].strings().collect();
        assert!(strings.contains(&"{region}"));
    }

    #[test]
    fn box_origin_follows_anchor() {
        assert_eq!(box_origin(Anchor::TopLeft, 1.0, 5.0, 2.0, 1.0), (1.0, 5.0));
        assert_eq!(box_origin(Anchor::BottomLeft, 1.0, 5.0, 2.0, 1.0), (1.0, 6.0));
        assert_eq!(box_origin(Anchor::Center, 1.0, 5.0, 2.0, 1.0), (0.0, 5.5));
        assert_eq!(box_origin(Anchor::BottomCenter, 1.0, 5.0, 2.0, 1.0), (0.0, 6.0));
    }

    #[test]
    fn pdf_output_loads_with_lopdf() {
        let layout = PageTemplate::builtin().instantiate().unwrap();
        let bytes = document_to_pdf(&compose_page(&layout, &ctx()));
        assert!(bytes.starts_with(b"%PDF-1.7"));
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("/BaseFont /Helvetica-Bold"));
        assert!(text.contains("(Texas) Tj"));
    }

    #[test]
    fn winansi_escapes_delimiters_and_replaces_unknowns() {
        let encoded = encode_winansi_pdf_string("(A\\B) \u{00E9} \u{4E2D}");
        assert_eq!(encoded.text, "\\(A\\\\B\\) \\351 ?");
        assert_eq!(encoded.replaced, 1);
    }

    #[test]
    fn number_formatting_trims_zeros() {
        assert_eq!(fmt(0.5), "0.5");
        assert_eq!(fmt(1.0), "1");
        assert_eq!(fmt_pt(Pt::from_inches(3.2)), "230.4");
        assert_eq!(format_milli(-1250), "-1.25");
    }

    #[test]
    fn exporter_writes_and_artifact_drop_removes() {
        let dir = temp_dir("drop");
        let layout = PageTemplate::builtin().instantiate().unwrap();
        let mut exporter = PdfPageExporter::new(&dir);
        let artifact = exporter
            .export_page(&compose_page(&layout, &ctx()), 2)
            .unwrap();
        let path = artifact.path().to_path_buf();
        assert!(path.exists());
        assert!(artifact.bytes() > 0);
        drop(artifact);
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn interrupted_write_leaves_no_artifact() {
        let dir = temp_dir("partial");
        let path = dir.join(".mapbook-page-0003.pdf");
        let err = TempArtifact::write_with(path.clone(), |file| {
            file.write_all(b"%PDF-1.7\n1 0 obj")?;
            Err(std::io::Error::other("disk full"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "disk full");
        assert!(!path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn exporter_reports_unwritable_directory() {
        let dir = temp_dir("missing").join("does-not-exist");
        let layout = PageTemplate::builtin().instantiate().unwrap();
        let mut exporter = PdfPageExporter::new(&dir);
        let err = exporter
            .export_page(&compose_page(&layout, &ctx()), 7)
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.page(), Some(7));
    }
}
