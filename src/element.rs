use crate::error::MapBookError;
use crate::types::{Color, Size};
use serde::{Deserialize, Serialize};

/// Name suffix carried by every page-scoped copy of a template element.
pub const CLONE_SUFFIX: &str = "_clone";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Line,
    Rect,
    Text,
}

impl ElementKind {
    pub fn is_graphic(self) -> bool {
        matches!(self, ElementKind::Line | ElementKind::Rect)
    }
}

/// Filter used when listing elements, mirroring the graphic/text split of a page layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    Any,
    Graphic,
    Text,
}

impl KindFilter {
    fn accepts(self, kind: ElementKind) -> bool {
        match self {
            KindFilter::Any => true,
            KindFilter::Graphic => kind.is_graphic(),
            KindFilter::Text => kind == ElementKind::Text,
        }
    }
}

/// Which point of the element's box `(x, y)` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    #[default]
    TopLeft,
    BottomLeft,
    Center,
    BottomCenter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementOrigin {
    Template,
    Clone { page: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: ElementId,
    pub name: String,
    pub kind: ElementKind,
    pub origin: ElementOrigin,
    pub anchor: Anchor,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
    pub font_name: String,
    pub text: Option<String>,
    pub stroke: Color,
    pub fill: Option<Color>,
    /// Stroke width in points.
    pub line_width: f32,
}

impl Element {
    pub fn is_clone(&self) -> bool {
        matches!(self.origin, ElementOrigin::Clone { .. })
    }
}

/// Serializable description of one element as it sits on the template canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSpec {
    pub name: String,
    pub kind: ElementKind,
    #[serde(default)]
    pub anchor: Anchor,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub width: f32,
    #[serde(default)]
    pub height: f32,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_font_name")]
    pub font_name: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub stroke: Color,
    #[serde(default)]
    pub fill: Option<Color>,
    #[serde(default = "default_line_width")]
    pub line_width: f32,
}

fn default_font_size() -> f32 {
    10.0
}

fn default_font_name() -> String {
    "Helvetica".to_string()
}

fn default_line_width() -> f32 {
    1.0
}

impl ElementSpec {
    pub fn new(name: impl Into<String>, kind: ElementKind, x: f32, y: f32) -> Self {
        Self {
            name: name.into(),
            kind,
            anchor: Anchor::TopLeft,
            x,
            y,
            width: 0.0,
            height: 0.0,
            font_size: default_font_size(),
            font_name: default_font_name(),
            text: None,
            stroke: Color::BLACK,
            fill: None,
            line_width: default_line_width(),
        }
    }

    pub fn with_size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_text(mut self, text: impl Into<String>, font_size: f32) -> Self {
        self.text = Some(text.into());
        self.font_size = font_size;
        self
    }

    pub fn with_font(mut self, font_name: impl Into<String>) -> Self {
        self.font_name = font_name.into();
        self
    }

    pub fn with_fill(mut self, fill: Color) -> Self {
        self.fill = Some(fill);
        self
    }

    pub fn with_line_width(mut self, width: f32) -> Self {
        self.line_width = width;
        self
    }
}

/// The live page layout: every named element currently on (or parked beside) the page,
/// in paint order. Template elements persist across pages; clones are page-scoped.
#[derive(Debug, Clone)]
pub struct LayoutCanvas {
    page_size: Size,
    elements: Vec<Element>,
    next_id: u32,
}

impl LayoutCanvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            elements: Vec::new(),
            next_id: 1,
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn insert(&mut self, spec: ElementSpec) -> ElementId {
        let id = self.alloc_id();
        self.elements.push(Element {
            id,
            name: spec.name,
            kind: spec.kind,
            origin: ElementOrigin::Template,
            anchor: spec.anchor,
            x: spec.x,
            y: spec.y,
            width: spec.width,
            height: spec.height,
            font_size: spec.font_size,
            font_name: spec.font_name,
            text: spec.text,
            stroke: spec.stroke,
            fill: spec.fill,
            line_width: spec.line_width,
        });
        id
    }

    fn alloc_id(&mut self) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.id == id)
    }

    pub(crate) fn element_mut(&mut self, id: ElementId) -> Result<&mut Element, MapBookError> {
        self.get_mut(id).ok_or_else(|| {
            MapBookError::InvalidConfiguration(format!("element {:?} is not on the canvas", id))
        })
    }

    /// Looks up a permanent template element by exact name. Clones are never returned.
    pub fn find_by_name(&self, name: &str) -> Option<ElementId> {
        self.elements
            .iter()
            .find(|e| !e.is_clone() && e.name == name)
            .map(|e| e.id)
    }

    /// Copies an element (current state included) into a new clone owned by `page`.
    /// The copy is named `<name><suffix>` and painted above everything else.
    pub fn clone_element(
        &mut self,
        id: ElementId,
        suffix: &str,
        page: usize,
    ) -> Result<ElementId, MapBookError> {
        let source = self.get(id).cloned().ok_or_else(|| {
            MapBookError::InvalidConfiguration(format!("cannot clone missing element {:?}", id))
        })?;
        let clone_id = self.alloc_id();
        self.elements.push(Element {
            id: clone_id,
            name: format!("{}{}", source.name, suffix),
            origin: ElementOrigin::Clone { page },
            ..source
        });
        Ok(clone_id)
    }

    pub fn delete(&mut self, id: ElementId) -> bool {
        let before = self.elements.len();
        self.elements.retain(|e| e.id != id);
        self.elements.len() != before
    }

    /// Lists elements whose name matches a `*` wildcard pattern, in paint order.
    pub fn list(&self, filter: KindFilter, pattern: &str) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|e| filter.accepts(e.kind) && wildcard_match(pattern, &e.name))
            .map(|e| e.id)
            .collect()
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn clone_count(&self) -> usize {
        self.elements.iter().filter(|e| e.is_clone()).count()
    }

    pub fn clones_for_page(&self, page: usize) -> usize {
        self.elements
            .iter()
            .filter(|e| e.origin == ElementOrigin::Clone { page })
            .count()
    }

    /// Whether the element's anchor lies inside the exportable page area.
    pub fn is_on_canvas(&self, element: &Element) -> bool {
        let w = self.page_size.width_inches();
        let h = self.page_size.height_inches();
        element.x >= 0.0 && element.x <= w && element.y >= 0.0 && element.y <= h
    }
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }
    let mut rest = name;
    let last = parts.len() - 1;
    for (idx, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if idx == 0 {
            let Some(stripped) = rest.strip_prefix(part) else {
                return false;
            };
            rest = stripped;
        } else if idx == last {
            return rest.ends_with(part);
        } else {
            let Some(pos) = rest.find(part) else {
                return false;
            };
            rest = &rest[pos + part.len()..];
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas_with_line() -> (LayoutCanvas, ElementId) {
        let mut canvas = LayoutCanvas::new(Size::letter());
        let id = canvas.insert(ElementSpec::new("horzLine", ElementKind::Line, -3.0, 1.0).with_size(2.5, 0.0));
        (canvas, id)
    }

    #[test]
    fn wildcard_patterns() {
        assert!(wildcard_match("*clone*", "horzLine_clone"));
        assert!(wildcard_match("*clone*", "cellTxt_clone"));
        assert!(!wildcard_match("*clone*", "cellTxt"));
        assert!(wildcard_match("bar*", "bar1txt"));
        assert!(wildcard_match("*txt", "bar1txt"));
        assert!(!wildcard_match("*txt", "bar1"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("bar1", "bar1"));
        assert!(!wildcard_match("bar1", "bar10"));
    }

    #[test]
    fn clones_copy_state_and_are_tagged() {
        let (mut canvas, line) = canvas_with_line();
        canvas.get_mut(line).unwrap().y = 3.2;
        let clone = canvas.clone_element(line, CLONE_SUFFIX, 7).unwrap();

        let copy = canvas.get(clone).unwrap();
        assert_eq!(copy.name, "horzLine_clone");
        assert_eq!(copy.y, 3.2);
        assert_eq!(copy.origin, ElementOrigin::Clone { page: 7 });
        assert_eq!(canvas.clone_count(), 1);
        assert_eq!(canvas.clones_for_page(7), 1);
        assert_eq!(canvas.clones_for_page(8), 0);

        // Name lookup only ever resolves the permanent element.
        assert_eq!(canvas.find_by_name("horzLine"), Some(line));
        assert_eq!(canvas.find_by_name("horzLine_clone"), None);
    }

    #[test]
    fn list_filters_by_kind_and_pattern() {
        let (mut canvas, line) = canvas_with_line();
        let text = canvas.insert(ElementSpec::new("cellTxt", ElementKind::Text, 0.0, 0.0));
        let line_clone = canvas.clone_element(line, CLONE_SUFFIX, 1).unwrap();
        let text_clone = canvas.clone_element(text, CLONE_SUFFIX, 1).unwrap();

        assert_eq!(canvas.list(KindFilter::Graphic, "*clone*"), vec![line_clone]);
        assert_eq!(canvas.list(KindFilter::Text, "*clone*"), vec![text_clone]);
        assert_eq!(canvas.list(KindFilter::Any, "*").len(), 4);

        assert!(canvas.delete(line_clone));
        assert!(!canvas.delete(line_clone));
        assert_eq!(canvas.clone_count(), 1);
    }

    #[test]
    fn parked_elements_are_off_canvas() {
        let (canvas, line) = canvas_with_line();
        let element = canvas.get(line).unwrap();
        assert!(!canvas.is_on_canvas(element));

        let mut moved = element.clone();
        moved.x = 2.8;
        assert!(canvas.is_on_canvas(&moved));
    }

    #[test]
    fn cloning_a_missing_element_fails() {
        let (mut canvas, line) = canvas_with_line();
        assert!(canvas.delete(line));
        assert!(matches!(
            canvas.clone_element(line, CLONE_SUFFIX, 1),
            Err(MapBookError::InvalidConfiguration(_))
        ));
    }
}
