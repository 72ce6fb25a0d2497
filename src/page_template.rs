use crate::element::{Anchor, CLONE_SUFFIX, ElementKind, ElementSpec, LayoutCanvas};
use crate::error::MapBookError;
use crate::template::PARK_X;
use crate::types::{Color, Size};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// A page layout as authored: page size in inches plus every named element in paint order.
///
/// Elements whose names match a template role are driven per page; all other elements are
/// static decorations drawn on every page. Static text may use the `{region}` and `{page}`
/// tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageTemplate {
    pub name: String,
    pub page_width: f32,
    pub page_height: f32,
    pub elements: Vec<ElementSpec>,
}

impl PageTemplate {
    pub fn new(name: impl Into<String>, page_size: Size) -> Self {
        Self {
            name: name.into(),
            page_width: page_size.width_inches(),
            page_height: page_size.height_inches(),
            elements: Vec::new(),
        }
    }

    pub fn with_element(mut self, spec: ElementSpec) -> Self {
        self.elements.push(spec);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self, MapBookError> {
        serde_json::from_str(json).map_err(|err| {
            MapBookError::InvalidConfiguration(format!("page template json: {err}"))
        })
    }

    pub fn load(path: &Path) -> Result<Self, MapBookError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn page_size(&self) -> Size {
        Size::from_inches(self.page_width, self.page_height)
    }

    pub fn validate(&self) -> Result<(), MapBookError> {
        if !(self.page_width > 0.0 && self.page_height > 0.0) {
            return Err(MapBookError::InvalidConfiguration(format!(
                "page template {} has a non-positive page size",
                self.name
            )));
        }
        let mut seen = BTreeSet::new();
        for spec in &self.elements {
            if spec.name.trim().is_empty() {
                return Err(MapBookError::InvalidConfiguration(
                    "template element names cannot be empty".to_string(),
                ));
            }
            if spec.name.contains(CLONE_SUFFIX) {
                return Err(MapBookError::InvalidConfiguration(format!(
                    "template element {} uses the reserved {} marker",
                    spec.name, CLONE_SUFFIX
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(MapBookError::InvalidConfiguration(format!(
                    "duplicate template element name: {}",
                    spec.name
                )));
            }
        }
        Ok(())
    }

    /// Loads the template onto a fresh canvas.
    pub fn instantiate(&self) -> Result<LayoutCanvas, MapBookError> {
        self.validate()?;
        let mut canvas = LayoutCanvas::new(self.page_size());
        for spec in &self.elements {
            canvas.insert(spec.clone());
        }
        Ok(canvas)
    }

    /// Letter-portrait map sheet: title and map frame on top, the county table in the lower
    /// middle, and the two-bar chart to its right. Table primitives start parked.
    pub fn builtin() -> Self {
        let bar_fill = Color::rgb(0.80, 0.45, 0.20);
        PageTemplate::new("mapbook-letter", Size::letter())
            .with_element(
                ElementSpec::new("pageFrame", ElementKind::Rect, 0.25, 10.75)
                    .with_size(8.0, 10.5)
                    .with_line_width(1.5),
            )
            .with_element(
                ElementSpec::new("titleTxt", ElementKind::Text, 4.25, 10.3)
                    .with_anchor(Anchor::Center)
                    .with_text("{region}", 24.0)
                    .with_font("Helvetica-Bold"),
            )
            .with_element(
                ElementSpec::new("mapFrame", ElementKind::Rect, 0.5, 9.9).with_size(7.5, 6.2),
            )
            .with_element(
                ElementSpec::new("tableCaption", ElementKind::Text, 2.8, 3.3)
                    .with_anchor(Anchor::BottomLeft)
                    .with_text("Counties with more than 100% growth", 10.0),
            )
            .with_element(
                ElementSpec::new("chartCaption", ElementKind::Text, 6.75, 3.3)
                    .with_anchor(Anchor::BottomCenter)
                    .with_text("Hispanic share (%)", 10.0),
            )
            .with_element(
                ElementSpec::new("bar1Caption", ElementKind::Text, 6.25, 0.35)
                    .with_anchor(Anchor::BottomCenter)
                    .with_text("2000", 9.0),
            )
            .with_element(
                ElementSpec::new("bar2Caption", ElementKind::Text, 7.25, 0.35)
                    .with_anchor(Anchor::BottomCenter)
                    .with_text("2010", 9.0),
            )
            .with_element(
                ElementSpec::new("pageNumberTxt", ElementKind::Text, 0.5, 0.45)
                    .with_anchor(Anchor::BottomLeft)
                    .with_text("Page {page}", 9.0),
            )
            .with_element(
                ElementSpec::new("bar1", ElementKind::Rect, 6.0, 0.6)
                    .with_anchor(Anchor::BottomLeft)
                    .with_size(0.5, 1.0)
                    .with_fill(bar_fill),
            )
            .with_element(
                ElementSpec::new("bar2", ElementKind::Rect, 7.0, 0.6)
                    .with_anchor(Anchor::BottomLeft)
                    .with_size(0.5, 1.0)
                    .with_fill(bar_fill),
            )
            .with_element(
                ElementSpec::new("bar1txt", ElementKind::Text, 6.25, 1.7)
                    .with_anchor(Anchor::BottomCenter)
                    .with_text("(0.0)", 9.0),
            )
            .with_element(
                ElementSpec::new("bar2txt", ElementKind::Text, 7.25, 1.7)
                    .with_anchor(Anchor::BottomCenter)
                    .with_text("(0.0)", 9.0),
            )
            .with_element(
                ElementSpec::new("NoGrowth", ElementKind::Text, PARK_X, 2.0)
                    .with_text("No counties grew by more than 100%", 12.0),
            )
            .with_element(
                ElementSpec::new("horzLine", ElementKind::Line, PARK_X, 3.2)
                    .with_size(2.5, 0.0)
                    .with_line_width(0.75),
            )
            .with_element(
                ElementSpec::new("vertLine", ElementKind::Line, PARK_X, 3.2)
                    .with_size(0.0, 3.0)
                    .with_line_width(0.75),
            )
            .with_element(
                ElementSpec::new("headerTxt", ElementKind::Text, PARK_X, 3.1)
                    .with_anchor(Anchor::Center)
                    .with_text("", 12.9)
                    .with_font("Helvetica-Bold"),
            )
            .with_element(
                ElementSpec::new("cellTxt", ElementKind::Text, PARK_X, 3.0).with_text("", 9.68),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Role, TemplateSet};

    #[test]
    fn builtin_template_resolves_every_role() {
        let canvas = PageTemplate::builtin().instantiate().expect("instantiate");
        let set = TemplateSet::resolve(&canvas).expect("resolve");
        for role in Role::ALL {
            assert_eq!(canvas.get(set.get(role)).unwrap().name, role.element_name());
        }
    }

    #[test]
    fn builtin_table_primitives_start_parked() {
        let canvas = PageTemplate::builtin().instantiate().unwrap();
        for name in ["NoGrowth", "horzLine", "vertLine", "headerTxt", "cellTxt"] {
            let id = canvas.find_by_name(name).unwrap();
            assert!(!canvas.is_on_canvas(canvas.get(id).unwrap()), "{name}");
        }
    }

    #[test]
    fn template_round_trips_through_json() {
        let template = PageTemplate::builtin();
        let json = serde_json::to_string(&template).unwrap();
        let parsed = PageTemplate::from_json_str(&json).unwrap();
        assert_eq!(parsed, template);
    }

    #[test]
    fn minimal_json_uses_element_defaults() {
        let json = r#"{
            "name": "tiny",
            "page_width": 8.5,
            "page_height": 11.0,
            "elements": [
                {"name": "cellTxt", "kind": "text", "x": -3.0, "y": 3.0}
            ]
        }"#;
        let template = PageTemplate::from_json_str(json).unwrap();
        let spec = &template.elements[0];
        assert_eq!(spec.anchor, Anchor::TopLeft);
        assert_eq!(spec.font_name, "Helvetica");
        assert_eq!(spec.line_width, 1.0);
        assert_eq!(spec.text, None);
    }

    #[test]
    fn duplicate_and_reserved_names_are_rejected() {
        let dup = PageTemplate::new("dup", Size::letter())
            .with_element(ElementSpec::new("bar1", ElementKind::Rect, 1.0, 1.0))
            .with_element(ElementSpec::new("bar1", ElementKind::Rect, 2.0, 1.0));
        assert!(matches!(
            dup.instantiate(),
            Err(MapBookError::InvalidConfiguration(msg)) if msg.contains("duplicate")
        ));

        let reserved = PageTemplate::new("reserved", Size::letter())
            .with_element(ElementSpec::new("bar1_clone", ElementKind::Rect, 1.0, 1.0));
        assert!(reserved.validate().is_err());
    }

    #[test]
    fn malformed_json_is_a_configuration_error() {
        assert!(matches!(
            PageTemplate::from_json_str("{\"name\": 3}"),
            Err(MapBookError::InvalidConfiguration(_))
        ));
    }
}
