use crate::element::{ElementId, ElementKind, LayoutCanvas};
use crate::error::MapBookError;

/// Off-page x coordinate that table and notice primitives rest at between pages.
pub const PARK_X: f32 = -3.0;

/// Every template element the page pipeline drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Bar1,
    Bar2,
    Bar1Text,
    Bar2Text,
    NoGrowth,
    HorzLine,
    VertLine,
    CellText,
    HeaderText,
}

impl Role {
    pub const ALL: [Role; 9] = [
        Role::Bar1,
        Role::Bar2,
        Role::Bar1Text,
        Role::Bar2Text,
        Role::NoGrowth,
        Role::HorzLine,
        Role::VertLine,
        Role::CellText,
        Role::HeaderText,
    ];

    /// Roles that are parked off-page after every page.
    pub const PARKED: [Role; 5] = [
        Role::NoGrowth,
        Role::CellText,
        Role::HeaderText,
        Role::HorzLine,
        Role::VertLine,
    ];

    pub fn element_name(self) -> &'static str {
        match self {
            Role::Bar1 => "bar1",
            Role::Bar2 => "bar2",
            Role::Bar1Text => "bar1txt",
            Role::Bar2Text => "bar2txt",
            Role::NoGrowth => "NoGrowth",
            Role::HorzLine => "horzLine",
            Role::VertLine => "vertLine",
            Role::CellText => "cellTxt",
            Role::HeaderText => "headerTxt",
        }
    }

    pub fn from_element_name(name: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.element_name() == name)
    }

    fn accepts(self, kind: ElementKind) -> bool {
        match self {
            Role::Bar1 | Role::Bar2 => kind == ElementKind::Rect,
            Role::HorzLine | Role::VertLine => kind == ElementKind::Line,
            Role::Bar1Text
            | Role::Bar2Text
            | Role::NoGrowth
            | Role::CellText
            | Role::HeaderText => kind == ElementKind::Text,
        }
    }
}

/// Typed handles to the permanent template elements, resolved once per run.
#[derive(Debug, Clone)]
pub struct TemplateSet {
    handles: [ElementId; 9],
}

impl TemplateSet {
    /// Resolves every role by name. All unresolved names are reported together.
    pub fn resolve(canvas: &LayoutCanvas) -> Result<Self, MapBookError> {
        let mut missing = Vec::new();
        let mut handles = Vec::with_capacity(Role::ALL.len());
        for role in Role::ALL {
            let Some(id) = canvas.find_by_name(role.element_name()) else {
                missing.push(role.element_name().to_string());
                continue;
            };
            if let Some(element) = canvas.get(id) {
                if !role.accepts(element.kind) {
                    return Err(MapBookError::InvalidConfiguration(format!(
                        "template element {} has kind {:?}, which does not fit its role",
                        element.name, element.kind
                    )));
                }
            }
            handles.push(id);
        }
        if !missing.is_empty() {
            return Err(MapBookError::MissingPrimitives(missing));
        }
        let handles: [ElementId; 9] = handles.try_into().map_err(|_| {
            MapBookError::InvalidConfiguration("template role table is incomplete".to_string())
        })?;
        Ok(Self { handles })
    }

    pub fn get(&self, role: Role) -> ElementId {
        self.handles[role as usize]
    }

    /// Moves the parked roles back off-page. Returns how many actually moved.
    pub fn reset(&self, canvas: &mut LayoutCanvas) -> usize {
        let mut moved = 0;
        for role in Role::PARKED {
            if let Some(element) = canvas.get_mut(self.get(role)) {
                if element.x != PARK_X {
                    element.x = PARK_X;
                    moved += 1;
                }
            }
        }
        moved
    }

    /// True when no parked role sits inside the page area.
    pub fn is_parked(&self, canvas: &LayoutCanvas) -> bool {
        Role::PARKED.into_iter().all(|role| {
            canvas
                .get(self.get(role))
                .is_none_or(|element| !canvas.is_on_canvas(element))
        })
    }
}
