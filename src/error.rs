use std::fmt;

#[derive(Debug)]
pub enum MapBookError {
    /// One or more named template primitives could not be resolved on the canvas.
    MissingPrimitives(Vec<String>),
    InvalidConfiguration(String),
    Layout {
        page: usize,
        message: String,
    },
    Export {
        page: usize,
        message: String,
    },
    Data {
        page: Option<usize>,
        record: Option<String>,
        message: String,
    },
    Pdf(String),
    Io(std::io::Error),
}

impl MapBookError {
    /// Only export/append failures are worth another attempt; everything else is
    /// deterministic and would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MapBookError::Export { .. })
    }

    /// Page the error is attributed to, when known.
    pub fn page(&self) -> Option<usize> {
        match self {
            MapBookError::Layout { page, .. } | MapBookError::Export { page, .. } => Some(*page),
            MapBookError::Data { page, .. } => *page,
            _ => None,
        }
    }

    pub(crate) fn export(page: usize, message: impl Into<String>) -> Self {
        MapBookError::Export {
            page,
            message: message.into(),
        }
    }

    pub(crate) fn data(
        page: Option<usize>,
        record: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        MapBookError::Data {
            page,
            record,
            message: message.into(),
        }
    }
}

impl fmt::Display for MapBookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapBookError::MissingPrimitives(names) => {
                write!(f, "template is missing named elements: {}", names.join(", "))
            }
            MapBookError::InvalidConfiguration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            MapBookError::Layout { page, message } => {
                write!(f, "layout error on page {}: {}", page, message)
            }
            MapBookError::Export { page, message } => {
                write!(f, "export error on page {}: {}", page, message)
            }
            MapBookError::Data {
                page,
                record,
                message,
            } => {
                write!(f, "data error")?;
                if let Some(page) = page {
                    write!(f, " on page {}", page)?;
                }
                if let Some(record) = record {
                    write!(f, " (record {})", record)?;
                }
                write!(f, ": {}", message)
            }
            MapBookError::Pdf(message) => write!(f, "pdf error: {}", message),
            MapBookError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for MapBookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MapBookError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MapBookError {
    fn from(value: std::io::Error) -> Self {
        MapBookError::Io(value)
    }
}

impl From<lopdf::Error> for MapBookError {
    fn from(value: lopdf::Error) -> Self {
        MapBookError::Pdf(value.to_string())
    }
}
