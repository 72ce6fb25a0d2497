use lopdf::{Document as LoDocument, Object as LoObject};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfInspectErrorCode {
    PdfParseFailed,
    PdfEncryptedUnsupported,
    PdfIoError,
}

impl PdfInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PdfInspectErrorCode::PdfParseFailed => "PDF_PARSE_FAILED",
            PdfInspectErrorCode::PdfEncryptedUnsupported => "PDF_ENCRYPTED_UNSUPPORTED",
            PdfInspectErrorCode::PdfIoError => "PDF_IO_ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectError {
    pub code: PdfInspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for PdfInspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for PdfInspectError {}

/// What a finished book looks like from the outside: structure, info metadata and the text
/// shown on each page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub page_mode: Option<String>,
    /// Literal strings shown with `Tj`, per page in page order.
    pub page_texts: Vec<Vec<String>>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, PdfInspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfParseFailed,
        message: err.to_string(),
    })?;
    if pdf.is_encrypted() {
        return Err(PdfInspectError {
            code: PdfInspectErrorCode::PdfEncryptedUnsupported,
            message: "encrypted pdf files are not supported".to_string(),
        });
    }

    let info = pdf
        .trailer
        .get(b"Info")
        .and_then(LoObject::as_reference)
        .and_then(|id| pdf.get_object(id))
        .and_then(LoObject::as_dict)
        .ok();
    let info_string = |key: &[u8]| -> Option<String> {
        match info?.get(key).ok()? {
            LoObject::String(raw, _) => Some(String::from_utf8_lossy(raw).into_owned()),
            _ => None,
        }
    };

    let page_mode = pdf
        .trailer
        .get(b"Root")
        .and_then(LoObject::as_reference)
        .and_then(|id| pdf.get_object(id))
        .and_then(LoObject::as_dict)
        .ok()
        .and_then(|catalog| catalog.get(b"PageMode").ok())
        .and_then(|mode| match mode {
            LoObject::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
            _ => None,
        });

    let pages = pdf.get_pages();
    let mut page_texts = Vec::with_capacity(pages.len());
    for page_id in pages.values() {
        let content = pdf.get_page_content(*page_id).unwrap_or_default();
        page_texts.push(shown_strings(&content));
    }

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pages.len(),
        encrypted: false,
        file_size_bytes: bytes.len(),
        title: info_string(b"Title"),
        author: info_string(b"Author"),
        subject: info_string(b"Subject"),
        keywords: info_string(b"Keywords"),
        page_mode,
        page_texts,
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfInspectReport, PdfInspectError> {
    let data = std::fs::read(path).map_err(|err| PdfInspectError {
        code: PdfInspectErrorCode::PdfIoError,
        message: err.to_string(),
    })?;
    inspect_pdf_bytes(&data)
}

/// Collects `(...) Tj` operands from a content stream. Only the literal-string form is
/// recognized, which is what page export writes.
fn shown_strings(content: &[u8]) -> Vec<String> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < content.len() {
        if content[i] != b'(' {
            i += 1;
            continue;
        }
        let (text, end) = read_literal(content, i + 1);
        let rest = &content[end.min(content.len())..];
        let trimmed = rest
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .map(|p| &rest[p..])
            .unwrap_or(&[]);
        if trimmed.starts_with(b"Tj") {
            out.push(text);
        }
        i = end;
    }
    out
}

// Reads a literal string body starting after `(`; returns the decoded text and the index just
// past the closing `)`.
fn read_literal(content: &[u8], start: usize) -> (String, usize) {
    let mut bytes = Vec::new();
    let mut depth = 0usize;
    let mut i = start;
    while i < content.len() {
        match content[i] {
            b'\\' => {
                let Some(&next) = content.get(i + 1) else {
                    break;
                };
                match next {
                    b'n' => bytes.push(b'\n'),
                    b'r' => bytes.push(b'\r'),
                    b'0'..=b'7' => {
                        let digits: Vec<u8> = content[i + 1..]
                            .iter()
                            .take(3)
                            .take_while(|b| (b'0'..=b'7').contains(*b))
                            .copied()
                            .collect();
                        let value = digits
                            .iter()
                            .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
                        bytes.push(value as u8);
                        i += 1 + digits.len();
                        continue;
                    }
                    other => bytes.push(other),
                }
                i += 2;
            }
            b'(' => {
                depth += 1;
                bytes.push(b'(');
                i += 1;
            }
            b')' => {
                if depth == 0 {
                    i += 1;
                    break;
                }
                depth -= 1;
                bytes.push(b')');
                i += 1;
            }
            b => {
                bytes.push(b);
                i += 1;
            }
        }
    }
    // WinAnsi and Latin-1 agree outside 0x80..0x9F.
    (bytes.iter().map(|b| char::from(*b)).collect(), i)
}
