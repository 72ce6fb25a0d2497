use crate::error::MapBookError;
use lopdf::{Document as LoDocument, Object as LoObject, ObjectId as LoObjectId, dictionary};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Document information dictionary written when the book is finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: String,
    pub author: String,
    pub subject: String,
    pub keywords: String,
    pub creator: String,
    pub producer: String,
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            title: "Hispanic Growth MapBook".to_string(),
            author: "Esri".to_string(),
            subject: "Population".to_string(),
            keywords: "map sheets, map book".to_string(),
            creator: "mapbook".to_string(),
            producer: format!("mapbook {}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// How a viewer should open the finished document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageMode {
    UseNone,
    #[default]
    UseThumbs,
    UseOutlines,
}

impl PageMode {
    pub fn as_pdf_name(self) -> &'static str {
        match self {
            PageMode::UseNone => "UseNone",
            PageMode::UseThumbs => "UseThumbs",
            PageMode::UseOutlines => "UseOutlines",
        }
    }
}

/// Ledger entry for one page appended to the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedPage {
    pub page_number: usize,
    pub region_key: String,
    /// Hex SHA-256 of the page artifact as it was appended.
    pub sha256: String,
    pub artifact_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeSummary {
    pub path: PathBuf,
    pub pages_written: usize,
    pub file_bytes: u64,
    pub pages: Vec<CommittedPage>,
}

/// The merged output book. Pages are append-only and must arrive in increasing page order.
/// An append either commits the whole page or leaves the document untouched.
pub struct OutputDocument {
    path: PathBuf,
    doc: LoDocument,
    pages_id: LoObjectId,
    kids: Vec<LoObjectId>,
    committed: Vec<CommittedPage>,
}

impl OutputDocument {
    /// Starts an empty book at `path`, removing whatever a previous run left there.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, MapBookError> {
        let path = path.into();
        match std::fs::remove_file(&path) {
            Ok(()) => log::debug!("removed previous output {}", path.display()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(MapBookError::Io(err)),
        }
        let mut doc = LoDocument::with_version("1.7");
        let pages_id = doc.new_object_id();
        Ok(Self {
            path,
            doc,
            pages_id,
            kids: Vec::new(),
            committed: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.kids.len()
    }

    pub fn committed(&self) -> &[CommittedPage] {
        &self.committed
    }

    /// Appends the single page held in the PDF at `artifact`.
    pub fn append_page(
        &mut self,
        page_number: usize,
        region_key: &str,
        artifact: &Path,
    ) -> Result<&CommittedPage, MapBookError> {
        if let Some(last) = self.committed.last() {
            if page_number <= last.page_number {
                return Err(MapBookError::Pdf(format!(
                    "page {} appended after page {}",
                    page_number, last.page_number
                )));
            }
        }

        let bytes = std::fs::read(artifact).map_err(|err| {
            MapBookError::export(page_number, format!("read {}: {}", artifact.display(), err))
        })?;
        let sha256 = sha256_hex(&bytes);
        let mut src = LoDocument::load_mem(&bytes).map_err(|err| {
            MapBookError::export(page_number, format!("page artifact is not a readable pdf: {err}"))
        })?;
        if src.is_encrypted() {
            return Err(MapBookError::export(page_number, "page artifact is encrypted"));
        }
        let found = src.get_pages().len();
        if found != 1 {
            return Err(MapBookError::export(
                page_number,
                format!("page artifact holds {} pages, expected 1", found),
            ));
        }

        src.renumber_objects_with(self.doc.max_id + 1);
        let Some(page_id) = src.get_pages().values().next().copied() else {
            return Err(MapBookError::export(page_number, "page artifact lost its page"));
        };
        src.get_object_mut(page_id)
            .and_then(LoObject::as_dict_mut)
            .map_err(|err| MapBookError::export(page_number, format!("page dictionary: {err}")))?
            .set("Parent", self.pages_id);

        // Nothing below can fail: the page is committed as a unit.
        if src.max_id > self.doc.max_id {
            self.doc.max_id = src.max_id;
        }
        self.doc.objects.extend(src.objects);
        self.kids.push(page_id);
        self.committed.push(CommittedPage {
            page_number,
            region_key: region_key.to_string(),
            sha256,
            artifact_bytes: bytes.len() as u64,
        });
        let index = self.committed.len() - 1;
        Ok(&self.committed[index])
    }

    /// Writes the page tree, catalog and info dictionary and saves the book. The file is
    /// written beside the target and renamed into place.
    pub fn finalize(
        mut self,
        metadata: &DocumentMetadata,
        page_mode: PageMode,
    ) -> Result<FinalizeSummary, MapBookError> {
        let kids: Vec<LoObject> = self.kids.iter().map(|id| LoObject::Reference(*id)).collect();
        self.doc.objects.insert(
            self.pages_id,
            LoObject::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => self.kids.len() as i64,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
            "PageMode" => page_mode.as_pdf_name(),
        });
        let info_id = self.doc.add_object(dictionary! {
            "Title" => LoObject::string_literal(metadata.title.as_str()),
            "Author" => LoObject::string_literal(metadata.author.as_str()),
            "Subject" => LoObject::string_literal(metadata.subject.as_str()),
            "Keywords" => LoObject::string_literal(metadata.keywords.as_str()),
            "Creator" => LoObject::string_literal(metadata.creator.as_str()),
            "Producer" => LoObject::string_literal(metadata.producer.as_str()),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);
        self.doc.prune_objects();
        self.doc.renumber_objects();
        self.doc.compress();

        let partial = partial_path(&self.path);
        self.doc.save(&partial)?;
        std::fs::rename(&partial, &self.path)?;
        let file_bytes = std::fs::metadata(&self.path)?.len();

        Ok(FinalizeSummary {
            path: self.path,
            pages_written: self.kids.len(),
            file_bytes,
            pages: self.committed,
        })
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "mapbook.pdf".into());
    name.push(".partial");
    path.with_file_name(name)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::export::document_to_pdf;
    use crate::inspect::inspect_pdf_path;
    use crate::types::{Pt, Size};

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "mapbook_document_{}_{}_{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("mkdir");
        dir
    }

    fn write_page(dir: &Path, name: &str, texts: &[&str]) -> PathBuf {
        let mut canvas = Canvas::new(Size::letter());
        for text in texts {
            canvas.draw_string(Pt::from_f32(72.0), Pt::from_f32(72.0), *text);
            canvas.show_page();
        }
        let path = dir.join(name);
        std::fs::write(&path, document_to_pdf(&canvas.finish())).expect("write page");
        path
    }

    #[test]
    fn pages_are_merged_in_order_with_metadata() {
        let dir = temp_dir("merge");
        let out = dir.join("book.pdf");
        let mut book = OutputDocument::create(&out).unwrap();
        for (n, region) in [(1, "Alpha"), (2, "Bravo"), (3, "Charlie")] {
            let page = write_page(&dir, &format!("p{n}.pdf"), &[region]);
            let committed = book.append_page(n, region, &page).unwrap();
            assert_eq!(committed.sha256.len(), 64);
        }
        assert_eq!(book.page_count(), 3);
        let summary = book
            .finalize(&DocumentMetadata::default(), PageMode::UseThumbs)
            .unwrap();
        assert_eq!(summary.pages_written, 3);
        assert!(!partial_path(&out).exists());

        let report = inspect_pdf_path(&out).unwrap();
        assert_eq!(report.page_count, 3);
        assert_eq!(report.title.as_deref(), Some("Hispanic Growth MapBook"));
        assert_eq!(report.author.as_deref(), Some("Esri"));
        assert_eq!(report.keywords.as_deref(), Some("map sheets, map book"));
        assert_eq!(report.page_mode.as_deref(), Some("UseThumbs"));
        let firsts: Vec<String> = report
            .page_texts
            .iter()
            .map(|texts| texts.first().cloned().unwrap_or_default())
            .collect();
        assert_eq!(firsts, vec!["Alpha", "Bravo", "Charlie"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn create_removes_previous_output() {
        let dir = temp_dir("overwrite");
        let out = dir.join("book.pdf");
        std::fs::write(&out, b"stale").unwrap();
        let book = OutputDocument::create(&out).unwrap();
        assert!(!out.exists());
        book.finalize(&DocumentMetadata::default(), PageMode::UseNone)
            .unwrap();
        assert_eq!(inspect_pdf_path(&out).unwrap().page_count, 0);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejected_artifacts_leave_the_book_unchanged() {
        let dir = temp_dir("reject");
        let mut book = OutputDocument::create(dir.join("book.pdf")).unwrap();
        let good = write_page(&dir, "good.pdf", &["One"]);
        book.append_page(1, "One", &good).unwrap();
        let max_id = book.doc.max_id;
        let objects = book.doc.objects.len();

        let two_pages = write_page(&dir, "two.pdf", &["A", "B"]);
        let err = book.append_page(2, "Two", &two_pages).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.page(), Some(2));

        let garbage = dir.join("garbage.pdf");
        std::fs::write(&garbage, b"%PDF-1.7 truncated").unwrap();
        assert!(book.append_page(2, "Two", &garbage).is_err());
        assert!(book.append_page(2, "Two", &dir.join("missing.pdf")).is_err());

        assert_eq!(book.page_count(), 1);
        assert_eq!(book.doc.max_id, max_id);
        assert_eq!(book.doc.objects.len(), objects);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn out_of_order_pages_are_refused() {
        let dir = temp_dir("order");
        let mut book = OutputDocument::create(dir.join("book.pdf")).unwrap();
        let page = write_page(&dir, "p.pdf", &["X"]);
        book.append_page(2, "X", &page).unwrap();
        let err = book.append_page(2, "X", &page).unwrap_err();
        assert!(!err.is_retryable());
        assert!(book.append_page(1, "X", &page).is_err());
        assert!(book.append_page(3, "X", &page).is_ok());
        assert_eq!(
            book.committed().iter().map(|p| p.page_number).collect::<Vec<_>>(),
            vec![2, 3]
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn identical_artifacts_share_a_digest() {
        assert_eq!(sha256_hex(b"abc"), sha256_hex(b"abc"));
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
