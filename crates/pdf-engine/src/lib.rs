//! Document access for the annotator
//!
//! Opens PDF bytes, exposes page geometry, and writes annotations back into
//! a new copy of the document (see [`codec`]).

pub mod codec;
mod page;

pub use codec::{serialize, CodecError};
pub use page::{media_box, PageBox};

use lopdf::Document;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("invalid handle {0}")]
    InvalidHandle(u64),
    #[error("page {page} out of range (page_count={page_count})")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
    #[error("document has no pages")]
    NoPages,
}

pub trait PdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;
    /// Original bytes of an open document, shared rather than copied
    fn document_bytes(&self, handle: DocumentHandle) -> Result<Arc<[u8]>, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

#[derive(Debug, Clone)]
struct DocumentRecord {
    bytes: Arc<[u8]>,
    page_boxes: Vec<PageBox>,
}

#[derive(Debug, Default)]
pub struct LopdfEngine {
    next_handle: u64,
    docs: HashMap<DocumentHandle, DocumentRecord>,
}

impl LopdfEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_boxes(bytes: &[u8]) -> Result<Vec<PageBox>, PdfEngineError> {
        let doc = Document::load_mem(bytes)?;
        if doc.trailer.has(b"Encrypt") {
            return Err(PdfEngineError::EncryptedUnsupported);
        }

        let boxes: Vec<PageBox> =
            doc.get_pages().into_values().map(|page_id| media_box(&doc, page_id)).collect();

        if boxes.is_empty() {
            return Err(PdfEngineError::NoPages);
        }

        Ok(boxes)
    }

    fn record(&self, handle: DocumentHandle) -> Result<&DocumentRecord, PdfEngineError> {
        self.docs.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }

    /// MediaBox of a page, origin included
    pub fn page_box(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageBox, PdfEngineError> {
        let record = self.record(handle)?;
        record.page_boxes.get(page_index as usize).copied().ok_or(PdfEngineError::PageOutOfRange {
            page: page_index,
            page_count: record.page_boxes.len() as u32,
        })
    }
}

impl PdfEngine for LopdfEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = match source {
            OpenSource::Path(path) => fs::read(path)?,
            OpenSource::Bytes(bytes) => bytes,
        };

        let page_boxes = Self::parse_boxes(&bytes)?;

        self.next_handle += 1;
        let handle = DocumentHandle(self.next_handle);
        tracing::info!(handle = handle.raw(), pages = page_boxes.len(), "opened document");
        self.docs.insert(handle, DocumentRecord { bytes: Arc::from(bytes), page_boxes });

        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        Ok(self.record(handle)?.page_boxes.len() as u32)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        self.page_box(handle, page_index).map(|page_box| page_box.size())
    }

    fn document_bytes(&self, handle: DocumentHandle) -> Result<Arc<[u8]>, PdfEngineError> {
        Ok(Arc::clone(&self.record(handle)?.bytes))
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.docs.remove(&handle).map(|_| ()).ok_or(PdfEngineError::InvalidHandle(handle.raw()))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a document with one page per MediaBox. Boxes are attached to
    /// the page itself unless `inherit` is set, in which case the first box
    /// is placed on the Pages node only.
    pub fn pdf_with_pages(boxes: &[[f32; 4]], inherit: bool) -> Vec<u8> {
        build(boxes, inherit, b"BT /F1 12 Tf 72 720 Td (Hi) Tj ET\n", false)
    }

    /// Single letter page showing `text`
    pub fn letter_pdf_with_text(text: &str) -> Vec<u8> {
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET\n");
        build(&[[0.0, 0.0, 612.0, 792.0]], false, content.as_bytes(), false)
    }

    /// Single letter page whose trailer declares standard security
    pub fn encrypted_letter_pdf() -> Vec<u8> {
        build(&[[0.0, 0.0, 612.0, 792.0]], false, b"", true)
    }

    fn build(boxes: &[[f32; 4]], inherit: bool, content: &[u8], encrypted: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });

        let mut kids = Vec::new();
        for media_box in boxes {
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "Contents" => Object::Reference(content_id),
            };
            if !inherit {
                let media_box: Vec<Object> = media_box.iter().map(|v| Object::Real(*v)).collect();
                page.set("MediaBox", media_box);
            }
            kids.push(Object::Reference(doc.add_object(page)));
        }

        let mut pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => Object::Reference(font_id) },
            },
        };
        if inherit {
            if let Some(first) = boxes.first() {
                pages.set("MediaBox", first.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>());
            }
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        if encrypted {
            let encrypt_id = doc.add_object(dictionary! {
                "Filter" => "Standard",
                "V" => 1,
                "R" => 2,
                "O" => Object::string_literal(vec![0u8; 32]),
                "U" => Object::string_literal(vec![0u8; 32]),
                "P" => -4,
            });
            doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
        }

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).expect("fixture should serialize");
        buffer
    }

    pub fn letter_pdf(pages: usize) -> Vec<u8> {
        pdf_with_pages(&vec![[0.0, 0.0, 612.0, 792.0]; pages], false)
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{
        encrypted_letter_pdf, letter_pdf, letter_pdf_with_text, pdf_with_pages,
    };
    use super::*;

    #[test]
    fn opens_pdf_and_reads_page_count() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(letter_pdf(3))).expect("open should succeed");

        assert_eq!(engine.page_count(handle).expect("count should succeed"), 3);
        assert_eq!(
            engine.page_size(handle, 0).expect("size should succeed"),
            PageSize { width_pt: 612.0, height_pt: 792.0 }
        );
    }

    #[test]
    fn media_box_is_inherited_from_page_tree() {
        let mut engine = LopdfEngine::new();
        let bytes = pdf_with_pages(&[[10.0, 20.0, 410.0, 620.0]], true);
        let handle = engine.open(OpenSource::Bytes(bytes)).expect("open should succeed");

        let page_box = engine.page_box(handle, 0).expect("box should resolve");
        assert_eq!(page_box, PageBox { x0: 10.0, y0: 20.0, width: 400.0, height: 600.0 });
    }

    #[test]
    fn page_out_of_range_is_reported() {
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(letter_pdf(1))).expect("open should succeed");

        let err = engine.page_size(handle, 4).expect_err("page 4 should not exist");
        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 4, page_count: 1 }));
    }

    #[test]
    fn corrupt_bytes_fail_to_open() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(b"not a pdf at all".to_vec()))
            .expect_err("garbage should not parse");

        assert!(matches!(err, PdfEngineError::Parse(_)));
    }

    #[test]
    fn encrypted_documents_are_rejected() {
        let mut engine = LopdfEngine::new();
        let err = engine
            .open(OpenSource::Bytes(encrypted_letter_pdf()))
            .expect_err("should be rejected");
        assert!(matches!(err, PdfEngineError::EncryptedUnsupported));
    }

    #[test]
    fn encrypt_keyword_in_page_text_is_not_encryption() {
        let mut engine = LopdfEngine::new();
        let bytes = letter_pdf_with_text("see /Encrypt docs");

        let handle = engine.open(OpenSource::Bytes(bytes)).expect("plain document should open");
        assert_eq!(engine.page_count(handle).expect("count should succeed"), 1);
    }

    #[test]
    fn document_bytes_are_shared_until_close() {
        let original = letter_pdf(1);
        let mut engine = LopdfEngine::new();
        let handle = engine.open(OpenSource::Bytes(original.clone())).expect("open should succeed");

        assert_eq!(&*engine.document_bytes(handle).expect("bytes should exist"), &original[..]);

        engine.close(handle).expect("close should succeed");
        assert!(matches!(engine.page_count(handle), Err(PdfEngineError::InvalidHandle(_))));
    }

    #[test]
    fn invalid_handle_returns_error() {
        let engine = LopdfEngine::new();
        let err =
            engine.page_count(DocumentHandle(999)).expect_err("should fail for unknown handle");

        assert!(matches!(err, PdfEngineError::InvalidHandle(999)));
    }
}
