//! Document annotation session
//!
//! Owns the one live document: its engine handle, the annotation history
//! and the decoded image cache shared by every page surface. Opening a new
//! document discards the previous one.

use crate::image_cache::ImageCache;
use crate::surface::{AnnotationSurface, SurfaceError};
use crate::view::{SurfaceConfig, ViewTransform};
use annotation_model::{
    apply_annotation_action, AnnotationAction, AnnotationHistory, DocumentAnnotationState,
    ImageAnnotation, PageLayer, PageNumber, PersistedAnnotations, Stroke,
};
use pdf_engine::{DocumentHandle, LopdfEngine, OpenSource, PageSize, PdfEngine, PdfEngineError};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to open document: {0}")]
    Open(#[from] PdfEngineError),
    #[error("no document is open")]
    NoDocument,
    #[error("page {page} does not exist (page_count={page_count})")]
    PageOutOfRange { page: PageNumber, page_count: u32 },
    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Everything needed to write the current annotations into the document.
///
/// Produced on the caller's thread; serialization happens elsewhere.
#[derive(Debug, Clone)]
pub struct SaveRequest {
    pub document: Arc<[u8]>,
    pub annotations_by_page: BTreeMap<PageNumber, Vec<Stroke>>,
    pub images_by_page: BTreeMap<PageNumber, Vec<ImageAnnotation>>,
    pub source_page_width: f32,
}

impl SaveRequest {
    pub fn serialize(&self) -> Result<Vec<u8>, pdf_engine::CodecError> {
        pdf_engine::serialize(
            &self.document,
            &self.annotations_by_page,
            &self.images_by_page,
            self.source_page_width,
        )
    }
}

#[derive(Debug)]
struct OpenDocument {
    handle: DocumentHandle,
    bytes: Arc<[u8]>,
    page_sizes: Vec<PageSize>,
    history: AnnotationHistory,
    source_page_width: f32,
}

impl OpenDocument {
    fn page_size(&self, page: PageNumber) -> Result<PageSize, SessionError> {
        page.checked_sub(1)
            .and_then(|index| self.page_sizes.get(index as usize))
            .copied()
            .ok_or(SessionError::PageOutOfRange { page, page_count: self.page_sizes.len() as u32 })
    }
}

pub struct AnnotationSession<E: PdfEngine = LopdfEngine> {
    engine: E,
    document: Option<OpenDocument>,
    images: ImageCache,
}

impl AnnotationSession<LopdfEngine> {
    pub fn new() -> Self {
        Self::with_engine(LopdfEngine::new())
    }
}

impl Default for AnnotationSession<LopdfEngine> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: PdfEngine> AnnotationSession<E> {
    pub fn with_engine(engine: E) -> Self {
        Self { engine, document: None, images: ImageCache::new() }
    }

    /// Open a document, optionally seeding it with previously saved annotations.
    ///
    /// The document is parsed before any state is touched, so a load failure
    /// leaves the session without a document. Annotations are measured
    /// against the saved source width when one is given, otherwise against
    /// the width of the first page.
    pub fn open(
        &mut self,
        source: impl Into<OpenSource>,
        initial: Option<PersistedAnnotations>,
    ) -> Result<(), SessionError> {
        self.close();

        let handle = self.engine.open(source.into())?;
        let loaded = self.load(handle, initial);
        if loaded.is_err() {
            let _ = self.engine.close(handle);
        }
        let document = loaded?;

        tracing::info!(
            pages = document.page_sizes.len(),
            strokes = document.history.current().stroke_count(),
            images = document.history.current().image_count(),
            source_page_width = document.source_page_width,
            "annotation session opened"
        );
        self.document = Some(document);
        Ok(())
    }

    fn load(
        &self,
        handle: DocumentHandle,
        initial: Option<PersistedAnnotations>,
    ) -> Result<OpenDocument, SessionError> {
        let page_count = self.engine.page_count(handle)?;
        let page_sizes = (0..page_count)
            .map(|index| self.engine.page_size(handle, index))
            .collect::<Result<Vec<_>, _>>()?;
        let first_width = page_sizes.first().map_or(0.0, |size| size.width_pt);
        let bytes = self.engine.document_bytes(handle)?;

        let (source_page_width, annotations_by_page, images_by_page) = match initial {
            Some(persisted) => {
                let width = persisted.source_page_width;
                let width = if width.is_finite() && width > 0.0 { width } else { first_width };
                (width, persisted.annotations_by_page, persisted.images_by_page)
            }
            None => (first_width, BTreeMap::new(), BTreeMap::new()),
        };

        let mut history = AnnotationHistory::new();
        apply_annotation_action(
            &mut history,
            AnnotationAction::LoadInitial { annotations_by_page, images_by_page },
        );

        Ok(OpenDocument { handle, bytes, page_sizes, history, source_page_width })
    }

    /// Discard the open document, its history and every cached image
    pub fn close(&mut self) {
        if let Some(document) = self.document.take() {
            if let Err(err) = self.engine.close(document.handle) {
                tracing::warn!(error = %err, "engine refused to close document");
            }
            tracing::info!(handle = document.handle.raw(), "annotation session closed");
        }
        self.images.clear();
    }

    pub fn is_open(&self) -> bool {
        self.document.is_some()
    }

    /// Apply an action to the open document. Returns whether the state changed.
    pub fn dispatch(&mut self, action: AnnotationAction) -> bool {
        let Some(document) = self.document.as_mut() else {
            tracing::debug!("action dropped: no document open");
            return false;
        };

        let changed = apply_annotation_action(&mut document.history, action);
        if changed {
            let live = document.history.current().images_by_page().values().flat_map(|images| {
                images.iter().map(|image| image.id)
            });
            self.images.retain_ids(live);
        }
        changed
    }

    pub fn undo(&mut self) -> bool {
        self.dispatch(AnnotationAction::Undo)
    }

    pub fn redo(&mut self) -> bool {
        self.dispatch(AnnotationAction::Redo)
    }

    pub fn state(&self) -> Option<&DocumentAnnotationState> {
        self.document.as_ref().map(|document| document.history.current())
    }

    pub fn page_layer(&self, page: PageNumber) -> Option<PageLayer> {
        self.state().map(|state| state.page_layer(page))
    }

    pub fn can_undo(&self) -> bool {
        self.document.as_ref().is_some_and(|document| document.history.can_undo())
    }

    pub fn can_redo(&self) -> bool {
        self.document.as_ref().is_some_and(|document| document.history.can_redo())
    }

    pub fn page_count(&self) -> u32 {
        self.document.as_ref().map_or(0, |document| document.page_sizes.len() as u32)
    }

    pub fn source_page_width(&self) -> Option<f32> {
        self.document.as_ref().map(|document| document.source_page_width)
    }

    /// Page size in annotation space: the source width, with the page's
    /// native aspect ratio.
    pub fn page_space_size(&self, page: PageNumber) -> Result<(f32, f32), SessionError> {
        let document = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        let native = document.page_size(page)?;
        let width = document.source_page_width;
        let height = if native.width_pt > 0.0 {
            native.height_pt * width / native.width_pt
        } else {
            native.height_pt
        };
        Ok((width, height))
    }

    /// Create a surface for one page, drawn with the page's current annotations
    pub fn create_surface(
        &mut self,
        page: PageNumber,
        view: ViewTransform,
        config: SurfaceConfig,
    ) -> Result<AnnotationSurface, SessionError> {
        let (width, height) = self.page_space_size(page)?;
        let mut surface = AnnotationSurface::new(page, width, height, view, config)?;
        self.sync_surface(&mut surface);
        Ok(surface)
    }

    /// Bring a surface up to date with the current state. Returns whether it redrew.
    pub fn sync_surface(&mut self, surface: &mut AnnotationSurface) -> bool {
        let Some(layer) = self.page_layer(surface.page()) else {
            return false;
        };
        surface.sync(&layer, &mut self.images)
    }

    /// Snapshot the current annotations for the persistence codec
    pub fn save(&self) -> Result<SaveRequest, SessionError> {
        let document = self.document.as_ref().ok_or(SessionError::NoDocument)?;
        let (annotations_by_page, images_by_page) = document.history.current().to_pages();
        Ok(SaveRequest {
            document: Arc::clone(&document.bytes),
            annotations_by_page,
            images_by_page,
            source_page_width: document.source_page_width,
        })
    }

    /// Current annotations in their stored JSON shape
    pub fn persisted(&self) -> Option<PersistedAnnotations> {
        let document = self.document.as_ref()?;
        Some(PersistedAnnotations::from_state(
            document.history.current(),
            document.source_page_width,
        ))
    }

    pub fn image_cache(&self) -> &ImageCache {
        &self.images
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotation_model::{ImageMimeType, Point, Rgb, StrokeTool};
    use lopdf::{dictionary, Document, Object, Stream};
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn pdf(pages: &[(f32, f32)]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let kids: Vec<Object> = pages
            .iter()
            .map(|&(width, height)| {
                let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                    "Contents" => content_id,
                });
                page_id.into()
            })
            .collect();
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages.len() as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    fn pen(page: PageNumber) -> Stroke {
        let points = vec![Point::new(10.0, 10.0, 1.0), Point::new(50.0, 50.0, 1.0)];
        Stroke::new(StrokeTool::Pen, points, Rgb::RED, 2.0, page).unwrap()
    }

    fn png() -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([0, 128, 0, 255]));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn open_records_first_page_width() {
        let mut session = AnnotationSession::new();
        session.open(pdf(&[(600.0, 800.0), (1200.0, 800.0)]), None).unwrap();

        assert_eq!(session.page_count(), 2);
        assert_eq!(session.source_page_width(), Some(600.0));
        assert_eq!(session.page_space_size(2).unwrap(), (600.0, 400.0));
        assert!(!session.can_undo());
    }

    #[test]
    fn open_failure_leaves_no_document() {
        let mut session = AnnotationSession::new();
        session.open(pdf(&[(600.0, 800.0)]), None).unwrap();

        let err = session.open(b"not a pdf".to_vec(), None).unwrap_err();

        assert!(matches!(err, SessionError::Open(_)));
        assert!(!session.is_open());
        assert!(matches!(session.save(), Err(SessionError::NoDocument)));
    }

    #[test]
    fn open_seeds_initial_annotations_without_history() {
        let persisted = PersistedAnnotations::new(
            300.0,
            [(1, vec![pen(1)])].into_iter().collect(),
            BTreeMap::new(),
        );
        let mut session = AnnotationSession::new();
        session.open(pdf(&[(600.0, 800.0)]), Some(persisted)).unwrap();

        assert_eq!(session.source_page_width(), Some(300.0));
        assert_eq!(session.state().unwrap().stroke_count(), 1);
        assert!(!session.can_undo());
    }

    #[test]
    fn dispatch_and_undo_through_session() {
        let mut session = AnnotationSession::new();
        session.open(pdf(&[(600.0, 800.0)]), None).unwrap();

        assert!(session.dispatch(AnnotationAction::AddStroke { page: 1, stroke: pen(1) }));
        assert_eq!(session.page_layer(1).unwrap().strokes.len(), 1);
        assert!(session.undo());
        assert_eq!(session.page_layer(1).unwrap().strokes.len(), 0);
        assert!(session.redo());
        assert!(!session.redo());
    }

    #[test]
    fn dispatch_without_document_is_ignored() {
        let mut session = AnnotationSession::new();
        assert!(!session.dispatch(AnnotationAction::AddStroke { page: 1, stroke: pen(1) }));
        assert!(session.state().is_none());
    }

    #[test]
    fn save_snapshots_current_state() {
        let mut session = AnnotationSession::new();
        let original = pdf(&[(600.0, 800.0)]);
        session.open(original.clone(), None).unwrap();
        session.dispatch(AnnotationAction::AddStroke { page: 1, stroke: pen(1) });

        let request = session.save().unwrap();
        session.dispatch(AnnotationAction::AddStroke { page: 1, stroke: pen(1) });

        assert_eq!(&request.document[..], &original[..]);
        assert_eq!(request.annotations_by_page[&1].len(), 1);
        assert_eq!(request.source_page_width, 600.0);
        assert!(request.serialize().unwrap().len() > original.len());
    }

    #[test]
    fn removed_images_leave_the_cache() {
        let mut session = AnnotationSession::new();
        session.open(pdf(&[(600.0, 800.0)]), None).unwrap();
        let image = ImageAnnotation::new(1, 10.0, 10.0, 40.0, 40.0, png(), ImageMimeType::Png);
        let id = image.id;
        session.dispatch(AnnotationAction::AddImage { page: 1, image });

        let mut surface = session
            .create_surface(1, ViewTransform::default(), SurfaceConfig::default())
            .unwrap();
        assert!(session.image_cache().contains(id));

        session.dispatch(AnnotationAction::RemoveImage { id });
        assert!(!session.image_cache().contains(id));
        assert!(session.sync_surface(&mut surface));
    }

    #[test]
    fn close_discards_everything() {
        let mut session = AnnotationSession::new();
        session.open(pdf(&[(600.0, 800.0)]), None).unwrap();
        session.dispatch(AnnotationAction::AddStroke { page: 1, stroke: pen(1) });

        session.close();

        assert!(!session.is_open());
        assert!(session.persisted().is_none());
        assert!(!session.can_undo());
        assert!(session.image_cache().is_empty());
    }

    #[test]
    fn surface_for_missing_page_is_an_error() {
        let mut session = AnnotationSession::new();
        session.open(pdf(&[(600.0, 800.0)]), None).unwrap();

        let err = session
            .create_surface(2, ViewTransform::default(), SurfaceConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, SessionError::PageOutOfRange { page: 2, page_count: 1 }));
    }
}
