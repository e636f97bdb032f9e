//! Per-document annotation state
//!
//! Snapshots are cheap to clone: both page maps sit behind `Arc`, each page
//! list is its own `Arc`, and stroke samples are shared. Producing the next
//! state copies only the page map and the one page list being changed.

use crate::types::{ImageAnnotation, ImageId, ImageUpdate, PageNumber, Stroke};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type PageStrokes = Arc<Vec<Stroke>>;
pub type PageImages = Arc<Vec<ImageAnnotation>>;

/// All strokes and images of one open document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentAnnotationState {
    annotations_by_page: Arc<BTreeMap<PageNumber, PageStrokes>>,
    images_by_page: Arc<BTreeMap<PageNumber, PageImages>>,
}

/// Read-only view of a single page handed to the annotation surface
#[derive(Debug, Clone, Default)]
pub struct PageLayer {
    pub page: PageNumber,
    pub strokes: PageStrokes,
    pub images: PageImages,
}

impl PageLayer {
    /// Whether two layers hold the same data without comparing contents
    pub fn same_data(&self, other: &PageLayer) -> bool {
        self.page == other.page
            && same_list(&self.strokes, &other.strokes)
            && same_list(&self.images, &other.images)
    }
}

fn same_list<T>(a: &Arc<Vec<T>>, b: &Arc<Vec<T>>) -> bool {
    Arc::ptr_eq(a, b) || (a.is_empty() && b.is_empty())
}

impl DocumentAnnotationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from per-page lists, dropping entries that could never
    /// have been committed.
    pub fn from_pages(
        annotations_by_page: BTreeMap<PageNumber, Vec<Stroke>>,
        images_by_page: BTreeMap<PageNumber, Vec<ImageAnnotation>>,
    ) -> Self {
        let mut strokes_map = BTreeMap::new();
        for (page, strokes) in annotations_by_page {
            let before = strokes.len();
            let valid: Vec<Stroke> = strokes.into_iter().filter(Stroke::is_valid).collect();
            if valid.len() != before {
                tracing::warn!(page, dropped = before - valid.len(), "dropped invalid strokes");
            }
            if page >= 1 && !valid.is_empty() {
                strokes_map.insert(page, Arc::new(valid));
            }
        }

        let mut images_map = BTreeMap::new();
        for (page, images) in images_by_page {
            let valid: Vec<ImageAnnotation> =
                images.into_iter().filter(ImageAnnotation::is_valid).collect();
            if page >= 1 && !valid.is_empty() {
                images_map.insert(page, Arc::new(valid));
            }
        }

        Self { annotations_by_page: Arc::new(strokes_map), images_by_page: Arc::new(images_map) }
    }

    pub fn annotations_by_page(&self) -> &BTreeMap<PageNumber, PageStrokes> {
        &self.annotations_by_page
    }

    pub fn images_by_page(&self) -> &BTreeMap<PageNumber, PageImages> {
        &self.images_by_page
    }

    pub fn page_strokes(&self, page: PageNumber) -> &[Stroke] {
        self.annotations_by_page.get(&page).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn page_images(&self, page: PageNumber) -> &[ImageAnnotation] {
        self.images_by_page.get(&page).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn page_layer(&self, page: PageNumber) -> PageLayer {
        PageLayer {
            page,
            strokes: self.annotations_by_page.get(&page).cloned().unwrap_or_default(),
            images: self.images_by_page.get(&page).cloned().unwrap_or_default(),
        }
    }

    /// Look up an image by id without knowing its page
    pub fn find_image(&self, id: ImageId) -> Option<&ImageAnnotation> {
        self.images_by_page.values().flat_map(|images| images.iter()).find(|image| image.id == id)
    }

    pub fn stroke_count(&self) -> usize {
        self.annotations_by_page.values().map(|s| s.len()).sum()
    }

    pub fn image_count(&self) -> usize {
        self.images_by_page.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations_by_page.is_empty() && self.images_by_page.is_empty()
    }

    /// Owned per-page copies, for serialization
    pub fn to_pages(
        &self,
    ) -> (BTreeMap<PageNumber, Vec<Stroke>>, BTreeMap<PageNumber, Vec<ImageAnnotation>>) {
        let strokes =
            self.annotations_by_page.iter().map(|(page, s)| (*page, s.as_ref().clone())).collect();
        let images =
            self.images_by_page.iter().map(|(page, s)| (*page, s.as_ref().clone())).collect();
        (strokes, images)
    }

    pub(crate) fn with_stroke_added(&self, page: PageNumber, stroke: Stroke) -> Self {
        let mut next = self.clone();
        let map = Arc::make_mut(&mut next.annotations_by_page);
        Arc::make_mut(map.entry(page).or_default()).push(stroke);
        next
    }

    pub(crate) fn with_page_strokes(&self, page: PageNumber, strokes: Vec<Stroke>) -> Self {
        let mut next = self.clone();
        let map = Arc::make_mut(&mut next.annotations_by_page);
        if strokes.is_empty() {
            map.remove(&page);
        } else {
            map.insert(page, Arc::new(strokes));
        }
        next
    }

    pub(crate) fn with_image_added(&self, page: PageNumber, image: ImageAnnotation) -> Self {
        let mut next = self.clone();
        let map = Arc::make_mut(&mut next.images_by_page);
        Arc::make_mut(map.entry(page).or_default()).push(image);
        next
    }

    /// Apply a partial update to the image with `id`; `None` if no page has it.
    pub(crate) fn with_image_updated(&self, id: ImageId, update: &ImageUpdate) -> Option<Self> {
        let page = self.image_page(id)?;
        let mut next = self.clone();
        let map = Arc::make_mut(&mut next.images_by_page);
        let images = Arc::make_mut(map.get_mut(&page)?);
        let image = images.iter_mut().find(|image| image.id == id)?;
        update.apply_to(image);
        Some(next)
    }

    pub(crate) fn with_image_removed(&self, id: ImageId) -> Option<Self> {
        let page = self.image_page(id)?;
        let mut next = self.clone();
        let map = Arc::make_mut(&mut next.images_by_page);
        let images = Arc::make_mut(map.get_mut(&page)?);
        images.retain(|image| image.id != id);
        if images.is_empty() {
            map.remove(&page);
        }
        Some(next)
    }

    fn image_page(&self, id: ImageId) -> Option<PageNumber> {
        self.images_by_page
            .iter()
            .find(|(_, images)| images.iter().any(|image| image.id == id))
            .map(|(page, _)| *page)
    }
}
