//! Annotation reducer with linear undo/redo
//!
//! Every committed action produces a new snapshot and discards any redo
//! future. Image drags and resizes rewrite the current snapshot instead, so
//! a stream of pointer moves cannot flood the history.

use crate::state::DocumentAnnotationState;
use crate::types::{ImageAnnotation, ImageId, ImageUpdate, PageNumber, Stroke};
use std::collections::BTreeMap;

/// Actions accepted by the annotation reducer
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationAction {
    AddStroke { page: PageNumber, stroke: Stroke },
    /// Wholesale replacement of a page's strokes (single-stroke and area erase)
    ReplacePageStrokes { page: PageNumber, strokes: Vec<Stroke> },
    AddImage { page: PageNumber, image: ImageAnnotation },
    /// Partial image update located by id; not recorded in history
    UpdateImage { id: ImageId, update: ImageUpdate },
    RemoveImage { id: ImageId },
    Undo,
    Redo,
    /// Replace everything and reset history to a single snapshot
    LoadInitial {
        annotations_by_page: BTreeMap<PageNumber, Vec<Stroke>>,
        images_by_page: BTreeMap<PageNumber, Vec<ImageAnnotation>>,
    },
}

/// Snapshot history for one open document
///
/// `cursor` always points at the displayed snapshot.
#[derive(Debug, Clone)]
pub struct AnnotationHistory {
    snapshots: Vec<DocumentAnnotationState>,
    cursor: usize,
}

impl Default for AnnotationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl AnnotationHistory {
    pub fn new() -> Self {
        Self::with_initial(DocumentAnnotationState::new())
    }

    pub fn with_initial(state: DocumentAnnotationState) -> Self {
        Self { snapshots: vec![state], cursor: 0 }
    }

    pub fn current(&self) -> &DocumentAnnotationState {
        &self.snapshots[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.snapshots.len()
    }

    pub fn add_stroke(&mut self, page: PageNumber, stroke: Stroke) {
        apply_annotation_action(self, AnnotationAction::AddStroke { page, stroke });
    }

    pub fn replace_page_strokes(&mut self, page: PageNumber, strokes: Vec<Stroke>) {
        apply_annotation_action(self, AnnotationAction::ReplacePageStrokes { page, strokes });
    }

    pub fn add_image(&mut self, page: PageNumber, image: ImageAnnotation) {
        apply_annotation_action(self, AnnotationAction::AddImage { page, image });
    }

    pub fn update_image(&mut self, id: ImageId, update: ImageUpdate) {
        apply_annotation_action(self, AnnotationAction::UpdateImage { id, update });
    }

    pub fn remove_image(&mut self, id: ImageId) {
        apply_annotation_action(self, AnnotationAction::RemoveImage { id });
    }

    pub fn undo(&mut self) -> bool {
        apply_annotation_action(self, AnnotationAction::Undo)
    }

    pub fn redo(&mut self) -> bool {
        apply_annotation_action(self, AnnotationAction::Redo)
    }

    pub fn load_initial(
        &mut self,
        annotations_by_page: BTreeMap<PageNumber, Vec<Stroke>>,
        images_by_page: BTreeMap<PageNumber, Vec<ImageAnnotation>>,
    ) {
        apply_annotation_action(
            self,
            AnnotationAction::LoadInitial { annotations_by_page, images_by_page },
        );
    }

    fn commit(&mut self, next: DocumentAnnotationState) {
        self.snapshots.truncate(self.cursor + 1);
        self.snapshots.push(next);
        self.cursor = self.snapshots.len() - 1;
    }

    fn replace_current(&mut self, next: DocumentAnnotationState) {
        self.snapshots[self.cursor] = next;
    }
}

/// Apply an action to the history.
///
/// Returns whether the displayed state changed. Boundary undo/redo and
/// updates to unknown image ids are no-ops.
pub fn apply_annotation_action(history: &mut AnnotationHistory, action: AnnotationAction) -> bool {
    match action {
        AnnotationAction::AddStroke { page, stroke } => {
            let points = stroke.points().len();
            tracing::debug!(page, stroke = %stroke.id(), points, "add stroke");
            let next = history.current().with_stroke_added(page, stroke);
            history.commit(next);
            true
        }
        AnnotationAction::ReplacePageStrokes { page, strokes } => {
            tracing::debug!(page, count = strokes.len(), "replace page strokes");
            let next = history.current().with_page_strokes(page, strokes);
            history.commit(next);
            true
        }
        AnnotationAction::AddImage { page, image } => {
            tracing::debug!(page, image = %image.id, "add image");
            let next = history.current().with_image_added(page, image);
            history.commit(next);
            true
        }
        AnnotationAction::UpdateImage { id, update } => {
            match history.current().with_image_updated(id, &update) {
                Some(next) => {
                    history.replace_current(next);
                    true
                }
                None => false,
            }
        }
        AnnotationAction::RemoveImage { id } => match history.current().with_image_removed(id) {
            Some(next) => {
                tracing::debug!(image = %id, "remove image");
                history.commit(next);
                true
            }
            None => false,
        },
        AnnotationAction::Undo => {
            if !history.can_undo() {
                return false;
            }
            history.cursor -= 1;
            tracing::debug!(cursor = history.cursor, "undo");
            true
        }
        AnnotationAction::Redo => {
            if !history.can_redo() {
                return false;
            }
            history.cursor += 1;
            tracing::debug!(cursor = history.cursor, "redo");
            true
        }
        AnnotationAction::LoadInitial { annotations_by_page, images_by_page } => {
            *history = AnnotationHistory::with_initial(DocumentAnnotationState::from_pages(
                annotations_by_page,
                images_by_page,
            ));
            true
        }
    }
}
