//! JSON shape of annotations stored alongside a document

use crate::state::DocumentAnnotationState;
use crate::types::{ImageAnnotation, PageNumber, Stroke};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PERSISTED_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("annotation JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported annotation schema version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Strokes and images of one document with the page width they were drawn at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedAnnotations {
    pub version: u32,
    pub source_page_width: f32,
    #[serde(default)]
    pub annotations_by_page: BTreeMap<PageNumber, Vec<Stroke>>,
    #[serde(default)]
    pub images_by_page: BTreeMap<PageNumber, Vec<ImageAnnotation>>,
}

impl PersistedAnnotations {
    pub fn new(
        source_page_width: f32,
        annotations_by_page: BTreeMap<PageNumber, Vec<Stroke>>,
        images_by_page: BTreeMap<PageNumber, Vec<ImageAnnotation>>,
    ) -> Self {
        Self {
            version: PERSISTED_SCHEMA_VERSION,
            source_page_width,
            annotations_by_page,
            images_by_page,
        }
    }

    pub fn from_state(state: &DocumentAnnotationState, source_page_width: f32) -> Self {
        let (strokes, images) = state.to_pages();
        Self::new(source_page_width, strokes, images)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ModelError> {
        let persisted: PersistedAnnotations = serde_json::from_slice(bytes)?;
        if persisted.version != PERSISTED_SCHEMA_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: persisted.version,
                expected: PERSISTED_SCHEMA_VERSION,
            });
        }
        Ok(persisted)
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ModelError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Build the initial state, dropping strokes and images that fail validation
    pub fn into_state(self) -> DocumentAnnotationState {
        DocumentAnnotationState::from_pages(self.annotations_by_page, self.images_by_page)
    }
}
