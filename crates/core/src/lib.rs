//! Annotation core
//!
//! Per-page annotation surfaces, raster compositing, the decoded image cache,
//! the document session and the background save worker. Pure data and
//! geometry live in `annotation-model`; PDF access lives in `pdf-engine`.

pub mod image_cache;
pub mod render;
pub mod save;
pub mod session;
pub mod surface;
pub mod view;

pub use image_cache::ImageCache;
pub use save::{DocumentWriter, SaveError, SaveOutcome, SaveWorker};
pub use session::{AnnotationSession, SaveRequest, SessionError};
pub use surface::{AnnotationSurface, PointerEvent, PointerInput, SurfaceError};
pub use view::{SurfaceConfig, ViewTransform};

pub use annotation_model;
pub use pdf_engine;
