//! Annotation data model
//!
//! Strokes, images, the per-document annotation state with undo/redo, and
//! the pure curve and erase geometry shared by the raster surface and the
//! PDF writer.

pub mod geometry;
pub mod history;
pub mod persisted;
pub mod state;
pub mod tool;
pub mod types;

pub use geometry::{
    distance_to_polyline, distance_to_segment, erase_along_path, hit_test_strokes,
    polyline_segments, pressure_width, quick_segments, smooth_segments, split_stroke, stroke_hit,
    SegmentShape, StrokeSegment, StrokeSplit, CATMULL_ROM_TENSION,
};
pub use history::{apply_annotation_action, AnnotationAction, AnnotationHistory};
pub use persisted::{ModelError, PersistedAnnotations, PERSISTED_SCHEMA_VERSION};
pub use state::{DocumentAnnotationState, PageImages, PageLayer, PageStrokes};
pub use tool::{EraserMode, GestureKind, Tool, ToolSettings};
pub use types::{
    normalize_pressure, ColorParseError, ImageAnnotation, ImageId, ImageMimeType, ImageUpdate,
    PageNumber, PagePoint, Point, Rgb, Stroke, StrokeId, StrokeTool, DEFAULT_PRESSURE,
};
