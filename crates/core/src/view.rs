//! View and surface configuration

use annotation_model::{PagePoint, Point, DEFAULT_PRESSURE};
use tiny_skia::Transform;

/// Zoom and backing-store scale for one displayed page
///
/// Pointer positions arrive in CSS pixels; the raster is allocated in device
/// pixels. Stored geometry is always page-space, independent of both.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    pub zoom: f32,
    pub device_pixel_ratio: f32,
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self { zoom: 1.0, device_pixel_ratio: 1.0 }
    }
}

impl ViewTransform {
    pub fn new(zoom: f32, device_pixel_ratio: f32) -> Self {
        Self { zoom, device_pixel_ratio }
    }

    fn zoom(&self) -> f32 {
        positive_or_one(self.zoom)
    }

    /// Device pixels per page unit
    pub fn pixel_scale(&self) -> f32 {
        self.zoom() * positive_or_one(self.device_pixel_ratio)
    }

    /// Convert a pointer position in CSS pixels to page-space
    pub fn css_to_page(&self, x: f32, y: f32) -> PagePoint {
        PagePoint::new(x / self.zoom(), y / self.zoom())
    }

    /// Convert a position in backing-store pixels to page-space
    pub fn device_to_page(&self, x: f32, y: f32) -> PagePoint {
        let scale = self.pixel_scale();
        PagePoint::new(x / scale, y / scale)
    }

    /// Raster size in device pixels for a page of the given page-space size
    pub fn raster_size(&self, page_width: f32, page_height: f32) -> (u32, u32) {
        let scale = self.pixel_scale();
        (
            (page_width * scale).ceil().max(1.0) as u32,
            (page_height * scale).ceil().max(1.0) as u32,
        )
    }

    /// Page-space to device-pixel transform for drawing
    pub fn to_pixels(&self) -> Transform {
        let scale = self.pixel_scale();
        Transform::from_scale(scale, scale)
    }
}

fn positive_or_one(value: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        1.0
    }
}

/// Tunables for pointer interpretation and compositing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceConfig {
    /// Added to half the stroke size for the stroke-eraser hit radius
    pub hit_tolerance: f32,
    /// Samples closer than this to the previous one are dropped
    pub min_sample_distance: f32,
    /// Pressure used when the device reports none
    pub default_pressure: f32,
    /// Opacity of the composited highlighter layer
    pub highlighter_opacity: f32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            hit_tolerance: 10.0,
            min_sample_distance: 1.0,
            default_pressure: DEFAULT_PRESSURE,
            highlighter_opacity: 0.3,
        }
    }
}

impl SurfaceConfig {
    pub fn sample(&self, position: PagePoint, pressure: Option<f32>) -> Point {
        let pressure = match pressure {
            Some(value) if value.is_finite() && value > 0.0 => value.min(1.0),
            _ => self.default_pressure,
        };
        Point { x: position.x, y: position.y, pressure }
    }
}
