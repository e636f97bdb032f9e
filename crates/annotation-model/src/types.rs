//! Annotation data model
//!
//! Strokes and placed images for a single document. All coordinates are
//! page-space: top-left origin, y grows downward, independent of the zoom
//! level that was active when the mark was captured.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Unique identifier for a committed stroke
pub type StrokeId = uuid::Uuid;

/// Unique identifier for an image, unique across every page of a document
pub type ImageId = uuid::Uuid;

/// 1-based page number
pub type PageNumber = u32;

/// Pressure used when the input device reports none
pub const DEFAULT_PRESSURE: f32 = 0.5;

/// Clamp a device-reported pressure into `(0, 1]`.
///
/// Devices without pressure support report `None`, `0.0` or garbage; all of
/// those fall back to [`DEFAULT_PRESSURE`].
pub fn normalize_pressure(reported: Option<f32>) -> f32 {
    match reported {
        Some(pressure) if pressure.is_finite() && pressure > 0.0 => pressure.min(1.0),
        _ => DEFAULT_PRESSURE,
    }
}

fn default_pressure() -> f32 {
    DEFAULT_PRESSURE
}

/// Stored pressure goes through the same normalization as live input
fn deserialize_pressure<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
    Option::<f32>::deserialize(deserializer).map(normalize_pressure)
}

/// Position on a page without pressure information
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PagePoint {
    pub x: f32,
    pub y: f32,
}

impl PagePoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &PagePoint) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn midpoint(&self, other: &PagePoint) -> PagePoint {
        PagePoint::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

/// Pressure-tagged sample captured from pointer input
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    #[serde(default = "default_pressure", deserialize_with = "deserialize_pressure")]
    pub pressure: f32,
}

impl Point {
    /// Create a sample; out-of-range pressure is normalized.
    pub fn new(x: f32, y: f32, pressure: f32) -> Self {
        Self { x, y, pressure: normalize_pressure(Some(pressure)) }
    }

    pub fn position(&self) -> PagePoint {
        PagePoint::new(self.x, self.y)
    }

    pub fn distance_to(&self, other: &Point) -> f32 {
        self.position().distance_to(&other.position())
    }
}

/// Error returned when a color string is not `#RRGGBB`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid color {0:?}: expected #RRGGBB")]
pub struct ColorParseError(pub String);

/// Opaque RGB color, serialized as `#RRGGBB`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const YELLOW: Rgb = Rgb::new(255, 235, 59);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to normalized RGB values (0.0 to 1.0)
    pub fn to_normalized(&self) -> (f32, f32, f32) {
        (self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0)
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Rgb {
    type Err = ColorParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let hex = value.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(ColorParseError(value.to_owned()));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ColorParseError(value.to_owned()))
        };

        Ok(Rgb::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl TryFrom<String> for Rgb {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_hex()
    }
}

/// Drawing tool a committed stroke was made with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrokeTool {
    Pen,
    Highlighter,
    Whiteout,
}

/// Committed freehand mark
///
/// Immutable once created: edits (such as splitting during an area erase)
/// produce new strokes with new ids. The point list is shared, so cloning a
/// stroke never copies its samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    id: StrokeId,
    tool: StrokeTool,
    points: Arc<[Point]>,
    color: Rgb,
    size: f32,
    page: PageNumber,
}

impl Stroke {
    /// Minimum number of samples a committed stroke must have
    pub const MIN_POINTS: usize = 2;

    /// Create a stroke with a fresh id.
    ///
    /// Returns `None` for marks that can never be committed: fewer than two
    /// points, a non-positive size or page 0.
    pub fn new(
        tool: StrokeTool,
        points: Vec<Point>,
        color: Rgb,
        size: f32,
        page: PageNumber,
    ) -> Option<Self> {
        Self::with_id(StrokeId::new_v4(), tool, points, color, size, page)
    }

    /// Create a stroke with a specific id (for deserialization and tests)
    pub fn with_id(
        id: StrokeId,
        tool: StrokeTool,
        points: Vec<Point>,
        color: Rgb,
        size: f32,
        page: PageNumber,
    ) -> Option<Self> {
        let stroke = Self { id, tool, points: Arc::from(points), color, size, page };
        stroke.is_valid().then_some(stroke)
    }

    /// Derive a new stroke (fresh id, same style) from a subset of points.
    pub fn fragment(&self, points: Vec<Point>) -> Option<Self> {
        Self::new(self.tool, points, self.color, self.size, self.page)
    }

    pub fn is_valid(&self) -> bool {
        self.points.len() >= Self::MIN_POINTS
            && self.size.is_finite()
            && self.size > 0.0
            && self.page >= 1
    }

    pub fn id(&self) -> StrokeId {
        self.id
    }

    pub fn tool(&self) -> StrokeTool {
        self.tool
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn color(&self) -> Rgb {
        self.color
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn page(&self) -> PageNumber {
        self.page
    }

    pub fn is_highlighter(&self) -> bool {
        self.tool == StrokeTool::Highlighter
    }

    /// Mean pressure over all samples
    pub fn mean_pressure(&self) -> f32 {
        if self.points.is_empty() {
            return DEFAULT_PRESSURE;
        }
        self.points.iter().map(|p| p.pressure).sum::<f32>() / self.points.len() as f32
    }
}

/// Encoding of an image annotation's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageMimeType {
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/jpeg")]
    Jpeg,
}

impl ImageMimeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageMimeType::Png => "image/png",
            ImageMimeType::Jpeg => "image/jpeg",
        }
    }

    /// Detect the encoding from the file signature.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageMimeType::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageMimeType::Jpeg)
        } else {
            None
        }
    }
}

/// Raster image placed on a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageAnnotation {
    pub id: ImageId,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    #[serde(with = "base64_bytes")]
    pub data: Arc<[u8]>,
    pub mime_type: ImageMimeType,
    pub page: PageNumber,
}

impl ImageAnnotation {
    /// Create an image annotation with a fresh id
    pub fn new(
        page: PageNumber,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        data: impl Into<Arc<[u8]>>,
        mime_type: ImageMimeType,
    ) -> Self {
        Self { id: ImageId::new_v4(), x, y, width, height, data: data.into(), mime_type, page }
    }

    pub fn is_valid(&self) -> bool {
        self.width.is_finite() && self.width > 0.0 && self.height.is_finite() && self.height > 0.0
            && self.page >= 1
    }
}

/// Partial update applied to an image during drag or resize
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageUpdate {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub data: Option<Arc<[u8]>>,
    pub mime_type: Option<ImageMimeType>,
}

impl ImageUpdate {
    pub fn position(x: f32, y: f32) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    pub fn size(width: f32, height: f32) -> Self {
        Self { width: Some(width), height: Some(height), ..Self::default() }
    }

    /// Apply the update. Non-positive sizes are ignored so the image stays valid.
    pub fn apply_to(&self, image: &mut ImageAnnotation) {
        if let Some(x) = self.x.filter(|v| v.is_finite()) {
            image.x = x;
        }
        if let Some(y) = self.y.filter(|v| v.is_finite()) {
            image.y = y;
        }
        if let Some(width) = self.width.filter(|v| v.is_finite() && *v > 0.0) {
            image.width = width;
        }
        if let Some(height) = self.height.filter(|v| v.is_finite() && *v > 0.0) {
            image.height = height;
        }
        if let Some(data) = &self.data {
            image.data = Arc::clone(data);
        }
        if let Some(mime_type) = self.mime_type {
            image.mime_type = mime_type;
        }
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S: Serializer>(bytes: &Arc<[u8]>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Arc<[u8]>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map(Arc::from).map_err(serde::de::Error::custom)
    }
}
