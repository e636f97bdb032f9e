//! Writes annotations into a copy of a PDF
//!
//! Each annotated page gets its original content wrapped in `q`/`Q`, then
//! one appended content stream drawing images followed by strokes. Page
//! space is top-down and measured against the page width the annotations
//! were captured at; PDF space is bottom-up in the page's own MediaBox.

use crate::page::{inherited, media_box, resolve, PageBox};
use annotation_model::{
    polyline_segments, smooth_segments, ImageAnnotation, ImageId, ImageMimeType, PageNumber,
    PagePoint, Rgb, Stroke, StrokeSegment, StrokeTool,
};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::ImageFormat;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::collections::BTreeMap;
use std::io::Write;

/// Constant alpha applied to highlighter strokes in the output
pub const HIGHLIGHTER_OPACITY: f32 = 0.3;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("PDF structure error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("encrypted PDFs cannot be annotated")]
    Encrypted,
    #[error("invalid source page width {0}")]
    InvalidSourceWidth(f32),
    #[error("page {page} does not exist (page_count={page_count})")]
    MissingPage { page: PageNumber, page_count: u32 },
    #[error("image {id} on page {page} could not be decoded: {source}")]
    ImageDecode {
        id: ImageId,
        page: PageNumber,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to compress image {id}: {source}")]
    Compress {
        id: ImageId,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode content for page {page}: {message}")]
    Content { page: PageNumber, message: String },
    #[error("failed to write document: {0}")]
    Write(String),
}

/// Serialize annotations into a new copy of `original`.
///
/// The input bytes are never modified, so a failed call can be retried.
/// Any error abandons the whole document; no partial output is returned.
pub fn serialize(
    original: &[u8],
    annotations_by_page: &BTreeMap<PageNumber, Vec<Stroke>>,
    images_by_page: &BTreeMap<PageNumber, Vec<ImageAnnotation>>,
    source_page_width: f32,
) -> Result<Vec<u8>, CodecError> {
    if !source_page_width.is_finite() || source_page_width <= 0.0 {
        return Err(CodecError::InvalidSourceWidth(source_page_width));
    }
    let mut doc = Document::load_mem(original)?;
    if doc.trailer.has(b"Encrypt") {
        return Err(CodecError::Encrypted);
    }
    let pages = doc.get_pages();
    let page_count = pages.len() as u32;

    let mut annotated: Vec<PageNumber> = annotations_by_page
        .iter()
        .filter(|(_, strokes)| !strokes.is_empty())
        .map(|(page, _)| *page)
        .chain(
            images_by_page
                .iter()
                .filter(|(_, images)| !images.is_empty())
                .map(|(page, _)| *page),
        )
        .collect();
    annotated.sort_unstable();
    annotated.dedup();

    let mut stroke_total = 0;
    let mut image_total = 0;
    for page in &annotated {
        let page_id = *pages.get(page).ok_or(CodecError::MissingPage { page: *page, page_count })?;
        let strokes = annotations_by_page.get(page).map(Vec::as_slice).unwrap_or(&[]);
        let images = images_by_page.get(page).map(Vec::as_slice).unwrap_or(&[]);

        write_page(&mut doc, page_id, *page, strokes, images, source_page_width)?;
        stroke_total += strokes.len();
        image_total += images.len();
    }

    let mut output = Vec::new();
    doc.save_to(&mut output).map_err(|err| CodecError::Write(err.to_string()))?;

    tracing::info!(
        pages = annotated.len(),
        strokes = stroke_total,
        images = image_total,
        bytes = output.len(),
        "serialized annotations"
    );
    Ok(output)
}

/// Maps page-space coordinates onto a page's MediaBox
#[derive(Debug, Clone, Copy)]
struct PageTransform {
    page_box: PageBox,
    ratio: f32,
}

impl PageTransform {
    fn new(page_box: PageBox, source_page_width: f32) -> Self {
        Self { page_box, ratio: page_box.width / source_page_width }
    }

    fn point(&self, point: PagePoint) -> (f32, f32) {
        (
            self.page_box.x0 + point.x * self.ratio,
            self.page_box.y0 + self.page_box.height - point.y * self.ratio,
        )
    }

    fn length(&self, value: f32) -> f32 {
        value * self.ratio
    }
}

fn write_page(
    doc: &mut Document,
    page_id: ObjectId,
    page: PageNumber,
    strokes: &[Stroke],
    images: &[ImageAnnotation],
    source_page_width: f32,
) -> Result<(), CodecError> {
    let transform = PageTransform::new(media_box(doc, page_id), source_page_width);

    let mut resources = page_resources(doc, page_id);
    let mut xobjects = sub_dictionary(doc, &resources, b"XObject");
    let mut states = sub_dictionary(doc, &resources, b"ExtGState");
    let existing_contents = content_references(doc, page_id)?;

    let mut operations = Vec::new();
    for image in images {
        let image_id = embed_image(doc, image, page)?;
        let name = unique_name(&xobjects, "AnnIm");
        xobjects.set(name.as_bytes(), Object::Reference(image_id));
        push_image(&mut operations, image, &name, &transform);
    }

    let mut highlighter_state: Option<String> = None;
    for stroke in strokes {
        let state = if stroke.is_highlighter() {
            let name = match &highlighter_state {
                Some(name) => name.clone(),
                None => {
                    let name = unique_name(&states, "AnnGs");
                    states.set(name.as_bytes(), highlighter_graphics_state());
                    highlighter_state = Some(name.clone());
                    name
                }
            };
            Some(name)
        } else {
            None
        };
        push_stroke(&mut operations, stroke, state.as_deref(), &transform);
    }

    let mut encoded = b"Q\n".to_vec();
    encoded.extend(
        Content { operations }
            .encode()
            .map_err(|err| CodecError::Content { page, message: err.to_string() })?,
    );
    encoded.push(b'\n');

    let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let annotation_id = doc.add_object(Stream::new(dictionary! {}, encoded));

    let mut contents = Vec::with_capacity(existing_contents.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing_contents);
    contents.push(Object::Reference(annotation_id));

    if !xobjects.is_empty() {
        resources.set("XObject", Object::Dictionary(xobjects));
    }
    if !states.is_empty() {
        resources.set("ExtGState", Object::Dictionary(states));
    }

    let page_dict = doc.get_object_mut(page_id)?.as_dict_mut()?;
    page_dict.set("Contents", Object::Array(contents));
    page_dict.set("Resources", Object::Dictionary(resources));

    tracing::debug!(page, strokes = strokes.len(), images = images.len(), "wrote page annotations");
    Ok(())
}

/// Page content streams as a flat list of references
fn content_references(doc: &Document, page_id: ObjectId) -> Result<Vec<Object>, CodecError> {
    let page = doc.get_dictionary(page_id)?;
    let references = match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    Ok(references)
}

/// Resources in effect for a page, copied so they can be extended inline
fn page_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    inherited(doc, page_id, b"Resources")
        .and_then(|object| object.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

fn sub_dictionary(doc: &Document, resources: &Dictionary, key: &[u8]) -> Dictionary {
    resources
        .get(key)
        .ok()
        .map(|object| resolve(doc, object))
        .and_then(|object| object.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

fn unique_name(dict: &Dictionary, prefix: &str) -> String {
    let mut index = dict.len();
    loop {
        let name = format!("{prefix}{index}");
        if !dict.has(name.as_bytes()) {
            return name;
        }
        index += 1;
    }
}

fn highlighter_graphics_state() -> Dictionary {
    dictionary! {
        "Type" => "ExtGState",
        "CA" => Object::Real(HIGHLIGHTER_OPACITY),
        "BM" => "Multiply",
    }
}

fn embed_image(
    doc: &mut Document,
    image: &ImageAnnotation,
    page: PageNumber,
) -> Result<ObjectId, CodecError> {
    let decode_error = |source| CodecError::ImageDecode { id: image.id, page, source };

    let format = match image.mime_type {
        ImageMimeType::Png => ImageFormat::Png,
        ImageMimeType::Jpeg => ImageFormat::Jpeg,
    };
    let decoded = image::load_from_memory_with_format(&image.data, format).map_err(decode_error)?;

    if image.mime_type == ImageMimeType::Jpeg {
        if let Some(color_space) = jpeg_passthrough_color_space(&image.data) {
            let dict =
                image_dictionary(decoded.width(), decoded.height(), color_space, "DCTDecode");
            return Ok(doc.add_object(Stream::new(dict, image.data.to_vec())));
        }
        // CMYK and YCCK scans are written from the decoded RGB pixels.
        tracing::debug!(image = %image.id, "re-encoding JPEG without a gray or RGB scan");
    }

    let decoded = decoded.to_rgba8();
    let (width, height) = decoded.dimensions();
    let pixel_count = (width as usize) * (height as usize);
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    for pixel in decoded.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
    }
    let compress_error = |source| CodecError::Compress { id: image.id, source };

    let mut dict = image_dictionary(width, height, "DeviceRGB", "FlateDecode");
    if alpha.iter().any(|&a| a < u8::MAX) {
        let mask = Stream::new(
            image_dictionary(width, height, "DeviceGray", "FlateDecode"),
            deflate(&alpha).map_err(compress_error)?,
        );
        dict.set("SMask", Object::Reference(doc.add_object(mask)));
    }

    let data = deflate(&rgb).map_err(compress_error)?;
    Ok(doc.add_object(Stream::new(dict, data)))
}

/// Colour space for embedding a JPEG's DCT stream unchanged, or `None` when
/// its frame is neither gray nor three-component.
fn jpeg_passthrough_color_space(bytes: &[u8]) -> Option<&'static str> {
    match jpeg_component_count(bytes)? {
        1 => Some("DeviceGray"),
        3 => Some("DeviceRGB"),
        _ => None,
    }
}

/// Number of components in the first frame header (SOFn) of a JPEG
fn jpeg_component_count(bytes: &[u8]) -> Option<u8> {
    if bytes.get(..2)? != [0xFF, 0xD8] {
        return None;
    }

    let mut at = 2;
    loop {
        if *bytes.get(at)? != 0xFF {
            return None;
        }
        let marker = *bytes.get(at + 1)?;
        match marker {
            // fill byte
            0xFF => at += 1,
            // markers without a length field
            0x01 | 0xD0..=0xD7 => at += 2,
            // SOF0..SOF15, except DHT, JPG and DAC
            0xC0..=0xCF if !matches!(marker, 0xC4 | 0xC8 | 0xCC) => {
                // length(2) precision(1) height(2) width(2) components(1)
                return bytes.get(at + 9).copied();
            }
            // start of scan or end of image before any frame header
            0xDA | 0xD9 => return None,
            _ => {
                let length = u16::from_be_bytes([*bytes.get(at + 2)?, *bytes.get(at + 3)?]);
                at += 2 + usize::from(length);
            }
        }
    }
}

fn image_dictionary(width: u32, height: u32, color_space: &str, filter: &str) -> Dictionary {
    dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => i64::from(width),
        "Height" => i64::from(height),
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => filter,
    }
}

fn deflate(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

fn real(value: f32) -> Object {
    Object::Real(value)
}

fn push_image(
    operations: &mut Vec<Operation>,
    image: &ImageAnnotation,
    name: &str,
    transform: &PageTransform,
) {
    // The image's bottom-left corner in page space is (x, y + height).
    let (left, bottom) = transform.point(PagePoint::new(image.x, image.y + image.height));
    operations.push(Operation::new("q", vec![]));
    operations.push(Operation::new(
        "cm",
        vec![
            real(transform.length(image.width)),
            real(0.0),
            real(0.0),
            real(transform.length(image.height)),
            real(left),
            real(bottom),
        ],
    ));
    operations.push(Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]));
    operations.push(Operation::new("Q", vec![]));
}

fn push_stroke(
    operations: &mut Vec<Operation>,
    stroke: &Stroke,
    graphics_state: Option<&str>,
    transform: &PageTransform,
) {
    let (segments, color, width) = match stroke.tool() {
        StrokeTool::Whiteout => {
            (polyline_segments(stroke.points(), stroke.size()), Rgb::WHITE, stroke.size())
        }
        StrokeTool::Pen | StrokeTool::Highlighter => (
            smooth_segments(stroke.points(), stroke.size()),
            stroke.color(),
            stroke.size() * stroke.mean_pressure() * 2.0,
        ),
    };
    let Some(first) = segments.first() else {
        return;
    };

    let (r, g, b) = color.to_normalized();
    operations.push(Operation::new("q", vec![]));
    if let Some(name) = graphics_state {
        operations.push(Operation::new("gs", vec![Object::Name(name.as_bytes().to_vec())]));
    }
    operations.push(Operation::new("RG", vec![real(r), real(g), real(b)]));
    operations.push(Operation::new("w", vec![real(transform.length(width))]));
    operations.push(Operation::new("J", vec![Object::Integer(1)]));
    operations.push(Operation::new("j", vec![Object::Integer(1)]));

    let (x, y) = transform.point(first.from);
    operations.push(Operation::new("m", vec![real(x), real(y)]));
    for segment in &segments {
        push_segment(operations, segment, transform);
    }

    operations.push(Operation::new("S", vec![]));
    operations.push(Operation::new("Q", vec![]));
}

fn push_segment(
    operations: &mut Vec<Operation>,
    segment: &StrokeSegment,
    transform: &PageTransform,
) {
    let (x, y) = transform.point(segment.to);
    match segment.cubic_controls() {
        None => operations.push(Operation::new("l", vec![real(x), real(y)])),
        Some((ctrl1, ctrl2)) => {
            let (x1, y1) = transform.point(ctrl1);
            let (x2, y2) = transform.point(ctrl2);
            operations.push(Operation::new(
                "c",
                vec![real(x1), real(y1), real(x2), real(y2), real(x), real(y)],
            ));
        }
    }
}
