//! Raster primitives for strokes, erase feedback and the highlighter layer
//!
//! All functions take page-space geometry plus a page-to-pixel transform.

use annotation_model::{
    polyline_segments, quick_segments, smooth_segments, PagePoint, Point, Rgb, SegmentShape,
    Stroke, StrokeSegment,
};
use tiny_skia::{
    BlendMode, Color, FillRule, FilterQuality, LineCap, LineJoin, Paint, Path, PathBuilder,
    Pixmap, PixmapPaint, Transform,
};

fn solid_paint(color: Rgb, blend_mode: BlendMode) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, 255);
    paint.anti_alias = true;
    paint.blend_mode = blend_mode;
    paint
}

fn round_line(width: f32) -> tiny_skia::Stroke {
    tiny_skia::Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..tiny_skia::Stroke::default()
    }
}

fn append_segment(builder: &mut PathBuilder, segment: &StrokeSegment) {
    let to = segment.to;
    match segment.shape {
        SegmentShape::Line => builder.line_to(to.x, to.y),
        SegmentShape::Quad { ctrl } => builder.quad_to(ctrl.x, ctrl.y, to.x, to.y),
        SegmentShape::Cubic { ctrl1, ctrl2 } => {
            builder.cubic_to(ctrl1.x, ctrl1.y, ctrl2.x, ctrl2.y, to.x, to.y)
        }
    }
}

/// One continuous path through contiguous segments
fn continuous_path(segments: &[StrokeSegment]) -> Option<Path> {
    let first = segments.first()?;
    let mut builder = PathBuilder::new();
    builder.move_to(first.from.x, first.from.y);
    for segment in segments {
        append_segment(&mut builder, segment);
    }
    builder.finish()
}

/// Draw a committed stroke with Catmull-Rom smoothing.
///
/// Each segment is stroked with its own pressure-derived width; round caps
/// keep the joins between segments closed.
pub fn draw_smooth_stroke(
    pixmap: &mut Pixmap,
    points: &[Point],
    base_size: f32,
    color: Rgb,
    blend_mode: BlendMode,
    transform: Transform,
) {
    let paint = solid_paint(color, blend_mode);
    for segment in smooth_segments(points, base_size) {
        if let Some(path) = continuous_path(std::slice::from_ref(&segment)) {
            pixmap.stroke_path(&path, &paint, &round_line(segment.width), transform, None);
        }
    }
}

/// Draw the stroke still being captured as a single quadratic path
pub fn draw_quick_stroke(
    pixmap: &mut Pixmap,
    points: &[Point],
    base_size: f32,
    color: Rgb,
    blend_mode: BlendMode,
    transform: Transform,
) {
    let segments = quick_segments(points, base_size);
    let Some(width) = segments.first().map(|segment| segment.width) else {
        return;
    };
    if let Some(path) = continuous_path(&segments) {
        let paint = solid_paint(color, blend_mode);
        pixmap.stroke_path(&path, &paint, &round_line(width), transform, None);
    }
}

/// Opaque white polyline used for whiteout strokes
pub fn white_out_path(pixmap: &mut Pixmap, points: &[Point], size: f32, transform: Transform) {
    let segments = polyline_segments(points, size);
    if let Some(path) = continuous_path(&segments) {
        let paint = solid_paint(Rgb::WHITE, BlendMode::SourceOver);
        pixmap.stroke_path(&path, &paint, &round_line(size), transform, None);
    }
}

/// Clear a disc of the raster. Visual feedback only.
pub fn erase_area(pixmap: &mut Pixmap, center: PagePoint, radius: f32, transform: Transform) {
    let Some(circle) = PathBuilder::from_circle(center.x, center.y, radius.max(0.5)) else {
        return;
    };
    let mut paint = Paint::default();
    paint.blend_mode = BlendMode::Clear;
    paint.anti_alias = true;
    pixmap.fill_path(&circle, &paint, FillRule::Winding, transform, None);
}

/// Blend an offscreen layer onto the target once, with multiply at `opacity`
pub fn composite_layer(target: &mut Pixmap, layer: &Pixmap, opacity: f32) {
    let paint = PixmapPaint {
        opacity: opacity.clamp(0.0, 1.0),
        blend_mode: BlendMode::Multiply,
        quality: FilterQuality::Nearest,
    };
    target.draw_pixmap(0, 0, layer.as_ref(), &paint, Transform::identity(), None);
}

/// Draw a layer over the target with source-over blending
pub fn draw_layer(target: &mut Pixmap, layer: &Pixmap) {
    let paint = PixmapPaint { quality: FilterQuality::Nearest, ..PixmapPaint::default() };
    target.draw_pixmap(0, 0, layer.as_ref(), &paint, Transform::identity(), None);
}

/// Render highlighter strokes into an isolated buffer at full opacity,
/// darkening where they meet.
///
/// The buffer is meant to be blended once with [`composite_layer`], so
/// overlapping highlights never look darker than a single one. More strokes,
/// including one still being drawn, can be added to it with
/// [`BlendMode::Darken`] before compositing. Returns `None` when there is
/// nothing to draw.
pub fn highlighter_layer<'a>(
    width: u32,
    height: u32,
    strokes: impl IntoIterator<Item = &'a Stroke>,
    transform: Transform,
) -> Option<Pixmap> {
    let mut strokes = strokes.into_iter().peekable();
    strokes.peek()?;
    let mut layer = Pixmap::new(width, height)?;

    for stroke in strokes {
        draw_smooth_stroke(
            &mut layer,
            stroke.points(),
            stroke.size(),
            stroke.color(),
            BlendMode::Darken,
            transform,
        );
    }
    Some(layer)
}

/// Draw a decoded image into its page-space rectangle
pub fn draw_image(
    target: &mut Pixmap,
    image: &Pixmap,
    rect: (f32, f32, f32, f32),
    pixel_scale: f32,
) {
    let (x, y, width, height) = rect;
    if image.width() == 0 || image.height() == 0 {
        return;
    }
    let transform = Transform::from_row(
        pixel_scale * width / image.width() as f32,
        0.0,
        0.0,
        pixel_scale * height / image.height() as f32,
        pixel_scale * x,
        pixel_scale * y,
    );
    let paint = PixmapPaint { quality: FilterQuality::Bilinear, ..PixmapPaint::default() };
    target.draw_pixmap(0, 0, image.as_ref(), &paint, transform, None);
}

/// Clear the raster to fully transparent
pub fn clear(pixmap: &mut Pixmap) {
    pixmap.fill(Color::TRANSPARENT);
}
