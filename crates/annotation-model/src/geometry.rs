//! Curve and hit-testing geometry for freehand strokes
//!
//! Pure functions only. The raster renderer and the PDF writer both consume
//! the [`StrokeSegment`] lists produced here, so a stroke has the same shape
//! on screen and in the saved document.

use crate::types::{PagePoint, Point, Stroke};

/// Catmull-Rom tension used when deriving Bezier control points
pub const CATMULL_ROM_TENSION: f32 = 1.0;

/// Shape of a single path segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SegmentShape {
    Line,
    Quad { ctrl: PagePoint },
    Cubic { ctrl1: PagePoint, ctrl2: PagePoint },
}

/// One drawable piece of a stroke path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeSegment {
    pub from: PagePoint,
    pub to: PagePoint,
    pub shape: SegmentShape,
    /// Line width for this segment, already pressure-scaled
    pub width: f32,
}

impl StrokeSegment {
    /// Control points of the equivalent cubic Bezier, or `None` for a line.
    ///
    /// Quadratics are degree-elevated: each control sits 2/3 of the way from
    /// its end point to the quadratic control.
    pub fn cubic_controls(&self) -> Option<(PagePoint, PagePoint)> {
        match self.shape {
            SegmentShape::Line => None,
            SegmentShape::Cubic { ctrl1, ctrl2 } => Some((ctrl1, ctrl2)),
            SegmentShape::Quad { ctrl } => {
                let toward = |end: PagePoint| {
                    PagePoint::new(
                        end.x + (ctrl.x - end.x) * 2.0 / 3.0,
                        end.y + (ctrl.y - end.y) * 2.0 / 3.0,
                    )
                };
                Some((toward(self.from), toward(self.to)))
            }
        }
    }
}

/// Width of a segment between two samples: `base × avgPressure × 2`
pub fn pressure_width(base_size: f32, a: &Point, b: &Point) -> f32 {
    base_size * ((a.pressure + b.pressure) / 2.0) * 2.0
}

/// Smooth path through every sample.
///
/// Two points give a straight segment. Three or more give one cubic Bezier
/// per pair of neighbours, with control points taken from the Catmull-Rom
/// tangents so the curve is continuous through all samples. Each segment
/// carries its own pressure-derived width.
pub fn smooth_segments(points: &[Point], base_size: f32) -> Vec<StrokeSegment> {
    match points.len() {
        0 | 1 => Vec::new(),
        2 => vec![StrokeSegment {
            from: points[0].position(),
            to: points[1].position(),
            shape: SegmentShape::Line,
            width: pressure_width(base_size, &points[0], &points[1]),
        }],
        len => {
            let mut segments = Vec::with_capacity(len - 1);
            for i in 0..len - 1 {
                let p0 = points[i.saturating_sub(1)].position();
                let p1 = points[i].position();
                let p2 = points[i + 1].position();
                let p3 = points[(i + 2).min(len - 1)].position();

                let k = CATMULL_ROM_TENSION / 6.0;
                let ctrl1 = PagePoint::new(p1.x + (p2.x - p0.x) * k, p1.y + (p2.y - p0.y) * k);
                let ctrl2 = PagePoint::new(p2.x - (p3.x - p1.x) * k, p2.y - (p3.y - p1.y) * k);

                segments.push(StrokeSegment {
                    from: p1,
                    to: p2,
                    shape: SegmentShape::Cubic { ctrl1, ctrl2 },
                    width: pressure_width(base_size, &points[i], &points[i + 1]),
                });
            }
            segments
        }
    }
}

/// Cheap continuous path for the stroke still being drawn.
///
/// Quadratic curves through segment midpoints, one width for the whole path
/// (from the mean pressure). Returned segments are contiguous.
pub fn quick_segments(points: &[Point], base_size: f32) -> Vec<StrokeSegment> {
    if points.len() < 2 {
        return Vec::new();
    }

    let mean_pressure = points.iter().map(|p| p.pressure).sum::<f32>() / points.len() as f32;
    let width = base_size * mean_pressure * 2.0;

    if points.len() == 2 {
        return vec![StrokeSegment {
            from: points[0].position(),
            to: points[1].position(),
            shape: SegmentShape::Line,
            width,
        }];
    }

    let mut segments = Vec::with_capacity(points.len());
    let mut cursor = points[0].position();
    for window in points[1..].windows(2) {
        let ctrl = window[0].position();
        let mid = ctrl.midpoint(&window[1].position());
        let shape = SegmentShape::Quad { ctrl };
        segments.push(StrokeSegment { from: cursor, to: mid, shape, width });
        cursor = mid;
    }
    if let Some(last) = points.last() {
        segments.push(StrokeSegment {
            from: cursor,
            to: last.position(),
            shape: SegmentShape::Line,
            width,
        });
    }
    segments
}

/// Straight polyline through every sample, used for whiteout strokes
pub fn polyline_segments(points: &[Point], width: f32) -> Vec<StrokeSegment> {
    points
        .windows(2)
        .map(|pair| StrokeSegment {
            from: pair[0].position(),
            to: pair[1].position(),
            shape: SegmentShape::Line,
            width,
        })
        .collect()
}

/// Distance from `point` to the segment `start..end`
pub fn distance_to_segment(point: &PagePoint, start: &PagePoint, end: &PagePoint) -> f32 {
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let length_sq = dx * dx + dy * dy;

    if length_sq < 1e-6 {
        return point.distance_to(start);
    }

    let t = (((point.x - start.x) * dx + (point.y - start.y) * dy) / length_sq).clamp(0.0, 1.0);
    point.distance_to(&PagePoint::new(start.x + t * dx, start.y + t * dy))
}

/// Distance from `point` to a polyline. A single-sample polyline is a point.
pub fn distance_to_polyline(point: &PagePoint, polyline: &[PagePoint]) -> f32 {
    match polyline {
        [] => f32::INFINITY,
        [only] => point.distance_to(only),
        _ => polyline
            .windows(2)
            .map(|pair| distance_to_segment(point, &pair[0], &pair[1]))
            .chain(polyline.iter().map(|vertex| point.distance_to(vertex)))
            .fold(f32::INFINITY, f32::min),
    }
}

/// Whether the pointer lies strictly inside a stroke's erase radius.
///
/// The radius is `tolerance + size / 2` around every sample; a pointer
/// exactly on the radius does not hit.
pub fn stroke_hit(stroke: &Stroke, pointer: &PagePoint, tolerance: f32) -> bool {
    let radius = tolerance + stroke.size() / 2.0;
    stroke.points().iter().any(|p| p.position().distance_to(pointer) < radius)
}

/// First stroke (in draw order) hit by the pointer
pub fn hit_test_strokes<'a>(
    strokes: &'a [Stroke],
    pointer: &PagePoint,
    tolerance: f32,
) -> Option<&'a Stroke> {
    strokes.iter().find(|stroke| stroke_hit(stroke, pointer, tolerance))
}

/// Result of running an erase path over one stroke
#[derive(Debug, Clone, PartialEq)]
pub enum StrokeSplit {
    /// No sample was inside the erase radius
    Untouched,
    /// Surviving runs of two or more samples, each a new stroke
    Fragments(Vec<Stroke>),
}

/// Split one stroke along an erase path.
///
/// A sample is erased when it lies strictly closer than
/// `eraser_size + stroke.size / 2` to the erase polyline. Contiguous
/// surviving runs of at least two samples become fresh strokes; shorter runs
/// are dropped.
pub fn split_stroke(stroke: &Stroke, erase_path: &[PagePoint], eraser_size: f32) -> StrokeSplit {
    if erase_path.is_empty() {
        return StrokeSplit::Untouched;
    }

    let radius = eraser_size + stroke.size() / 2.0;
    let erased: Vec<bool> = stroke
        .points()
        .iter()
        .map(|p| distance_to_polyline(&p.position(), erase_path) < radius)
        .collect();

    if !erased.iter().any(|&e| e) {
        return StrokeSplit::Untouched;
    }

    let mut fragments = Vec::new();
    let mut run: Vec<Point> = Vec::new();
    for (point, erased) in stroke.points().iter().zip(erased) {
        if erased {
            if let Some(fragment) = stroke.fragment(std::mem::take(&mut run)) {
                fragments.push(fragment);
            }
        } else {
            run.push(*point);
        }
    }
    if let Some(fragment) = stroke.fragment(run) {
        fragments.push(fragment);
    }

    StrokeSplit::Fragments(fragments)
}

/// Apply an area erase to a page's strokes.
///
/// Returns `None` when nothing was erased; otherwise the replacement list in
/// the original draw order, with untouched strokes kept as they were.
pub fn erase_along_path(
    strokes: &[Stroke],
    erase_path: &[PagePoint],
    eraser_size: f32,
) -> Option<Vec<Stroke>> {
    let mut changed = false;
    let mut result = Vec::with_capacity(strokes.len());

    for stroke in strokes {
        match split_stroke(stroke, erase_path, eraser_size) {
            StrokeSplit::Untouched => result.push(stroke.clone()),
            StrokeSplit::Fragments(fragments) => {
                changed = true;
                result.extend(fragments);
            }
        }
    }

    changed.then_some(result)
}
