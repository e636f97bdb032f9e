//! Per-page annotation surface
//!
//! Turns a pointer gesture stream into annotation actions and keeps a raster
//! of the page's annotations in sync with the data it was last given. The
//! surface never mutates annotation data; it only emits actions for the
//! session to commit.

use crate::image_cache::ImageCache;
use crate::render;
use crate::view::{SurfaceConfig, ViewTransform};
use annotation_model::{
    erase_along_path, hit_test_strokes, AnnotationAction, GestureKind, PageLayer, PageNumber,
    PagePoint, Point, Rgb, Stroke, StrokeTool, ToolSettings,
};
use tiny_skia::{BlendMode, Pixmap};

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("cannot allocate a {width}x{height} raster for page {page}")]
    RasterSize { page: PageNumber, width: u32, height: u32 },
}

/// Pointer sample in CSS pixels relative to the page's top-left corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerInput {
    pub x: f32,
    pub y: f32,
    pub pressure: Option<f32>,
}

impl PointerInput {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, pressure: None }
    }

    pub fn with_pressure(x: f32, y: f32, pressure: f32) -> Self {
        Self { x, y, pressure: Some(pressure) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(PointerInput),
    Move(PointerInput),
    Up,
    /// Pointer left the surface or the gesture was cancelled
    Leave,
}

#[derive(Debug, Clone, PartialEq)]
struct InProgressStroke {
    tool: StrokeTool,
    color: Rgb,
    size: f32,
    points: Vec<Point>,
}

#[derive(Debug, Clone, PartialEq)]
enum GesturePhase {
    Idle,
    Drawing(InProgressStroke),
    AreaErasing(Vec<PagePoint>),
    StrokeErasing,
}

pub struct AnnotationSurface {
    page: PageNumber,
    page_width: f32,
    page_height: f32,
    view: ViewTransform,
    config: SurfaceConfig,
    settings: ToolSettings,
    phase: GesturePhase,
    drawn: Option<PageLayer>,
    layers: CommittedLayers,
    canvas: Pixmap,
}

/// Rasters of the committed annotations, kept apart so a highlighter in
/// progress can join the highlighter layer before it is blended.
struct CommittedLayers {
    /// Image annotations
    underlay: Pixmap,
    /// Unblended highlighter strokes
    highlights: Option<Pixmap>,
    /// Pen and whiteout strokes
    ink: Pixmap,
    /// All of the above, flattened
    flattened: Pixmap,
}

impl CommittedLayers {
    fn blank(raster: Pixmap) -> Self {
        Self {
            underlay: raster.clone(),
            highlights: None,
            ink: raster.clone(),
            flattened: raster,
        }
    }
}

impl AnnotationSurface {
    /// Create a surface for a page of the given page-space size
    pub fn new(
        page: PageNumber,
        page_width: f32,
        page_height: f32,
        view: ViewTransform,
        config: SurfaceConfig,
    ) -> Result<Self, SurfaceError> {
        let raster = allocate(page, view, page_width, page_height)?;
        let canvas = raster.clone();
        Ok(Self {
            page,
            page_width,
            page_height,
            view,
            config,
            settings: ToolSettings::default(),
            phase: GesturePhase::Idle,
            drawn: None,
            layers: CommittedLayers::blank(raster),
            canvas,
        })
    }

    pub fn page(&self) -> PageNumber {
        self.page
    }

    pub fn view(&self) -> ViewTransform {
        self.view
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    pub fn tool_settings(&self) -> &ToolSettings {
        &self.settings
    }

    pub fn set_tool_settings(&mut self, settings: ToolSettings) {
        self.settings = settings;
    }

    /// The raster the host displays over the rendered page
    pub fn canvas(&self) -> &Pixmap {
        &self.canvas
    }

    pub fn is_idle(&self) -> bool {
        self.phase == GesturePhase::Idle
    }

    /// Points of the stroke currently being drawn, if any
    pub fn in_progress_points(&self) -> Option<&[Point]> {
        match &self.phase {
            GesturePhase::Drawing(stroke) => Some(&stroke.points),
            _ => None,
        }
    }

    /// Change zoom or pixel ratio; the raster is reallocated and redrawn.
    pub fn set_view(
        &mut self,
        view: ViewTransform,
        images: &mut ImageCache,
    ) -> Result<(), SurfaceError> {
        let raster = allocate(self.page, view, self.page_width, self.page_height)?;
        self.layers = CommittedLayers::blank(raster);
        self.view = view;
        if let Some(layer) = self.drawn.take() {
            self.redraw(layer, images);
        } else {
            self.present();
        }
        Ok(())
    }

    /// Redraw if `layer` holds different data from the last one drawn.
    ///
    /// Returns whether a redraw happened.
    pub fn sync(&mut self, layer: &PageLayer, images: &mut ImageCache) -> bool {
        if self.drawn.as_ref().is_some_and(|drawn| drawn.same_data(layer)) {
            return false;
        }
        self.redraw(layer.clone(), images);
        true
    }

    pub fn handle(&mut self, layer: &PageLayer, event: PointerEvent) -> Option<AnnotationAction> {
        match event {
            PointerEvent::Down(input) => self.pointer_down(layer, input),
            PointerEvent::Move(input) => self.pointer_move(layer, input),
            PointerEvent::Up => self.pointer_up(layer),
            PointerEvent::Leave => self.pointer_leave(layer),
        }
    }

    /// Start a gesture. A new pointer-down abandons any unfinished gesture.
    pub fn pointer_down(
        &mut self,
        layer: &PageLayer,
        input: PointerInput,
    ) -> Option<AnnotationAction> {
        let position = self.view.css_to_page(input.x, input.y);
        let size = self.settings.effective_size();

        match self.settings.gesture() {
            GestureKind::None => {
                self.phase = GesturePhase::Idle;
                None
            }
            GestureKind::Draw(tool) => {
                let color = match tool {
                    StrokeTool::Whiteout => Rgb::WHITE,
                    StrokeTool::Pen | StrokeTool::Highlighter => self.settings.color,
                };
                self.phase = GesturePhase::Drawing(InProgressStroke {
                    tool,
                    color,
                    size,
                    points: vec![self.config.sample(position, input.pressure)],
                });
                self.present();
                None
            }
            GestureKind::EraseStroke => {
                self.phase = GesturePhase::StrokeErasing;
                self.erase_stroke_at(layer, position)
            }
            GestureKind::EraseArea => {
                self.phase = GesturePhase::AreaErasing(vec![position]);
                render::erase_area(&mut self.canvas, position, size, self.view.to_pixels());
                None
            }
        }
    }

    pub fn pointer_move(
        &mut self,
        layer: &PageLayer,
        input: PointerInput,
    ) -> Option<AnnotationAction> {
        let position = self.view.css_to_page(input.x, input.y);

        match &mut self.phase {
            GesturePhase::Idle => None,
            GesturePhase::Drawing(stroke) => {
                let far_enough = stroke.points.last().map_or(true, |last| {
                    last.position().distance_to(&position) >= self.config.min_sample_distance
                });
                if far_enough {
                    stroke.points.push(self.config.sample(position, input.pressure));
                    self.present();
                }
                None
            }
            GesturePhase::AreaErasing(path) => {
                path.push(position);
                let radius = self.settings.effective_size();
                render::erase_area(&mut self.canvas, position, radius, self.view.to_pixels());
                None
            }
            GesturePhase::StrokeErasing => self.erase_stroke_at(layer, position),
        }
    }

    /// Finish the gesture and return to idle
    pub fn pointer_up(&mut self, layer: &PageLayer) -> Option<AnnotationAction> {
        match std::mem::replace(&mut self.phase, GesturePhase::Idle) {
            GesturePhase::Idle | GesturePhase::StrokeErasing => None,
            GesturePhase::Drawing(stroke) => {
                let committed =
                    Stroke::new(stroke.tool, stroke.points, stroke.color, stroke.size, self.page);
                self.present();
                let stroke = committed?;
                let points = stroke.points().len();
                tracing::debug!(page = self.page, points, "stroke finished");
                Some(AnnotationAction::AddStroke { page: self.page, stroke })
            }
            GesturePhase::AreaErasing(path) => {
                let eraser_size = self.settings.effective_size();
                match erase_along_path(&layer.strokes, &path, eraser_size) {
                    Some(strokes) => {
                        tracing::debug!(
                            page = self.page,
                            before = layer.strokes.len(),
                            after = strokes.len(),
                            "area erase"
                        );
                        Some(AnnotationAction::ReplacePageStrokes { page: self.page, strokes })
                    }
                    None => {
                        // Nothing was erased; undo the visual feedback.
                        self.present();
                        None
                    }
                }
            }
        }
    }

    pub fn pointer_leave(&mut self, layer: &PageLayer) -> Option<AnnotationAction> {
        self.pointer_up(layer)
    }

    fn erase_stroke_at(
        &mut self,
        layer: &PageLayer,
        position: PagePoint,
    ) -> Option<AnnotationAction> {
        let hit = hit_test_strokes(&layer.strokes, &position, self.config.hit_tolerance)?;
        let id = hit.id();
        tracing::debug!(page = self.page, stroke = %id, "stroke erase");

        let strokes = layer.strokes.iter().filter(|stroke| stroke.id() != id).cloned().collect();
        Some(AnnotationAction::ReplacePageStrokes { page: self.page, strokes })
    }

    /// Full redraw of committed content: images, then the composited
    /// highlighter layer, then every other stroke in draw order.
    fn redraw(&mut self, layer: PageLayer, images: &mut ImageCache) {
        let transform = self.view.to_pixels();
        let scale = self.view.pixel_scale();
        let layers = &mut self.layers;
        for raster in [&mut layers.underlay, &mut layers.ink] {
            render::clear(raster);
        }

        for image in layer.images.iter() {
            if let Some(pixmap) = images.get(image) {
                render::draw_image(
                    &mut layers.underlay,
                    pixmap,
                    (image.x, image.y, image.width, image.height),
                    scale,
                );
            }
        }

        layers.highlights = render::highlighter_layer(
            layers.underlay.width(),
            layers.underlay.height(),
            layer.strokes.iter().filter(|stroke| stroke.is_highlighter()),
            transform,
        );

        for stroke in layer.strokes.iter() {
            match stroke.tool() {
                StrokeTool::Highlighter => {}
                StrokeTool::Pen => render::draw_smooth_stroke(
                    &mut layers.ink,
                    stroke.points(),
                    stroke.size(),
                    stroke.color(),
                    BlendMode::SourceOver,
                    transform,
                ),
                StrokeTool::Whiteout => render::white_out_path(
                    &mut layers.ink,
                    stroke.points(),
                    stroke.size(),
                    transform,
                ),
            }
        }

        let opacity = self.config.highlighter_opacity;
        layers.flattened =
            flatten(&layers.underlay, layers.highlights.as_ref(), &layers.ink, opacity);
        self.drawn = Some(layer);
        self.present();
    }

    /// Rebuild the visible canvas from committed content plus the stroke in
    /// progress.
    fn present(&mut self) {
        let GesturePhase::Drawing(stroke) = &self.phase else {
            self.canvas = self.layers.flattened.clone();
            return;
        };

        let transform = self.view.to_pixels();
        match stroke.tool {
            StrokeTool::Whiteout => {
                self.canvas = self.layers.flattened.clone();
                render::white_out_path(&mut self.canvas, &stroke.points, stroke.size, transform)
            }
            StrokeTool::Pen => {
                self.canvas = self.layers.flattened.clone();
                render::draw_quick_stroke(
                    &mut self.canvas,
                    &stroke.points,
                    stroke.size,
                    stroke.color,
                    BlendMode::SourceOver,
                    transform,
                )
            }
            StrokeTool::Highlighter => {
                let layers = &self.layers;
                let (width, height) = (layers.underlay.width(), layers.underlay.height());
                let Some(mut highlights) =
                    layers.highlights.clone().or_else(|| Pixmap::new(width, height))
                else {
                    self.canvas = layers.flattened.clone();
                    return;
                };
                render::draw_quick_stroke(
                    &mut highlights,
                    &stroke.points,
                    stroke.size,
                    stroke.color,
                    BlendMode::Darken,
                    transform,
                );
                self.canvas = flatten(
                    &layers.underlay,
                    Some(&highlights),
                    &layers.ink,
                    self.config.highlighter_opacity,
                );
            }
        }
    }
}

/// Images, then highlights blended once, then ink on top
fn flatten(underlay: &Pixmap, highlights: Option<&Pixmap>, ink: &Pixmap, opacity: f32) -> Pixmap {
    let mut flattened = underlay.clone();
    if let Some(highlights) = highlights {
        render::composite_layer(&mut flattened, highlights, opacity);
    }
    render::draw_layer(&mut flattened, ink);
    flattened
}

fn allocate(
    page: PageNumber,
    view: ViewTransform,
    page_width: f32,
    page_height: f32,
) -> Result<Pixmap, SurfaceError> {
    let (width, height) = view.raster_size(page_width, page_height);
    Pixmap::new(width, height).ok_or(SurfaceError::RasterSize { page, width, height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use annotation_model::{DocumentAnnotationState, EraserMode, Tool};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn surface() -> AnnotationSurface {
        AnnotationSurface::new(1, 200.0, 100.0, ViewTransform::default(), SurfaceConfig::default())
            .unwrap()
    }

    fn eraser(mode: EraserMode, size: f32) -> ToolSettings {
        ToolSettings { tool: Tool::Eraser, eraser_mode: mode, size, ..ToolSettings::default() }
    }

    fn pen(coords: &[(f32, f32)], size: f32) -> Stroke {
        let points = coords.iter().map(|&(x, y)| Point::new(x, y, 0.5)).collect();
        Stroke::new(StrokeTool::Pen, points, Rgb::BLACK, size, 1).unwrap()
    }

    fn layer_with(strokes: Vec<Stroke>) -> PageLayer {
        PageLayer { page: 1, strokes: Arc::new(strokes), images: Arc::default() }
    }

    fn alpha(surface: &AnnotationSurface, x: u32, y: u32) -> u8 {
        surface.canvas().pixel(x, y).unwrap().alpha()
    }

    #[test]
    fn drawing_gesture_commits_a_stroke() {
        let mut surface = surface();
        let layer = PageLayer::default();

        let first = PointerInput::with_pressure(10.0, 10.0, 0.8);
        assert!(surface.pointer_down(&layer, first).is_none());
        surface.pointer_move(&layer, PointerInput::new(20.0, 10.0));
        surface.pointer_move(&layer, PointerInput::new(30.0, 15.0));

        let Some(AnnotationAction::AddStroke { page, stroke }) = surface.pointer_up(&layer) else {
            panic!("expected a committed stroke");
        };
        assert_eq!(page, 1);
        assert_eq!(stroke.points().len(), 3);
        assert_eq!(stroke.points()[0].pressure, 0.8);
        assert_eq!(stroke.points()[1].pressure, 0.5);
        assert_eq!(stroke.tool(), StrokeTool::Pen);
        assert!(surface.is_idle());
    }

    #[test]
    fn samples_closer_than_one_unit_are_dropped() {
        let mut surface = surface();
        let layer = PageLayer::default();

        surface.pointer_down(&layer, PointerInput::new(10.0, 10.0));
        surface.pointer_move(&layer, PointerInput::new(10.5, 10.0));
        surface.pointer_move(&layer, PointerInput::new(10.6, 10.6));
        surface.pointer_move(&layer, PointerInput::new(11.0, 10.0));

        assert_eq!(surface.in_progress_points().map(<[Point]>::len), Some(2));
    }

    #[test]
    fn single_tap_is_discarded() {
        let mut surface = surface();
        let layer = PageLayer::default();

        surface.pointer_down(&layer, PointerInput::new(10.0, 10.0));
        assert!(surface.pointer_up(&layer).is_none());
        assert!(surface.is_idle());
    }

    #[test]
    fn pointer_positions_are_stored_in_page_space() {
        let view = ViewTransform::new(2.0, 2.0);
        let mut surface =
            AnnotationSurface::new(1, 200.0, 100.0, view, SurfaceConfig::default()).unwrap();
        let layer = PageLayer::default();

        surface.pointer_down(&layer, PointerInput::new(100.0, 40.0));
        surface.pointer_move(&layer, PointerInput::new(200.0, 40.0));
        let Some(AnnotationAction::AddStroke { stroke, .. }) = surface.pointer_up(&layer) else {
            panic!("expected a committed stroke");
        };

        assert_eq!(stroke.points()[0].position(), PagePoint::new(50.0, 20.0));
        assert_eq!(stroke.points()[1].position(), PagePoint::new(100.0, 20.0));
        assert_eq!(surface.canvas().width(), 800);
    }

    #[test]
    fn leave_finishes_the_gesture() {
        let mut surface = surface();
        let layer = PageLayer::default();

        surface.handle(&layer, PointerEvent::Down(PointerInput::new(10.0, 10.0)));
        surface.handle(&layer, PointerEvent::Move(PointerInput::new(40.0, 10.0)));
        let action = surface.handle(&layer, PointerEvent::Leave);

        assert!(matches!(action, Some(AnnotationAction::AddStroke { .. })));
        assert!(surface.is_idle());
    }

    #[test]
    fn whiteout_mode_draws_white_strokes() {
        let mut surface = surface();
        surface.set_tool_settings(eraser(EraserMode::Whiteout, 6.0));
        let layer = PageLayer::default();

        surface.pointer_down(&layer, PointerInput::new(10.0, 10.0));
        surface.pointer_move(&layer, PointerInput::new(40.0, 10.0));
        let Some(AnnotationAction::AddStroke { stroke, .. }) = surface.pointer_up(&layer) else {
            panic!("expected a whiteout stroke");
        };

        assert_eq!(stroke.tool(), StrokeTool::Whiteout);
        assert_eq!(stroke.color(), Rgb::WHITE);
        assert_eq!(stroke.size(), 6.0);
    }

    #[test]
    fn select_tool_ignores_pointer() {
        let mut surface = surface();
        surface.set_tool_settings(ToolSettings { tool: Tool::Select, ..ToolSettings::default() });
        let layer = PageLayer::default();

        assert!(surface.pointer_down(&layer, PointerInput::new(10.0, 10.0)).is_none());
        assert!(surface.pointer_move(&layer, PointerInput::new(50.0, 10.0)).is_none());
        assert!(surface.pointer_up(&layer).is_none());
    }

    #[test]
    fn stroke_erase_boundary_is_kept() {
        let target = pen(&[(100.0, 0.0), (100.0, 90.0)], 4.0);
        let layer = layer_with(vec![target]);
        let mut surface = surface();
        surface.set_tool_settings(eraser(EraserMode::Stroke, 20.0));

        // 10 + 4 / 2 = 12 from the sample at (100, 0)
        assert!(surface.pointer_down(&layer, PointerInput::new(112.0, 0.0)).is_none());
        let action = surface.pointer_move(&layer, PointerInput::new(111.5, 0.0));

        let Some(AnnotationAction::ReplacePageStrokes { page, strokes }) = action else {
            panic!("expected the stroke to be erased");
        };
        assert_eq!(page, 1);
        assert!(strokes.is_empty());
    }

    #[test]
    fn stroke_erase_removes_only_first_hit() {
        let first = pen(&[(10.0, 10.0), (50.0, 10.0)], 2.0);
        let second = pen(&[(10.0, 12.0), (50.0, 12.0)], 2.0);
        let layer = layer_with(vec![first, second.clone()]);
        let mut surface = surface();
        surface.set_tool_settings(eraser(EraserMode::Stroke, 20.0));

        let Some(AnnotationAction::ReplacePageStrokes { strokes, .. }) =
            surface.pointer_down(&layer, PointerInput::new(10.0, 11.0))
        else {
            panic!("expected an erase");
        };
        assert_eq!(strokes, vec![second]);
        assert!(surface.pointer_up(&layer).is_none());
    }

    #[test]
    fn area_erase_splits_on_pointer_up() {
        let target =
            pen(&[(10.0, 50.0), (30.0, 50.0), (50.0, 50.0), (70.0, 50.0), (90.0, 50.0)], 2.0);
        let layer = layer_with(vec![target.clone()]);
        let mut surface = surface();
        surface.set_tool_settings(eraser(EraserMode::Area, 5.0));

        assert!(surface.pointer_down(&layer, PointerInput::new(50.0, 20.0)).is_none());
        assert!(surface.pointer_move(&layer, PointerInput::new(50.0, 80.0)).is_none());

        let Some(AnnotationAction::ReplacePageStrokes { strokes, .. }) = surface.pointer_up(&layer)
        else {
            panic!("expected an area erase");
        };
        assert_eq!(strokes.len(), 2);
        assert!(strokes.iter().all(|s| s.id() != target.id() && s.points().len() == 2));
    }

    #[test]
    fn area_erase_missing_everything_emits_nothing() {
        let layer = layer_with(vec![pen(&[(10.0, 10.0), (20.0, 10.0)], 2.0)]);
        let mut surface = surface();
        surface.set_tool_settings(eraser(EraserMode::Area, 5.0));

        surface.pointer_down(&layer, PointerInput::new(150.0, 80.0));
        assert!(surface.pointer_up(&layer).is_none());
    }

    #[test]
    fn area_erase_feedback_clears_pixels_until_release() {
        let layer = layer_with(vec![pen(&[(10.0, 50.0), (190.0, 50.0)], 4.0)]);
        let mut images = ImageCache::new();
        let mut surface = surface();
        surface.sync(&layer, &mut images);
        assert_eq!(alpha(&surface, 100, 50), 255);

        surface.set_tool_settings(eraser(EraserMode::Area, 5.0));
        surface.pointer_down(&PageLayer::default(), PointerInput::new(100.0, 50.0));
        assert_eq!(alpha(&surface, 100, 50), 0);

        // Nothing in the (empty) data layer was erased, so the raster is restored.
        surface.pointer_up(&PageLayer::default());
        assert_eq!(alpha(&surface, 100, 50), 255);
    }

    #[test]
    fn sync_redraws_only_on_data_change() {
        let mut images = ImageCache::new();
        let mut surface = surface();
        let state = DocumentAnnotationState::from_pages(
            [(1, vec![pen(&[(10.0, 50.0), (190.0, 50.0)], 4.0)])].into_iter().collect(),
            Default::default(),
        );

        assert!(surface.sync(&state.page_layer(1), &mut images));
        assert!(!surface.sync(&state.page_layer(1), &mut images));
        assert_eq!(alpha(&surface, 100, 50), 255);

        assert!(surface.sync(&PageLayer { page: 1, ..PageLayer::default() }, &mut images));
        assert_eq!(alpha(&surface, 100, 50), 0);
    }

    #[test]
    fn in_progress_stroke_is_visible_before_commit() {
        let mut surface = surface();
        let layer = PageLayer::default();

        surface.pointer_down(&layer, PointerInput::new(20.0, 30.0));
        surface.pointer_move(&layer, PointerInput::new(60.0, 30.0));
        surface.pointer_move(&layer, PointerInput::new(100.0, 30.0));

        assert_eq!(alpha(&surface, 50, 30), 255);
        surface.pointer_up(&layer);
        assert_eq!(alpha(&surface, 50, 30), 0);
    }

    #[test]
    fn committed_highlighters_do_not_stack() {
        let layer = layer_with(vec![highlight(10.0, 90.0), highlight(50.0, 150.0)]);
        let mut surface = surface();
        surface.sync(&layer, &mut ImageCache::new());

        let single = surface.canvas().pixel(30, 50).unwrap();
        let overlap = surface.canvas().pixel(70, 50).unwrap();
        assert!(single.alpha() > 0);
        assert_eq!(single, overlap);
    }

    fn highlight(from: f32, to: f32) -> Stroke {
        let points = vec![Point::new(from, 50.0, 0.5), Point::new(to, 50.0, 0.5)];
        Stroke::new(StrokeTool::Highlighter, points, Rgb::YELLOW, 10.0, 1).unwrap()
    }

    #[test]
    fn live_highlighter_does_not_stack_on_committed_ones() {
        let layer = layer_with(vec![highlight(10.0, 90.0)]);
        let mut surface = surface();
        surface.sync(&layer, &mut ImageCache::new());
        let single = surface.canvas().pixel(30, 50).unwrap();
        surface.set_tool_settings(ToolSettings {
            tool: Tool::Highlighter,
            color: Rgb::YELLOW,
            size: 10.0,
            ..ToolSettings::default()
        });

        surface.pointer_down(&layer, PointerInput::new(50.0, 50.0));
        surface.pointer_move(&layer, PointerInput::new(100.0, 50.0));
        surface.pointer_move(&layer, PointerInput::new(150.0, 50.0));

        assert_eq!(surface.canvas().pixel(70, 50).unwrap(), single);
        assert_eq!(surface.canvas().pixel(120, 50).unwrap(), single);
    }

    #[test]
    fn live_highlighter_stays_under_ink() {
        let points = vec![Point::new(100.0, 10.0, 0.5), Point::new(100.0, 90.0, 0.5)];
        let red = Stroke::new(StrokeTool::Pen, points, Rgb::RED, 6.0, 1).unwrap();
        let layer = layer_with(vec![red]);
        let mut surface = surface();
        surface.sync(&layer, &mut ImageCache::new());
        surface.set_tool_settings(ToolSettings {
            tool: Tool::Highlighter,
            color: Rgb::new(0, 0, 255),
            size: 10.0,
            ..ToolSettings::default()
        });

        surface.pointer_down(&layer, PointerInput::new(20.0, 50.0));
        surface.pointer_move(&layer, PointerInput::new(180.0, 50.0));

        let pixel = surface.canvas().pixel(100, 50).unwrap();
        assert_eq!((pixel.red(), pixel.green(), pixel.blue(), pixel.alpha()), (255, 0, 0, 255));
    }

    proptest! {
        #[test]
        fn gestures_store_page_space_points_at_any_zoom(
            zoom in 0.5f32..4.0,
            css in prop::collection::vec((0.0f32..400.0, 0.0f32..200.0), 2..12),
        ) {
            let view = ViewTransform::new(zoom, 1.0);
            let mut surface =
                AnnotationSurface::new(1, 200.0, 100.0, view, SurfaceConfig::default()).unwrap();
            let layer = PageLayer::default();

            surface.pointer_down(&layer, PointerInput::new(css[0].0, css[0].1));
            for &(x, y) in &css[1..] {
                surface.pointer_move(&layer, PointerInput::new(x, y));
            }
            let expected: Vec<PagePoint> =
                css.iter().map(|&(x, y)| PagePoint::new(x / zoom, y / zoom)).collect();

            if let Some(AnnotationAction::AddStroke { stroke, .. }) = surface.pointer_up(&layer) {
                let first = stroke.points()[0].position();
                prop_assert!(first.distance_to(&expected[0]) < 1e-3);
                for point in stroke.points() {
                    let position = point.position();
                    prop_assert!(expected.iter().any(|p| p.distance_to(&position) < 1e-3));
                }
            }
        }
    }
}
