use crate::types::{Rgb, StrokeTool};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Select,
    Pen,
    Highlighter,
    Eraser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EraserMode {
    Area,
    Stroke,
    Whiteout,
}

/// What a pointer-down starts for a given tool configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureKind {
    /// Selection is handled by the host; the surface ignores the pointer
    None,
    Draw(StrokeTool),
    EraseStroke,
    EraseArea,
}

/// Active tool and style, set by the host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    pub tool: Tool,
    pub eraser_mode: EraserMode,
    pub color: Rgb,
    pub size: f32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self { tool: Tool::Pen, eraser_mode: EraserMode::Area, color: Rgb::BLACK, size: 2.0 }
    }
}

impl ToolSettings {
    pub fn gesture(&self) -> GestureKind {
        match (self.tool, self.eraser_mode) {
            (Tool::Select, _) => GestureKind::None,
            (Tool::Pen, _) => GestureKind::Draw(StrokeTool::Pen),
            (Tool::Highlighter, _) => GestureKind::Draw(StrokeTool::Highlighter),
            (Tool::Eraser, EraserMode::Area) => GestureKind::EraseArea,
            (Tool::Eraser, EraserMode::Stroke) => GestureKind::EraseStroke,
            (Tool::Eraser, EraserMode::Whiteout) => GestureKind::Draw(StrokeTool::Whiteout),
        }
    }

    /// Size clamped to something drawable
    pub fn effective_size(&self) -> f32 {
        if self.size.is_finite() && self.size > 0.0 {
            self.size
        } else {
            ToolSettings::default().size
        }
    }
}
