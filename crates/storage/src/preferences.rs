//! Per-tool style memory
//!
//! Each drawing tool keeps its own colour and size, so switching from a
//! thin black pen to a wide yellow highlighter and back restores both.

use annotation_model::{EraserMode, Rgb, Tool, ToolSettings};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToolStyle {
    pub color: Rgb,
    pub size: f32,
}

impl ToolStyle {
    /// Style a tool starts with before the user changes it
    pub fn initial(tool: Tool) -> Self {
        match tool {
            Tool::Highlighter => Self { color: Rgb::YELLOW, size: 12.0 },
            Tool::Eraser => Self { color: Rgb::BLACK, size: 10.0 },
            Tool::Select | Tool::Pen => {
                let defaults = ToolSettings::default();
                Self { color: defaults.color, size: defaults.size }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPreferences {
    pub active: Tool,
    pub eraser_mode: EraserMode,
    styles: BTreeMap<Tool, ToolStyle>,
}

impl Default for ToolPreferences {
    fn default() -> Self {
        let defaults = ToolSettings::default();
        Self { active: defaults.tool, eraser_mode: defaults.eraser_mode, styles: BTreeMap::new() }
    }
}

impl ToolPreferences {
    pub fn style(&self, tool: Tool) -> ToolStyle {
        self.styles.get(&tool).copied().unwrap_or_else(|| ToolStyle::initial(tool))
    }

    /// Settings for the active tool
    pub fn settings(&self) -> ToolSettings {
        self.settings_for(self.active)
    }

    pub fn settings_for(&self, tool: Tool) -> ToolSettings {
        let style = self.style(tool);
        ToolSettings { tool, eraser_mode: self.eraser_mode, color: style.color, size: style.size }
    }

    /// Make `tool` active and return its remembered settings
    pub fn switch_to(&mut self, tool: Tool) -> ToolSettings {
        self.active = tool;
        self.settings()
    }

    /// Record what the host last applied to the surface.
    ///
    /// The style is stored under the settings' tool; selection has no style
    /// of its own.
    pub fn remember(&mut self, settings: &ToolSettings) {
        self.active = settings.tool;
        self.eraser_mode = settings.eraser_mode;
        if settings.tool != Tool::Select {
            let style = ToolStyle { color: settings.color, size: settings.effective_size() };
            self.styles.insert(settings.tool, style);
        }
    }
}
