use serde::{Deserialize, Serialize};

/// Tunables for gesture classification and the manipulations it drives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GestureConfig {
    /// Squared pixel displacement a press must exceed to become a drag.
    pub drag_threshold_sq: f32,

    /// Uniform scale bounds applied by the note registry.
    pub min_scale: f32,
    pub max_scale: f32,

    /// Finger separations below this are treated as this, in pixels.
    pub min_pinch_distance: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            drag_threshold_sq: 400.0,
            min_scale: 0.1,
            max_scale: 3.0,
            min_pinch_distance: 1.0,
        }
    }
}

impl GestureConfig {
    pub fn clamp_scale(&self, scale: f32) -> f32 {
        if !scale.is_finite() {
            return self.min_scale;
        }
        scale.clamp(self.min_scale, self.max_scale)
    }
}
