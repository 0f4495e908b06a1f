use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::geometry::ScreenPoint;

/// Finger id reported for the emulated mouse touch.
pub const MOUSE_FINGER_ID: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TouchPhase {
    Began,
    Moved,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TouchSample {
    pub id: u64,
    pub position: ScreenPoint,
    pub phase: TouchPhase,
}

impl TouchSample {
    pub fn new(id: u64, position: ScreenPoint, phase: TouchPhase) -> Self {
        Self {
            id,
            position,
            phase,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MouseButton {
    /// Went down this frame.
    Pressed,
    Held,
    /// Went up this frame.
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MouseSample {
    pub position: ScreenPoint,
    pub button: MouseButton,
}

impl MouseSample {
    pub fn as_touch(&self) -> TouchSample {
        let phase = match self.button {
            MouseButton::Pressed => TouchPhase::Began,
            MouseButton::Held => TouchPhase::Moved,
            MouseButton::Released => TouchPhase::Ended,
        };
        TouchSample::new(MOUSE_FINGER_ID, self.position, phase)
    }
}

/// Everything the input layer reports for one display frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInput {
    pub touches: Vec<TouchSample>,
    /// Only present while the left button is down or on the frame it is released.
    pub mouse: Option<MouseSample>,
    /// The pointer is over a host UI widget; the frame is not classified.
    pub pointer_over_ui: bool,
}

impl FrameInput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn touches(touches: Vec<TouchSample>) -> Self {
        Self {
            touches,
            ..Self::default()
        }
    }

    pub fn single(id: u64, position: ScreenPoint, phase: TouchPhase) -> Self {
        Self::touches(vec![TouchSample::new(id, position, phase)])
    }

    pub fn mouse(position: ScreenPoint, button: MouseButton) -> Self {
        Self {
            mouse: Some(MouseSample { position, button }),
            ..Self::default()
        }
    }

    pub fn over_ui(mut self) -> Self {
        self.pointer_over_ui = true;
        self
    }

    pub fn has_duplicate_ids(&self) -> bool {
        let mut seen = HashSet::with_capacity(self.touches.len());
        self.touches.iter().any(|touch| !seen.insert(touch.id))
    }
}
