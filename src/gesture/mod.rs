pub mod classifier;
pub mod config;
pub mod input;

pub use classifier::{GestureClassifier, GestureEvent, GestureState};
pub use config::GestureConfig;
pub use input::{FrameInput, MouseButton, MouseSample, TouchPhase, TouchSample};
