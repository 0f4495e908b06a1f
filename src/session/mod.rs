pub mod controller;
pub mod queue;

pub use controller::{SessionConfig, SessionController, SessionStats};
pub use queue::{Action, ActionQueue, ActionSender};
