pub mod anchors;
pub mod db;
pub mod geometry;
pub mod gesture;
pub mod models;
pub mod notes;
pub mod scan;
pub mod scene;
pub mod session;
pub mod settings;
mod utils;

pub use anchors::{AnchorService, AnchorSyncManager, InMemoryAnchorService, SyncEvent};
pub use db::{AnchorRecord, Database};
pub use geometry::{Pose, Quat, ScreenPoint, Vec3};
pub use gesture::{
    FrameInput, GestureClassifier, GestureConfig, GestureEvent, GestureState, MouseButton,
    TouchPhase, TouchSample,
};
pub use models::{Note, NoteContent, NoteId, Rgba, SyncState};
pub use notes::{NoteEvent, NoteRegistry};
pub use scan::{
    CameraFrame, LumaQrDecoder, QrDecoder, QrHit, QrMatrix, ScanController, ScanMode,
};
pub use scene::{FlatScene, SceneProbe};
pub use session::{SessionConfig, SessionController, SessionStats};
pub use settings::{SettingsStore, UserSettings};

/// True when `ARMEMO_DEBUG` is `1` or `true`.
pub fn debug_mode() -> bool {
    std::env::var("ARMEMO_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Initializes `env_logger` (reads `RUST_LOG`). Debug mode lowers the default level.
pub fn init_logging() {
    let level = if debug_mode() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Tests may initialize more than once.
    let _ = env_logger::Builder::from_default_env()
        .filter_level(level)
        .try_init();
}
