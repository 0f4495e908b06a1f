pub mod content;
pub mod note;

pub use content::{NoteContent, Rgba};
pub use note::{Note, NoteId, SyncState, Transform, STATUS_NOT_SAVED};
