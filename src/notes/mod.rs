pub mod events;
pub mod registry;

pub use events::NoteEvent;
pub use registry::NoteRegistry;
