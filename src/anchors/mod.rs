pub mod events;
pub mod manager;
pub mod memory;
pub mod service;

pub use events::SyncEvent;
pub use manager::AnchorSyncManager;
pub use memory::InMemoryAnchorService;
pub use service::{AnchorFuture, AnchorService};
