use serde::Serialize;

use crate::{db::AnchorRecord, geometry::Pose, models::NoteId};

/// Completion of an anchor operation, applied to the registry on the interactive thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// The anchor is live in the cloud. `persisted` is false when the local index write
    /// failed, in which case the next session will not restore it.
    Hosted {
        note_id: NoteId,
        anchor_id: String,
        persisted: bool,
    },
    HostFailed {
        note_id: NoteId,
        reason: String,
    },
    Resolved {
        record: AnchorRecord,
        pose: Pose,
    },
    ResolveFailed {
        anchor_id: String,
        reason: String,
    },
    /// An edited note's record was rewritten (or not).
    ContentSaved {
        anchor_id: String,
        persisted: bool,
    },
}
