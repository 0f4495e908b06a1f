use serde::Serialize;

use crate::models::NoteId;

/// Change notifications for the renderer and the status display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NoteEvent {
    Created { note_id: NoteId },
    /// Transform or content changed.
    Updated { note_id: NoteId },
    Selected { note_id: NoteId },
    Deselected { note_id: NoteId },
    StatusChanged { note_id: NoteId, status_text: String },
    Removed {
        note_id: NoteId,
        anchor_id: Option<String>,
    },
}

impl NoteEvent {
    pub fn note_id(&self) -> NoteId {
        match self {
            NoteEvent::Created { note_id }
            | NoteEvent::Updated { note_id }
            | NoteEvent::Selected { note_id }
            | NoteEvent::Deselected { note_id }
            | NoteEvent::StatusChanged { note_id, .. }
            | NoteEvent::Removed { note_id, .. } => *note_id,
        }
    }
}
