use std::fmt;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::{Pose, Quat, Vec3};

use super::content::NoteContent;

/// Local handle of a note, assigned at creation and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(Uuid);

impl NoteId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    Local,
    Hosting,
    Hosted,
    Failed,
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::Local
    }
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Local => "Local",
            SyncState::Hosting => "Hosting",
            SyncState::Hosted => "Hosted",
            SyncState::Failed => "Failed",
        }
    }

    /// Status line shown under a note for this state.
    pub fn status_text(&self) -> &'static str {
        match self {
            SyncState::Local => "",
            SyncState::Hosting => "Saving...",
            SyncState::Hosted => "Saved",
            SyncState::Failed => "Save failed",
        }
    }
}

/// Shown when the anchor is hosted but the local index could not record it.
pub const STATUS_NOT_SAVED: &str = "Not saved";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
}

impl Transform {
    pub fn from_pose(pose: Pose, scale: f32) -> Self {
        Self {
            position: pose.position,
            rotation: pose.rotation,
            scale,
        }
    }

    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub note_id: NoteId,
    /// Cloud anchor id. Present iff `sync_state` is `Hosted`.
    pub anchor_id: Option<String>,
    pub transform: Transform,
    pub content: NoteContent,
    pub sync_state: SyncState,
    pub status_text: String,
}

impl Note {
    pub fn is_hosted(&self) -> bool {
        self.sync_state == SyncState::Hosted && self.anchor_id.is_some()
    }

    /// Payload to store for this note. Carries the current scale once a pinch has moved it
    /// away from the size the content asked for.
    pub fn payload(&self) -> Result<String> {
        let requested = self.content.size.unwrap_or(1.0);
        if (self.transform.scale - requested).abs() <= f32::EPSILON {
            return self.content.to_payload();
        }
        NoteContent {
            size: Some(self.transform.scale),
            ..self.content.clone()
        }
        .to_payload()
    }
}
