use crate::{
    geometry::{Pose, Quat, Vec3},
    gesture::GestureConfig,
    models::{Note, NoteContent, NoteId, SyncState, Transform},
};

use super::events::NoteEvent;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Scale and rotation of the selected note when the current pinch started.
#[derive(Debug, Clone, Copy)]
struct PinchBaseline {
    note_id: NoteId,
    scale: f32,
    rotation: Quat,
}

/// Owns every live note and the single selection.
///
/// Only the interactive thread touches the registry; asynchronous results reach it through
/// the session's action queue. Every mutation is mirrored as a [`NoteEvent`] in an outbox the
/// renderer drains with [`NoteRegistry::take_events`].
#[derive(Debug, Default)]
pub struct NoteRegistry {
    config: GestureConfig,
    notes: Vec<Note>,
    selected: Option<NoteId>,
    pinch_baseline: Option<PinchBaseline>,
    events: Vec<NoteEvent>,
}

impl NoteRegistry {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Places a new local note and selects it.
    pub fn create_note(&mut self, pose: Pose, content: NoteContent) -> NoteId {
        let note_id = self.add_note(pose, content);
        self.select(note_id);
        note_id
    }

    /// Places a new local note without touching the selection.
    pub fn add_note(&mut self, pose: Pose, content: NoteContent) -> NoteId {
        self.insert(pose, content, None, SyncState::Local)
    }

    /// Materializes a note resolved from a stored anchor. The note is not selected.
    ///
    /// Returns `None` if a note for `anchor_id` is already live.
    pub fn restore_note(
        &mut self,
        pose: Pose,
        content: NoteContent,
        anchor_id: String,
    ) -> Option<NoteId> {
        if anchor_id.is_empty() || self.find_by_anchor(&anchor_id).is_some() {
            return None;
        }
        Some(self.insert(pose, content, Some(anchor_id), SyncState::Hosted))
    }

    fn insert(
        &mut self,
        pose: Pose,
        content: NoteContent,
        anchor_id: Option<String>,
        sync_state: SyncState,
    ) -> NoteId {
        let scale = self.config.clamp_scale(content.size.unwrap_or(1.0));
        let note = Note {
            note_id: NoteId::new(),
            anchor_id,
            transform: Transform::from_pose(pose, scale),
            content,
            sync_state,
            status_text: sync_state.status_text().to_string(),
        };
        let note_id = note.note_id;
        self.notes.push(note);
        self.events.push(NoteEvent::Created { note_id });
        note_id
    }

    pub fn get(&self, note_id: NoteId) -> Option<&Note> {
        self.notes.iter().find(|note| note.note_id == note_id)
    }

    fn get_mut(&mut self, note_id: NoteId) -> Option<&mut Note> {
        self.notes.iter_mut().find(|note| note.note_id == note_id)
    }

    pub fn contains(&self, note_id: NoteId) -> bool {
        self.get(note_id).is_some()
    }

    pub fn find_by_anchor(&self, anchor_id: &str) -> Option<&Note> {
        self.notes
            .iter()
            .find(|note| note.anchor_id.as_deref() == Some(anchor_id))
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn selected(&self) -> Option<NoteId> {
        self.selected
    }

    pub fn selected_note(&self) -> Option<&Note> {
        self.selected.and_then(|note_id| self.get(note_id))
    }

    pub fn is_selected(&self, note_id: NoteId) -> bool {
        self.selected == Some(note_id)
    }

    /// Selects `note_id`, deselecting any other note. Returns false for unknown ids.
    pub fn select(&mut self, note_id: NoteId) -> bool {
        if !self.contains(note_id) {
            return false;
        }
        if self.selected == Some(note_id) {
            return true;
        }
        self.deselect();
        self.selected = Some(note_id);
        self.events.push(NoteEvent::Selected { note_id });
        true
    }

    pub fn deselect(&mut self) {
        if let Some(note_id) = self.selected.take() {
            self.pinch_baseline = None;
            self.events.push(NoteEvent::Deselected { note_id });
        }
    }

    /// Moves the selected note. `candidate` is the note the drag started on; anything other
    /// than the selection is ignored.
    pub fn apply_drag(&mut self, candidate: NoteId, position: Vec3) -> bool {
        if self.selected != Some(candidate) {
            return false;
        }
        let Some(note) = self.get_mut(candidate) else {
            return false;
        };
        note.transform.position = position;
        self.events.push(NoteEvent::Updated {
            note_id: candidate,
        });
        true
    }

    /// Scales and yaws the selected note relative to the baseline captured when the current
    /// pinch started.
    pub fn apply_pinch_rotate(
        &mut self,
        scale_factor: f32,
        angle_delta: f32,
        rebaseline: bool,
    ) -> bool {
        let Some(note_id) = self.selected else {
            return false;
        };
        let Some(current) = self.get(note_id).map(|note| note.transform) else {
            return false;
        };

        let baseline = match self.pinch_baseline {
            Some(baseline) if !rebaseline && baseline.note_id == note_id => baseline,
            _ => {
                log_debug!(
                    "pinch baseline for {}: scale {:.2}",
                    note_id,
                    current.scale
                );
                let baseline = PinchBaseline {
                    note_id,
                    scale: current.scale,
                    rotation: current.rotation,
                };
                self.pinch_baseline = Some(baseline);
                baseline
            }
        };

        let scale = self.config.clamp_scale(baseline.scale * scale_factor);
        let rotation = Quat::from_yaw_degrees(angle_delta).mul(baseline.rotation);

        if let Some(note) = self.get_mut(note_id) {
            note.transform.scale = scale;
            note.transform.rotation = rotation;
        }
        self.events.push(NoteEvent::Updated { note_id });
        true
    }

    pub fn edit_content(&mut self, note_id: NoteId, text: impl Into<String>) -> bool {
        let Some(note) = self.get_mut(note_id) else {
            return false;
        };
        note.content.text = text.into();
        self.events.push(NoteEvent::Updated { note_id });
        true
    }

    /// Records a sync transition. `Hosted` requires a non-empty anchor id; every other state
    /// clears it.
    pub fn set_sync_state(
        &mut self,
        note_id: NoteId,
        state: SyncState,
        anchor_id: Option<String>,
    ) -> bool {
        let anchor_id = anchor_id.filter(|id| !id.is_empty());
        if state == SyncState::Hosted && anchor_id.is_none() {
            log_warn!("refusing Hosted without an anchor id for note {}", note_id);
            return false;
        }

        let Some(note) = self.get_mut(note_id) else {
            return false;
        };
        note.sync_state = state;
        note.anchor_id = if state == SyncState::Hosted {
            anchor_id
        } else {
            None
        };
        note.status_text = state.status_text().to_string();
        let status_text = note.status_text.clone();
        self.events.push(NoteEvent::StatusChanged {
            note_id,
            status_text,
        });
        true
    }

    pub fn set_status_text(&mut self, note_id: NoteId, text: impl Into<String>) -> bool {
        let Some(note) = self.get_mut(note_id) else {
            return false;
        };
        note.status_text = text.into();
        let status_text = note.status_text.clone();
        self.events.push(NoteEvent::StatusChanged {
            note_id,
            status_text,
        });
        true
    }

    /// Removes a note. The caller forwards the returned note's anchor id (if any) to the
    /// anchor manager so its record is purged.
    pub fn delete(&mut self, note_id: NoteId) -> Option<Note> {
        let index = self.notes.iter().position(|note| note.note_id == note_id)?;
        if self.selected == Some(note_id) {
            self.deselect();
        }
        let note = self.notes.remove(index);
        self.events.push(NoteEvent::Removed {
            note_id,
            anchor_id: note.anchor_id.clone(),
        });
        Some(note)
    }

    /// Drops every note without touching persistence (session teardown).
    pub fn clear(&mut self) {
        self.deselect();
        for note in self.notes.drain(..) {
            self.events.push(NoteEvent::Removed {
                note_id: note.note_id,
                anchor_id: note.anchor_id,
            });
        }
    }

    pub fn take_events(&mut self) -> Vec<NoteEvent> {
        std::mem::take(&mut self.events)
    }
}
