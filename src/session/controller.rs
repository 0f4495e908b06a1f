use std::{
    collections::HashSet,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;

use crate::{
    anchors::{AnchorService, AnchorSyncManager, SyncEvent},
    db::Database,
    geometry::Pose,
    gesture::{FrameInput, GestureClassifier, GestureConfig, GestureEvent, GestureState},
    models::{NoteContent, NoteId, SyncState, STATUS_NOT_SAVED},
    notes::{NoteEvent, NoteRegistry},
    scan::{CameraFrame, QrDecoder, ScanController, ScanEvent, ScanMode},
    scene::SceneProbe,
};

use super::queue::{Action, ActionQueue};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub gesture: GestureConfig,
    /// Content given to notes created by tapping empty surface.
    pub default_content: NoteContent,
}

/// Counters for the current session, mostly for logs and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub created: usize,
    pub hosted: usize,
    pub host_failures: usize,
    pub resolved: usize,
    pub resolve_failures: usize,
    pub discarded: usize,
    pub qr_placed: usize,
}

/// Per-frame driver that ties input, notes and anchor persistence together.
///
/// The host frame loop calls [`SessionController::advance`] once per frame from a single
/// thread. Asynchronous completions are applied at the start of that call, so the registry
/// is never touched from anywhere else.
pub struct SessionController {
    classifier: GestureClassifier,
    registry: NoteRegistry,
    sync: AnchorSyncManager,
    scanner: Option<ScanController>,
    queue: ActionQueue,
    runtime: Handle,
    default_content: NoteContent,
    /// Notes edited while their host was still pending; rewritten once hosted.
    edited_while_hosting: HashSet<NoteId>,
    /// Anchors deleted this session; late resolves for them are dropped.
    forgotten: HashSet<String>,
    stats: SessionStats,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        service: Arc<dyn AnchorService>,
        db: Database,
        runtime: Handle,
    ) -> Self {
        let queue = ActionQueue::new();
        let sync = AnchorSyncManager::new(service, db, runtime.clone(), queue.sender());

        Self {
            classifier: GestureClassifier::new(config.gesture),
            registry: NoteRegistry::new(config.gesture),
            sync,
            scanner: None,
            queue,
            runtime,
            default_content: config.default_content,
            edited_while_hosting: HashSet::new(),
            forgotten: HashSet::new(),
            stats: SessionStats::default(),
        }
    }

    /// Turns on QR placement. `screen_size` maps scan windows onto screen points.
    pub fn enable_scanning(
        &mut self,
        mode: ScanMode,
        screen_size: (f32, f32),
        decoder: Arc<dyn QrDecoder>,
    ) {
        log_info!("QR scanning enabled ({:?})", mode);
        self.scanner = Some(ScanController::new(
            mode,
            screen_size,
            decoder,
            self.runtime.clone(),
            self.queue.sender(),
        ));
    }

    pub fn scanner(&self) -> Option<&ScanController> {
        self.scanner.as_ref()
    }

    pub fn scanner_mut(&mut self) -> Option<&mut ScanController> {
        self.scanner.as_mut()
    }

    /// Offers a camera frame to the scanner. False when scanning is off or throttled.
    pub fn try_scan(&mut self, frame: CameraFrame, now: Instant) -> bool {
        match self.scanner.as_mut() {
            Some(scanner) => scanner.try_scan(frame, now),
            None => false,
        }
    }

    pub fn registry(&self) -> &NoteRegistry {
        &self.registry
    }

    pub fn database(&self) -> &Database {
        self.sync.database()
    }

    pub fn gesture_state(&self) -> GestureState {
        self.classifier.state()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn default_content(&self) -> &NoteContent {
        &self.default_content
    }

    pub fn set_default_content(&mut self, content: NoteContent) {
        self.default_content = content;
    }

    /// Outstanding anchor tasks plus a running scan.
    pub fn in_flight(&self) -> usize {
        let scanning = self.scanner.as_ref().is_some_and(|s| s.is_scanning());
        self.sync.in_flight() + usize::from(scanning)
    }

    pub fn take_note_events(&mut self) -> Vec<NoteEvent> {
        self.registry.take_events()
    }

    /// One display frame: apply queued completions, then classify `frame` and route the
    /// resulting gestures. Returns the gestures for the host UI.
    pub fn advance(&mut self, frame: &FrameInput, scene: &dyn SceneProbe) -> Vec<GestureEvent> {
        self.drain_actions(scene);

        let events = self
            .classifier
            .advance(frame, scene, self.registry.selected());

        for event in &events {
            self.apply_gesture(event);
        }

        events
    }

    fn apply_gesture(&mut self, event: &GestureEvent) {
        match event {
            GestureEvent::TapEmpty(pose) => {
                if self.registry.selected().is_some() {
                    self.registry.deselect();
                } else {
                    self.create_note_at(*pose);
                }
            }
            GestureEvent::TapOn(note_id) => {
                self.registry.select(*note_id);
            }
            GestureEvent::DragTo { note, position } => {
                self.registry.apply_drag(*note, *position);
            }
            GestureEvent::PinchRotate {
                scale_factor,
                angle_delta,
                rebaseline,
            } => {
                self.registry
                    .apply_pinch_rotate(*scale_factor, *angle_delta, *rebaseline);
            }
            GestureEvent::Release => self.registry.deselect(),
        }
    }

    /// Places a note with the default content at `pose`, selects it and starts hosting it.
    pub fn create_note_at(&mut self, pose: Pose) -> NoteId {
        let note_id = self
            .registry
            .create_note(pose, self.default_content.clone());
        self.stats.created += 1;
        log_info!("created note {}", note_id);
        self.host_note(note_id);
        note_id
    }

    fn host_note(&mut self, note_id: NoteId) {
        let Some(note) = self.registry.get(note_id) else {
            return;
        };
        let pose = note.transform.pose();

        match note.payload() {
            Ok(payload) => {
                self.registry
                    .set_sync_state(note_id, SyncState::Hosting, None);
                self.sync.host(note_id, pose, payload);
            }
            Err(err) => {
                log_error!("cannot encode note {}: {err:#}", note_id);
                self.registry.set_sync_state(note_id, SyncState::Failed, None);
                self.stats.host_failures += 1;
            }
        }
    }

    pub fn select(&mut self, note_id: NoteId) -> bool {
        self.registry.select(note_id)
    }

    pub fn deselect(&mut self) {
        self.registry.deselect();
    }

    /// Removes a note and forgets its anchor. A host still pending for it is discarded when
    /// it completes.
    pub fn delete_note(&mut self, note_id: NoteId) -> bool {
        let Some(note) = self.registry.delete(note_id) else {
            return false;
        };
        self.edited_while_hosting.remove(&note_id);

        if let Some(anchor_id) = note.anchor_id {
            if let Err(err) = self.sync.delete(&anchor_id) {
                log_error!("failed to forget anchor {}: {err:#}", anchor_id);
            }
            self.forgotten.insert(anchor_id);
        }
        log_info!("deleted note {}", note_id);
        true
    }

    pub fn delete_selected(&mut self) -> bool {
        match self.registry.selected() {
            Some(note_id) => self.delete_note(note_id),
            None => false,
        }
    }

    /// Replaces a note's text. A hosted note's stored payload is rewritten, current scale
    /// included; a note still hosting is rewritten once its anchor id arrives.
    pub fn edit_note(&mut self, note_id: NoteId, text: impl Into<String>) -> bool {
        if !self.registry.edit_content(note_id, text) {
            return false;
        }

        let Some(note) = self.registry.get(note_id) else {
            return false;
        };
        match (note.sync_state, note.anchor_id.clone()) {
            (SyncState::Hosted, Some(anchor_id)) => self.save_content(note_id, &anchor_id),
            (SyncState::Hosting, _) => {
                self.edited_while_hosting.insert(note_id);
            }
            _ => {}
        }
        true
    }

    pub fn edit_selected(&mut self, text: impl Into<String>) -> bool {
        match self.registry.selected() {
            Some(note_id) => self.edit_note(note_id, text),
            None => false,
        }
    }

    fn save_content(&mut self, note_id: NoteId, anchor_id: &str) {
        let Some(note) = self.registry.get(note_id) else {
            return;
        };
        match note.payload() {
            Ok(payload) => {
                self.registry
                    .set_status_text(note_id, SyncState::Hosting.status_text());
                self.sync.update_content(anchor_id, &payload);
            }
            Err(err) => {
                log_error!("cannot encode note {}: {err:#}", note_id);
                self.registry.set_status_text(note_id, STATUS_NOT_SAVED);
            }
        }
    }

    /// Resolves every stored anchor; called once on app start.
    pub fn load(&self) {
        log_info!("loading saved notes");
        self.sync.resolve_all();
    }

    /// Applies every queued completion. Returns how many were drained.
    pub fn drain_actions(&mut self, scene: &dyn SceneProbe) -> usize {
        let actions = self.queue.drain();
        let count = actions.len();

        for action in actions {
            match action {
                Action::Sync(event) => self.apply_sync(event),
                Action::Scan(event) => self.apply_scan(event, scene),
            }
        }

        count
    }

    fn apply_sync(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Hosted {
                note_id,
                anchor_id,
                persisted,
            } => {
                if !self.registry.contains(note_id) {
                    log_info!(
                        "note {} was deleted while hosting; dropping anchor {}",
                        note_id,
                        anchor_id
                    );
                    self.stats.discarded += 1;
                    if let Err(err) = self.sync.delete(&anchor_id) {
                        log_error!("failed to purge orphan anchor {}: {err:#}", anchor_id);
                    }
                    return;
                }

                self.registry
                    .set_sync_state(note_id, SyncState::Hosted, Some(anchor_id.clone()));
                self.stats.hosted += 1;

                if !persisted {
                    self.registry.set_status_text(note_id, STATUS_NOT_SAVED);
                } else if self.edited_while_hosting.remove(&note_id) {
                    self.save_content(note_id, &anchor_id);
                }
            }
            SyncEvent::HostFailed { note_id, reason } => {
                self.edited_while_hosting.remove(&note_id);
                if !self.registry.contains(note_id) {
                    log_debug!("host failure for deleted note {}: {}", note_id, reason);
                    return;
                }
                self.registry.set_sync_state(note_id, SyncState::Failed, None);
                self.stats.host_failures += 1;
            }
            SyncEvent::Resolved { record, pose } => {
                if self.forgotten.contains(&record.anchor_id) {
                    log_debug!("anchor {} was deleted; ignoring resolve", record.anchor_id);
                    self.stats.discarded += 1;
                    return;
                }
                let content = NoteContent::from_payload(&record.note_content);
                match self.registry.restore_note(pose, content, record.anchor_id) {
                    Some(note_id) => {
                        log_debug!("restored note {}", note_id);
                        self.stats.resolved += 1;
                    }
                    None => {
                        log_debug!("anchor already materialized; skipping");
                    }
                }
            }
            SyncEvent::ResolveFailed { anchor_id, reason } => {
                log_warn!("could not restore anchor {}: {}", anchor_id, reason);
                self.stats.resolve_failures += 1;
            }
            SyncEvent::ContentSaved {
                anchor_id,
                persisted,
            } => {
                let Some(note_id) = self
                    .registry
                    .find_by_anchor(&anchor_id)
                    .map(|note| note.note_id)
                else {
                    return;
                };
                let status = if persisted {
                    SyncState::Hosted.status_text()
                } else {
                    STATUS_NOT_SAVED
                };
                self.registry.set_status_text(note_id, status);
            }
        }
    }

    fn apply_scan(&mut self, event: ScanEvent, scene: &dyn SceneProbe) {
        let Some(scanner) = self.scanner.as_mut() else {
            return;
        };
        scanner.finish(Instant::now());

        let Some(text) = event.text.filter(|text| !text.trim().is_empty()) else {
            return;
        };
        if scanner.is_placed(&text) {
            log_debug!("QR payload already placed");
            return;
        }
        let Some(pose) = scene.raycast(event.screen_point) else {
            log_debug!("no surface under QR code at {:?}", event.screen_point);
            return;
        };
        scanner.mark_placed(text.clone());

        let note_id = self
            .registry
            .add_note(pose, NoteContent::from_payload(&text));
        self.stats.created += 1;
        self.stats.qr_placed += 1;
        log_info!("placed note {} from QR code", note_id);
        self.host_note(note_id);
    }

    /// Keeps draining until nothing is in flight. For tests and the demo, which have no
    /// frame loop of their own.
    pub async fn run_until_idle(
        &mut self,
        scene: &dyn SceneProbe,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            self.drain_actions(scene);
            if self.in_flight() == 0 {
                // Completions are queued before their task's counter drops.
                self.drain_actions(scene);
                if self.in_flight() == 0 {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(anyhow!(
                    "session still has {} operations in flight after {:?}",
                    self.in_flight(),
                    timeout
                ));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Abandons outstanding work and drops every note. Stored records are kept.
    pub fn shutdown(&mut self) {
        log_info!("session shutting down with {} notes", self.registry.len());
        self.sync.shutdown();
        if let Some(scanner) = self.scanner.as_mut() {
            scanner.reset();
        }
        self.classifier.reset();
        self.registry.clear();
        self.queue.drain();
        self.edited_while_hosting.clear();
    }
}
