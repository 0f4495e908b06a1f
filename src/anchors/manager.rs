use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use anyhow::Result;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::{
    db::{AnchorRecord, Database},
    geometry::Pose,
    models::NoteId,
    session::queue::{Action, ActionSender},
};

use super::{events::SyncEvent, service::AnchorService};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Counts a task as outstanding until dropped.
struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Drives host, resolve and delete against the anchor service and the local index.
///
/// Every operation returns immediately; the work runs on the tokio runtime and its outcome
/// is queued as a [`SyncEvent`] for the session to apply. Operations for different notes
/// are independent and complete in any order.
pub struct AnchorSyncManager {
    service: Arc<dyn AnchorService>,
    db: Database,
    runtime: Handle,
    completions: ActionSender,
    in_flight: Arc<AtomicUsize>,
    cancel_token: CancellationToken,
}

impl AnchorSyncManager {
    pub fn new(
        service: Arc<dyn AnchorService>,
        db: Database,
        runtime: Handle,
        completions: ActionSender,
    ) -> Self {
        Self {
            service,
            db,
            runtime,
            completions,
            in_flight: Arc::new(AtomicUsize::new(0)),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Host/resolve/save tasks that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Hosts the anchor for `note_id` and records `note_content` under the new cloud id.
    pub fn host(&self, note_id: NoteId, pose: Pose, note_content: String) {
        let service = self.service.clone();
        let db = self.db.clone();
        let completions = self.completions.clone();
        let token = self.cancel_token.clone();
        let guard = InFlightGuard::new(&self.in_flight);

        log_info!("hosting anchor for note {}", note_id);

        self.runtime.spawn(async move {
            let _guard = guard;

            let outcome = tokio::select! {
                _ = token.cancelled() => {
                    log_info!("host for note {} cancelled", note_id);
                    return;
                }
                outcome = service.host(pose) => outcome,
            };

            let event = match outcome {
                Ok(anchor_id) => {
                    let persisted = match db.put_anchor(&anchor_id, &note_content).await {
                        Ok(()) => true,
                        Err(err) => {
                            log_error!("failed to record anchor {}: {err:#}", anchor_id);
                            false
                        }
                    };
                    log_info!("note {} hosted as {}", note_id, anchor_id);
                    SyncEvent::Hosted {
                        note_id,
                        anchor_id,
                        persisted,
                    }
                }
                Err(err) => {
                    log_warn!("hosting note {} failed: {err:#}", note_id);
                    SyncEvent::HostFailed {
                        note_id,
                        reason: format!("{err:#}"),
                    }
                }
            };

            completions.send(Action::Sync(event));
        });
    }

    /// Resolves every anchor in the local index, each independently.
    ///
    /// An unreadable index counts as empty. One failed resolve never affects the others.
    pub fn resolve_all(&self) {
        let service = self.service.clone();
        let db = self.db.clone();
        let completions = self.completions.clone();
        let token = self.cancel_token.clone();
        let in_flight = self.in_flight.clone();
        let guard = InFlightGuard::new(&self.in_flight);

        self.runtime.spawn(async move {
            let _guard = guard;

            let records = match db.list_anchor_records().await {
                Ok(records) => records,
                Err(err) => {
                    log_warn!("anchor index unreadable, treating as empty: {err:#}");
                    Vec::new()
                }
            };

            log_info!("resolving {} stored anchors", records.len());

            for record in records {
                let guard = InFlightGuard::new(&in_flight);
                tokio::spawn(resolve_one(
                    service.clone(),
                    record,
                    completions.clone(),
                    token.clone(),
                    guard,
                ));
            }
        });
    }

    /// Drops the local record for `anchor_id`. The remote anchor is left alone; it simply
    /// will not be resolved again. Ordered before any index read issued after this call.
    pub fn delete(&self, anchor_id: &str) -> Result<()> {
        log_info!("forgetting anchor {}", anchor_id);
        self.db.queue_delete_anchor(anchor_id)
    }

    /// Rewrites the stored payload of an already hosted anchor.
    pub fn update_content(&self, anchor_id: &str, note_content: &str) {
        let completions = self.completions.clone();
        let anchor_id = anchor_id.to_string();

        let reply = match self.db.queue_put_anchor(&anchor_id, note_content) {
            Ok(reply) => reply,
            Err(err) => {
                log_error!("failed to queue content update for {}: {err:#}", anchor_id);
                completions.send(Action::Sync(SyncEvent::ContentSaved {
                    anchor_id,
                    persisted: false,
                }));
                return;
            }
        };

        let guard = InFlightGuard::new(&self.in_flight);
        self.runtime.spawn(async move {
            let _guard = guard;
            let persisted = match reply.await {
                Ok(Ok(())) => true,
                Ok(Err(err)) => {
                    log_error!("failed to update anchor {}: {err:#}", anchor_id);
                    false
                }
                Err(_) => {
                    log_error!("database thread dropped update for {}", anchor_id);
                    false
                }
            };
            completions.send(Action::Sync(SyncEvent::ContentSaved {
                anchor_id,
                persisted,
            }));
        });
    }

    /// Abandons every outstanding host/resolve; their completions are never queued.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

async fn resolve_one(
    service: Arc<dyn AnchorService>,
    record: AnchorRecord,
    completions: ActionSender,
    token: CancellationToken,
    guard: InFlightGuard,
) {
    let _guard = guard;

    let outcome = tokio::select! {
        _ = token.cancelled() => return,
        outcome = service.resolve(&record.anchor_id) => outcome,
    };

    let event = match outcome {
        Ok(pose) => SyncEvent::Resolved { record, pose },
        Err(err) => {
            log_warn!("resolving {} failed: {err:#}", record.anchor_id);
            SyncEvent::ResolveFailed {
                anchor_id: record.anchor_id,
                reason: format!("{err:#}"),
            }
        }
    };

    completions.send(Action::Sync(event));
}
