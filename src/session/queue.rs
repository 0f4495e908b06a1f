//! Single-consumer queue that carries asynchronous completions back to the interactive
//! thread.
//!
//! Producers (anchor tasks, QR decode workers) hold cheap [`ActionSender`] clones; only the
//! session owns the receiving end and drains it once per frame, before gesture processing.

use tokio::sync::mpsc;

use crate::{anchors::SyncEvent, scan::ScanEvent};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

#[derive(Debug, Clone)]
pub enum Action {
    Sync(SyncEvent),
    Scan(ScanEvent),
}

#[derive(Debug, Clone)]
pub struct ActionSender {
    inner: mpsc::UnboundedSender<Action>,
}

impl ActionSender {
    /// Returns false if the session is gone; the action is dropped.
    pub fn send(&self, action: Action) -> bool {
        match self.inner.send(action) {
            Ok(()) => true,
            Err(err) => {
                log_warn!("session closed; dropping {:?}", err.0);
                false
            }
        }
    }
}

#[derive(Debug)]
pub struct ActionQueue {
    sender: ActionSender,
    receiver: mpsc::UnboundedReceiver<Action>,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        let (tx, receiver) = mpsc::unbounded_channel();
        Self {
            sender: ActionSender { inner: tx },
            receiver,
        }
    }

    pub fn sender(&self) -> ActionSender {
        self.sender.clone()
    }

    /// Everything queued so far, in arrival order. Never blocks.
    pub fn drain(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        while let Ok(action) = self.receiver.try_recv() {
            actions.push(action);
        }
        actions
    }
}
