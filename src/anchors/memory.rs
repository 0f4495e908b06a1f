use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use anyhow::{anyhow, bail, Result};
use rand::Rng;
use uuid::Uuid;

use crate::geometry::Pose;

use super::service::{AnchorFuture, AnchorService};

#[derive(Debug, Default)]
struct ServiceState {
    anchors: HashMap<String, Pose>,
    fail_hosts: bool,
    failing_resolves: HashSet<String>,
}

/// Anchor backend kept in process memory.
///
/// Stands in for the cloud service in the demo session and in tests: hosting stores the
/// pose under a fresh id, resolving returns it. Latency is drawn uniformly from the
/// configured range, and failures can be injected per call kind or per anchor id.
#[derive(Clone)]
pub struct InMemoryAnchorService {
    state: Arc<Mutex<ServiceState>>,
    min_latency_ms: u64,
    max_latency_ms: u64,
}

impl Default for InMemoryAnchorService {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAnchorService {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServiceState::default())),
            min_latency_ms: 0,
            max_latency_ms: 0,
        }
    }

    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.min_latency_ms = min_ms.min(max_ms);
        self.max_latency_ms = max_ms.max(min_ms);
        self
    }

    /// Makes every following host request fail (or succeed again).
    pub fn set_host_failure(&self, fail: bool) -> Result<()> {
        lock(&self.state)?.fail_hosts = fail;
        Ok(())
    }

    /// Makes resolves of `anchor_id` fail as if the anchor had expired remotely.
    pub fn fail_resolve(&self, anchor_id: &str) -> Result<()> {
        lock(&self.state)?
            .failing_resolves
            .insert(anchor_id.to_string());
        Ok(())
    }

    /// Seeds an anchor as if it had been hosted in an earlier run.
    pub fn insert_anchor(&self, anchor_id: &str, pose: Pose) -> Result<()> {
        lock(&self.state)?
            .anchors
            .insert(anchor_id.to_string(), pose);
        Ok(())
    }

    pub fn anchor_count(&self) -> usize {
        lock(&self.state).map(|state| state.anchors.len()).unwrap_or(0)
    }

    fn next_delay(&self) -> Duration {
        if self.max_latency_ms == 0 {
            return Duration::ZERO;
        }
        let ms = rand::thread_rng().gen_range(self.min_latency_ms..=self.max_latency_ms);
        Duration::from_millis(ms)
    }
}

fn lock(state: &Mutex<ServiceState>) -> Result<MutexGuard<'_, ServiceState>> {
    state
        .lock()
        .map_err(|_| anyhow!("anchor service state poisoned"))
}

impl AnchorService for InMemoryAnchorService {
    fn host(&self, pose: Pose) -> AnchorFuture<String> {
        let state = self.state.clone();
        let delay = self.next_delay();

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let mut guard = lock(&state)?;
            if guard.fail_hosts {
                bail!("anchor service rejected the host request");
            }

            let anchor_id = format!("ua-{}", Uuid::new_v4().simple());
            guard.anchors.insert(anchor_id.clone(), pose);
            Ok(anchor_id)
        })
    }

    fn resolve(&self, anchor_id: &str) -> AnchorFuture<Pose> {
        let state = self.state.clone();
        let anchor_id = anchor_id.to_string();
        let delay = self.next_delay();

        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let guard = lock(&state)?;
            if guard.failing_resolves.contains(&anchor_id) {
                bail!("anchor {anchor_id} has expired");
            }
            let pose = guard.anchors.get(&anchor_id).copied();
            pose.ok_or_else(|| anyhow!("anchor {anchor_id} not found"))
        })
    }
}
