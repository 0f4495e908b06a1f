use std::{future::Future, pin::Pin};

use anyhow::Result;

use crate::geometry::Pose;

/// Boxed, `'static` future returned by anchor service calls so they can be moved into
/// spawned tasks.
pub type AnchorFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// Cloud anchor backend.
///
/// Both calls may take seconds. A returned error is the terminal failure signal for that
/// request; nothing in this crate retries.
pub trait AnchorService: Send + Sync + 'static {
    /// Publishes a local anchor at `pose` and yields its cloud id.
    fn host(&self, pose: Pose) -> AnchorFuture<String>;

    /// Looks up a previously hosted anchor and yields its live pose.
    fn resolve(&self, anchor_id: &str) -> AnchorFuture<Pose>;
}
