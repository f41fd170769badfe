//! Task repository seam and the shared snapshot cache.
//!
//! The hosted document store is an external collaborator; the bridge consumes
//! it through [`TaskRepository`]. Subscriptions are push-based and always
//! deliver the full ordered task collection, never a partial patch, so cache
//! readers always see a consistent snapshot.

pub mod memory;

use crate::board::{NewTask, Task, TaskPatch};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A full, immutable view of the task collection at one point in time.
pub type TaskSnapshot = Arc<Vec<Task>>;

/// External task repository with live subscription.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Subscribe to the task collection, ordered by order number ascending.
    ///
    /// Every document change yields the full updated set.
    fn subscribe(&self) -> watch::Receiver<TaskSnapshot>;

    /// Create a task; the repository assigns the id and creation timestamp.
    async fn create(&self, task: NewTask) -> Result<String>;

    /// Apply a partial update to an existing task.
    async fn update(&self, id: &str, patch: TaskPatch) -> Result<()>;

    /// Delete a task.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// Shared in-memory task cache, replaced wholesale on every subscription push.
///
/// This is the single shared mutable structure between the repository
/// subscription (writer) and the tool-call executor (reader). Readers clone
/// the inner `Arc`, so a snapshot taken mid-call stays consistent even if a
/// push lands while the call is executing. There is no read-your-writes
/// guarantee: a write issued by a tool call becomes visible only with the
/// next subscription push.
#[derive(Clone)]
pub struct SnapshotCache {
    inner: Arc<RwLock<TaskSnapshot>>,
}

impl SnapshotCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(Vec::new()))),
        }
    }

    /// Current snapshot. Cheap: clones the `Arc`, not the tasks.
    #[must_use]
    pub fn current(&self) -> TaskSnapshot {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Install a new snapshot, replacing the previous one wholesale.
    pub fn install(&self, snapshot: TaskSnapshot) {
        match self.inner.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => *poisoned.into_inner() = snapshot,
        }
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Keep a [`SnapshotCache`] current from a repository subscription.
///
/// Runs until cancelled or the subscription ends.
pub async fn sync_cache(
    mut rx: watch::Receiver<TaskSnapshot>,
    cache: SnapshotCache,
    cancel: CancellationToken,
) {
    // Install whatever the subscription currently holds before waiting.
    cache.install(rx.borrow_and_update().clone());

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = rx.borrow_and_update().clone();
                debug!("task snapshot updated: {} tasks", snapshot.len());
                cache.install(snapshot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::board::TaskStatus;

    fn task(order: u32, title: &str) -> Task {
        Task {
            id: format!("t{order}"),
            order_number: order,
            title: title.to_owned(),
            status: TaskStatus::ToCheck,
            assignee: None,
            date: None,
            phone: None,
            address: None,
            job_description: None,
            general_note: None,
            team_note: None,
            check_status: None,
            gas_opening_date: None,
            gas_note: None,
            service_serial_number: None,
            service_note: None,
            created_by: None,
            last_updated_by: None,
            created_at: None,
        }
    }

    #[test]
    fn cache_replaces_wholesale() {
        let cache = SnapshotCache::new();
        assert!(cache.current().is_empty());

        cache.install(Arc::new(vec![task(1, "A"), task(2, "B")]));
        let before = cache.current();
        assert_eq!(before.len(), 2);

        cache.install(Arc::new(vec![task(3, "C")]));
        // The earlier snapshot is unaffected by the replacement.
        assert_eq!(before.len(), 2);
        assert_eq!(cache.current().len(), 1);
    }

    #[tokio::test]
    async fn sync_follows_subscription_pushes() {
        let (tx, rx) = watch::channel::<TaskSnapshot>(Arc::new(vec![task(1, "A")]));
        let cache = SnapshotCache::new();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(sync_cache(rx, cache.clone(), cancel.clone()));

        tx.send(Arc::new(vec![task(1, "A"), task(2, "B")])).unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(cache.current().len(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }
}
