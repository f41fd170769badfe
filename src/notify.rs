//! Status-change notifications.
//!
//! Watches consecutive task snapshots from the repository subscription and
//! raises a notification whenever a task's stage changes and the admin
//! settings map that stage to recipients. Rendering (toast, desktop, sound)
//! is the frontend's business; this module only produces the events.

use crate::board::{Task, TaskStatus};
use crate::store::TaskSnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Per-stage notification recipients, as stored in the admin settings
/// document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Stage token → recipient emails.
    pub notifications: HashMap<TaskStatus, Vec<String>>,
}

impl NotificationSettings {
    /// Recipients configured for a stage, empty when none.
    #[must_use]
    pub fn recipients(&self, status: TaskStatus) -> &[String] {
        self.notifications
            .get(&status)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// A task that moved to a different stage between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub task: Task,
    pub previous: TaskStatus,
}

/// A notification ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Operator-facing message, e.g. `Ahmet Bey işi "Gaz Açıldı" aşamasına geldi.`
    pub message: String,
    pub recipients: Vec<String>,
}

impl Notification {
    #[must_use]
    pub fn for_change(change: &StatusChange, recipients: &[String]) -> Self {
        Self {
            message: format!(
                "{} işi \"{}\" aşamasına geldi.",
                change.task.title,
                change.task.status.label()
            ),
            recipients: recipients.to_vec(),
        }
    }
}

/// Tasks whose stage differs between two snapshots, matched by id.
///
/// Creations and deletions are not status changes and produce nothing.
#[must_use]
pub fn diff_status_changes(previous: &[Task], next: &[Task]) -> Vec<StatusChange> {
    next.iter()
        .filter_map(|task| {
            let old = previous.iter().find(|p| p.id == task.id)?;
            (old.status != task.status).then(|| StatusChange {
                task: task.clone(),
                previous: old.status,
            })
        })
        .collect()
}

/// Watch the subscription and emit a [`Notification`] per qualifying change.
///
/// Runs until cancelled or the subscription ends.
pub async fn run_notifier(
    mut rx: watch::Receiver<TaskSnapshot>,
    settings: NotificationSettings,
    tx: mpsc::UnboundedSender<Notification>,
    cancel: CancellationToken,
) {
    let mut previous = rx.borrow_and_update().clone();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let next = rx.borrow_and_update().clone();
                for change in diff_status_changes(&previous, &next) {
                    let recipients = settings.recipients(change.task.status);
                    if recipients.is_empty() {
                        continue;
                    }
                    info!(
                        "notifying {} recipient(s): {} -> {}",
                        recipients.len(),
                        change.task.title,
                        change.task.status
                    );
                    if tx.send(Notification::for_change(&change, recipients)).is_err() {
                        return;
                    }
                }
                previous = next;
            }
        }
    }
}
