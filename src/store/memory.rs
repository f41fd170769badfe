//! In-memory task repository.
//!
//! Backs tests and the demo binary; mimics the hosted store's observable
//! behavior (server-assigned ids and timestamps, full-collection pushes
//! ordered by order number).

use super::{TaskRepository, TaskSnapshot};
use crate::board::{NewTask, Task, TaskPatch};
use crate::error::{BridgeError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// In-memory [`TaskRepository`] implementation.
pub struct InMemoryRepository {
    tasks: Mutex<Vec<Task>>,
    tx: watch::Sender<TaskSnapshot>,
    fail_writes: AtomicBool,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel::<TaskSnapshot>(std::sync::Arc::new(Vec::new()));
        Self {
            tasks: Mutex::new(Vec::new()),
            tx,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail, simulating a rejected repository
    /// operation. Used to exercise the error-conversion path.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(BridgeError::Repository("write rejected".into()));
        }
        Ok(())
    }

    fn publish(&self, tasks: &[Task]) {
        let mut snapshot = tasks.to_vec();
        snapshot.sort_by_key(|t| t.order_number);
        // send_replace stores the value even with no live receiver, so a
        // late subscriber's first borrow sees the current collection.
        self.tx.send_replace(std::sync::Arc::new(snapshot));
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<Task>> {
        match self.tasks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRepository for InMemoryRepository {
    fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.tx.subscribe()
    }

    async fn create(&self, task: NewTask) -> Result<String> {
        self.check_writable()?;
        let id = uuid::Uuid::new_v4().to_string();
        let mut tasks = self.lock_tasks();
        tasks.push(Task {
            id: id.clone(),
            order_number: task.order_number,
            title: task.title,
            status: task.status,
            assignee: task.assignee,
            date: None,
            phone: task.phone,
            address: task.address,
            job_description: task.job_description,
            general_note: None,
            team_note: None,
            check_status: None,
            gas_opening_date: None,
            gas_note: None,
            service_serial_number: None,
            service_note: None,
            created_by: task.created_by,
            last_updated_by: None,
            created_at: Some(Utc::now()),
        });
        self.publish(&tasks);
        Ok(id)
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<()> {
        self.check_writable()?;
        let mut tasks = self.lock_tasks();
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| BridgeError::Repository(format!("no such task: {id}")))?;

        if let Some(title) = patch.title {
            task.title = title;
        }
        if let Some(status) = patch.status {
            task.status = status;
        }
        if let Some(assignee) = patch.assignee {
            task.assignee = Some(assignee);
        }
        if let Some(date) = patch.date {
            task.date = Some(date);
        }
        if let Some(phone) = patch.phone {
            task.phone = Some(phone);
        }
        if let Some(address) = patch.address {
            task.address = Some(address);
        }
        if let Some(note) = patch.general_note {
            task.general_note = Some(note);
        }
        if let Some(note) = patch.team_note {
            task.team_note = Some(note);
        }
        if let Some(check) = patch.check_status {
            task.check_status = Some(check);
        }
        if let Some(date) = patch.gas_opening_date {
            task.gas_opening_date = Some(date);
        }
        if let Some(note) = patch.gas_note {
            task.gas_note = Some(note);
        }
        if let Some(serial) = patch.service_serial_number {
            task.service_serial_number = Some(serial);
        }
        if let Some(note) = patch.service_note {
            task.service_note = Some(note);
        }
        if let Some(updater) = patch.last_updated_by {
            task.last_updated_by = Some(updater);
        }
        self.publish(&tasks);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check_writable()?;
        let mut tasks = self.lock_tasks();
        let before = tasks.len();
        tasks.retain(|t| t.id != id);
        if tasks.len() == before {
            return Err(BridgeError::Repository(format!("no such task: {id}")));
        }
        self.publish(&tasks);
        Ok(())
    }
}
