//! Executes remote-invoked operations against the task repository.
//!
//! One inbound message may carry several calls; they are executed and
//! answered in received order, and the whole batch goes back to the session
//! as a single response message. Every failure is converted into a
//! structured `{status: "error"}` result; nothing here panics or propagates
//! an error into the session loop.

use crate::auth::Identity;
use crate::board::{self, NewTask, TaskPatch, TaskStatus};
use crate::live::protocol::{FunctionCall, FunctionResponse};
use crate::store::{SnapshotCache, TaskRepository};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

/// Assignee marker for tasks added without one.
const UNASSIGNED: &str = "Atanmadı";

/// Executes tool-call batches against the live task snapshot.
///
/// Reads whatever the most recent subscription push has populated; never
/// triggers a fresh read. A call executing between two pushes may therefore
/// act on a snapshot that is stale relative to a write it just issued; the
/// next push reconciles it.
pub struct ToolCallExecutor {
    repo: Arc<dyn TaskRepository>,
    cache: SnapshotCache,
    /// Acting identity recorded in audit fields.
    user: Option<Identity>,
}

impl ToolCallExecutor {
    #[must_use]
    pub fn new(repo: Arc<dyn TaskRepository>, cache: SnapshotCache, user: Option<Identity>) -> Self {
        Self { repo, cache, user }
    }

    /// Execute a batch of calls in received order.
    ///
    /// Each call is independent; a failed call yields an error-status result
    /// without affecting its neighbors.
    pub async fn execute_batch(&self, calls: &[FunctionCall]) -> Vec<FunctionResponse> {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            info!("tool call: {} (id={:?})", call.name, call.id);
            let result = self.dispatch(call).await;
            responses.push(FunctionResponse::new(call, result));
        }
        responses
    }

    async fn dispatch(&self, call: &FunctionCall) -> Value {
        match call.name.as_str() {
            "addTask" => self.add_task(&call.args).await,
            "moveTask" => self.move_task(&call.args).await,
            "getBoardStatus" => self.board_status(),
            other => {
                warn!("unknown tool call: {other}");
                json!({ "status": "error", "message": "Bilinmeyen işlem" })
            }
        }
    }

    async fn add_task(&self, args: &Value) -> Value {
        let Some(title) = args["title"].as_str().map(str::trim).filter(|t| !t.is_empty())
        else {
            return json!({ "status": "error", "message": "İş adı gerekli" });
        };

        // Invalid or absent column tokens fall back to the first stage.
        let status = args["column"]
            .as_str()
            .and_then(|c| c.parse::<TaskStatus>().ok())
            .unwrap_or_default();

        let snapshot = self.cache.current();
        let order_number = board::next_order_number(&snapshot);

        let task = NewTask {
            order_number,
            title: title.to_owned(),
            status,
            assignee: Some(
                args["assignee"]
                    .as_str()
                    .filter(|a| !a.trim().is_empty())
                    .unwrap_or(UNASSIGNED)
                    .to_owned(),
            ),
            phone: args["phone"].as_str().map(str::to_owned),
            address: args["address"].as_str().map(str::to_owned),
            job_description: None,
            created_by: self.user.as_ref().map(|u| u.email.clone()),
        };

        match self.repo.create(task).await {
            Ok(task_id) => json!({
                "status": "success",
                "taskId": task_id,
                "orderNumber": order_number,
                "message": "İş eklendi"
            }),
            Err(e) => {
                warn!("addTask repository failure: {e}");
                json!({ "status": "error", "message": "Veritabanı hatası" })
            }
        }
    }

    async fn move_task(&self, args: &Value) -> Value {
        let search = args["searchTitle"].as_str().unwrap_or("").to_lowercase();
        let target = args["targetColumn"].as_str().unwrap_or("");

        // Externally supplied stage tokens are validated against the
        // enumeration; arbitrary strings are never written through.
        let Ok(target) = target.parse::<TaskStatus>() else {
            return json!({
                "status": "error",
                "message": format!(
                    "Geçersiz kolon. Geçerli kolonlar: {}",
                    TaskStatus::ALL.map(TaskStatus::as_str).join(", ")
                )
            });
        };

        // Case-insensitive substring match, first hit in snapshot order
        // wins; ambiguity is not resolved.
        let snapshot = self.cache.current();
        let Some(task) = snapshot
            .iter()
            .find(|t| t.title.to_lowercase().contains(&search))
        else {
            return json!({ "status": "not_found", "message": "İş bulunamadı" });
        };

        let patch = TaskPatch {
            status: Some(target),
            last_updated_by: self.user.as_ref().map(|u| u.email.clone()),
            ..TaskPatch::default()
        };

        match self.repo.update(&task.id, patch).await {
            Ok(()) => json!({
                "status": "success",
                "message": format!("\"{}\" taşındı: {}", task.title, target)
            }),
            Err(e) => {
                warn!("moveTask repository failure: {e}");
                json!({ "status": "error", "message": "Güncelleme hatası" })
            }
        }
    }

    /// Flattened board summary for the model to read aloud. No pagination;
    /// linear in task count.
    fn board_status(&self) -> Value {
        let snapshot = self.cache.current();
        let summary = snapshot
            .iter()
            .map(|t| format!("No:{} {} ({})", t.order_number, t.title, t.status))
            .collect::<Vec<_>>()
            .join(", ");
        json!({ "total": snapshot.len(), "summary": summary })
    }
}
