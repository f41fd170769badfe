//! Board domain model: tasks, workflow stages, and order numbers.
//!
//! The board is a five-stage workflow for gas installation jobs. Stages form
//! a fixed ordered set but there is no enforced transition graph: operators
//! move jobs between any two stages freely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the five fixed workflow stages a task can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Kontrolü yapılacak işler (first stage, default for new tasks).
    #[serde(rename = "TO_CHECK")]
    ToCheck,
    /// Kontrolü yapılan işler.
    #[serde(rename = "CHECK_COMPLETED")]
    CheckCompleted,
    /// Depozito yatırıldı.
    #[serde(rename = "DEPOSIT_PAID")]
    DepositPaid,
    /// Gaz açıldı.
    #[serde(rename = "GAS_OPENED")]
    GasOpened,
    /// Servis yönlendirildi.
    #[serde(rename = "SERVICE_DIRECTED")]
    ServiceDirected,
}

impl TaskStatus {
    /// All stages in workflow order.
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::ToCheck,
        TaskStatus::CheckCompleted,
        TaskStatus::DepositPaid,
        TaskStatus::GasOpened,
        TaskStatus::ServiceDirected,
    ];

    /// Wire token for this stage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::ToCheck => "TO_CHECK",
            TaskStatus::CheckCompleted => "CHECK_COMPLETED",
            TaskStatus::DepositPaid => "DEPOSIT_PAID",
            TaskStatus::GasOpened => "GAS_OPENED",
            TaskStatus::ServiceDirected => "SERVICE_DIRECTED",
        }
    }

    /// Operator-facing Turkish label, as shown on the board columns.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::ToCheck => "Kontrolü Yapılacak İşler",
            TaskStatus::CheckCompleted => "Kontrolü Yapılan İşler",
            TaskStatus::DepositPaid => "Depozito Yatırıldı",
            TaskStatus::GasOpened => "Gaz Açıldı",
            TaskStatus::ServiceDirected => "Servis Yönlendirildi",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::ToCheck
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TO_CHECK" => Ok(TaskStatus::ToCheck),
            "CHECK_COMPLETED" => Ok(TaskStatus::CheckCompleted),
            "DEPOSIT_PAID" => Ok(TaskStatus::DepositPaid),
            "GAS_OPENED" => Ok(TaskStatus::GasOpened),
            "SERVICE_DIRECTED" => Ok(TaskStatus::ServiceDirected),
            _ => Err(()),
        }
    }
}

/// Result of the check-crew visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    /// Eksik var: something is missing at the site.
    Missing,
    /// Eksik yok: installation is clean.
    Clean,
}

/// One job/customer card on the board.
///
/// Owned by the external task repository; the bridge only ever reads whole
/// snapshots of these and issues create/update calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Repository-assigned document id.
    pub id: String,
    /// Human-facing sequence number, unique within the active set.
    pub order_number: u32,
    /// Customer/job name.
    pub title: String,
    /// Current workflow stage.
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    /// Free-form customer date field, as entered on the card.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub general_note: Option<String>,
    /// Kontrol ekibi notu.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_status: Option<CheckStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_opening_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_by: Option<String>,
    /// Server-assigned creation timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Field bundle for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub order_number: u32,
    pub title: String,
    pub status: TaskStatus,
    pub assignee: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub job_description: Option<String>,
    pub created_by: Option<String>,
}

/// Partial update applied to an existing task. `None` fields are untouched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub status: Option<TaskStatus>,
    pub assignee: Option<String>,
    pub date: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub general_note: Option<String>,
    pub team_note: Option<String>,
    pub check_status: Option<CheckStatus>,
    pub gas_opening_date: Option<String>,
    pub gas_note: Option<String>,
    pub service_serial_number: Option<String>,
    pub service_note: Option<String>,
    pub last_updated_by: Option<String>,
}

/// Order number for the next task created against the given snapshot.
///
/// One greater than the maximum order number currently held, or 1 on an empty
/// board. Computed from the caller's snapshot, so two concurrent creators can
/// end up with the same number.
#[must_use]
pub fn next_order_number(tasks: &[Task]) -> u32 {
    tasks.iter().map(|t| t.order_number).max().unwrap_or(0) + 1
}

/// Manual create path used by the form layer.
///
/// Stamps the computed order number and the acting user; the same order
/// number invariant as the voice `addTask` path.
///
/// # Errors
///
/// Returns an error if the repository rejects the create.
pub async fn create_task(
    repo: &dyn crate::store::TaskRepository,
    snapshot: &[Task],
    mut fields: NewTask,
    user: Option<&crate::auth::Identity>,
) -> crate::error::Result<String> {
    fields.order_number = next_order_number(snapshot);
    if fields.title.trim().is_empty() {
        fields.title = "Yeni Müşteri".to_owned();
    }
    fields.created_by = user.map(|u| u.email.clone());
    repo.create(fields).await
}

/// Manual edit path used by the form layer. Stamps the last updater.
///
/// # Errors
///
/// Returns an error if the repository rejects the update.
pub async fn update_task(
    repo: &dyn crate::store::TaskRepository,
    id: &str,
    mut patch: TaskPatch,
    user: Option<&crate::auth::Identity>,
) -> crate::error::Result<()> {
    patch.last_updated_by = user.map(|u| u.email.clone());
    repo.update(id, patch).await
}

/// Manual delete path used by the form layer.
///
/// # Errors
///
/// Returns an error if the repository rejects the delete.
pub async fn delete_task(
    repo: &dyn crate::store::TaskRepository,
    id: &str,
) -> crate::error::Result<()> {
    repo.delete(id).await
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn task(order: u32, title: &str, status: TaskStatus) -> Task {
        Task {
            id: format!("t{order}"),
            order_number: order,
            title: title.to_owned(),
            status,
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
    fn order_number_starts_at_one() {
        assert_eq!(next_order_number(&[]), 1);
    }

    #[test]
    fn order_number_is_max_plus_one() {
        let tasks = vec![
            task(3, "A", TaskStatus::ToCheck),
            task(7, "B", TaskStatus::GasOpened),
            task(5, "C", TaskStatus::DepositPaid),
        ];
        assert_eq!(next_order_number(&tasks), 8);
    }

    #[test]
    fn status_tokens_roundtrip() {
        for status in TaskStatus::ALL {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("GAZ_ACILDI".parse::<TaskStatus>().is_err());
        assert!("to_check".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn status_serde_uses_wire_tokens() {
        let json = serde_json::to_string(&TaskStatus::GasOpened).unwrap();
        assert_eq!(json, "\"GAS_OPENED\"");
        let back: TaskStatus = serde_json::from_str("\"SERVICE_DIRECTED\"").unwrap();
        assert_eq!(back, TaskStatus::ServiceDirected);
    }

    #[test]
    fn task_detail_fields_use_document_names() {
        let mut t = task(1, "Ahmet Bey", TaskStatus::ToCheck);
        t.date = Some("12 Mayıs".to_owned());
        t.service_serial_number = Some("SN-42".to_owned());

        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["date"], "12 Mayıs");
        assert_eq!(json["serviceSerialNumber"], "SN-42");
        assert_eq!(json["orderNumber"], 1);
        // Absent detail fields stay out of the document.
        assert!(json.get("phone").is_none());

        let back: Task = serde_json::from_value(json).unwrap();
        assert_eq!(back.date.as_deref(), Some("12 Mayıs"));
    }

    #[test]
    fn default_status_is_first_stage() {
        assert_eq!(TaskStatus::default(), TaskStatus::ToCheck);
    }
}
