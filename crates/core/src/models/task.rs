use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::{Priority, TaskSource};

/// A to-do item, imported from assignments or calendar events or created locally.
///
/// `show_on_calendar` and `completed` are owned by the user and never written by sync.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    pub source: TaskSource,
    /// Source-qualified remote identifier such as `assignment:12`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_ref: Option<String>,
    pub show_on_calendar: bool,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Build the source-qualified remote reference stored on imported tasks.
pub fn remote_ref(source: TaskSource, remote_id: i64) -> String {
    format!("{}:{remote_id}", source.as_str())
}
