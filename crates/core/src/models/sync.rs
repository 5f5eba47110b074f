use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::common::ResourceKind;

/// Status of a recorded sync run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Running,
    Completed,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Running => "running",
            SyncStatus::Completed => "completed",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "completed" => SyncStatus::Completed,
            "running" => SyncStatus::Running,
            _ => SyncStatus::Failed,
        }
    }
}

/// Coarse, externally visible state of the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum SyncState {
    Idle,
    Probing,
    Fetching,
    Reconciling,
    Completed { at: DateTime<Utc> },
    Failed { message: String },
}

impl SyncState {
    /// True while a cycle is in flight.
    pub fn is_syncing(&self) -> bool {
        matches!(
            self,
            SyncState::Probing | SyncState::Fetching | SyncState::Reconciling
        )
    }
}

/// Per-record tallies for one resource kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileCounts {
    pub created: i64,
    pub updated: i64,
    /// Matched an existing entity whose authoritative fields already agreed.
    #[serde(default)]
    pub unchanged: i64,
    /// Records dropped because required fields were missing.
    pub skipped: i64,
}

impl ReconcileCounts {
    /// Records that resolved to a local entity.
    pub fn total(&self) -> i64 {
        self.created + self.updated + self.unchanged
    }
}

/// Per-kind tallies for one sync run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SyncCounts {
    pub enrollments: ReconcileCounts,
    pub assignments: ReconcileCounts,
    pub grades: ReconcileCounts,
    pub calendar_events: ReconcileCounts,
    pub attendance_sessions: ReconcileCounts,
    /// Courses whose attendance fetch failed and were skipped.
    #[serde(default)]
    pub attendance_skipped_courses: Vec<i64>,
    /// Kinds whose fetch failed, or that depended on one that did.
    #[serde(default)]
    pub skipped_kinds: Vec<ResourceKind>,
}

impl SyncCounts {
    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut ReconcileCounts {
        match kind {
            ResourceKind::Enrollments => &mut self.enrollments,
            ResourceKind::Assignments => &mut self.assignments,
            ResourceKind::Grades => &mut self.grades,
            ResourceKind::CalendarEvents => &mut self.calendar_events,
            ResourceKind::AttendanceSessions => &mut self.attendance_sessions,
        }
    }

    pub fn was_skipped(&self, kind: ResourceKind) -> bool {
        self.skipped_kinds.contains(&kind)
    }

    pub fn get(&self, kind: ResourceKind) -> ReconcileCounts {
        match kind {
            ResourceKind::Enrollments => self.enrollments,
            ResourceKind::Assignments => self.assignments,
            ResourceKind::Grades => self.grades,
            ResourceKind::CalendarEvents => self.calendar_events,
            ResourceKind::AttendanceSessions => self.attendance_sessions,
        }
    }
}

/// A record of a single sync cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncRun {
    pub id: i64,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Remote functions probed as available during this run.
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub counts: SyncCounts,
}
