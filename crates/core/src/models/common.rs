use serde::{Deserialize, Serialize};

/// Task priority. Imported tasks default to `Medium`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Where a task came from. Assignments and calendar events share the Task entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    Assignment,
    CalendarEvent,
    Manual,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSource::Assignment => "assignment",
            TaskSource::CalendarEvent => "calendar_event",
            TaskSource::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "assignment" => TaskSource::Assignment,
            "calendar_event" => TaskSource::CalendarEvent,
            _ => TaskSource::Manual,
        }
    }
}

/// The unit of fetch/reconcile granularity, in sync order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Enrollments,
    Assignments,
    Grades,
    CalendarEvents,
    AttendanceSessions,
}

impl ResourceKind {
    /// All kinds in the order a sync cycle processes them.
    pub const ORDERED: [ResourceKind; 5] = [
        ResourceKind::Enrollments,
        ResourceKind::Assignments,
        ResourceKind::Grades,
        ResourceKind::CalendarEvents,
        ResourceKind::AttendanceSessions,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Enrollments => "enrollments",
            ResourceKind::Assignments => "assignments",
            ResourceKind::Grades => "grades",
            ResourceKind::CalendarEvents => "calendar_events",
            ResourceKind::AttendanceSessions => "attendance_sessions",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_strings_parse_back() {
        for p in [Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(Priority::parse(p.as_str()), Some(p));
        }
        assert_eq!(Priority::parse("urgent"), None);
    }

    #[test]
    fn task_source_unknown_is_manual() {
        assert_eq!(TaskSource::parse("calendar_event"), TaskSource::CalendarEvent);
        assert_eq!(TaskSource::parse("something"), TaskSource::Manual);
    }

    #[test]
    fn resource_kind_order_starts_with_enrollments() {
        assert_eq!(ResourceKind::ORDERED[0], ResourceKind::Enrollments);
        assert_eq!(
            ResourceKind::ORDERED[4],
            ResourceKind::AttendanceSessions
        );
        assert_eq!(ResourceKind::CalendarEvents.to_string(), "calendar_events");
    }

    #[test]
    fn resource_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ResourceKind::AttendanceSessions).unwrap(),
            "\"attendance_sessions\""
        );
    }
}
