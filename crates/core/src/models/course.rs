use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A local course, matched against remote enrollments by short code or full name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn course_camel_case_fields() {
        let course = Course {
            id: "c-1".to_string(),
            code: "CS101".to_string(),
            name: "Intro to CS".to_string(),
            remote_id: None,
            created_at: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
        };
        let json = serde_json::to_string(&course).unwrap();
        assert!(json.contains("\"createdAt\""));
        assert!(!json.contains("\"remoteId\""));
    }
}
