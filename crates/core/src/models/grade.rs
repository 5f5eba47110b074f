use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A grade item. The remote side is authoritative for score and maximum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub max_points: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
