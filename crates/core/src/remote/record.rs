//! Defensive accessors over loosely-typed remote payloads.
//!
//! Remote field sets drift between deployments and versions, so every
//! accessor fails closed: a missing or mistyped field reads as `None` (or the
//! documented default) instead of raising an error. Typed views per resource
//! kind enumerate exactly the fields the reconciler relies on.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Default maximum points for a grade item that does not report one.
pub const DEFAULT_GRADE_MAX: f64 = 100.0;

/// An untyped key-value record as returned by a resource fetcher.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    /// Wrap a JSON object. Non-object values yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Set a field, returning the record (used to stamp parent context onto nested records).
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.0.insert(key.to_string(), value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Trimmed, non-empty string field. Numbers are rendered as strings.
    pub fn str(&self, key: &str) -> Option<String> {
        let s = match self.0.get(key)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }

    /// Integer field, accepting numeric strings.
    pub fn i64(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating-point field, accepting numeric strings.
    pub fn f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Epoch-seconds field as a timestamp. Zero, negative or absent reads as no date.
    pub fn epoch(&self, key: &str) -> Option<DateTime<Utc>> {
        self.i64(key)
            .filter(|secs| *secs > 0)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// First non-empty string among `keys`.
    pub fn first_str(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.str(k))
    }

    /// First integer among `keys`.
    pub fn first_i64(&self, keys: &[&str]) -> Option<i64> {
        keys.iter().find_map(|k| self.i64(k))
    }

    /// Nested array of object records under `key`. Anything else reads as empty.
    pub fn records(&self, key: &str) -> Vec<RawRecord> {
        match self.0.get(key) {
            Some(value) => records_from(value),
            None => Vec::new(),
        }
    }
}

/// Collect the object elements of a JSON array; non-arrays yield nothing.
pub fn records_from(value: &Value) -> Vec<RawRecord> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .cloned()
                .filter_map(RawRecord::from_value)
                .collect()
        })
        .unwrap_or_default()
}

/// A course the user is enrolled in.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCourse {
    pub remote_id: i64,
    pub short_code: String,
    pub full_name: String,
}

impl RemoteCourse {
    pub fn from_raw(raw: &RawRecord) -> Option<Self> {
        let remote_id = raw.i64("id")?;
        let short_code = raw.str("shortname").unwrap_or_default();
        let full_name = raw
            .first_str(&["fullname", "displayname"])
            .unwrap_or_else(|| short_code.clone());
        if short_code.is_empty() && full_name.is_empty() {
            return None;
        }
        Some(Self {
            remote_id,
            short_code,
            full_name,
        })
    }
}

/// An assignment; written into the local Task entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAssignment {
    pub remote_id: Option<i64>,
    pub course_remote_id: Option<i64>,
    pub title: String,
    pub due: Option<DateTime<Utc>>,
    pub description: Option<String>,
}

impl RemoteAssignment {
    pub fn from_raw(raw: &RawRecord) -> Option<Self> {
        Some(Self {
            remote_id: raw.i64("id"),
            course_remote_id: raw.first_i64(&["courseid", "course"]),
            title: raw.str("name")?,
            due: raw.epoch("duedate"),
            description: raw.str("intro"),
        })
    }
}

/// A grade item from the user grade report.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteGradeItem {
    pub remote_id: Option<i64>,
    pub course_remote_id: Option<i64>,
    pub name: String,
    pub score: Option<f64>,
    pub max_points: f64,
}

impl RemoteGradeItem {
    pub fn from_raw(raw: &RawRecord) -> Option<Self> {
        let name = raw.str("itemname").or_else(|| {
            // The course total row carries no item name.
            (raw.str("itemtype").as_deref() == Some("course")).then(|| "Course total".to_string())
        })?;
        Some(Self {
            remote_id: raw.i64("id"),
            course_remote_id: raw.first_i64(&["courseid", "course"]),
            name,
            score: raw.f64("graderaw"),
            max_points: raw.f64("grademax").unwrap_or(DEFAULT_GRADE_MAX),
        })
    }
}

/// A calendar event; written into the local Task entity.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteCalendarEvent {
    pub remote_id: Option<i64>,
    pub course_remote_id: Option<i64>,
    pub title: String,
    pub starts: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub event_type: Option<String>,
}

impl RemoteCalendarEvent {
    pub fn from_raw(raw: &RawRecord) -> Option<Self> {
        Some(Self {
            remote_id: raw.i64("id"),
            // Site-wide events report courseid 0 or 1 depending on version; 0 means none.
            course_remote_id: raw.first_i64(&["courseid", "course"]).filter(|id| *id > 0),
            title: raw.str("name")?,
            starts: raw.epoch("timestart"),
            description: raw.str("description"),
            event_type: raw.str("eventtype"),
        })
    }
}

/// An attendance session. The remote id is a true primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteAttendanceSession {
    pub remote_id: i64,
    pub course_remote_id: Option<i64>,
    pub starts: Option<DateTime<Utc>>,
    pub duration_secs: Option<i64>,
    pub description: Option<String>,
    pub room: Option<String>,
}

impl RemoteAttendanceSession {
    pub fn from_raw(raw: &RawRecord) -> Option<Self> {
        Some(Self {
            remote_id: raw.i64("id")?,
            course_remote_id: raw.first_i64(&["courseid", "course"]),
            starts: raw.epoch("sessdate"),
            duration_secs: raw.i64("duration").filter(|d| *d > 0),
            description: raw.str("description"),
            room: raw.first_str(&["room", "location"]),
        })
    }
}
