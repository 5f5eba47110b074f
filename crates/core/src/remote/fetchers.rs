//! Resource fetchers: one remote function plus parameters per resource kind,
//! normalized into flat lists of [`RawRecord`]s.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::client::{RemoteApi, RpcParams};
use super::record::{records_from, RawRecord};
use super::RemoteConfig;
use crate::capability::ATTENDANCE_GET_SESSIONS;
use crate::error::{Result, SatchelError};

pub const SITE_INFO: &str = "core_webservice_get_site_info";
pub const ENROLLED_COURSES: &str = "core_enrol_get_users_courses";
pub const ASSIGNMENTS: &str = "mod_assign_get_assignments";
pub const GRADE_ITEMS: &str = "gradereport_user_get_grade_items";
pub const CALENDAR_EVENTS: &str = "core_calendar_get_calendar_events";

/// Time window for the calendar fetch, relative to the moment of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarWindow {
    pub days_back: i64,
    pub days_ahead: i64,
}

impl Default for CalendarWindow {
    fn default() -> Self {
        Self {
            days_back: 14,
            days_ahead: 60,
        }
    }
}

impl CalendarWindow {
    pub fn bounds(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now - Duration::days(self.days_back),
            now + Duration::days(self.days_ahead),
        )
    }
}

/// Outcome of the per-course attendance loop.
#[derive(Debug, Default)]
pub struct AttendanceFetch {
    pub records: Vec<RawRecord>,
    /// Courses whose call failed and were skipped.
    pub failed_courses: Vec<i64>,
}

/// Reject HTTP 200 bodies that carry an application-level exception.
fn check_exception(function: &str, value: &Value) -> Result<()> {
    let Some(obj) = value.as_object() else {
        return Ok(());
    };
    if !obj.contains_key("exception") && !obj.contains_key("errorcode") {
        return Ok(());
    }
    let code = obj
        .get("errorcode")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let message = obj.get("message").and_then(Value::as_str).unwrap_or("");
    Err(SatchelError::Sync(format!(
        "{function} raised {code}: {message}"
    )))
}

/// Fetches resource collections for one remote configuration.
pub struct ResourceFetcher<'a> {
    api: &'a dyn RemoteApi,
    config: &'a RemoteConfig,
}

impl<'a> ResourceFetcher<'a> {
    pub fn new(api: &'a dyn RemoteApi, config: &'a RemoteConfig) -> Self {
        Self { api, config }
    }

    async fn call(&self, function: &str, params: &RpcParams) -> Result<Value> {
        let value = self.api.call(self.config, function, params).await?;
        check_exception(function, &value)?;
        Ok(value)
    }

    /// Remote user id of the token owner, used to scope user-level fetches.
    pub async fn site_user_id(&self) -> Result<i64> {
        let value = self.call(SITE_INFO, &RpcParams::new()).await?;
        RawRecord::from_value(value)
            .and_then(|site| site.i64("userid"))
            .ok_or_else(|| SatchelError::Sync(format!("{SITE_INFO} response has no userid")))
    }

    /// Courses the user is enrolled in.
    pub async fn enrollments(&self, user_id: i64) -> Result<Vec<RawRecord>> {
        let value = self
            .call(ENROLLED_COURSES, &RpcParams::new().with("userid", user_id))
            .await?;
        let records = records_from(&value);
        info!(count = records.len(), "Fetched enrollments");
        Ok(records)
    }

    /// Assignments for all `course_ids` in a single batched call.
    pub async fn assignments(&self, course_ids: &[i64]) -> Result<Vec<RawRecord>> {
        if course_ids.is_empty() {
            debug!("No courses, skipping assignment fetch");
            return Ok(Vec::new());
        }
        let value = self
            .call(
                ASSIGNMENTS,
                &RpcParams::new().with_indexed("courseids", course_ids),
            )
            .await?;

        let mut records = Vec::new();
        for course in RawRecord::from_value(value)
            .map(|root| root.records("courses"))
            .unwrap_or_default()
        {
            let course_id = course.i64("id");
            for assignment in course.records("assignments") {
                records.push(stamp_course(assignment, course_id));
            }
        }
        info!(count = records.len(), "Fetched assignments");
        Ok(records)
    }

    /// Grade items across all of the user's courses, in one call.
    pub async fn grade_items(&self, user_id: i64) -> Result<Vec<RawRecord>> {
        let value = self
            .call(GRADE_ITEMS, &RpcParams::new().with("userid", user_id))
            .await?;

        let mut records = Vec::new();
        for report in RawRecord::from_value(value)
            .map(|root| root.records("usergrades"))
            .unwrap_or_default()
        {
            let course_id = report.i64("courseid");
            for item in report.records("gradeitems") {
                records.push(stamp_course(item, course_id));
            }
        }
        info!(count = records.len(), "Fetched grade items");
        Ok(records)
    }

    /// Calendar events inside `window` around `now`.
    pub async fn calendar_events(
        &self,
        window: CalendarWindow,
        now: DateTime<Utc>,
    ) -> Result<Vec<RawRecord>> {
        let (start, end) = window.bounds(now);
        let params = RpcParams::new()
            .with("options[userevents]", 1)
            .with("options[siteevents]", 1)
            .with("options[timestart]", start.timestamp())
            .with("options[timeend]", end.timestamp());
        let value = self.call(CALENDAR_EVENTS, &params).await?;

        let records = RawRecord::from_value(value)
            .map(|root| root.records("events"))
            .unwrap_or_default();
        info!(count = records.len(), "Fetched calendar events");
        Ok(records)
    }

    /// Attendance sessions, one call per course. A failing course is skipped
    /// and the loop continues with the next one.
    pub async fn attendance_sessions(&self, course_ids: &[i64]) -> AttendanceFetch {
        let mut fetch = AttendanceFetch::default();

        for &course_id in course_ids {
            let params = RpcParams::new().with("courseid", course_id);
            match self.call(ATTENDANCE_GET_SESSIONS, &params).await {
                Ok(value) => {
                    let sessions = match &value {
                        Value::Array(_) => records_from(&value),
                        _ => RawRecord::from_value(value)
                            .map(|root| root.records("sessions"))
                            .unwrap_or_default(),
                    };
                    debug!(course_id, count = sessions.len(), "Fetched attendance sessions");
                    fetch.records.extend(
                        sessions
                            .into_iter()
                            .map(|s| stamp_course(s, Some(course_id))),
                    );
                }
                Err(e) => {
                    warn!(course_id, error = %e, "Attendance fetch failed, skipping course");
                    fetch.failed_courses.push(course_id);
                }
            }
        }

        info!(
            count = fetch.records.len(),
            skipped_courses = fetch.failed_courses.len(),
            "Fetched attendance sessions"
        );
        fetch
    }
}

/// Record the parent course on a nested record that does not name one itself.
fn stamp_course(record: RawRecord, course_id: Option<i64>) -> RawRecord {
    match course_id {
        Some(id) if record.i64("courseid").is_none() => record.with("courseid", json!(id)),
        _ => record,
    }
}
