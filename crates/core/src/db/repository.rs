use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    attendance::AttendanceSession,
    common::Priority,
    course::Course,
    grade::Grade,
    sync::{SyncCounts, SyncRun, SyncStatus},
    task::Task,
};

#[async_trait]
pub trait CourseRepository: Send + Sync {
    async fn get_course(&self, id: &str) -> Result<Option<Course>>;
    async fn list_courses(&self) -> Result<Vec<Course>>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn get_task(&self, id: &str) -> Result<Option<Task>>;
    async fn list_tasks(&self) -> Result<Vec<Task>>;
    async fn list_tasks_for_course(&self, course_id: &str) -> Result<Vec<Task>>;
    async fn set_task_show_on_calendar(&self, id: &str, show: bool) -> Result<bool>;
    async fn set_task_completed(&self, id: &str, completed: bool) -> Result<bool>;
    async fn set_task_priority(&self, id: &str, priority: Option<Priority>) -> Result<bool>;
}

#[async_trait]
pub trait GradeRepository: Send + Sync {
    async fn list_grades(&self) -> Result<Vec<Grade>>;
    async fn list_grades_for_course(&self, course_id: &str) -> Result<Vec<Grade>>;
}

#[async_trait]
pub trait AttendanceRepository: Send + Sync {
    async fn get_attendance_session(&self, remote_id: i64) -> Result<Option<AttendanceSession>>;
    async fn list_attendance_sessions(&self) -> Result<Vec<AttendanceSession>>;
}

#[async_trait]
pub trait SyncRepository: Send + Sync {
    async fn create_sync_run(&self, started_at: DateTime<Utc>) -> Result<SyncRun>;
    async fn finish_sync_run(
        &self,
        id: i64,
        status: SyncStatus,
        error_message: Option<&str>,
        capabilities: &[String],
        counts: &SyncCounts,
    ) -> Result<()>;
    async fn get_sync_run(&self, id: i64) -> Result<Option<SyncRun>>;
    async fn get_latest_sync_run(&self) -> Result<Option<SyncRun>>;
}

/// Opens transaction-scoped write batches against the entity graph.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn begin_batch(&self) -> Result<Box<dyn EntityBatch>>;
}

/// Predicate finds and writes inside one transaction.
///
/// Dropping a batch without calling [`EntityBatch::commit`] discards its writes.
/// `update_*` methods write only the columns the remote side is authoritative
/// for; local-only fields and creation timestamps are never touched.
#[async_trait]
pub trait EntityBatch: Send {
    /// Courses whose code equals `code` or whose name equals `name`, rows
    /// matching both first, then oldest first. Empty arguments never match.
    async fn find_courses(&mut self, code: &str, name: &str) -> Result<Vec<Course>>;
    async fn find_course_by_remote_id(&mut self, remote_id: i64) -> Result<Option<Course>>;
    async fn insert_course(&mut self, course: &Course) -> Result<()>;
    async fn update_course(&mut self, course: &Course) -> Result<()>;

    /// A task whose title, due date and course all equal the arguments (absent matches absent).
    async fn find_task(
        &mut self,
        title: &str,
        due_date: Option<DateTime<Utc>>,
        course_id: Option<&str>,
    ) -> Result<Option<Task>>;
    async fn find_task_by_remote_ref(&mut self, remote_ref: &str) -> Result<Option<Task>>;
    async fn insert_task(&mut self, task: &Task) -> Result<()>;
    async fn update_task(&mut self, task: &Task) -> Result<()>;

    async fn find_grade(&mut self, name: &str, course_id: Option<&str>) -> Result<Option<Grade>>;
    async fn find_grade_by_remote_id(&mut self, remote_id: i64) -> Result<Option<Grade>>;
    async fn insert_grade(&mut self, grade: &Grade) -> Result<()>;
    async fn update_grade(&mut self, grade: &Grade) -> Result<()>;

    async fn find_attendance_session(&mut self, remote_id: i64)
        -> Result<Option<AttendanceSession>>;
    async fn insert_attendance_session(&mut self, session: &AttendanceSession) -> Result<()>;
    async fn update_attendance_session(&mut self, session: &AttendanceSession) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;
}

/// Combined repository trait for the full local store.
pub trait SatchelRepository:
    CourseRepository
    + TaskRepository
    + GradeRepository
    + AttendanceRepository
    + SyncRepository
    + EntityStore
{
}
