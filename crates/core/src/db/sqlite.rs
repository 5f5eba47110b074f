use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::error::{Result, SatchelError};
use crate::models::{
    attendance::AttendanceSession,
    common::{Priority, TaskSource},
    course::Course,
    grade::Grade,
    sync::{SyncCounts, SyncRun, SyncStatus},
    task::Task,
};

use super::repository::{
    AttendanceRepository, CourseRepository, EntityBatch, EntityStore, GradeRepository,
    SatchelRepository, SyncRepository, TaskRepository,
};

const COURSE_COLUMNS: &str = "id, code, name, remote_id, created_at, updated_at";
const TASK_COLUMNS: &str = "id, title, due_date, course_id, description, priority, source, remote_ref, show_on_calendar, completed, created_at, updated_at";
const GRADE_COLUMNS: &str =
    "id, name, course_id, score, max_points, remote_id, created_at, updated_at";
const SESSION_COLUMNS: &str =
    "id, remote_id, course_id, starts_at, duration_secs, description, room, created_at, updated_at";
const SYNC_RUN_COLUMNS: &str =
    "id, status, started_at, completed_at, error_message, capabilities, counts";

#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl SatchelRepository for SqliteRepository {}

// -- Helper functions for converting between rows and entities --

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_opt_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|v| {
        DateTime::parse_from_rfc3339(&v)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Second precision in UTC, so stored due dates compare exactly in key predicates.
fn datetime_to_str(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn opt_datetime_to_str(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(datetime_to_str)
}

fn row_to_course(r: &SqliteRow) -> Course {
    Course {
        id: r.get("id"),
        code: r.get("code"),
        name: r.get("name"),
        remote_id: r.get("remote_id"),
        created_at: parse_datetime(r.get("created_at")),
        updated_at: parse_datetime(r.get("updated_at")),
    }
}

fn row_to_task(r: &SqliteRow) -> Task {
    let priority: Option<String> = r.get("priority");
    Task {
        id: r.get("id"),
        title: r.get("title"),
        due_date: parse_opt_datetime(r.get("due_date")),
        course_id: r.get("course_id"),
        description: r.get("description"),
        priority: priority.as_deref().and_then(Priority::parse),
        source: TaskSource::parse(r.get("source")),
        remote_ref: r.get("remote_ref"),
        show_on_calendar: r.get("show_on_calendar"),
        completed: r.get("completed"),
        created_at: parse_datetime(r.get("created_at")),
        updated_at: parse_datetime(r.get("updated_at")),
    }
}

fn row_to_grade(r: &SqliteRow) -> Grade {
    Grade {
        id: r.get("id"),
        name: r.get("name"),
        course_id: r.get("course_id"),
        score: r.get("score"),
        max_points: r.get("max_points"),
        remote_id: r.get("remote_id"),
        created_at: parse_datetime(r.get("created_at")),
        updated_at: parse_datetime(r.get("updated_at")),
    }
}

fn row_to_session(r: &SqliteRow) -> AttendanceSession {
    AttendanceSession {
        id: r.get("id"),
        remote_id: r.get("remote_id"),
        course_id: r.get("course_id"),
        starts_at: parse_opt_datetime(r.get("starts_at")),
        duration_secs: r.get("duration_secs"),
        description: r.get("description"),
        room: r.get("room"),
        created_at: parse_datetime(r.get("created_at")),
        updated_at: parse_datetime(r.get("updated_at")),
    }
}

fn row_to_sync_run(r: &SqliteRow) -> SyncRun {
    let capabilities: String = r.get("capabilities");
    let counts: String = r.get("counts");
    SyncRun {
        id: r.get("id"),
        status: SyncStatus::parse(r.get("status")),
        started_at: parse_datetime(r.get("started_at")),
        completed_at: parse_opt_datetime(r.get("completed_at")),
        error_message: r.get("error_message"),
        capabilities: serde_json::from_str(&capabilities).unwrap_or_default(),
        counts: serde_json::from_str(&counts).unwrap_or_default(),
    }
}

// -- CourseRepository --

#[async_trait]
impl CourseRepository for SqliteRepository {
    async fn get_course(&self, id: &str) -> Result<Option<Course>> {
        let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_course))
    }

    async fn list_courses(&self) -> Result<Vec<Course>> {
        let rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses ORDER BY code, name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_course).collect())
    }
}

// -- TaskRepository --

#[async_trait]
impl TaskRepository for SqliteRepository {
    async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(row_to_task))
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY due_date IS NULL, due_date, title"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn list_tasks_for_course(&self, course_id: &str) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE course_id = ?1 ORDER BY due_date IS NULL, due_date, title"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_task).collect())
    }

    async fn set_task_show_on_calendar(&self, id: &str, show: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE tasks SET show_on_calendar = ?1 WHERE id = ?2")
            .bind(show)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_task_completed(&self, id: &str, completed: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE tasks SET completed = ?1 WHERE id = ?2")
            .bind(completed)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_task_priority(&self, id: &str, priority: Option<Priority>) -> Result<bool> {
        let result = sqlx::query("UPDATE tasks SET priority = ?1 WHERE id = ?2")
            .bind(priority.map(|p| p.as_str()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// -- GradeRepository --

#[async_trait]
impl GradeRepository for SqliteRepository {
    async fn list_grades(&self) -> Result<Vec<Grade>> {
        let rows = sqlx::query(&format!(
            "SELECT {GRADE_COLUMNS} FROM grades ORDER BY course_id, name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_grade).collect())
    }

    async fn list_grades_for_course(&self, course_id: &str) -> Result<Vec<Grade>> {
        let rows = sqlx::query(&format!(
            "SELECT {GRADE_COLUMNS} FROM grades WHERE course_id = ?1 ORDER BY name"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_grade).collect())
    }
}

// -- AttendanceRepository --

#[async_trait]
impl AttendanceRepository for SqliteRepository {
    async fn get_attendance_session(&self, remote_id: i64) -> Result<Option<AttendanceSession>> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM attendance_sessions WHERE remote_id = ?1"
        ))
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn list_attendance_sessions(&self) -> Result<Vec<AttendanceSession>> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM attendance_sessions ORDER BY starts_at, remote_id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_session).collect())
    }
}

// -- SyncRepository --

#[async_trait]
impl SyncRepository for SqliteRepository {
    async fn create_sync_run(&self, started_at: DateTime<Utc>) -> Result<SyncRun> {
        let started = datetime_to_str(&started_at);
        let result =
            sqlx::query("INSERT INTO sync_runs (status, started_at) VALUES (?1, ?2)")
                .bind(SyncStatus::Running.as_str())
                .bind(&started)
                .execute(&self.pool)
                .await?;

        Ok(SyncRun {
            id: result.last_insert_rowid(),
            status: SyncStatus::Running,
            started_at: parse_datetime(&started),
            completed_at: None,
            error_message: None,
            capabilities: Vec::new(),
            counts: SyncCounts::default(),
        })
    }

    async fn finish_sync_run(
        &self,
        id: i64,
        status: SyncStatus,
        error_message: Option<&str>,
        capabilities: &[String],
        counts: &SyncCounts,
    ) -> Result<()> {
        let capabilities = serde_json::to_string(capabilities)
            .map_err(|e| SatchelError::Serialization(e.to_string()))?;
        let counts =
            serde_json::to_string(counts).map_err(|e| SatchelError::Serialization(e.to_string()))?;
        sqlx::query(
            "UPDATE sync_runs SET status = ?1, completed_at = ?2, error_message = ?3, capabilities = ?4, counts = ?5 WHERE id = ?6",
        )
        .bind(status.as_str())
        .bind(datetime_to_str(&Utc::now()))
        .bind(error_message)
        .bind(capabilities)
        .bind(counts)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_sync_run(&self, id: i64) -> Result<Option<SyncRun>> {
        let row = sqlx::query(&format!(
            "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_sync_run))
    }

    async fn get_latest_sync_run(&self) -> Result<Option<SyncRun>> {
        let row = sqlx::query(&format!(
            "SELECT {SYNC_RUN_COLUMNS} FROM sync_runs ORDER BY id DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_sync_run))
    }
}

// -- EntityStore --

#[async_trait]
impl EntityStore for SqliteRepository {
    async fn begin_batch(&self) -> Result<Box<dyn EntityBatch>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteBatch { tx: Some(tx) }))
    }
}

/// A write batch backed by one SQLite transaction.
pub struct SqliteBatch {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteBatch {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Sqlite>> {
        self.tx
            .as_mut()
            .ok_or_else(|| SatchelError::Reconciliation("batch already committed".into()))
    }
}

#[async_trait]
impl EntityBatch for SqliteBatch {
    async fn find_courses(&mut self, code: &str, name: &str) -> Result<Vec<Course>> {
        let tx = self.tx()?;
        let rows = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses
             WHERE (?1 <> '' AND code = ?1) OR (?2 <> '' AND name = ?2)
             ORDER BY (code = ?1 AND name = ?2) DESC, created_at, id"
        ))
        .bind(code)
        .bind(name)
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows.iter().map(row_to_course).collect())
    }

    async fn find_course_by_remote_id(&mut self, remote_id: i64) -> Result<Option<Course>> {
        let tx = self.tx()?;
        let row = sqlx::query(&format!(
            "SELECT {COURSE_COLUMNS} FROM courses WHERE remote_id = ?1 ORDER BY created_at, id LIMIT 1"
        ))
        .bind(remote_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.as_ref().map(row_to_course))
    }

    async fn insert_course(&mut self, course: &Course) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO courses (id, code, name, remote_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&course.id)
        .bind(&course.code)
        .bind(&course.name)
        .bind(course.remote_id)
        .bind(datetime_to_str(&course.created_at))
        .bind(datetime_to_str(&course.updated_at))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_course(&mut self, course: &Course) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            "UPDATE courses SET code = ?1, name = ?2, remote_id = ?3, updated_at = ?4 WHERE id = ?5",
        )
        .bind(&course.code)
        .bind(&course.name)
        .bind(course.remote_id)
        .bind(datetime_to_str(&course.updated_at))
        .bind(&course.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_task(
        &mut self,
        title: &str,
        due_date: Option<DateTime<Utc>>,
        course_id: Option<&str>,
    ) -> Result<Option<Task>> {
        let tx = self.tx()?;
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE title = ?1 AND due_date IS ?2 AND course_id IS ?3
             ORDER BY created_at, id
             LIMIT 1"
        ))
        .bind(title)
        .bind(opt_datetime_to_str(&due_date))
        .bind(course_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.as_ref().map(row_to_task))
    }

    async fn find_task_by_remote_ref(&mut self, remote_ref: &str) -> Result<Option<Task>> {
        let tx = self.tx()?;
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE remote_ref = ?1 ORDER BY created_at, id LIMIT 1"
        ))
        .bind(remote_ref)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.as_ref().map(row_to_task))
    }

    async fn insert_task(&mut self, task: &Task) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO tasks (id, title, due_date, course_id, description, priority, source, remote_ref, show_on_calendar, completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .bind(&task.id)
        .bind(&task.title)
        .bind(opt_datetime_to_str(&task.due_date))
        .bind(&task.course_id)
        .bind(&task.description)
        .bind(task.priority.map(|p| p.as_str()))
        .bind(task.source.as_str())
        .bind(&task.remote_ref)
        .bind(task.show_on_calendar)
        .bind(task.completed)
        .bind(datetime_to_str(&task.created_at))
        .bind(datetime_to_str(&task.updated_at))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_task(&mut self, task: &Task) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            "UPDATE tasks SET title = ?1, due_date = ?2, course_id = ?3, description = ?4, priority = ?5, remote_ref = ?6, updated_at = ?7
             WHERE id = ?8",
        )
        .bind(&task.title)
        .bind(opt_datetime_to_str(&task.due_date))
        .bind(&task.course_id)
        .bind(&task.description)
        .bind(task.priority.map(|p| p.as_str()))
        .bind(&task.remote_ref)
        .bind(datetime_to_str(&task.updated_at))
        .bind(&task.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_grade(&mut self, name: &str, course_id: Option<&str>) -> Result<Option<Grade>> {
        let tx = self.tx()?;
        let row = sqlx::query(&format!(
            "SELECT {GRADE_COLUMNS} FROM grades
             WHERE name = ?1 AND course_id IS ?2
             ORDER BY created_at, id
             LIMIT 1"
        ))
        .bind(name)
        .bind(course_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.as_ref().map(row_to_grade))
    }

    async fn find_grade_by_remote_id(&mut self, remote_id: i64) -> Result<Option<Grade>> {
        let tx = self.tx()?;
        let row = sqlx::query(&format!(
            "SELECT {GRADE_COLUMNS} FROM grades WHERE remote_id = ?1 ORDER BY created_at, id LIMIT 1"
        ))
        .bind(remote_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.as_ref().map(row_to_grade))
    }

    async fn insert_grade(&mut self, grade: &Grade) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO grades (id, name, course_id, score, max_points, remote_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(&grade.id)
        .bind(&grade.name)
        .bind(&grade.course_id)
        .bind(grade.score)
        .bind(grade.max_points)
        .bind(grade.remote_id)
        .bind(datetime_to_str(&grade.created_at))
        .bind(datetime_to_str(&grade.updated_at))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_grade(&mut self, grade: &Grade) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            "UPDATE grades SET name = ?1, course_id = ?2, score = ?3, max_points = ?4, remote_id = ?5, updated_at = ?6
             WHERE id = ?7",
        )
        .bind(&grade.name)
        .bind(&grade.course_id)
        .bind(grade.score)
        .bind(grade.max_points)
        .bind(grade.remote_id)
        .bind(datetime_to_str(&grade.updated_at))
        .bind(&grade.id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn find_attendance_session(
        &mut self,
        remote_id: i64,
    ) -> Result<Option<AttendanceSession>> {
        let tx = self.tx()?;
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM attendance_sessions WHERE remote_id = ?1"
        ))
        .bind(remote_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.as_ref().map(row_to_session))
    }

    async fn insert_attendance_session(&mut self, session: &AttendanceSession) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            "INSERT INTO attendance_sessions (id, remote_id, course_id, starts_at, duration_secs, description, room, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&session.id)
        .bind(session.remote_id)
        .bind(&session.course_id)
        .bind(opt_datetime_to_str(&session.starts_at))
        .bind(session.duration_secs)
        .bind(&session.description)
        .bind(&session.room)
        .bind(datetime_to_str(&session.created_at))
        .bind(datetime_to_str(&session.updated_at))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn update_attendance_session(&mut self, session: &AttendanceSession) -> Result<()> {
        let tx = self.tx()?;
        sqlx::query(
            "UPDATE attendance_sessions SET course_id = ?1, starts_at = ?2, duration_secs = ?3, description = ?4, room = ?5, updated_at = ?6
             WHERE remote_id = ?7",
        )
        .bind(&session.course_id)
        .bind(opt_datetime_to_str(&session.starts_at))
        .bind(session.duration_secs)
        .bind(&session.description)
        .bind(&session.room)
        .bind(datetime_to_str(&session.updated_at))
        .bind(session.remote_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| SatchelError::Reconciliation("batch already committed".into()))?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabasePool;
    use crate::models::sync::ReconcileCounts;
    use chrono::TimeZone;

    async fn setup() -> SqliteRepository {
        let pool = DatabasePool::new_sqlite_memory().await.unwrap();
        match pool {
            DatabasePool::Sqlite(p) => SqliteRepository::new(p),
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap()
    }

    fn sample_course(id: &str, code: &str, name: &str) -> Course {
        Course {
            id: id.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            remote_id: None,
            created_at: ts(),
            updated_at: ts(),
        }
    }

    fn sample_task(id: &str, title: &str, due: Option<DateTime<Utc>>) -> Task {
        Task {
            id: id.to_string(),
            title: title.to_string(),
            due_date: due,
            course_id: None,
            description: None,
            priority: Some(Priority::Medium),
            source: TaskSource::Assignment,
            remote_ref: None,
            show_on_calendar: true,
            completed: false,
            created_at: ts(),
            updated_at: ts(),
        }
    }

    #[tokio::test]
    async fn committed_batch_is_visible() {
        let repo = setup().await;
        let mut batch = repo.begin_batch().await.unwrap();
        batch
            .insert_course(&sample_course("c-1", "CS101", "Intro to CS"))
            .await
            .unwrap();
        batch.commit().await.unwrap();

        let courses = repo.list_courses().await.unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].code, "CS101");
        assert_eq!(courses[0].created_at, ts());
    }

    #[tokio::test]
    async fn dropped_batch_rolls_back() {
        let repo = setup().await;
        {
            let mut batch = repo.begin_batch().await.unwrap();
            batch
                .insert_course(&sample_course("c-1", "CS101", "Intro to CS"))
                .await
                .unwrap();
        }
        assert!(repo.list_courses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn commit_twice_fails() {
        let repo = setup().await;
        let mut batch = repo.begin_batch().await.unwrap();
        batch.commit().await.unwrap();
        let err = batch.commit().await.unwrap_err();
        assert!(matches!(err, SatchelError::Reconciliation(_)));
    }

    #[tokio::test]
    async fn find_course_matches_either_field() {
        let repo = setup().await;
        let mut batch = repo.begin_batch().await.unwrap();
        batch
            .insert_course(&sample_course("c-1", "CS101", "Intro to CS"))
            .await
            .unwrap();

        let by_code = batch.find_courses("CS101", "Renamed").await.unwrap();
        assert_eq!(by_code.len(), 1);
        assert_eq!(by_code[0].id, "c-1");

        let by_name = batch.find_courses("CS-101", "Intro to CS").await.unwrap();
        assert_eq!(by_name[0].id, "c-1");

        assert!(batch.find_courses("MA201", "Calculus").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_course_ignores_empty_fields() {
        let repo = setup().await;
        let mut batch = repo.begin_batch().await.unwrap();
        batch
            .insert_course(&sample_course("c-1", "", "Homeroom"))
            .await
            .unwrap();
        assert!(batch.find_courses("", "Other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn find_course_prefers_full_match() {
        let repo = setup().await;
        let mut batch = repo.begin_batch().await.unwrap();
        batch
            .insert_course(&sample_course("c-1", "CS101", "Old name"))
            .await
            .unwrap();
        let mut second = sample_course("c-2", "CS101", "Intro to CS");
        second.created_at = ts() + chrono::Duration::hours(1);
        batch.insert_course(&second).await.unwrap();

        let found = batch.find_courses("CS101", "Intro to CS").await.unwrap();
        let ids: Vec<&str> = found.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c-2", "c-1"]);
    }

    #[tokio::test]
    async fn find_task_requires_all_key_fields() {
        let repo = setup().await;
        let mut batch = repo.begin_batch().await.unwrap();
        batch
            .insert_course(&sample_course("c-1", "CS101", "Intro to CS"))
            .await
            .unwrap();
        let mut task = sample_task("t-1", "HW1", Some(ts()));
        task.course_id = Some("c-1".to_string());
        batch.insert_task(&task).await.unwrap();

        assert!(batch
            .find_task("HW1", Some(ts()), Some("c-1"))
            .await
            .unwrap()
            .is_some());
        assert!(batch.find_task("HW1", Some(ts()), None).await.unwrap().is_none());
        assert!(batch.find_task("HW1", None, Some("c-1")).await.unwrap().is_none());
        assert!(batch
            .find_task("HW2", Some(ts()), Some("c-1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn find_task_matches_absent_due_date() {
        let repo = setup().await;
        let mut batch = repo.begin_batch().await.unwrap();
        batch
            .insert_task(&sample_task("t-1", "Reading", None))
            .await
            .unwrap();
        let found = batch.find_task("Reading", None, None).await.unwrap();
        assert_eq!(found.map(|t| t.id).as_deref(), Some("t-1"));
    }

    #[tokio::test]
    async fn update_task_preserves_local_fields() {
        let repo = setup().await;
        let mut batch = repo.begin_batch().await.unwrap();
        batch
            .insert_task(&sample_task("t-1", "HW1", Some(ts())))
            .await
            .unwrap();
        batch.commit().await.unwrap();

        repo.set_task_show_on_calendar("t-1", false).await.unwrap();
        repo.set_task_completed("t-1", true).await.unwrap();

        let mut batch = repo.begin_batch().await.unwrap();
        let mut task = sample_task("t-1", "HW1 (revised)", Some(ts()));
        task.show_on_calendar = true;
        task.completed = false;
        batch.update_task(&task).await.unwrap();
        batch.commit().await.unwrap();

        let stored = repo.get_task("t-1").await.unwrap().unwrap();
        assert_eq!(stored.title, "HW1 (revised)");
        assert!(!stored.show_on_calendar);
        assert!(stored.completed);
    }

    #[tokio::test]
    async fn set_task_priority_on_missing_task_reports_false() {
        let repo = setup().await;
        assert!(!repo
            .set_task_priority("nope", Some(Priority::High))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn grade_update_keeps_created_at() {
        let repo = setup().await;
        let grade = Grade {
            id: "g-1".to_string(),
            name: "Quiz 1".to_string(),
            course_id: None,
            score: Some(7.0),
            max_points: 10.0,
            remote_id: None,
            created_at: ts(),
            updated_at: ts(),
        };
        let mut batch = repo.begin_batch().await.unwrap();
        batch.insert_grade(&grade).await.unwrap();

        let mut changed = grade.clone();
        changed.score = Some(9.0);
        changed.created_at = ts() + chrono::Duration::days(3);
        changed.updated_at = ts() + chrono::Duration::days(3);
        batch.update_grade(&changed).await.unwrap();
        batch.commit().await.unwrap();

        let grades = repo.list_grades().await.unwrap();
        assert_eq!(grades.len(), 1);
        assert_eq!(grades[0].score, Some(9.0));
        assert_eq!(grades[0].created_at, ts());
        assert_eq!(grades[0].updated_at, ts() + chrono::Duration::days(3));
    }

    #[tokio::test]
    async fn attendance_remote_id_is_unique() {
        let repo = setup().await;
        let session = AttendanceSession {
            id: "s-1".to_string(),
            remote_id: 501,
            course_id: None,
            starts_at: Some(ts()),
            duration_secs: Some(3600),
            description: Some("Lecture".to_string()),
            room: None,
            created_at: ts(),
            updated_at: ts(),
        };
        let mut batch = repo.begin_batch().await.unwrap();
        batch.insert_attendance_session(&session).await.unwrap();

        let mut duplicate = session.clone();
        duplicate.id = "s-2".to_string();
        assert!(batch.insert_attendance_session(&duplicate).await.is_err());
    }

    #[tokio::test]
    async fn sync_run_lifecycle() {
        let repo = setup().await;
        let run = repo.create_sync_run(ts()).await.unwrap();
        assert_eq!(run.status, SyncStatus::Running);

        let mut counts = SyncCounts::default();
        counts.enrollments = ReconcileCounts {
            created: 2,
            updated: 0,
            unchanged: 3,
            skipped: 1,
        };
        counts.attendance_skipped_courses = vec![4];
        repo.finish_sync_run(
            run.id,
            SyncStatus::Completed,
            None,
            &["mod_attendance_get_sessions".to_string()],
            &counts,
        )
        .await
        .unwrap();

        let fetched = repo.get_sync_run(run.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, SyncStatus::Completed);
        assert_eq!(fetched.started_at, ts());
        assert!(fetched.completed_at.is_some());
        assert_eq!(fetched.capabilities, vec!["mod_attendance_get_sessions"]);
        assert_eq!(fetched.counts, counts);
    }

    #[tokio::test]
    async fn latest_sync_run_is_most_recent() {
        let repo = setup().await;
        assert!(repo.get_latest_sync_run().await.unwrap().is_none());
        let _first = repo.create_sync_run(ts()).await.unwrap();
        let second = repo.create_sync_run(ts()).await.unwrap();
        let latest = repo.get_latest_sync_run().await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }
}
