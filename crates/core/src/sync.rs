use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::capability::{CapabilityProber, CapabilitySet, ProbeMode, ATTENDANCE_GET_SESSIONS};
use crate::config::SyncSettings;
use crate::db::repository::SatchelRepository;
use crate::error::{Result, SatchelError};
use crate::models::common::ResourceKind;
use crate::models::sync::{SyncCounts, SyncRun, SyncState, SyncStatus};
use crate::reconcile::{CourseIndex, Reconciler};
use crate::remote::client::RemoteApi;
use crate::remote::fetchers::{CalendarWindow, ResourceFetcher};
use crate::remote::record::{RawRecord, RemoteCourse};
use crate::remote::RemoteConfig;

/// Everything fetched during one cycle, before reconciliation.
#[derive(Default)]
struct FetchedResources {
    enrollments: Vec<RawRecord>,
    assignments: Vec<RawRecord>,
    grades: Vec<RawRecord>,
    calendar_events: Vec<RawRecord>,
    attendance_sessions: Vec<RawRecord>,
    attendance_failed_courses: Vec<i64>,
    skipped_kinds: Vec<ResourceKind>,
}

impl FetchedResources {
    fn records(&self, kind: ResourceKind) -> &[RawRecord] {
        match kind {
            ResourceKind::Enrollments => &self.enrollments,
            ResourceKind::Assignments => &self.assignments,
            ResourceKind::Grades => &self.grades,
            ResourceKind::CalendarEvents => &self.calendar_events,
            ResourceKind::AttendanceSessions => &self.attendance_sessions,
        }
    }
}

/// Progress of the cycle in flight, recorded on the sync run whatever the outcome.
#[derive(Default)]
struct CycleReport {
    capabilities: CapabilitySet,
    counts: SyncCounts,
}

/// Clears the busy flag when the cycle ends, including on early return.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Engine that runs sync cycles from the remote platform into the local store.
///
/// At most one cycle runs at a time; a [`SyncEngine::run`] call made while
/// another is in flight returns `Ok(None)` without doing anything.
pub struct SyncEngine<R: SatchelRepository> {
    repo: Arc<R>,
    api: Arc<dyn RemoteApi>,
    settings: SyncSettings,
    probe_mode: ProbeMode,
    credentials: Mutex<Option<RemoteConfig>>,
    busy: AtomicBool,
    state: Mutex<SyncState>,
    last_completed_at: Mutex<Option<DateTime<Utc>>>,
    capabilities: Mutex<CapabilitySet>,
}

impl<R: SatchelRepository> SyncEngine<R> {
    pub fn new(repo: Arc<R>, api: Arc<dyn RemoteApi>, settings: SyncSettings) -> Self {
        Self {
            repo,
            api,
            settings,
            probe_mode: ProbeMode::default(),
            credentials: Mutex::new(None),
            busy: AtomicBool::new(false),
            state: Mutex::new(SyncState::Idle),
            last_completed_at: Mutex::new(None),
            capabilities: Mutex::new(CapabilitySet::new()),
        }
    }

    pub fn with_probe_mode(mut self, mode: ProbeMode) -> Self {
        self.probe_mode = mode;
        self
    }

    pub fn with_credentials(self, config: RemoteConfig) -> Self {
        self.set_credentials(config);
        self
    }

    /// Replace the session credentials. Takes effect from the next cycle.
    pub fn set_credentials(&self, config: RemoteConfig) {
        *lock(&self.credentials) = Some(config);
    }

    pub fn clear_credentials(&self) {
        *lock(&self.credentials) = None;
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn state(&self) -> SyncState {
        lock(&self.state).clone()
    }

    pub fn is_syncing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn last_completed_at(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_completed_at)
    }

    /// Capabilities probed by the most recent cycle.
    pub fn capabilities(&self) -> CapabilitySet {
        lock(&self.capabilities).clone()
    }

    fn set_state(&self, state: SyncState) {
        *lock(&self.state) = state;
    }

    /// Run one sync cycle and record it as a [`SyncRun`].
    ///
    /// Failures inside the cycle mark the run failed and are returned in the
    /// run itself. Only store errors while recording the run surface as `Err`.
    /// Writes already committed for earlier resource kinds are kept when a
    /// later kind fails.
    pub async fn run(&self) -> Result<Option<SyncRun>> {
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            info!("Sync already in progress, ignoring request");
            return Ok(None);
        };

        let sync_run = self.repo.create_sync_run(Utc::now()).await?;
        let sync_id = sync_run.id;
        info!(sync_id, "Starting sync run");

        let mut report = CycleReport::default();
        let outcome = self.execute_sync(&mut report).await;
        let capabilities: Vec<String> = report.capabilities.iter().map(String::from).collect();

        // Terminal state first; recording the run below may still fail.
        let (status, message) = match outcome {
            Ok(()) => {
                let at = Utc::now();
                *lock(&self.last_completed_at) = Some(at);
                self.set_state(SyncState::Completed { at });
                info!(sync_id, "Sync run completed");
                (SyncStatus::Completed, None)
            }
            Err(e) => {
                error!(sync_id, error = %e, "Sync run failed");
                let message = e.to_string();
                self.set_state(SyncState::Failed {
                    message: message.clone(),
                });
                (SyncStatus::Failed, Some(message))
            }
        };

        if let Err(e) = self
            .repo
            .finish_sync_run(
                sync_id,
                status,
                message.as_deref(),
                &capabilities,
                &report.counts,
            )
            .await
        {
            error!(sync_id, error = %e, "Failed to record sync run");
            self.set_state(SyncState::Failed {
                message: e.to_string(),
            });
            return Err(e);
        }

        let final_run = self.repo.get_sync_run(sync_id).await?;
        final_run
            .map(Some)
            .ok_or_else(|| SatchelError::Sync(format!("sync run {sync_id} disappeared")))
    }

    async fn execute_sync(&self, report: &mut CycleReport) -> Result<()> {
        let config = lock(&self.credentials)
            .clone()
            .ok_or(SatchelError::NotAuthenticated)?;

        self.set_state(SyncState::Probing);
        let capabilities = CapabilityProber::new(self.api.as_ref(), self.probe_mode)
            .probe(&config)
            .await;
        *lock(&self.capabilities) = capabilities.clone();
        report.capabilities = capabilities;

        self.set_state(SyncState::Fetching);
        let fetched = self.fetch_all(&config, &report.capabilities).await?;
        report.counts.attendance_skipped_courses = fetched.attendance_failed_courses.clone();
        report.counts.skipped_kinds = fetched.skipped_kinds.clone();

        self.set_state(SyncState::Reconciling);
        let reconciler = Reconciler::new(self.repo.as_ref(), self.settings.dedup);
        let mut index = CourseIndex::new();
        for kind in ResourceKind::ORDERED {
            if fetched.skipped_kinds.contains(&kind) {
                continue;
            }
            let counts = reconciler
                .upsert(fetched.records(kind), kind, &mut index)
                .await?;
            *report.counts.get_mut(kind) = counts;
        }
        Ok(())
    }

    /// Fetch every resource kind.
    ///
    /// Site info, assignment and calendar failures abort the cycle. A failed
    /// enrollment or grade fetch skips only that kind; without enrollments
    /// every kind that resolves courses through them is skipped too.
    async fn fetch_all(
        &self,
        config: &RemoteConfig,
        capabilities: &CapabilitySet,
    ) -> Result<FetchedResources> {
        let fetcher = ResourceFetcher::new(self.api.as_ref(), config);
        let mut fetched = FetchedResources::default();

        let user_id = fetcher.site_user_id().await?;
        match fetcher.enrollments(user_id).await {
            Ok(records) => fetched.enrollments = records,
            Err(e) => {
                warn!(
                    kind = %ResourceKind::Enrollments,
                    error = %e,
                    "Fetch failed, skipping enrollments and dependent kinds"
                );
                fetched.skipped_kinds = ResourceKind::ORDERED.to_vec();
                return Ok(fetched);
            }
        }
        let course_ids: Vec<i64> = fetched
            .enrollments
            .iter()
            .filter_map(RemoteCourse::from_raw)
            .map(|c| c.remote_id)
            .collect();

        fetched.assignments = fetcher.assignments(&course_ids).await?;
        match fetcher.grade_items(user_id).await {
            Ok(records) => fetched.grades = records,
            Err(e) => {
                warn!(kind = %ResourceKind::Grades, error = %e, "Fetch failed, skipping grades");
                fetched.skipped_kinds.push(ResourceKind::Grades);
            }
        }

        let window = CalendarWindow {
            days_back: self.settings.calendar_days_back,
            days_ahead: self.settings.calendar_days_ahead,
        };
        fetched.calendar_events = fetcher.calendar_events(window, Utc::now()).await?;

        if !self.settings.attendance {
            info!("Attendance sync disabled, skipping");
        } else if !capabilities.contains(ATTENDANCE_GET_SESSIONS) {
            warn!(
                function = ATTENDANCE_GET_SESSIONS,
                "Attendance not supported by this deployment, skipping"
            );
        } else {
            let attendance = fetcher.attendance_sessions(&course_ids).await;
            fetched.attendance_sessions = attendance.records;
            fetched.attendance_failed_courses = attendance.failed_courses;
        }

        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{
        AttendanceRepository, CourseRepository, GradeRepository, SyncRepository, TaskRepository,
    };
    use crate::db::sqlite::SqliteRepository;
    use crate::db::DatabasePool;
    use crate::remote::client::RpcParams;
    use crate::remote::fetchers::{
        ASSIGNMENTS, CALENDAR_EVENTS, ENROLLED_COURSES, GRADE_ITEMS, SITE_INFO,
    };
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    const T: i64 = 1_760_000_000;

    /// Answers per function name; attendance answers per course id.
    struct MockRemote {
        responses: HashMap<&'static str, Value>,
        attendance: HashMap<i64, Value>,
        calls: Mutex<Vec<String>>,
    }

    impl MockRemote {
        fn new() -> Self {
            let mut responses = HashMap::new();
            responses.insert(SITE_INFO, json!({"userid": 42, "sitename": "LMS"}));
            responses.insert(
                ENROLLED_COURSES,
                json!([
                    {"id": 1, "shortname": "CS101", "fullname": "Intro to CS"},
                    {"id": 2, "shortname": "MA201", "fullname": "Linear Algebra"}
                ]),
            );
            responses.insert(
                ASSIGNMENTS,
                json!({"courses": [
                    {"id": 1, "assignments": [{"id": 10, "name": "HW1", "duedate": T}]},
                    {"id": 2, "assignments": []}
                ]}),
            );
            responses.insert(
                GRADE_ITEMS,
                json!({"usergrades": [
                    {"courseid": 1, "gradeitems": [{"id": 5, "itemname": "Quiz 1", "graderaw": 8, "grademax": 10}]}
                ]}),
            );
            responses.insert(
                CALENDAR_EVENTS,
                json!({"events": [{"id": 77, "name": "HW1", "timestart": T, "courseid": 1}]}),
            );
            responses.insert(ATTENDANCE_GET_SESSIONS, json!([]));

            let mut attendance = HashMap::new();
            attendance.insert(
                1,
                json!([{"id": 501, "sessdate": T, "description": "Lecture", "room": "A1"}]),
            );
            attendance.insert(
                2,
                json!([{"id": 601, "sessdate": T, "description": "Tutorial", "room": "B2"}]),
            );

            Self {
                responses,
                attendance,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn without(mut self, function: &'static str) -> Self {
            self.responses.remove(function);
            self
        }

        fn with_response(mut self, function: &'static str, value: Value) -> Self {
            self.responses.insert(function, value);
            self
        }

        fn failing_attendance_for(mut self, course_id: i64) -> Self {
            self.attendance.remove(&course_id);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteApi for MockRemote {
        async fn call(
            &self,
            _config: &RemoteConfig,
            function: &str,
            params: &RpcParams,
        ) -> Result<Value> {
            self.calls.lock().unwrap().push(function.to_string());
            let known = self
                .responses
                .get(function)
                .cloned()
                .ok_or_else(|| SatchelError::Transport(format!("{function}: 404")))?;
            if function != ATTENDANCE_GET_SESSIONS {
                return Ok(known);
            }
            // Empty-argument probe call.
            let Some(course_id) = params.get("courseid") else {
                return Ok(known);
            };
            let course_id: i64 = course_id.parse().unwrap();
            self.attendance
                .get(&course_id)
                .cloned()
                .ok_or_else(|| SatchelError::Transport(format!("course {course_id}: 500")))
        }
    }

    async fn setup_repo() -> Arc<SqliteRepository> {
        let pool = DatabasePool::new_sqlite_memory().await.unwrap();
        match pool {
            DatabasePool::Sqlite(p) => Arc::new(SqliteRepository::new(p)),
        }
    }

    fn credentials() -> RemoteConfig {
        RemoteConfig::new("https://lms.example.edu", "tok").unwrap()
    }

    async fn engine_with(remote: MockRemote) -> (SyncEngine<SqliteRepository>, Arc<MockRemote>) {
        let remote = Arc::new(remote);
        let engine = SyncEngine::new(setup_repo().await, remote.clone(), SyncSettings::default())
            .with_credentials(credentials());
        (engine, remote)
    }

    #[tokio::test]
    async fn full_sync_reconciles_every_kind() {
        let (engine, _) = engine_with(MockRemote::new()).await;

        let run = engine.run().await.unwrap().unwrap();
        assert_eq!(run.status, SyncStatus::Completed);
        assert!(run.completed_at.is_some());
        assert_eq!(run.counts.enrollments.created, 2);
        // Assignment and calendar event share one task.
        assert_eq!(run.counts.assignments.created, 1);
        assert_eq!(run.counts.calendar_events.created, 0);
        assert_eq!(run.counts.grades.created, 1);
        assert_eq!(run.counts.attendance_sessions.created, 2);
        assert!(run.capabilities.contains(&ATTENDANCE_GET_SESSIONS.to_string()));

        let repo = engine.repository();
        assert_eq!(repo.list_courses().await.unwrap().len(), 2);
        assert_eq!(repo.list_tasks().await.unwrap().len(), 1);
        assert_eq!(repo.list_grades().await.unwrap().len(), 1);
        assert_eq!(repo.list_attendance_sessions().await.unwrap().len(), 2);

        assert!(matches!(engine.state(), SyncState::Completed { .. }));
        assert!(engine.last_completed_at().is_some());
        assert!(!engine.is_syncing());
    }

    #[tokio::test]
    async fn second_run_creates_nothing() {
        let (engine, _) = engine_with(MockRemote::new()).await;
        engine.run().await.unwrap().unwrap();
        let second = engine.run().await.unwrap().unwrap();

        assert_eq!(second.status, SyncStatus::Completed);
        for kind in ResourceKind::ORDERED {
            assert_eq!(second.counts.get(kind).created, 0, "{kind}");
        }
        let repo = engine.repository();
        assert_eq!(repo.list_courses().await.unwrap().len(), 2);
        assert_eq!(repo.list_tasks().await.unwrap().len(), 1);
        assert_eq!(repo.list_grades().await.unwrap().len(), 1);
        assert_eq!(repo.list_attendance_sessions().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failing_attendance_course_does_not_block_others() {
        let (engine, _) = engine_with(MockRemote::new().failing_attendance_for(1)).await;

        let run = engine.run().await.unwrap().unwrap();
        assert_eq!(run.status, SyncStatus::Completed);
        assert_eq!(run.counts.attendance_skipped_courses, vec![1]);

        let sessions = engine.repository().list_attendance_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].remote_id, 601);
    }

    #[tokio::test]
    async fn missing_probe_capability_skips_attendance() {
        let (engine, remote) = engine_with(MockRemote::new().without(ATTENDANCE_GET_SESSIONS)).await;

        let run = engine.run().await.unwrap().unwrap();
        assert_eq!(run.status, SyncStatus::Completed);
        assert_eq!(run.counts.attendance_sessions.created, 0);
        assert!(!engine.capabilities().contains(ATTENDANCE_GET_SESSIONS));
        // Only the probe itself was attempted.
        let attendance_calls = remote
            .calls()
            .iter()
            .filter(|c| c.as_str() == ATTENDANCE_GET_SESSIONS)
            .count();
        assert_eq!(attendance_calls, 1);
    }

    #[tokio::test]
    async fn attendance_disabled_in_settings() {
        let remote = Arc::new(MockRemote::new());
        let settings = SyncSettings {
            attendance: false,
            ..SyncSettings::default()
        };
        let engine = SyncEngine::new(setup_repo().await, remote.clone(), settings)
            .with_credentials(credentials());

        let run = engine.run().await.unwrap().unwrap();
        assert_eq!(run.status, SyncStatus::Completed);
        assert!(engine
            .repository()
            .list_attendance_sessions()
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn missing_credentials_fails_without_network() {
        let remote = Arc::new(MockRemote::new());
        let engine = SyncEngine::new(setup_repo().await, remote.clone(), SyncSettings::default());

        let run = engine.run().await.unwrap().unwrap();
        assert_eq!(run.status, SyncStatus::Failed);
        assert!(run.error_message.unwrap().contains("not authenticated"));
        assert!(remote.calls().is_empty());
        assert!(matches!(engine.state(), SyncState::Failed { .. }));
        assert!(engine.last_completed_at().is_none());
    }

    #[tokio::test]
    async fn cleared_credentials_fail_next_run() {
        let (engine, _) = engine_with(MockRemote::new()).await;
        engine.run().await.unwrap().unwrap();
        engine.clear_credentials();

        let run = engine.run().await.unwrap().unwrap();
        assert_eq!(run.status, SyncStatus::Failed);
    }

    #[tokio::test]
    async fn grade_fetch_failure_keeps_other_kinds() {
        let (engine, _) = engine_with(MockRemote::new().without(GRADE_ITEMS)).await;

        let run = engine.run().await.unwrap().unwrap();
        assert_eq!(run.status, SyncStatus::Completed);
        assert!(run.error_message.is_none());
        assert_eq!(run.counts.skipped_kinds, vec![ResourceKind::Grades]);
        assert_eq!(run.counts.grades.created, 0);
        assert_eq!(run.counts.enrollments.created, 2);

        let repo = engine.repository();
        assert_eq!(repo.list_courses().await.unwrap().len(), 2);
        assert_eq!(repo.list_tasks().await.unwrap().len(), 1);
        assert_eq!(repo.list_attendance_sessions().await.unwrap().len(), 2);
        assert!(repo.list_grades().await.unwrap().is_empty());

        let latest = repo.get_latest_sync_run().await.unwrap().unwrap();
        assert_eq!(latest.id, run.id);
        assert!(latest.counts.was_skipped(ResourceKind::Grades));
        assert!(matches!(engine.state(), SyncState::Completed { .. }));
    }

    #[tokio::test]
    async fn enrollment_fetch_failure_skips_course_dependent_kinds() {
        let (engine, remote) = engine_with(MockRemote::new().without(ENROLLED_COURSES)).await;

        let run = engine.run().await.unwrap().unwrap();
        assert_eq!(run.status, SyncStatus::Completed);
        assert_eq!(run.counts.skipped_kinds, ResourceKind::ORDERED.to_vec());

        let repo = engine.repository();
        assert!(repo.list_courses().await.unwrap().is_empty());
        assert!(repo.list_tasks().await.unwrap().is_empty());
        assert!(repo.list_grades().await.unwrap().is_empty());
        let calls = remote.calls();
        assert!(!calls.iter().any(|f| f == ASSIGNMENTS || f == GRADE_ITEMS));
    }

    #[tokio::test]
    async fn site_info_failure_marks_run_failed() {
        let (engine, _) = engine_with(MockRemote::new().without(SITE_INFO)).await;

        let run = engine.run().await.unwrap().unwrap();
        assert_eq!(run.status, SyncStatus::Failed);
        assert!(run.error_message.unwrap().contains(SITE_INFO));
        assert!(engine.repository().list_courses().await.unwrap().is_empty());
        assert!(matches!(engine.state(), SyncState::Failed { .. }));
    }

    #[tokio::test]
    async fn grade_store_failure_rolls_back_only_grades() {
        let remote = MockRemote::new().with_response(
            GRADE_ITEMS,
            json!({"usergrades": [
                {"courseid": 1, "gradeitems": [
                    {"id": 5, "itemname": "Quiz 1", "graderaw": 8, "grademax": 10},
                    {"id": 6, "itemname": "Quiz 2", "graderaw": 9, "grademax": 10}
                ]}
            ]}),
        );
        let (engine, _) = engine_with(remote).await;
        sqlx::query(
            "CREATE TRIGGER reject_quiz_2 BEFORE INSERT ON grades \
             WHEN NEW.name = 'Quiz 2' BEGIN SELECT RAISE(ABORT, 'grade rejected'); END",
        )
        .execute(engine.repository().pool())
        .await
        .unwrap();

        let run = engine.run().await.unwrap().unwrap();
        assert_eq!(run.status, SyncStatus::Failed);
        let message = run.error_message.unwrap();
        assert!(message.starts_with("reconciliation error: grades"), "{message}");
        // Kinds reconciled before grades stay committed.
        assert_eq!(run.counts.enrollments.created, 2);
        assert_eq!(run.counts.assignments.created, 1);

        let repo = engine.repository();
        assert_eq!(repo.list_courses().await.unwrap().len(), 2);
        assert_eq!(repo.list_tasks().await.unwrap().len(), 1);
        // Quiz 1 was written in the same batch and is rolled back with it.
        assert!(repo.list_grades().await.unwrap().is_empty());
        assert!(repo.list_attendance_sessions().await.unwrap().is_empty());
        assert!(matches!(engine.state(), SyncState::Failed { .. }));
    }

    #[tokio::test]
    async fn unrecorded_run_leaves_engine_failed() {
        let (engine, _) = engine_with(MockRemote::new()).await;
        sqlx::query(
            "CREATE TRIGGER reject_run_update BEFORE UPDATE ON sync_runs \
             BEGIN SELECT RAISE(ABORT, 'sync_runs is read-only'); END",
        )
        .execute(engine.repository().pool())
        .await
        .unwrap();

        assert!(engine.run().await.is_err());
        match engine.state() {
            SyncState::Failed { message } => assert!(message.contains("read-only"), "{message}"),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(!engine.is_syncing());
    }

    #[tokio::test]
    async fn busy_engine_ignores_second_request() {
        let (engine, _) = engine_with(MockRemote::new()).await;
        engine.busy.store(true, Ordering::Release);

        assert!(engine.run().await.unwrap().is_none());
        assert!(engine.repository().get_latest_sync_run().await.unwrap().is_none());

        engine.busy.store(false, Ordering::Release);
        assert!(engine.run().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn concurrent_runs_do_not_interleave() {
        let (engine, _) = engine_with(MockRemote::new()).await;

        let (a, b) = tokio::join!(engine.run(), engine.run());
        let results = [a.unwrap(), b.unwrap()];
        let completed = results.iter().filter(|r| r.is_some()).count();
        assert!(completed >= 1);
        assert_eq!(engine.repository().list_courses().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn strict_probe_mode_rejects_exception_payloads() {
        let mut remote = MockRemote::new();
        remote.responses.insert(
            crate::capability::MESSAGE_GET_CONVERSATIONS,
            json!({"exception": "dml_missing_record_exception", "errorcode": "invalidrecord"}),
        );
        let remote = Arc::new(remote);
        let engine = SyncEngine::new(setup_repo().await, remote, SyncSettings::default())
            .with_probe_mode(ProbeMode::Strict)
            .with_credentials(credentials());

        engine.run().await.unwrap().unwrap();
        let caps = engine.capabilities();
        assert!(caps.contains(ATTENDANCE_GET_SESSIONS));
        assert!(!caps.contains(crate::capability::MESSAGE_GET_CONVERSATIONS));
    }
}
