//! Entity reconciliation: merge fetched remote records into the local entity graph.
//!
//! Every resource kind is merged inside its own [`EntityBatch`], so a kind is
//! applied completely or not at all. Matching per kind:
//!
//! | kind                | dedup key                                   |
//! |---------------------|---------------------------------------------|
//! | enrollments         | course short code OR full name              |
//! | assignments, events | (title, due date, course)                   |
//! | grades              | (name, course)                              |
//! | attendance sessions | remote session id                           |
//!
//! The first three are best-effort heuristics: the remote platform offers no
//! identifier that is stable across its resource types. [`DedupStrategy::RemoteId`]
//! layers a remote-id lookup in front of the heuristic without abandoning it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{DedupConfig, DedupStrategy};
use crate::db::repository::{EntityBatch, EntityStore};
use crate::error::{Result, SatchelError};
use crate::models::{
    attendance::AttendanceSession,
    common::{Priority, ResourceKind, TaskSource},
    course::Course,
    grade::Grade,
    sync::ReconcileCounts,
    task::{remote_ref, Task},
};
use crate::remote::record::{
    RawRecord, RemoteAssignment, RemoteAttendanceSession, RemoteCalendarEvent, RemoteCourse,
    RemoteGradeItem,
};

/// Remote course id to reconciled local course, built once per cycle from enrollments.
#[derive(Debug, Clone, Default)]
pub struct CourseIndex {
    by_remote: HashMap<i64, Course>,
}

impl CourseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, remote_id: i64, course: Course) {
        self.by_remote.insert(remote_id, course);
    }

    pub fn get(&self, remote_id: i64) -> Option<&Course> {
        self.by_remote.get(&remote_id)
    }

    /// Local id for an optional remote course id.
    pub fn local_id(&self, remote_id: Option<i64>) -> Option<String> {
        remote_id
            .and_then(|id| self.by_remote.get(&id))
            .map(|c| c.id.clone())
    }

    /// Remote ids in ascending order.
    pub fn remote_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.by_remote.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.by_remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_remote.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Created,
    Updated,
    Unchanged,
}

impl ReconcileCounts {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Created => self.created += 1,
            Outcome::Updated => self.updated += 1,
            Outcome::Unchanged => self.unchanged += 1,
        }
    }
}

/// Task fields derived from either an assignment or a calendar event.
struct IncomingTask {
    title: String,
    due: Option<DateTime<Utc>>,
    course_id: Option<String>,
    description: Option<String>,
    source: TaskSource,
    remote_ref: Option<String>,
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Wrap store failures so the failing resource kind is named.
fn store_error(kind: ResourceKind, e: SatchelError) -> SatchelError {
    match e {
        SatchelError::Reconciliation(msg) => {
            SatchelError::Reconciliation(format!("{kind}: {msg}"))
        }
        other => SatchelError::Reconciliation(format!("{kind}: {other}")),
    }
}

/// Merges raw records into the local store.
pub struct Reconciler<'a> {
    store: &'a dyn EntityStore,
    dedup: DedupConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn EntityStore, dedup: DedupConfig) -> Self {
        Self { store, dedup }
    }

    /// Upsert `records` of `kind` in one batch.
    ///
    /// Enrollments populate `index`; every other kind resolves its course
    /// references through it. Any store failure aborts and rolls back this
    /// kind's batch and is returned as [`SatchelError::Reconciliation`].
    pub async fn upsert(
        &self,
        records: &[RawRecord],
        kind: ResourceKind,
        index: &mut CourseIndex,
    ) -> Result<ReconcileCounts> {
        let now = Utc::now();
        let mut batch = self
            .store
            .begin_batch()
            .await
            .map_err(|e| store_error(kind, e))?;

        let counts = match kind {
            ResourceKind::Enrollments => {
                let (counts, courses) = self.upsert_courses(batch.as_mut(), records, now).await?;
                batch.commit().await.map_err(|e| store_error(kind, e))?;
                for (remote_id, course) in courses {
                    index.insert(remote_id, course);
                }
                counts
            }
            _ => {
                let counts = self
                    .upsert_dependent(batch.as_mut(), records, kind, index, now)
                    .await?;
                batch.commit().await.map_err(|e| store_error(kind, e))?;
                counts
            }
        };

        info!(
            kind = %kind,
            created = counts.created,
            updated = counts.updated,
            unchanged = counts.unchanged,
            skipped = counts.skipped,
            "Reconciled resource kind"
        );
        Ok(counts)
    }

    async fn upsert_dependent(
        &self,
        batch: &mut dyn EntityBatch,
        records: &[RawRecord],
        kind: ResourceKind,
        index: &CourseIndex,
        now: DateTime<Utc>,
    ) -> Result<ReconcileCounts> {
        let mut counts = ReconcileCounts::default();

        for raw in records {
            let outcome = match kind {
                ResourceKind::Assignments => match RemoteAssignment::from_raw(raw) {
                    Some(a) => {
                        let incoming = IncomingTask {
                            course_id: index.local_id(a.course_remote_id),
                            remote_ref: a.remote_id.map(|id| remote_ref(TaskSource::Assignment, id)),
                            title: a.title,
                            due: a.due,
                            description: a.description,
                            source: TaskSource::Assignment,
                        };
                        Some(self.upsert_task(batch, incoming, now).await)
                    }
                    None => None,
                },
                ResourceKind::CalendarEvents => match RemoteCalendarEvent::from_raw(raw) {
                    Some(e) => {
                        let incoming = IncomingTask {
                            course_id: index.local_id(e.course_remote_id),
                            remote_ref: e
                                .remote_id
                                .map(|id| remote_ref(TaskSource::CalendarEvent, id)),
                            title: e.title,
                            due: e.starts,
                            description: e.description,
                            source: TaskSource::CalendarEvent,
                        };
                        Some(self.upsert_task(batch, incoming, now).await)
                    }
                    None => None,
                },
                ResourceKind::Grades => match RemoteGradeItem::from_raw(raw) {
                    Some(g) => Some(self.upsert_grade(batch, g, index, now).await),
                    None => None,
                },
                ResourceKind::AttendanceSessions => match RemoteAttendanceSession::from_raw(raw) {
                    Some(s) => Some(upsert_attendance_session(batch, s, index, now).await),
                    None => None,
                },
                ResourceKind::Enrollments => {
                    return Err(SatchelError::Reconciliation(
                        "enrollments must be reconciled before dependent kinds".into(),
                    ))
                }
            };

            match outcome {
                Some(result) => counts.record(result.map_err(|e| store_error(kind, e))?),
                None => {
                    debug!(kind = %kind, "Skipping record without required fields");
                    counts.skipped += 1;
                }
            }
        }

        if counts.skipped > 0 {
            warn!(kind = %kind, skipped = counts.skipped, "Skipped incomplete records");
        }
        Ok(counts)
    }

    async fn upsert_courses(
        &self,
        batch: &mut dyn EntityBatch,
        records: &[RawRecord],
        now: DateTime<Utc>,
    ) -> Result<(ReconcileCounts, Vec<(i64, Course)>)> {
        let kind = ResourceKind::Enrollments;
        let mut counts = ReconcileCounts::default();
        let mut courses = Vec::with_capacity(records.len());
        // Local course id -> remote course id that resolved to it in this fetch.
        let mut claimed: HashMap<String, i64> = HashMap::new();

        for raw in records {
            let Some(remote) = RemoteCourse::from_raw(raw) else {
                counts.skipped += 1;
                continue;
            };
            let (outcome, course) = self
                .upsert_course(batch, &remote, &claimed, now)
                .await
                .map_err(|e| store_error(kind, e))?;
            counts.record(outcome);
            claimed.insert(course.id.clone(), remote.remote_id);
            courses.push((remote.remote_id, course));
        }

        if counts.skipped > 0 {
            warn!(kind = %kind, skipped = counts.skipped, "Skipped incomplete records");
        }
        Ok((counts, courses))
    }

    async fn upsert_course(
        &self,
        batch: &mut dyn EntityBatch,
        remote: &RemoteCourse,
        claimed: &HashMap<String, i64>,
        now: DateTime<Utc>,
    ) -> Result<(Outcome, Course)> {
        let mut existing = None;
        if self.dedup.courses == DedupStrategy::RemoteId {
            existing = batch.find_course_by_remote_id(remote.remote_id).await?;
        }
        if existing.is_none() {
            existing = batch
                .find_courses(&remote.short_code, &remote.full_name)
                .await?
                .into_iter()
                .find(|candidate| course_accepts(candidate, remote, claimed));
        }

        match existing {
            Some(mut course) => {
                let mut changed = false;
                if !remote.short_code.is_empty() && course.code != remote.short_code {
                    course.code = remote.short_code.clone();
                    changed = true;
                }
                if !remote.full_name.is_empty() && course.name != remote.full_name {
                    course.name = remote.full_name.clone();
                    changed = true;
                }
                if course.remote_id != Some(remote.remote_id) {
                    course.remote_id = Some(remote.remote_id);
                    changed = true;
                }
                if !changed {
                    return Ok((Outcome::Unchanged, course));
                }
                course.updated_at = now;
                batch.update_course(&course).await?;
                Ok((Outcome::Updated, course))
            }
            None => {
                let course = Course {
                    id: new_id(),
                    code: remote.short_code.clone(),
                    name: remote.full_name.clone(),
                    remote_id: Some(remote.remote_id),
                    created_at: now,
                    updated_at: now,
                };
                batch.insert_course(&course).await?;
                Ok((Outcome::Created, course))
            }
        }
    }

    async fn upsert_task(
        &self,
        batch: &mut dyn EntityBatch,
        incoming: IncomingTask,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let mut existing = None;
        if self.dedup.tasks == DedupStrategy::RemoteId {
            if let Some(r) = incoming.remote_ref.as_deref() {
                existing = batch.find_task_by_remote_ref(r).await?;
            }
        }
        if existing.is_none() {
            existing = batch
                .find_task(&incoming.title, incoming.due, incoming.course_id.as_deref())
                .await?;
        }

        let Some(mut task) = existing else {
            let task = Task {
                id: new_id(),
                title: incoming.title,
                due_date: incoming.due,
                course_id: incoming.course_id,
                description: incoming.description,
                priority: Some(Priority::default()),
                source: incoming.source,
                remote_ref: incoming.remote_ref,
                show_on_calendar: true,
                completed: false,
                created_at: now,
                updated_at: now,
            };
            batch.insert_task(&task).await?;
            return Ok(Outcome::Created);
        };

        let mut changed = false;
        if task.title != incoming.title {
            task.title = incoming.title;
            changed = true;
        }
        if task.due_date != incoming.due {
            task.due_date = incoming.due;
            changed = true;
        }
        if task.course_id != incoming.course_id {
            task.course_id = incoming.course_id;
            changed = true;
        }
        if incoming.description.is_some() && task.description != incoming.description {
            task.description = incoming.description;
            changed = true;
        }
        if task.priority.is_none() {
            task.priority = Some(Priority::default());
            changed = true;
        }
        // The first remote source to claim a task keeps its reference.
        if task.remote_ref.is_none() && incoming.remote_ref.is_some() {
            task.remote_ref = incoming.remote_ref;
            changed = true;
        }

        if !changed {
            return Ok(Outcome::Unchanged);
        }
        task.updated_at = now;
        batch.update_task(&task).await?;
        Ok(Outcome::Updated)
    }

    async fn upsert_grade(
        &self,
        batch: &mut dyn EntityBatch,
        remote: RemoteGradeItem,
        index: &CourseIndex,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let course_id = index.local_id(remote.course_remote_id);

        let mut existing = None;
        if self.dedup.grades == DedupStrategy::RemoteId {
            if let Some(id) = remote.remote_id {
                existing = batch.find_grade_by_remote_id(id).await?;
            }
        }
        if existing.is_none() {
            existing = batch.find_grade(&remote.name, course_id.as_deref()).await?;
        }

        let Some(mut grade) = existing else {
            let grade = Grade {
                id: new_id(),
                name: remote.name,
                course_id,
                score: remote.score,
                max_points: remote.max_points,
                remote_id: remote.remote_id,
                created_at: now,
                updated_at: now,
            };
            batch.insert_grade(&grade).await?;
            return Ok(Outcome::Created);
        };

        // Score and maximum always follow the remote side.
        let changed = grade.name != remote.name
            || grade.course_id != course_id
            || grade.score != remote.score
            || grade.max_points != remote.max_points
            || (remote.remote_id.is_some() && grade.remote_id != remote.remote_id);
        if !changed {
            return Ok(Outcome::Unchanged);
        }
        grade.name = remote.name;
        grade.course_id = course_id;
        grade.score = remote.score;
        grade.max_points = remote.max_points;
        if remote.remote_id.is_some() {
            grade.remote_id = remote.remote_id;
        }
        grade.updated_at = now;
        batch.update_grade(&grade).await?;
        Ok(Outcome::Updated)
    }
}

/// Whether a code-or-name candidate may stand for `remote`. A course already
/// resolved to another remote course in this fetch is never shared, and a
/// partial match must not belong to a different remote course.
fn course_accepts(
    candidate: &Course,
    remote: &RemoteCourse,
    claimed: &HashMap<String, i64>,
) -> bool {
    if claimed
        .get(&candidate.id)
        .is_some_and(|owner| *owner != remote.remote_id)
    {
        return false;
    }
    let full_match = candidate.code == remote.short_code && candidate.name == remote.full_name;
    full_match || candidate.remote_id.map_or(true, |id| id == remote.remote_id)
}

async fn upsert_attendance_session(
    batch: &mut dyn EntityBatch,
    remote: RemoteAttendanceSession,
    index: &CourseIndex,
    now: DateTime<Utc>,
) -> Result<Outcome> {
    let course_id = index.local_id(remote.course_remote_id);

    let Some(mut session) = batch.find_attendance_session(remote.remote_id).await? else {
        let session = AttendanceSession {
            id: new_id(),
            remote_id: remote.remote_id,
            course_id,
            starts_at: remote.starts,
            duration_secs: remote.duration_secs,
            description: remote.description,
            room: remote.room,
            created_at: now,
            updated_at: now,
        };
        batch.insert_attendance_session(&session).await?;
        return Ok(Outcome::Created);
    };

    let changed = session.course_id != course_id
        || session.starts_at != remote.starts
        || session.duration_secs != remote.duration_secs
        || session.description != remote.description
        || session.room != remote.room;
    if !changed {
        return Ok(Outcome::Unchanged);
    }
    session.course_id = course_id;
    session.starts_at = remote.starts;
    session.duration_secs = remote.duration_secs;
    session.description = remote.description;
    session.room = remote.room;
    session.updated_at = now;
    batch.update_attendance_session(&session).await?;
    Ok(Outcome::Updated)
}
