//! Workflow orchestrator: one operation per admin action. Each operation
//! validates the status transition, performs the required ledger/allocator
//! side effect, appends the status-history row, and persists the record as a
//! single unit. If persistence fails after a reservation succeeded, the
//! reservation is compensated before the error propagates, so the state
//! machine and the capacity ledger can never drift apart.
//!
//! Mutations of one application are serialized on a per-application lock:
//! a duplicated admin action is strictly ordered, and the second copy fails
//! the transition check instead of committing twice.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::allocator::{AllocationError, AllocationTarget, Allocator};
use super::domain::{
    Actor, AdmissionStatus, ApplicantId, Application, ApplicationId, AssignmentId,
    AssignmentStatus, ResourceId, ResourceKey, ResourceKind, ScoreRecord, StatusHistoryRecord,
};
use super::ledger::{CapacityLedger, LedgerError};
use super::repository::{
    ApplicationRecord, ApplicationRepository, NotificationPublisher, RepositoryError, StageEvent,
};
use super::scores::{
    parse_score_sheet, validate_stanine, InvalidStanine, ScoreImportError, ScoreImportSummary,
    ScoreRowFailure,
};
use super::state::{transition, AdmissionEvent, StateTransitionError};

/// How an admin picked a schedule: let the allocator choose, or name one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSelection {
    Auto,
    Schedule(ResourceId),
}

/// Bounded retry of lock-contention failures. Everything else propagates on
/// the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

/// Error raised by orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionServiceError {
    #[error(transparent)]
    Transition(#[from] StateTransitionError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Score(#[from] InvalidStanine),
    #[error(transparent)]
    Import(#[from] ScoreImportError),
    #[error("assignment '{}' not found on application '{}'", assignment.0, application.0)]
    AssignmentNotFound {
        application: ApplicationId,
        assignment: AssignmentId,
    },
    #[error("{0}")]
    Validation(String),
}

impl AdmissionServiceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AdmissionServiceError::Allocation(err) => err.is_retryable(),
            AdmissionServiceError::Ledger(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Outcome of a batch auto-assignment sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub assigned: u32,
    pub skipped: u32,
}

static APPLICATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_application_ids() -> (ApplicationId, String) {
    let id = APPLICATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    (ApplicationId(format!("app-{id:06}")), format!("ADM-{id:06}"))
}

/// Orchestrating service over a repository and a notification publisher.
pub struct AdmissionService<R, N> {
    repository: Arc<R>,
    notifier: Arc<N>,
    ledger: Arc<CapacityLedger>,
    allocator: Allocator,
    retry: RetryPolicy,
    op_locks: Mutex<HashMap<ApplicationId, Arc<Mutex<()>>>>,
}

impl<R, N> AdmissionService<R, N>
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        ledger: Arc<CapacityLedger>,
        retry: RetryPolicy,
    ) -> Self {
        let allocator = Allocator::new(Arc::clone(&ledger));
        Self {
            repository,
            notifier,
            ledger,
            allocator,
            retry,
            op_locks: Mutex::new(HashMap::new()),
        }
    }

    /// One mutex per application id, held across the fetch-validate-persist
    /// unit of every mutating operation.
    fn application_lock(&self, id: &ApplicationId) -> Arc<Mutex<()>> {
        let mut registry = self
            .op_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        registry.entry(id.clone()).or_default().clone()
    }

    pub fn ledger(&self) -> &Arc<CapacityLedger> {
        &self.ledger
    }

    /// Open a new admission attempt. An applicant may hold at most one
    /// active application at a time.
    pub fn submit_application(
        &self,
        applicant_id: ApplicantId,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        if let Some(existing) = self.repository.active_for_applicant(&applicant_id)? {
            return Err(AdmissionServiceError::Validation(format!(
                "applicant '{}' already has an active application '{}'",
                applicant_id.0, existing.application.id.0
            )));
        }

        let (id, control_number) = next_application_ids();
        let now = Utc::now();
        let record = ApplicationRecord {
            application: Application {
                id: id.clone(),
                applicant_id,
                control_number,
                status: AdmissionStatus::Submitted,
                course_id: None,
                rejection_reason: None,
                submitted_at: now,
                updated_at: now,
            },
            score: None,
            assignments: Vec::new(),
            history: vec![StatusHistoryRecord {
                application_id: id.clone(),
                old_status: None,
                new_status: AdmissionStatus::Submitted,
                note: "Application submitted".to_string(),
                actor: Actor::Auto,
                recorded_at: now,
            }],
        };

        let stored = self.repository.insert(record)?;
        info!(application = %stored.application.id.0, "application submitted");
        self.notify(&stored, None, BTreeMap::new());
        Ok(stored)
    }

    /// Fetch an application record for API responses.
    pub fn get(&self, id: &ApplicationId) -> Result<ApplicationRecord, AdmissionServiceError> {
        Ok(self
            .repository
            .fetch(id)?
            .ok_or(RepositoryError::NotFound)?)
    }

    pub fn verify_application(
        &self,
        id: &ApplicationId,
        note: Option<String>,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let op_lock = self.application_lock(id);
        let _serial = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.get(id)?;
        let old = record.application.status;
        let next = transition(old, AdmissionEvent::Verify)?;

        let note = note.unwrap_or_else(|| "Application verified".to_string());
        apply_status(&mut record, next, note, Actor::admin(admin));
        self.repository.update(record.clone())?;

        info!(application = %id.0, "application verified");
        self.notify(&record, Some(old), BTreeMap::new());
        Ok(record)
    }

    /// Reject from any non-terminal status. Pending assignments are
    /// cancelled and their units released; a reserved course seat is
    /// returned as well.
    pub fn reject_application(
        &self,
        id: &ApplicationId,
        reason: &str,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        self.with_retry(|| self.try_reject(id, reason, admin))
    }

    fn try_reject(
        &self,
        id: &ApplicationId,
        reason: &str,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let op_lock = self.application_lock(id);
        let _serial = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.get(id)?;
        let old = record.application.status;
        let next = transition(old, AdmissionEvent::Reject)?;

        let mut released: Vec<ResourceKey> = Vec::new();
        let cancellation_note = format!("Application rejected: {reason}");
        for index in 0..record.assignments.len() {
            if record.assignments[index].status != AssignmentStatus::Pending {
                continue;
            }
            let schedule = record.assignments[index].schedule.clone();
            match self
                .allocator
                .cancel(&mut record.assignments[index], &cancellation_note)
            {
                Ok(true) => released.push(schedule),
                Ok(false) => {}
                Err(err) => {
                    self.restore_reservations(&released);
                    return Err(err.into());
                }
            }
        }

        if let Some(course_id) = record.application.course_id.clone() {
            let course_key = ResourceKey {
                kind: ResourceKind::Course,
                id: course_id,
            };
            if let Err(err) = self.ledger.release(&course_key, 1) {
                self.restore_reservations(&released);
                return Err(err.into());
            }
            released.push(course_key);
        }

        record.application.rejection_reason = Some(reason.to_string());
        apply_status(
            &mut record,
            next,
            format!("Rejected: {reason}"),
            Actor::admin(admin),
        );

        if let Err(err) = self.repository.update(record.clone()) {
            self.restore_reservations(&released);
            return Err(err.into());
        }

        info!(application = %id.0, %reason, "application rejected");
        let mut details = BTreeMap::new();
        details.insert("reason".to_string(), reason.to_string());
        self.notify(&record, Some(old), details);
        Ok(record)
    }

    /// Place the applicant on an exam schedule, either by explicit admin
    /// choice or through the load-balancing allocator.
    pub fn schedule_exam(
        &self,
        id: &ApplicationId,
        selection: &ScheduleSelection,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        self.with_retry(|| self.try_schedule_exam(id, selection, admin))
    }

    fn try_schedule_exam(
        &self,
        id: &ApplicationId,
        selection: &ScheduleSelection,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let op_lock = self.application_lock(id);
        let _serial = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.get(id)?;
        let old = record.application.status;
        let next = transition(old, AdmissionEvent::ScheduleExam)?;

        let assignment = match selection {
            ScheduleSelection::Auto => self
                .allocator
                .auto_assign(&record.application, &AllocationTarget::Exam)?,
            ScheduleSelection::Schedule(schedule_id) => {
                let key = ResourceKey {
                    kind: ResourceKind::ExamSchedule,
                    id: schedule_id.clone(),
                };
                self.allocator
                    .manual_assign(&record.application, &key, admin)?
            }
        };

        let schedule_key = assignment.schedule.clone();
        let note = format!("Exam scheduled on '{}'", schedule_key.id.0);
        record.assignments.push(assignment);
        apply_status(&mut record, next, note, Actor::admin(admin));

        if let Err(err) = self.repository.update(record.clone()) {
            self.restore_releases(&[schedule_key]);
            return Err(err.into());
        }

        info!(application = %id.0, schedule = %schedule_key.id.0, "exam scheduled");
        let mut details = BTreeMap::new();
        details.insert("schedule_id".to_string(), schedule_key.id.0.clone());
        self.notify(&record, Some(old), details);
        Ok(record)
    }

    /// Record the entrance-exam result. The pending exam assignment, if any,
    /// is marked completed; its slot stays occupied.
    pub fn post_score(
        &self,
        id: &ApplicationId,
        stanine: i64,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let stanine = validate_stanine(stanine)?;
        let op_lock = self.application_lock(id);
        let _serial = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.get(id)?;
        let old = record.application.status;
        let next = transition(old, AdmissionEvent::PostScore)?;

        let now = Utc::now();
        record.score = Some(ScoreRecord {
            stanine,
            recorded_by: Actor::admin(admin),
            recorded_at: now,
        });
        if let Some(assignment) = record.pending_assignment_mut(ResourceKind::ExamSchedule) {
            assignment.status = AssignmentStatus::Completed;
            assignment.updated_at = now;
        }
        apply_status(
            &mut record,
            next,
            format!("Stanine score {stanine} posted"),
            Actor::admin(admin),
        );
        self.repository.update(record.clone())?;

        info!(application = %id.0, stanine, "score posted");
        let mut details = BTreeMap::new();
        details.insert("stanine".to_string(), stanine.to_string());
        self.notify(&record, Some(old), details);
        Ok(record)
    }

    pub fn post_score_by_control_number(
        &self,
        control_number: &str,
        stanine: i64,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let record = self
            .repository
            .fetch_by_control_number(control_number)?
            .ok_or(RepositoryError::NotFound)?;
        self.post_score(&record.application.id, stanine, admin)
    }

    /// Bulk score intake from an uploaded CSV. Bad rows are collected in the
    /// summary; they never abort the batch.
    pub fn import_scores<RD: Read>(
        &self,
        reader: RD,
        admin: &str,
    ) -> Result<ScoreImportSummary, AdmissionServiceError> {
        let (rows, mut failures) = parse_score_sheet(reader)?;
        let mut posted = 0;
        for row in rows {
            match self.post_score_by_control_number(&row.control_number, row.stanine as i64, admin)
            {
                Ok(_) => posted += 1,
                Err(err) => failures.push(ScoreRowFailure {
                    line: row.line,
                    control_number: row.control_number,
                    reason: err.to_string(),
                }),
            }
        }
        info!(posted, failed = failures.len(), "score sheet imported");
        Ok(ScoreImportSummary { posted, failures })
    }

    /// Reserve a seat in the chosen course.
    pub fn assign_course(
        &self,
        id: &ApplicationId,
        course_id: &ResourceId,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        self.with_retry(|| self.try_assign_course(id, course_id, admin))
    }

    fn try_assign_course(
        &self,
        id: &ApplicationId,
        course_id: &ResourceId,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let op_lock = self.application_lock(id);
        let _serial = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.get(id)?;
        let old = record.application.status;
        let next = transition(old, AdmissionEvent::AssignCourse)?;

        let course_key = ResourceKey {
            kind: ResourceKind::Course,
            id: course_id.clone(),
        };
        self.ledger.reserve(&course_key, 1)?;

        record.application.course_id = Some(course_id.clone());
        apply_status(
            &mut record,
            next,
            format!("Assigned to course '{}'", course_id.0),
            Actor::admin(admin),
        );

        if let Err(err) = self.repository.update(record.clone()) {
            self.restore_releases(&[course_key]);
            return Err(err.into());
        }

        info!(application = %id.0, course = %course_id.0, "course assigned");
        let mut details = BTreeMap::new();
        details.insert("course_id".to_string(), course_id.0.clone());
        self.notify(&record, Some(old), details);
        Ok(record)
    }

    /// Place the applicant on an enrollment schedule for the assigned
    /// course.
    pub fn schedule_enrollment(
        &self,
        id: &ApplicationId,
        selection: &ScheduleSelection,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        self.with_retry(|| self.try_schedule_enrollment(id, selection, admin))
    }

    fn try_schedule_enrollment(
        &self,
        id: &ApplicationId,
        selection: &ScheduleSelection,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let op_lock = self.application_lock(id);
        let _serial = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.get(id)?;
        let old = record.application.status;
        let next = transition(old, AdmissionEvent::ScheduleEnrollment)?;

        let course_id = record.application.course_id.clone().ok_or_else(|| {
            AdmissionServiceError::Validation(format!(
                "application '{}' has no assigned course",
                id.0
            ))
        })?;

        let assignment = match selection {
            ScheduleSelection::Auto => self.allocator.auto_assign(
                &record.application,
                &AllocationTarget::Enrollment {
                    course_id: course_id.clone(),
                },
            )?,
            ScheduleSelection::Schedule(schedule_id) => {
                let key = ResourceKey {
                    kind: ResourceKind::EnrollmentSchedule,
                    id: schedule_id.clone(),
                };
                self.ensure_schedule_owned_by(&key, &course_id)?;
                self.allocator
                    .manual_assign(&record.application, &key, admin)?
            }
        };

        let schedule_key = assignment.schedule.clone();
        let note = format!("Enrollment scheduled on '{}'", schedule_key.id.0);
        record.assignments.push(assignment);
        apply_status(&mut record, next, note, Actor::admin(admin));

        if let Err(err) = self.repository.update(record.clone()) {
            self.restore_releases(&[schedule_key]);
            return Err(err.into());
        }

        info!(application = %id.0, schedule = %schedule_key.id.0, "enrollment scheduled");
        let mut details = BTreeMap::new();
        details.insert("schedule_id".to_string(), schedule_key.id.0.clone());
        self.notify(&record, Some(old), details);
        Ok(record)
    }

    /// Move a pending enrollment assignment to another schedule of the same
    /// course. Atomic across both legs: if the new schedule is full the old
    /// reservation is untouched.
    pub fn reassign_enrollment(
        &self,
        id: &ApplicationId,
        new_schedule_id: &ResourceId,
        reason: &str,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        self.with_retry(|| self.try_reassign_enrollment(id, new_schedule_id, reason, admin))
    }

    fn try_reassign_enrollment(
        &self,
        id: &ApplicationId,
        new_schedule_id: &ResourceId,
        reason: &str,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let op_lock = self.application_lock(id);
        let _serial = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.get(id)?;
        let status = record.application.status;
        let course_id = record.application.course_id.clone().ok_or_else(|| {
            AdmissionServiceError::Validation(format!(
                "application '{}' has no assigned course",
                id.0
            ))
        })?;

        let new_key = ResourceKey {
            kind: ResourceKind::EnrollmentSchedule,
            id: new_schedule_id.clone(),
        };
        self.ensure_schedule_owned_by(&new_key, &course_id)?;

        let assignment = record
            .pending_assignment_mut(ResourceKind::EnrollmentSchedule)
            .ok_or_else(|| {
                AdmissionServiceError::Validation(format!(
                    "application '{}' has no pending enrollment assignment",
                    id.0
                ))
            })?;
        let old_key = assignment.schedule.clone();

        let replacement = self
            .allocator
            .reassign(assignment, &new_key, reason, admin)?;
        record.assignments.push(replacement);
        record.history.push(StatusHistoryRecord {
            application_id: id.clone(),
            old_status: Some(status),
            new_status: status,
            note: format!(
                "Enrollment moved from '{}' to '{}': {reason}",
                old_key.id.0, new_key.id.0
            ),
            actor: Actor::admin(admin),
            recorded_at: Utc::now(),
        });
        record.application.updated_at = Utc::now();

        if let Err(err) = self.repository.update(record.clone()) {
            // Undo the transfer; the stored record still points at the old slot.
            if let Err(undo) = self.ledger.transfer(&new_key, &old_key, 1) {
                warn!(application = %id.0, error = %undo, "failed to undo reassignment transfer");
            }
            return Err(err.into());
        }

        info!(
            application = %id.0,
            from = %old_key.id.0,
            to = %new_key.id.0,
            "enrollment reassigned"
        );
        let mut details = BTreeMap::new();
        details.insert("old_schedule_id".to_string(), old_key.id.0);
        details.insert("new_schedule_id".to_string(), new_key.id.0.clone());
        self.notify(&record, Some(status), details);
        Ok(record)
    }

    /// Cancel one assignment by id, releasing its unit exactly once.
    /// Cancelling an already-cancelled assignment is a no-op.
    pub fn cancel_assignment(
        &self,
        id: &ApplicationId,
        assignment_id: &AssignmentId,
        reason: &str,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        self.with_retry(|| self.try_cancel_assignment(id, assignment_id, reason, admin))
    }

    fn try_cancel_assignment(
        &self,
        id: &ApplicationId,
        assignment_id: &AssignmentId,
        reason: &str,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let op_lock = self.application_lock(id);
        let _serial = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.get(id)?;
        let status = record.application.status;
        let index = record
            .assignments
            .iter()
            .position(|assignment| &assignment.id == assignment_id)
            .ok_or_else(|| AdmissionServiceError::AssignmentNotFound {
                application: id.clone(),
                assignment: assignment_id.clone(),
            })?;

        let schedule = record.assignments[index].schedule.clone();
        if !self.allocator.cancel(&mut record.assignments[index], reason)? {
            return Ok(record);
        }

        record.history.push(StatusHistoryRecord {
            application_id: id.clone(),
            old_status: Some(status),
            new_status: status,
            note: format!(
                "Assignment '{}' on '{}' cancelled: {reason}",
                assignment_id.0, schedule.id.0
            ),
            actor: Actor::admin(admin),
            recorded_at: Utc::now(),
        });
        record.application.updated_at = Utc::now();

        if let Err(err) = self.repository.update(record.clone()) {
            self.restore_reservations(&[schedule]);
            return Err(err.into());
        }

        info!(application = %id.0, assignment = %assignment_id.0, "assignment cancelled");
        Ok(record)
    }

    /// Final step: the applicant showed up and enrolled. The seat and slot
    /// stay reserved; the enrolled student occupies them.
    pub fn complete_enrollment(
        &self,
        id: &ApplicationId,
        admin: &str,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let op_lock = self.application_lock(id);
        let _serial = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.get(id)?;
        let old = record.application.status;
        let next = transition(old, AdmissionEvent::Complete)?;

        let now = Utc::now();
        if let Some(assignment) = record.pending_assignment_mut(ResourceKind::EnrollmentSchedule) {
            assignment.status = AssignmentStatus::Completed;
            assignment.updated_at = now;
        }
        apply_status(
            &mut record,
            next,
            "Enrollment completed".to_string(),
            Actor::admin(admin),
        );
        self.repository.update(record.clone())?;

        info!(application = %id.0, "enrollment completed");
        self.notify(&record, Some(old), BTreeMap::new());
        Ok(record)
    }

    /// Re-open a rejected application as a fresh `Submitted` cycle. Prior
    /// assignments stay on record, cancelled, as history.
    pub fn resubmit(
        &self,
        id: &ApplicationId,
        actor: Actor,
    ) -> Result<ApplicationRecord, AdmissionServiceError> {
        let op_lock = self.application_lock(id);
        let _serial = op_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut record = self.get(id)?;
        let old = record.application.status;
        let next = transition(old, AdmissionEvent::Resubmit)?;

        record.application.rejection_reason = None;
        record.application.course_id = None;
        record.score = None;
        apply_status(&mut record, next, "Application resubmitted".to_string(), actor);
        self.repository.update(record.clone())?;

        info!(application = %id.0, "application resubmitted");
        self.notify(&record, Some(old), BTreeMap::new());
        Ok(record)
    }

    /// Batch sweep: auto-assign every verified applicant to an exam
    /// schedule. Applicants that cannot be placed are skipped and counted.
    pub fn auto_schedule_exams(&self, admin: &str) -> Result<SweepSummary, AdmissionServiceError> {
        let pending = self.repository.with_status(AdmissionStatus::Verified)?;
        let mut summary = SweepSummary::default();
        for record in pending {
            match self.schedule_exam(&record.application.id, &ScheduleSelection::Auto, admin) {
                Ok(_) => summary.assigned += 1,
                Err(AdmissionServiceError::Allocation(AllocationError::NoCapacity { .. }))
                | Err(AdmissionServiceError::Transition(_)) => summary.skipped += 1,
                Err(err) => return Err(err),
            }
        }
        info!(assigned = summary.assigned, skipped = summary.skipped, "exam sweep finished");
        Ok(summary)
    }

    /// Batch sweep: auto-assign every course-assigned applicant of one
    /// course to an enrollment schedule.
    pub fn auto_assign_enrollments(
        &self,
        course_id: &ResourceId,
        admin: &str,
    ) -> Result<SweepSummary, AdmissionServiceError> {
        let pending = self.repository.with_status(AdmissionStatus::CourseAssigned)?;
        let mut summary = SweepSummary::default();
        for record in pending {
            if record.application.course_id.as_ref() != Some(course_id) {
                continue;
            }
            match self.schedule_enrollment(&record.application.id, &ScheduleSelection::Auto, admin)
            {
                Ok(_) => summary.assigned += 1,
                Err(AdmissionServiceError::Allocation(AllocationError::NoCapacity { .. }))
                | Err(AdmissionServiceError::Transition(_)) => summary.skipped += 1,
                Err(err) => return Err(err),
            }
        }
        info!(
            course = %course_id.0,
            assigned = summary.assigned,
            skipped = summary.skipped,
            "enrollment sweep finished"
        );
        Ok(summary)
    }

    fn ensure_schedule_owned_by(
        &self,
        key: &ResourceKey,
        course_id: &ResourceId,
    ) -> Result<(), AdmissionServiceError> {
        let state = self.ledger.state_of(key)?;
        match &state.spec {
            super::domain::ResourceSpec::EnrollmentSchedule { course_id: owner, .. }
                if owner == course_id =>
            {
                Ok(())
            }
            _ => Err(AdmissionServiceError::Validation(format!(
                "enrollment schedule '{}' does not belong to course '{}'",
                key.id.0, course_id.0
            ))),
        }
    }

    fn with_retry<T>(
        &self,
        mut op: impl FnMut() -> Result<T, AdmissionServiceError>,
    ) -> Result<T, AdmissionServiceError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    attempt += 1;
                    std::thread::sleep(self.retry.backoff);
                }
                other => return other,
            }
        }
    }

    /// Compensation: put released units back after a failed persistence.
    fn restore_reservations(&self, keys: &[ResourceKey]) {
        for key in keys {
            if let Err(err) = self.ledger.reserve(key, 1) {
                warn!(resource = %key.id.0, error = %err, "failed to restore reservation");
            }
        }
    }

    /// Compensation: release units reserved during an operation that did not
    /// persist.
    fn restore_releases(&self, keys: &[ResourceKey]) {
        for key in keys {
            if let Err(err) = self.ledger.release(key, 1) {
                warn!(resource = %key.id.0, error = %err, "failed to release reservation");
            }
        }
    }

    /// Hand the stage event to the external sender. Delivery failures are
    /// logged, never surfaced: the workflow does not block on notifications.
    fn notify(
        &self,
        record: &ApplicationRecord,
        old_status: Option<AdmissionStatus>,
        details: BTreeMap<String, String>,
    ) {
        let event = StageEvent {
            application_id: record.application.id.clone(),
            old_status,
            new_status: record.application.status,
            details,
        };
        if let Err(err) = self.notifier.publish(event) {
            warn!(application = %record.application.id.0, error = %err, "notification dropped");
        }
    }
}

fn apply_status(
    record: &mut ApplicationRecord,
    new_status: AdmissionStatus,
    note: String,
    actor: Actor,
) {
    let now = Utc::now();
    record.history.push(StatusHistoryRecord {
        application_id: record.application.id.clone(),
        old_status: Some(record.application.status),
        new_status,
        note,
        actor,
        recorded_at: now,
    });
    record.application.status = new_status;
    record.application.updated_at = now;
}
