//! Schedule allocation: picks a concrete exam or enrollment schedule for an
//! application and performs the reservation through the ledger. Manual
//! administrator choices go through the exact same capacity check as
//! automatic ones.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;

use super::domain::{
    Actor, Application, Assignment, AssignmentId, AssignmentStatus, ResourceId, ResourceKey,
    ResourceKind, ResourceSpec,
};
use super::ledger::{CapacityLedger, LedgerError, ResourceState};

/// What the allocator is being asked to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationTarget {
    Exam,
    Enrollment { course_id: ResourceId },
}

impl AllocationTarget {
    pub fn kind(&self) -> ResourceKind {
        match self {
            AllocationTarget::Exam => ResourceKind::ExamSchedule,
            AllocationTarget::Enrollment { .. } => ResourceKind::EnrollmentSchedule,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("no {} with open capacity is available", kind.label())]
    NoCapacity { kind: ResourceKind },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl AllocationError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AllocationError::Ledger(err) if err.is_retryable())
    }
}

static ASSIGNMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_assignment_id() -> AssignmentId {
    let id = ASSIGNMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AssignmentId(format!("asg-{id:06}"))
}

/// Allocator over a shared capacity ledger.
pub struct Allocator {
    ledger: Arc<CapacityLedger>,
}

impl Allocator {
    pub fn new(ledger: Arc<CapacityLedger>) -> Self {
        Self { ledger }
    }

    /// Pick a schedule automatically: among active candidates with headroom
    /// (enrollment candidates further restricted to the target course and its
    /// auto-assign schedules), prefer the largest available headroom, then
    /// the earliest date, then the lowest id. Candidates that fill up between
    /// the snapshot and the reservation are skipped in favor of the next one.
    pub fn auto_assign(
        &self,
        application: &Application,
        target: &AllocationTarget,
    ) -> Result<Assignment, AllocationError> {
        let kind = target.kind();
        let mut candidates: Vec<ResourceState> = self
            .ledger
            .states_of_kind(kind)?
            .into_iter()
            .filter(|state| state.active && state.available() > 0)
            .filter(|state| match target {
                AllocationTarget::Exam => true,
                AllocationTarget::Enrollment { course_id } => matches!(
                    &state.spec,
                    ResourceSpec::EnrollmentSchedule {
                        course_id: owner,
                        auto_assign: true,
                        ..
                    } if owner == course_id
                ),
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.available()
                .cmp(&a.available())
                .then_with(|| a.spec.date().cmp(&b.spec.date()))
                .then_with(|| a.key.id.cmp(&b.key.id))
        });

        for candidate in &candidates {
            match self.ledger.reserve(&candidate.key, 1) {
                Ok(reservation) => {
                    return Ok(self.assignment(application, reservation.key, Actor::Auto))
                }
                // A racing reservation beat us to this schedule; try the next.
                Err(LedgerError::CapacityExceeded { .. }) | Err(LedgerError::Inactive { .. }) => {
                    continue
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(AllocationError::NoCapacity { kind })
    }

    /// Explicit administrator choice. Still subject to the ledger's capacity
    /// check; a manual pick never oversells a schedule.
    pub fn manual_assign(
        &self,
        application: &Application,
        schedule: &ResourceKey,
        admin: &str,
    ) -> Result<Assignment, AllocationError> {
        let reservation = self.ledger.reserve(schedule, 1)?;
        Ok(self.assignment(application, reservation.key, Actor::admin(admin)))
    }

    /// Move an assignment to another schedule of the same kind. The new slot
    /// is reserved before the old one is released; if the new schedule has no
    /// room the old reservation is untouched and the assignment unchanged.
    pub fn reassign(
        &self,
        assignment: &mut Assignment,
        new_schedule: &ResourceKey,
        reason: &str,
        admin: &str,
    ) -> Result<Assignment, AllocationError> {
        self.ledger.transfer(&assignment.schedule, new_schedule, 1)?;

        assignment.status = AssignmentStatus::Cancelled;
        assignment.note = Some(reason.to_string());
        assignment.updated_at = Utc::now();

        let now = Utc::now();
        Ok(Assignment {
            id: next_assignment_id(),
            application_id: assignment.application_id.clone(),
            schedule: new_schedule.clone(),
            status: AssignmentStatus::Pending,
            assigned_by: Actor::admin(admin),
            note: Some(reason.to_string()),
            assigned_at: now,
            updated_at: now,
        })
    }

    /// Cancel an assignment and release its unit exactly once. Cancelling an
    /// already-cancelled assignment is a no-op, reported as `false`.
    pub fn cancel(
        &self,
        assignment: &mut Assignment,
        reason: &str,
    ) -> Result<bool, AllocationError> {
        if assignment.status == AssignmentStatus::Cancelled {
            return Ok(false);
        }
        assignment.status = AssignmentStatus::Cancelled;
        assignment.note = Some(reason.to_string());
        assignment.updated_at = Utc::now();
        self.ledger.release(&assignment.schedule, 1)?;
        Ok(true)
    }

    fn assignment(
        &self,
        application: &Application,
        schedule: ResourceKey,
        assigned_by: Actor,
    ) -> Assignment {
        let now = Utc::now();
        Assignment {
            id: next_assignment_id(),
            application_id: application.id.clone(),
            schedule,
            status: AssignmentStatus::Pending,
            assigned_by,
            note: None,
            assigned_at: now,
            updated_at: now,
        }
    }
}
