//! Central transition table for the application lifecycle. Any `(status,
//! event)` pair not whitelisted here fails with [`StateTransitionError`] and
//! leaves the application untouched, which is also the guard against a
//! duplicated admin action racing itself.

use serde::{Deserialize, Serialize};

use super::domain::AdmissionStatus;

/// Events an administrator (or batch sweep) can raise against an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionEvent {
    Verify,
    ScheduleExam,
    PostScore,
    AssignCourse,
    ScheduleEnrollment,
    Complete,
    Reject,
    Resubmit,
}

impl AdmissionEvent {
    pub const fn label(self) -> &'static str {
        match self {
            AdmissionEvent::Verify => "verify",
            AdmissionEvent::ScheduleExam => "schedule exam",
            AdmissionEvent::PostScore => "post score",
            AdmissionEvent::AssignCourse => "assign course",
            AdmissionEvent::ScheduleEnrollment => "schedule enrollment",
            AdmissionEvent::Complete => "complete enrollment",
            AdmissionEvent::Reject => "reject",
            AdmissionEvent::Resubmit => "resubmit",
        }
    }
}

/// Raised when an event is applied from the wrong status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {} an application in status '{}'", event.label(), from.label())]
pub struct StateTransitionError {
    pub from: AdmissionStatus,
    pub event: AdmissionEvent,
}

/// Resolve the next status for `(from, event)`, or fail without side effects.
pub fn transition(
    from: AdmissionStatus,
    event: AdmissionEvent,
) -> Result<AdmissionStatus, StateTransitionError> {
    use AdmissionEvent as E;
    use AdmissionStatus as S;

    let next = match (from, event) {
        (S::Submitted, E::Verify) => S::Verified,
        (S::Verified, E::ScheduleExam) => S::ExamScheduled,
        (S::ExamScheduled, E::PostScore) => S::ScorePosted,
        (S::ScorePosted, E::AssignCourse) => S::CourseAssigned,
        (S::CourseAssigned, E::ScheduleEnrollment) => S::EnrollmentScheduled,
        (S::EnrollmentScheduled, E::Complete) => S::Enrolled,
        (from, E::Reject) if !from.is_terminal() => S::Rejected,
        (S::Rejected, E::Resubmit) => S::Submitted,
        _ => return Err(StateTransitionError { from, event }),
    };

    Ok(next)
}
