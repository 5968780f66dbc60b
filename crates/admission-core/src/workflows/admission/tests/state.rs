use crate::workflows::admission::domain::AdmissionStatus;
use crate::workflows::admission::state::{transition, AdmissionEvent};

use AdmissionEvent as E;
use AdmissionStatus as S;

const EVENTS: [AdmissionEvent; 8] = [
    E::Verify,
    E::ScheduleExam,
    E::PostScore,
    E::AssignCourse,
    E::ScheduleEnrollment,
    E::Complete,
    E::Reject,
    E::Resubmit,
];

fn expected(from: AdmissionStatus, event: AdmissionEvent) -> Option<AdmissionStatus> {
    match (from, event) {
        (S::Submitted, E::Verify) => Some(S::Verified),
        (S::Verified, E::ScheduleExam) => Some(S::ExamScheduled),
        (S::ExamScheduled, E::PostScore) => Some(S::ScorePosted),
        (S::ScorePosted, E::AssignCourse) => Some(S::CourseAssigned),
        (S::CourseAssigned, E::ScheduleEnrollment) => Some(S::EnrollmentScheduled),
        (S::EnrollmentScheduled, E::Complete) => Some(S::Enrolled),
        (S::Rejected, E::Resubmit) => Some(S::Submitted),
        (from, E::Reject) if !from.is_terminal() => Some(S::Rejected),
        _ => None,
    }
}

/// The table is closed: every pair outside the allowed set errors, and the
/// error names both the offending status and the attempted event.
#[test]
fn transition_table_is_closed() {
    for from in AdmissionStatus::ALL {
        for event in EVENTS {
            match (transition(from, event), expected(from, event)) {
                (Ok(next), Some(want)) => assert_eq!(next, want, "{from:?} + {event:?}"),
                (Err(err), None) => {
                    assert_eq!(err.from, from);
                    assert_eq!(err.event, event);
                    let message = err.to_string();
                    assert!(message.contains(from.label()), "message: {message}");
                }
                (Ok(next), None) => panic!("{from:?} + {event:?} unexpectedly gave {next:?}"),
                (Err(err), Some(want)) => {
                    panic!("{from:?} + {event:?} should give {want:?}, got {err}")
                }
            }
        }
    }
}

#[test]
fn reject_is_reachable_from_every_active_status() {
    for from in AdmissionStatus::ALL {
        if from.is_terminal() {
            assert!(transition(from, E::Reject).is_err(), "{from:?}");
        } else {
            assert_eq!(transition(from, E::Reject), Ok(S::Rejected), "{from:?}");
        }
    }
}

#[test]
fn enrolled_accepts_no_further_events() {
    for event in EVENTS {
        assert!(transition(S::Enrolled, event).is_err(), "{event:?}");
    }
}

#[test]
fn resubmission_restarts_the_pipeline() {
    let reopened = transition(S::Rejected, E::Resubmit).expect("resubmit allowed");
    assert_eq!(reopened, S::Submitted);
    assert_eq!(transition(reopened, E::Verify), Ok(S::Verified));
}
