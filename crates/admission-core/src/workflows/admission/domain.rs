use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for admission applications.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for the applicant behind an application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicantId(pub String);

/// Identifier wrapper for ledger-managed resources (courses and schedules).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub String);

/// Identifier wrapper for exam and enrollment assignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

/// Identifier wrapper for venues backing schedules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VenueId(pub String);

/// The three kinds of capacity-bounded resources the ledger tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Course,
    ExamSchedule,
    EnrollmentSchedule,
}

impl ResourceKind {
    pub const fn label(self) -> &'static str {
        match self {
            ResourceKind::Course => "course",
            ResourceKind::ExamSchedule => "exam schedule",
            ResourceKind::EnrollmentSchedule => "enrollment schedule",
        }
    }
}

/// Fully qualified resource address. The derived ordering (kind, then id) is
/// the fixed total order used whenever two resource rows must be locked
/// together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub id: ResourceId,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: ResourceId(id.into()),
        }
    }
}

/// Canonical lifecycle status of an application. Labels match the values the
/// admission office sees in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdmissionStatus {
    Submitted,
    Verified,
    ExamScheduled,
    ScorePosted,
    CourseAssigned,
    EnrollmentScheduled,
    Enrolled,
    Rejected,
}

impl AdmissionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AdmissionStatus::Submitted => "Submitted",
            AdmissionStatus::Verified => "Verified",
            AdmissionStatus::ExamScheduled => "Exam Scheduled",
            AdmissionStatus::ScorePosted => "Score Posted",
            AdmissionStatus::CourseAssigned => "Course Assigned",
            AdmissionStatus::EnrollmentScheduled => "Enrollment Scheduled",
            AdmissionStatus::Enrolled => "Enrolled",
            AdmissionStatus::Rejected => "Rejected",
        }
    }

    /// Terminal statuses accept no forward event. `Rejected` is still
    /// re-enterable through resubmission.
    pub const fn is_terminal(self) -> bool {
        matches!(self, AdmissionStatus::Enrolled | AdmissionStatus::Rejected)
    }

    /// An active application blocks the applicant from opening another one.
    pub const fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub const ALL: [AdmissionStatus; 8] = [
        AdmissionStatus::Submitted,
        AdmissionStatus::Verified,
        AdmissionStatus::ExamScheduled,
        AdmissionStatus::ScorePosted,
        AdmissionStatus::CourseAssigned,
        AdmissionStatus::EnrollmentScheduled,
        AdmissionStatus::Enrolled,
        AdmissionStatus::Rejected,
    ];
}

/// Who performed an action: a named administrator or the automatic allocator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Actor {
    Admin(String),
    Auto,
}

impl Actor {
    pub fn admin(name: impl Into<String>) -> Self {
        Actor::Admin(name.into())
    }

    pub fn label(&self) -> &str {
        match self {
            Actor::Admin(name) => name,
            Actor::Auto => "auto",
        }
    }
}

/// Assignment lifecycle. Only cancellation releases the reserved unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Pending,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }
}

/// Links an application to a schedule slot. Exam and enrollment assignments
/// share this shape; the kind is carried by the schedule key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub application_id: ApplicationId,
    pub schedule: ResourceKey,
    pub status: AssignmentStatus,
    pub assigned_by: Actor,
    pub note: Option<String>,
    pub assigned_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Assignment {
    pub fn kind(&self) -> ResourceKind {
        self.schedule.kind
    }
}

/// One admission attempt. Mutated only through state-machine transitions and
/// never physically deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    pub id: ApplicationId,
    pub applicant_id: ApplicantId,
    pub control_number: String,
    pub status: AdmissionStatus,
    pub course_id: Option<ResourceId>,
    pub rejection_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Entrance exam result on the stanine scale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub stanine: u8,
    pub recorded_by: Actor,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only audit row written for every applied transition. The canonical
/// record of how long an application spent in each stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryRecord {
    pub application_id: ApplicationId,
    pub old_status: Option<AdmissionStatus>,
    pub new_status: AdmissionStatus,
    pub note: String,
    pub actor: Actor,
    pub recorded_at: DateTime<Utc>,
}

/// Administrator-owned venue; schedules may not exceed its capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    pub capacity: u32,
}

/// Descriptive fields of a course resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDetails {
    pub code: String,
    pub name: String,
}

/// Date, time window, and venue of a schedule resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDetails {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub venue_id: VenueId,
}

/// Kind-specific metadata stored alongside each ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceSpec {
    Course(CourseDetails),
    ExamSchedule(ScheduleDetails),
    EnrollmentSchedule {
        schedule: ScheduleDetails,
        course_id: ResourceId,
        auto_assign: bool,
    },
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Course(_) => ResourceKind::Course,
            ResourceSpec::ExamSchedule(_) => ResourceKind::ExamSchedule,
            ResourceSpec::EnrollmentSchedule { .. } => ResourceKind::EnrollmentSchedule,
        }
    }

    /// Schedule date, if this resource has one. Used for allocation
    /// tie-breaking; courses sort last.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            ResourceSpec::Course(_) => None,
            ResourceSpec::ExamSchedule(details) => Some(details.date),
            ResourceSpec::EnrollmentSchedule { schedule, .. } => Some(schedule.date),
        }
    }
}

/// Read-only counter snapshot exposed for reporting. Allocation decisions
/// never trust a snapshot; they re-check under the row lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CapacitySnapshot {
    pub capacity: u32,
    pub used: u32,
    pub available: u32,
}

impl CapacitySnapshot {
    pub fn new(capacity: u32, used: u32) -> Self {
        Self {
            capacity,
            used,
            available: capacity.saturating_sub(used),
        }
    }
}
