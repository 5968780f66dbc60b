use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    AdmissionStatus, ApplicantId, Application, ApplicationId, Assignment, AssignmentStatus,
    ResourceKind, ScoreRecord, StatusHistoryRecord,
};

/// Aggregate record: the application plus everything it owns (score,
/// assignments, and the append-only status history).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationRecord {
    pub application: Application,
    pub score: Option<ScoreRecord>,
    pub assignments: Vec<Assignment>,
    pub history: Vec<StatusHistoryRecord>,
}

impl ApplicationRecord {
    pub fn pending_assignment(&self, kind: ResourceKind) -> Option<&Assignment> {
        self.assignments
            .iter()
            .find(|assignment| assignment.kind() == kind && assignment.status == AssignmentStatus::Pending)
    }

    pub fn pending_assignment_mut(&mut self, kind: ResourceKind) -> Option<&mut Assignment> {
        self.assignments
            .iter_mut()
            .find(|assignment| assignment.kind() == kind && assignment.status == AssignmentStatus::Pending)
    }

    pub fn status_view(&self) -> ApplicationStatusView {
        ApplicationStatusView {
            application_id: self.application.id.clone(),
            control_number: self.application.control_number.clone(),
            status: self.application.status.label(),
            course_id: self.application.course_id.as_ref().map(|id| id.0.clone()),
            stanine: self.score.as_ref().map(|score| score.stanine),
            rejection_reason: self.application.rejection_reason.clone(),
        }
    }
}

/// Sanitized representation of an application's externally visible state.
#[derive(Debug, Clone, Serialize)]
pub struct ApplicationStatusView {
    pub application_id: ApplicationId,
    pub control_number: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stanine: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// Storage abstraction so the orchestrator can be exercised in isolation.
pub trait ApplicationRepository: Send + Sync {
    fn insert(&self, record: ApplicationRecord) -> Result<ApplicationRecord, RepositoryError>;
    fn update(&self, record: ApplicationRecord) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &ApplicationId) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn fetch_by_control_number(
        &self,
        control_number: &str,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
    fn with_status(
        &self,
        status: AdmissionStatus,
    ) -> Result<Vec<ApplicationRecord>, RepositoryError>;
    fn active_for_applicant(
        &self,
        applicant_id: &ApplicantId,
    ) -> Result<Option<ApplicationRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Event handed to the external notification sender after a transition
/// commits. Delivery is asynchronous; the engine never waits on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    pub application_id: ApplicationId,
    pub old_status: Option<AdmissionStatus>,
    pub new_status: AdmissionStatus,
    pub details: BTreeMap<String, String>,
}

/// Trait describing the outbound notification hook (e-mail sender, queue).
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, event: StageEvent) -> Result<(), NotificationError>;
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
