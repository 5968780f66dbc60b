use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::allocator::AllocationError;
use super::domain::{Actor, ApplicationId, AssignmentId, ResourceId, ResourceKey, ResourceKind};
use super::ledger::LedgerError;
use super::repository::{ApplicationRepository, NotificationPublisher, RepositoryError};
use super::service::{AdmissionService, AdmissionServiceError, ScheduleSelection};

/// Router builder exposing HTTP endpoints for the admission workflow.
pub fn admission_router<R, N>(service: Arc<AdmissionService<R, N>>) -> Router
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/admissions", post(submit_handler::<R, N>))
        .route(
            "/api/v1/admissions/:application_id",
            get(status_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/history",
            get(history_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/verify",
            post(verify_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/reject",
            post(reject_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/exam-schedule",
            post(exam_schedule_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/score",
            post(score_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/course",
            post(course_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/enrollment-schedule",
            post(enrollment_schedule_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/enrollment-reassign",
            post(enrollment_reassign_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/assignments/:assignment_id/cancel",
            post(cancel_assignment_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/complete",
            post(complete_handler::<R, N>),
        )
        .route(
            "/api/v1/admissions/:application_id/resubmit",
            post(resubmit_handler::<R, N>),
        )
        .route(
            "/api/v1/resources/:kind/:resource_id/capacity",
            get(capacity_handler::<R, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitRequest {
    pub applicant_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct VerifyRequest {
    pub admin: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RejectRequest {
    pub admin: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScheduleRequest {
    pub admin: String,
    /// Omit for automatic selection.
    #[serde(default)]
    pub schedule_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScoreRequest {
    pub admin: String,
    pub stanine: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CourseRequest {
    pub admin: String,
    pub course_id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReassignRequest {
    pub admin: String,
    pub schedule_id: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CancelRequest {
    pub admin: String,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompleteRequest {
    pub admin: String,
}

#[derive(Debug, Deserialize, Default)]
pub(crate) struct ResubmitRequest {
    #[serde(default)]
    pub admin: Option<String>,
}

impl ScheduleRequest {
    fn selection(&self) -> ScheduleSelection {
        match &self.schedule_id {
            Some(id) => ScheduleSelection::Schedule(ResourceId(id.clone())),
            None => ScheduleSelection::Auto,
        }
    }
}

pub(crate) async fn submit_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    axum::Json(request): axum::Json<SubmitRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.submit_application(super::domain::ApplicantId(request.applicant_id)) {
        Ok(record) => (StatusCode::CREATED, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn status_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.get(&id) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn history_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.get(&id) {
        Ok(record) => (StatusCode::OK, axum::Json(record.history)).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn verify_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<VerifyRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.verify_application(&id, request.note, &request.admin) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn reject_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<RejectRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.reject_application(&id, &request.reason, &request.admin) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn exam_schedule_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<ScheduleRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.schedule_exam(&id, &request.selection(), &request.admin) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn score_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<ScoreRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.post_score(&id, request.stanine, &request.admin) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn course_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<CourseRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.assign_course(&id, &ResourceId(request.course_id), &request.admin) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn enrollment_schedule_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<ScheduleRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.schedule_enrollment(&id, &request.selection(), &request.admin) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn enrollment_reassign_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<ReassignRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.reassign_enrollment(
        &id,
        &ResourceId(request.schedule_id),
        &request.reason,
        &request.admin,
    ) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn cancel_assignment_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path((application_id, assignment_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<CancelRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    let assignment = AssignmentId(assignment_id);
    match service.cancel_assignment(&id, &assignment, &request.reason, &request.admin) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn complete_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<CompleteRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    match service.complete_enrollment(&id, &request.admin) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn resubmit_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path(application_id): Path<String>,
    axum::Json(request): axum::Json<ResubmitRequest>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let id = ApplicationId(application_id);
    let actor = match request.admin {
        Some(admin) => Actor::admin(admin),
        None => Actor::Auto,
    };
    match service.resubmit(&id, actor) {
        Ok(record) => (StatusCode::OK, axum::Json(record.status_view())).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn capacity_handler<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Path((kind, resource_id)): Path<(String, String)>,
) -> Response
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let kind = match kind.as_str() {
        "courses" => ResourceKind::Course,
        "exam-schedules" => ResourceKind::ExamSchedule,
        "enrollment-schedules" => ResourceKind::EnrollmentSchedule,
        other => {
            let payload = json!({
                "error": format!("unknown resource kind '{other}'"),
            });
            return (StatusCode::NOT_FOUND, axum::Json(payload)).into_response();
        }
    };
    let key = ResourceKey {
        kind,
        id: ResourceId(resource_id),
    };
    match service.ledger().capacity_of(&key) {
        Ok(snapshot) => (StatusCode::OK, axum::Json(snapshot)).into_response(),
        Err(err) => error_response(AdmissionServiceError::Ledger(err)),
    }
}

/// Map workflow errors onto HTTP statuses. Retryable contention is reported
/// as 503 so clients know to try again.
fn error_response(err: AdmissionServiceError) -> Response {
    let status = error_status(&err);
    let payload = json!({
        "error": err.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

fn error_status(err: &AdmissionServiceError) -> StatusCode {
    let ledger = match err {
        AdmissionServiceError::Ledger(inner) => Some(inner),
        AdmissionServiceError::Allocation(AllocationError::Ledger(inner)) => Some(inner),
        _ => None,
    };
    if let Some(inner) = ledger {
        return match inner {
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::CapacityExceeded { .. } => StatusCode::CONFLICT,
            LedgerError::Contended { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
    }
    match err {
        AdmissionServiceError::Repository(RepositoryError::NotFound)
        | AdmissionServiceError::AssignmentNotFound { .. } => StatusCode::NOT_FOUND,
        AdmissionServiceError::Repository(RepositoryError::Conflict)
        | AdmissionServiceError::Transition(_)
        | AdmissionServiceError::Allocation(AllocationError::NoCapacity { .. }) => {
            StatusCode::CONFLICT
        }
        AdmissionServiceError::Validation(_)
        | AdmissionServiceError::Score(_)
        | AdmissionServiceError::Import(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
