use crate::infra::AppState;
use admission_core::workflows::admission::{
    admission_router, write_score_template, AdmissionService, ApplicationRepository,
    NotificationPublisher,
};
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_admission_routes<R, N>(service: Arc<AdmissionService<R, N>>) -> axum::Router
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    admission_router(service.clone())
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .merge(score_routes(service))
}

fn score_routes<R, N>(service: Arc<AdmissionService<R, N>>) -> axum::Router
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    axum::Router::new()
        .route(
            "/api/v1/scores/import",
            axum::routing::post(score_import_endpoint::<R, N>),
        )
        .route(
            "/api/v1/scores/template",
            axum::routing::get(score_template_endpoint),
        )
        .with_state(service)
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScoreImportQuery {
    #[serde(default)]
    pub(crate) admin: Option<String>,
}

/// Bulk score upload: the request body is the CSV sheet itself.
pub(crate) async fn score_import_endpoint<R, N>(
    State(service): State<Arc<AdmissionService<R, N>>>,
    Query(query): Query<ScoreImportQuery>,
    body: String,
) -> impl IntoResponse
where
    R: ApplicationRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let admin = query.admin.unwrap_or_else(|| "bulk-upload".to_string());
    match service.import_scores(body.as_bytes(), &admin) {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(err) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}

pub(crate) async fn score_template_endpoint() -> impl IntoResponse {
    let mut buffer = Vec::new();
    if let Err(err) = write_score_template(&mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": err.to_string() })),
        )
            .into_response();
    }
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"score_upload_template.csv\"",
            ),
        ],
        buffer,
    )
        .into_response()
}
