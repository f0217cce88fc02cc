//! HTTP surface: submit calculations, inspect the worker, fetch exports.
//!
//! | Method | Path                                                 |
//! |--------|------------------------------------------------------|
//! | POST   | `/api/v1/calculations`                               |
//! | GET    | `/api/v1/calculations/status`                        |
//! | GET    | `/api/v1/calculations/{work_key}/artifacts/{kind}`   |
//! | GET    | `/health`                                            |

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use validator::Validate;
use valvesize_core::codec::SparseRow;
use valvesize_core::work_key::WorkKey;
use valvesize_engine::session::ExportKind;
use valvesize_pipeline::ArtifactPaths;

use crate::worker::{SizingWorker, WorkerStatus};

/// HTTP request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// State, envelope, errors
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub worker: Arc<SizingWorker>,
}

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", errors.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message, "code": code }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitCalculation {
    #[validate(length(min = 1, message = "work_key must not be empty"))]
    pub work_key: String,
    /// Request columns to store before the job is queued.
    #[serde(default)]
    pub fields: Option<SparseRow>,
}

#[derive(Debug, Serialize)]
pub struct Submitted {
    pub work_key: String,
    pub queued: bool,
}

/// POST /api/v1/calculations
///
/// Fire-and-forget: returns 202 as soon as the token is queued. A failed
/// field upsert is logged and the job is queued anyway.
async fn submit(
    State(state): State<AppState>,
    Json(input): Json<SubmitCalculation>,
) -> ApiResult<impl IntoResponse> {
    input.validate()?;
    let token = input.work_key.trim().to_string();

    if let Some(fields) = input.fields.filter(|f| !f.is_empty()) {
        match WorkKey::parse(&token) {
            Ok(key) => {
                if let Err(e) = state.worker.driver().store().upsert_request(&key, &fields).await {
                    tracing::warn!(work_key = %key, error = %e, "Failed to store request fields");
                }
            }
            Err(e) => {
                tracing::warn!(token = %token, error = %e, "Fields ignored for malformed work key");
            }
        }
    }

    state.worker.enqueue(token.clone());
    let worker = Arc::clone(&state.worker);
    tokio::spawn(async move {
        worker.start_draining().await;
    });

    tracing::info!(token = %token, "Calculation submitted");
    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: Submitted {
                work_key: token,
                queued: true,
            },
        }),
    ))
}

// ---------------------------------------------------------------------------
// Status / artifacts
// ---------------------------------------------------------------------------

/// GET /api/v1/calculations/status
async fn status(State(state): State<AppState>) -> Json<DataResponse<WorkerStatus>> {
    Json(DataResponse {
        data: state.worker.status(),
    })
}

/// GET /api/v1/calculations/{work_key}/artifacts/{kind}
async fn artifact(
    State(state): State<AppState>,
    Path((work_key, kind)): Path<(String, String)>,
) -> ApiResult<Response> {
    let key = WorkKey::parse(&work_key).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let kind: ExportKind = kind.parse().map_err(|_| {
        ApiError::BadRequest(format!("Unknown artifact kind '{kind}', expected snapshot or report"))
    })?;
    let paths = ArtifactPaths::for_job(&state.worker.driver().config().results_dir, &key)
        .ok_or_else(|| {
            ApiError::BadRequest(format!("Request id '{}' is not usable", key.request_id()))
        })?;

    let body = match tokio::fs::read(paths.path(kind)).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("No {kind} for {key}")));
        }
        Err(e) => return Err(ApiError::Internal(format!("Failed to read {kind} for {key}: {e}"))),
    };

    let content_type = match kind {
        ExportKind::Snapshot => "application/json",
        ExportKind::Report => "text/html; charset=utf-8",
    };
    Ok(([(CONTENT_TYPE, content_type)], body).into_response())
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/calculations", post(submit))
        .route("/calculations/status", get(status))
        .route("/calculations/{work_key}/artifacts/{kind}", get(artifact))
}

/// The full application router with its middleware stack.
pub fn build_router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .with_state(state)
}
