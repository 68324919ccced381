// 🌐 HTTP surface - axum router over the pipeline
//
// All pipeline operations go through one async mutex, so there is only ever
// one writer touching the session directories or the ledger.

use crate::auth::AuthGate;
use crate::pipeline::{Pipeline, PipelineError, SessionStatus};
use crate::session::SessionError;
use crate::spreadsheet::{CodecError, XLSX_CONTENT_TYPE};
use crate::validation::{ValidationError, ValidationReport};
use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Multipart, Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Mutex<Pipeline>>,
    auth: Arc<dyn AuthGate>,
}

impl AppState {
    pub fn new(pipeline: Pipeline, auth: Arc<dyn AuthGate>) -> Self {
        AppState {
            pipeline: Arc::new(Mutex::new(pipeline)),
            auth,
        }
    }

    fn require_auth(&self) -> Result<(), ApiError> {
        if self.auth.is_authenticated() {
            Ok(())
        } else {
            Err(ApiError::new(StatusCode::UNAUTHORIZED, "Not authenticated"))
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

/// `{success, message, ...body}` for the pipeline operations
#[derive(Serialize)]
struct Outcome<T> {
    success: bool,
    message: String,
    #[serde(flatten)]
    body: T,
}

impl<T> Outcome<T> {
    fn ok(message: impl Into<String>, body: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            body,
        }
    }
}

#[derive(Serialize)]
struct StatusResponse {
    success: bool,
    has_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<SessionStatus>,
}

#[derive(Serialize)]
struct AuthStatus {
    authenticated: bool,
}

/// Failure body: `{success: false, detail, ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
    report: Option<ValidationReport>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    detail: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    invalid_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<&'a [ValidationError]>,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        ApiError {
            status,
            detail: detail.into(),
            report: None,
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = match &err {
            PipelineError::BadInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::Session(SessionError::InvalidId(_)) => StatusCode::BAD_REQUEST,
            PipelineError::Session(
                SessionError::NotFound(_) | SessionError::NoSessions | SessionError::ArtifactMissing { .. },
            ) => StatusCode::NOT_FOUND,
            PipelineError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Codec(CodecError::Unreadable(_)) => StatusCode::BAD_REQUEST,
            PipelineError::Codec(CodecError::Invalid { .. }) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Codec(CodecError::Write(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Ledger(_) => StatusCode::BAD_GATEWAY,
            PipelineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::StageViolation { .. } => StatusCode::CONFLICT,
            PipelineError::Empty(_) => StatusCode::NOT_FOUND,
        };
        let detail = err.to_string();
        let report = match err {
            PipelineError::Validation(report) => Some(report),
            _ => None,
        };
        ApiError { status, detail, report }
    }
}

// Extractor failures get the same `{success: false, detail}` body as
// everything else instead of axum's plain-text rejection.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("❌ {} {}", self.status, self.detail);
        }
        let body = ErrorBody {
            success: false,
            detail: &self.detail,
            valid_count: self.report.as_ref().map(|r| r.valid_count),
            invalid_count: self.report.as_ref().map(|r| r.invalid_count),
            errors: self.report.as_ref().map(|r| r.errors.as_slice()),
        };
        (self.status, Json(body)).into_response()
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UndoRequest {
    pub loan_id: i64,
    pub cutoff_date: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

#[derive(Serialize)]
struct UndoBody {
    session_id: String,
    success_count: usize,
    failure_count: usize,
    transactions: Vec<crate::records::UndoOutcome>,
}

#[derive(Serialize)]
struct ReplayBody {
    session_id: String,
    success_count: usize,
    failure_count: usize,
    total_count: usize,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/undo-transactions
///
/// Runs in its own task so a dropped connection cannot stop a half-done
/// batch of reversals.
async fn undo_transactions(
    State(state): State<AppState>,
    payload: Result<Json<UndoRequest>, JsonRejection>,
) -> Result<Json<impl Serialize>, ApiError> {
    state.require_auth()?;
    let Json(request) = payload?;
    info!("Undo requested: loan {} from {}", request.loan_id, request.cutoff_date);

    let pipeline = state.pipeline.clone();
    let report = tokio::spawn(async move {
        let pipeline = pipeline.lock().await;
        pipeline.undo(request.loan_id, &request.cutoff_date).await
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("undo task failed: {e}")))??;

    let message = format!("Processed {} transactions", report.transactions.len());
    Ok(Json(Outcome::ok(
        message,
        UndoBody {
            session_id: report.session_id,
            success_count: report.success_count,
            failure_count: report.failure_count,
            transactions: report.transactions,
        },
    )))
}

/// GET /api/export-excel - XLSX download
async fn export_excel(
    State(state): State<AppState>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    state.require_auth()?;
    let Query(query) = query?;

    let export = state.pipeline.lock().await.export(query.session_id.as_deref())?;
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        export.file_name,
        urlencoding::encode(&export.file_name)
    );

    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        export.bytes,
    )
        .into_response())
}

/// POST /api/import-excel - multipart field `file`
async fn import_excel(
    State(state): State<AppState>,
    query: Result<Query<SessionQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<impl Serialize>, ApiError> {
    state.require_auth()?;
    let Query(query) = query?;
    let mut multipart = multipart?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed upload: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("Malformed upload: {e}")))?;
            upload = Some(bytes);
            break;
        }
    }
    let bytes = upload.ok_or_else(|| ApiError::bad_request("Missing multipart field 'file'"))?;

    let report = state
        .pipeline
        .lock()
        .await
        .import(query.session_id.as_deref(), &bytes)?;

    Ok(Json(Outcome::ok(
        format!("Imported {} transactions to session", report.total_count),
        report,
    )))
}

/// POST /api/replay-transactions
async fn replay_transactions(
    State(state): State<AppState>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> Result<Json<impl Serialize>, ApiError> {
    state.require_auth()?;
    let Query(query) = query?;

    let pipeline = state.pipeline.clone();
    let report = tokio::spawn(async move {
        let pipeline = pipeline.lock().await;
        pipeline.replay(query.session_id.as_deref()).await
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("replay task failed: {e}")))??;

    Ok(Json(Outcome::ok(
        format!("Replayed {} transactions", report.total_count),
        ReplayBody {
            session_id: report.session_id,
            success_count: report.success_count,
            failure_count: report.failure_count,
            total_count: report.total_count,
        },
    )))
}

/// GET /api/status - one session, the latest by default
async fn get_status(
    State(state): State<AppState>,
    query: Result<Query<SessionQuery>, QueryRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    state.require_auth()?;
    let Query(query) = query?;

    let requested = query.session_id.as_deref().filter(|s| !s.trim().is_empty());
    match state.pipeline.lock().await.status(requested) {
        Ok(session) => Ok(Json(StatusResponse {
            success: true,
            has_session: true,
            session: Some(session),
        })),
        Err(PipelineError::Session(SessionError::NoSessions)) if requested.is_none() => Ok(Json(StatusResponse {
            success: true,
            has_session: false,
            session: None,
        })),
        Err(e) => Err(e.into()),
    }
}

/// GET /api/sessions - newest first
async fn list_sessions(State(state): State<AppState>) -> Result<Json<impl Serialize>, ApiError> {
    state.require_auth()?;
    let sessions = state.pipeline.lock().await.sessions()?;
    Ok(Json(ApiResponse::ok(sessions)))
}

/// GET /api/auth-status
async fn auth_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(AuthStatus {
        authenticated: state.auth.is_authenticated(),
    })
}

/// POST /api/logout
async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    state.auth.logout();
    info!("Operator logged out");
    Json(Outcome::ok("Logged out successfully", serde_json::json!({})))
}

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(include_str!("../web/index.html"))
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/undo-transactions", post(undo_transactions))
        .route("/export-excel", get(export_excel))
        .route(
            "/import-excel",
            post(import_excel).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/replay-transactions", post(replay_transactions))
        .route("/status", get(get_status))
        .route("/sessions", get(list_sessions))
        .route("/auth-status", get(auth_status))
        .route("/logout", post(logout))
        .with_state(state);

    Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .nest_service("/static", ServeDir::new("web"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
