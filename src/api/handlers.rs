//! HTTP request handlers

use super::sse::sse_stream;
use super::types::{
    CancelResponse, ChatRequest, ChatResponse, CreateSessionRequest, CreateSessionResponse,
    DeleteSessionResponse, ErrorResponse, PromptResponse, PromptsResponse, SetPromptRequest, SetPromptResponse,
};
use super::{AppState, SessionActionError};
use crate::config::SessionError;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Prompt versions
        .route("/api/prompts", get(list_prompts))
        .route("/api/prompts/:version", get(get_prompt))
        // Sessions
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", delete(delete_session))
        .route("/api/sessions/:id/stream", get(stream_session))
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/api/sessions/:id/prompt", post(set_prompt))
        .route("/api/sessions/:id/cancel", post(cancel_session))
        .route("/api/sessions/:id/charts/:name", get(get_chart))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Prompts
// ============================================================

async fn list_prompts(State(state): State<AppState>) -> Json<PromptsResponse> {
    let prompts = &state.sessions.settings().prompts;
    Json(PromptsResponse {
        prompts: prompts.list().into_iter().map(str::to_string).collect(),
        default: prompts.latest().map(str::to_string),
    })
}

async fn get_prompt(
    State(state): State<AppState>,
    Path(version): Path<String>,
) -> Result<Json<PromptResponse>, AppError> {
    let text = state
        .sessions
        .settings()
        .prompts
        .resolve(&version)
        .map_err(|e| AppError::NotFound(e.to_string()))?;
    Ok(Json(PromptResponse {
        version,
        text: text.to_string(),
    }))
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(
    State(state): State<AppState>,
    req: Option<Json<CreateSessionRequest>>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let req = req.map(|Json(r)| r).unwrap_or_default();
    let session = state
        .sessions
        .create(req.prompt_version.as_deref(), req.data_file.as_deref())
        .await?;
    Ok(Json(CreateSessionResponse {
        session_id: session.id.clone(),
        prompt_version: session.prompt_version().to_string(),
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, AppError> {
    state.sessions.delete(&id).await?;
    Ok(Json(DeleteSessionResponse { deleted: true }))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.sessions.get(&id).await?;
    // Subscribe first so nothing between init and the live feed is lost
    let rx = session.subscribe();
    Ok(sse_stream(session.init_event(), rx))
}

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }
    state.sessions.chat(&id, req.text).await?;
    Ok(Json(ChatResponse { queued: true }))
}

async fn set_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<SetPromptRequest>,
) -> Result<Json<SetPromptResponse>, AppError> {
    let version = state.sessions.set_prompt(&id, &req.prompt_version).await?;
    Ok(Json(SetPromptResponse {
        prompt_version: version.to_string(),
    }))
}

async fn cancel_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let ok = state.sessions.cancel(&id).await?;
    Ok(Json(CancelResponse { ok }))
}

async fn get_chart(
    State(state): State<AppState>,
    Path((id, name)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let path = state
        .sessions
        .chart_path(&id, &name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Chart not found: {name}")))?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    Ok(([(header::CONTENT_TYPE, mime.as_ref().to_string())], bytes).into_response())
}

async fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================
// Errors
// ============================================================

enum AppError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Internal(String),
}

impl From<SessionActionError> for AppError {
    fn from(e: SessionActionError) -> Self {
        match e {
            SessionActionError::NotFound(_) => AppError::NotFound(e.to_string()),
            SessionActionError::Busy => AppError::Conflict(e.to_string()),
            SessionActionError::UnknownPrompt(_) => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::UnknownPrompt(_) | SessionError::Dataset(_) => {
                AppError::BadRequest(e.to_string())
            }
            SessionError::Workspace { .. } => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
