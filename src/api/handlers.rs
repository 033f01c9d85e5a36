//! HTTP request handlers

use super::sse::{session_stream, turn_stream};
use super::types::{ChatRequest, ChatResponse, ErrorResponse, SessionResponse, TurnRequest};
use super::AppState;
use crate::session::{SessionError, SessionInfo};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_session).delete(delete_session))
        // User input and live updates
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/api/sessions/:id/stream", get(stream_session))
        // Single turn, no booking sub-flow
        .route("/api/turn", post(run_turn))
        // Version
        .route("/version", get(get_version))
        .with_state(state)
}

// ============================================================
// Sessions
// ============================================================

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionInfo>) {
    let handle = state.sessions.create().await;
    (StatusCode::CREATED, Json(handle.info))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let handle = state.sessions.get(&id).await?;
    let snapshot = handle.snapshot.read().await.clone();
    Ok(Json(SessionResponse {
        session_id: handle.info.session_id,
        thread_id: handle.info.thread_id,
        booking: snapshot.state,
        messages: snapshot.messages,
        working: snapshot.working,
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.sessions.close(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    if req.text.trim().is_empty() {
        return Err(AppError::BadRequest("Message text is empty".to_string()));
    }
    state.sessions.send_message(&id, req.text).await?;
    Ok(Json(ChatResponse { queued: true }))
}

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Subscribe before taking the snapshot so no update falls in between
    let broadcast_rx = state.sessions.subscribe(&id).await?;
    let snapshot = state.sessions.snapshot(&id).await?;
    Ok(session_stream(id, snapshot, broadcast_rx))
}

// ============================================================
// Single turn
// ============================================================

async fn run_turn(
    State(state): State<AppState>,
    Json(req): Json<TurnRequest>,
) -> Result<impl IntoResponse, AppError> {
    if req.query.trim().is_empty() {
        return Err(AppError::BadRequest("Query is empty".to_string()));
    }
    let session_id = req
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let stream = state.orchestrator.submit(req.query, &session_id);
    Ok(turn_stream(stream))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::NotFound(_) => AppError::NotFound(e.to_string()),
            SessionError::Closed => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
