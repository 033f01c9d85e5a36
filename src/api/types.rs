//! API request and response types

use crate::session::{ChatMessage, SessionState};
use serde::{Deserialize, Serialize};

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Response for chat action
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub queued: bool,
}

/// Response with session transcript and booking state
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub thread_id: String,
    pub booking: SessionState,
    pub messages: Vec<ChatMessage>,
    pub working: bool,
}

/// Request for a single stateless turn
#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
