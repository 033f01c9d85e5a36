//! HTTP API for the support assistant

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::agent::Orchestrator;
use crate::session::SessionManager;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(sessions: Arc<SessionManager>, orchestrator: Orchestrator) -> Self {
        Self {
            sessions,
            orchestrator,
        }
    }
}
