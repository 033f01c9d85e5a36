//! In-memory registry of live sessions

use super::event::SessionEvent;
use super::runtime::{SessionRuntime, SessionSnapshot, SessionUpdate};
use super::state::SessionContext;
use crate::agent::Orchestrator;
use crate::calendar::CalendarProvider;
use crate::config::ContactInfo;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;

/// Upper bound on the delay between idle sweeps
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),
    #[error("Session runtime has stopped")]
    Closed,
}

/// Identifiers handed back when a session is created
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub thread_id: String,
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    pub info: SessionInfo,
    pub event_tx: mpsc::Sender<SessionEvent>,
    pub broadcast_tx: broadcast::Sender<SessionUpdate>,
    pub snapshot: Arc<RwLock<SessionSnapshot>>,
    last_active: Arc<RwLock<Instant>>,
}

impl SessionHandle {
    async fn touch(&self) {
        *self.last_active.write().await = Instant::now();
    }
}

/// Manager for all session runtimes
pub struct SessionManager {
    orchestrator: Orchestrator,
    calendar: Arc<dyn CalendarProvider>,
    contact: ContactInfo,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionManager {
    pub fn new(
        orchestrator: Orchestrator,
        calendar: Arc<dyn CalendarProvider>,
        contact: ContactInfo,
    ) -> Self {
        Self {
            orchestrator,
            calendar,
            contact,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new session runtime in the background
    pub async fn create(&self) -> SessionHandle {
        let session_id = uuid::Uuid::new_v4().to_string();
        let context = SessionContext::new(&session_id, self.contact.clone());
        let info = SessionInfo {
            session_id: context.session_id.clone(),
            thread_id: context.thread_id.clone(),
        };

        let (event_tx, event_rx) = mpsc::channel(32);
        let (broadcast_tx, _) = broadcast::channel(256);
        let snapshot = Arc::new(RwLock::new(SessionSnapshot::default()));

        let runtime = SessionRuntime::new(
            context,
            self.orchestrator.clone(),
            self.calendar.clone(),
            snapshot.clone(),
            event_rx,
            broadcast_tx.clone(),
        );
        tokio::spawn(runtime.run());

        let handle = SessionHandle {
            info,
            event_tx,
            broadcast_tx,
            snapshot,
            last_active: Arc::new(RwLock::new(Instant::now())),
        };
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), handle.clone());
        tracing::info!(session_id = %session_id, "Session created");
        handle
    }

    pub async fn get(&self, session_id: &str) -> Result<SessionHandle, SessionError> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Queue user text for the session's runtime
    pub async fn send_message(&self, session_id: &str, text: String) -> Result<(), SessionError> {
        let handle = self.get(session_id).await?;
        handle.touch().await;
        handle
            .event_tx
            .send(SessionEvent::UserMessage { text })
            .await
            .map_err(|_| SessionError::Closed)
    }

    pub async fn subscribe(
        &self,
        session_id: &str,
    ) -> Result<broadcast::Receiver<SessionUpdate>, SessionError> {
        Ok(self.get(session_id).await?.broadcast_tx.subscribe())
    }

    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let handle = self.get(session_id).await?;
        let snapshot = handle.snapshot.read().await.clone();
        Ok(snapshot)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Forget a session. Its runtime finishes the input in progress, then
    /// stops once the last handle is dropped, ending any open streams.
    pub async fn close(&self, session_id: &str) -> Result<(), SessionError> {
        self.sessions
            .write()
            .await
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        tracing::info!(session_id = %session_id, "Session closed");
        Ok(())
    }

    /// Close sessions with no input for at least `max_idle`. Sessions in the
    /// middle of a turn are kept. Returns how many were closed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();

        let mut expired = Vec::new();
        for handle in handles {
            let idle = handle.last_active.read().await.elapsed() >= max_idle;
            if idle && !handle.snapshot.read().await.working {
                expired.push(handle.info.session_id);
            }
        }

        let mut sessions = self.sessions.write().await;
        for session_id in &expired {
            sessions.remove(session_id);
        }
        if !expired.is_empty() {
            tracing::info!(closed = expired.len(), remaining = sessions.len(), "Evicted idle sessions");
        }
        expired.len()
    }

    /// Periodically evict idle sessions until `shutdown` fires
    pub async fn run_idle_sweeper(self: Arc<Self>, max_idle: Duration, shutdown: CancellationToken) {
        let period = SWEEP_INTERVAL.min(max_idle).max(Duration::from_secs(1));
        let mut tick = tokio::time::interval(period);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = tick.tick() => {
                    self.evict_idle(max_idle).await;
                }
            }
        }
    }
}
