//! Session runtime: executes effects produced by the pure transition
//!
//! One runtime task per session reads events from an mpsc channel and fully
//! processes each user input, including the orchestrator turn and any
//! calendar call, before it reads the next one.

use super::effect::Effect;
use super::event::SessionEvent;
use super::state::{ChatMessage, SessionContext, SessionState};
use super::transition::transition;
use crate::agent::{next_node, Node, Orchestrator, TurnEvent, TurnState};
use crate::calendar::{CalendarProvider, MeetingRequest, Slot};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_stream::StreamExt;

pub const MEETING_SUMMARY: &str = "Customer Support Meeting";
pub const MEETING_MINUTES: i64 = 30;

/// Updates broadcast to connected clients
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    /// The named node is about to run
    Status { node: Node, label: &'static str },
    Fragment { text: String },
    Message { message: ChatMessage },
    Booking { state: SessionState },
    Error { message: String },
    TurnDone,
}

/// Read-side copy of the session, kept current by the runtime
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub messages: Vec<ChatMessage>,
    /// True while an input is being processed
    pub working: bool,
}

pub struct SessionRuntime {
    context: SessionContext,
    state: SessionState,
    orchestrator: Orchestrator,
    calendar: Arc<dyn CalendarProvider>,
    snapshot: Arc<RwLock<SessionSnapshot>>,
    event_rx: mpsc::Receiver<SessionEvent>,
    broadcast_tx: broadcast::Sender<SessionUpdate>,
}

impl SessionRuntime {
    pub fn new(
        context: SessionContext,
        orchestrator: Orchestrator,
        calendar: Arc<dyn CalendarProvider>,
        snapshot: Arc<RwLock<SessionSnapshot>>,
        event_rx: mpsc::Receiver<SessionEvent>,
        broadcast_tx: broadcast::Sender<SessionUpdate>,
    ) -> Self {
        Self {
            context,
            state: SessionState::Idle,
            orchestrator,
            calendar,
            snapshot,
            event_rx,
            broadcast_tx,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(session_id = %self.context.session_id, "Starting session runtime");

        while let Some(event) = self.event_rx.recv().await {
            self.snapshot.write().await.working = true;
            if let Err(e) = self.process_event(event).await {
                tracing::warn!(session_id = %self.context.session_id, error = %e, "Error handling event");
                let _ = self.broadcast_tx.send(SessionUpdate::Error { message: e });
                let _ = self.broadcast_tx.send(SessionUpdate::TurnDone);
            }
            self.snapshot.write().await.working = false;
        }

        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    async fn process_event(&mut self, event: SessionEvent) -> Result<(), String> {
        let mut events_to_process = vec![event];

        while let Some(current) = events_to_process.pop() {
            let result =
                transition(&self.state, &self.context, current).map_err(|e| e.to_string())?;

            if result.new_state != self.state {
                tracing::debug!(
                    from = self.state.name(),
                    to = result.new_state.name(),
                    "Session state change"
                );
            }
            self.state = result.new_state;
            self.snapshot.write().await.state = self.state.clone();

            for effect in result.effects {
                if let Some(generated) = self.execute_effect(effect).await {
                    events_to_process.push(generated);
                }
            }
        }

        Ok(())
    }

    async fn execute_effect(&mut self, effect: Effect) -> Option<SessionEvent> {
        match effect {
            Effect::RecordMessage { role, text } => {
                let message = ChatMessage::new(role, text);
                self.snapshot.write().await.messages.push(message.clone());
                let _ = self.broadcast_tx.send(SessionUpdate::Message { message });
                None
            }
            Effect::RunTurn { query } => Some(self.run_turn(query).await),
            Effect::CreateMeeting { slot, email } => Some(self.create_meeting(slot, email).await),
            Effect::NotifyState => {
                let _ = self.broadcast_tx.send(SessionUpdate::Booking {
                    state: self.state.clone(),
                });
                None
            }
            Effect::TurnDone => {
                let _ = self.broadcast_tx.send(SessionUpdate::TurnDone);
                None
            }
        }
    }

    /// Consume one orchestrator turn, relaying progress to clients
    async fn run_turn(&self, query: String) -> SessionEvent {
        self.announce(Node::Router);
        let mut turn = TurnState::new(query.clone());
        let mut stream = self.orchestrator.submit(query, &self.context.thread_id);

        while let Some(event) = stream.next().await {
            match event {
                TurnEvent::Node(update) => {
                    turn.apply(&update);
                    if let Some(next) = next_node(update.node, &turn) {
                        self.announce(next);
                    }
                }
                TurnEvent::Fragment { text } => {
                    let _ = self.broadcast_tx.send(SessionUpdate::Fragment { text });
                }
            }
        }

        SessionEvent::TurnCompleted {
            answer: turn.answer,
            booking_slots: turn.booking_slots,
        }
    }

    fn announce(&self, node: Node) {
        let _ = self.broadcast_tx.send(SessionUpdate::Status {
            node,
            label: node.status_label(),
        });
    }

    async fn create_meeting(&self, slot: Slot, email: String) -> SessionEvent {
        let meeting = meeting_request(&self.context, &slot, &email);
        match self.calendar.create_event(&meeting).await {
            Ok(link) => {
                tracing::info!(session_id = %self.context.session_id, start = %slot.start, "Meeting booked");
                SessionEvent::MeetingBooked { slot, email, link }
            }
            Err(e) => {
                tracing::warn!(session_id = %self.context.session_id, error = %e, "Meeting creation failed");
                SessionEvent::MeetingFailed {
                    error: e.to_string(),
                }
            }
        }
    }
}

fn meeting_request(context: &SessionContext, slot: &Slot, email: &str) -> MeetingRequest {
    MeetingRequest {
        summary: MEETING_SUMMARY.to_string(),
        start: slot.start,
        duration: chrono::Duration::minutes(MEETING_MINUTES),
        attendee_email: email.to_string(),
        description: format!(
            "Meeting booked through {} Support Assistant\nAttendee: {email}",
            context.contact.brand
        ),
    }
}
