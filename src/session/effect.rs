//! Effects produced by session transitions

use super::state::ChatRole;
use crate::calendar::Slot;

/// Effects to be executed after a session transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append to the transcript and notify clients
    RecordMessage { role: ChatRole, text: String },

    /// Run the single-turn orchestrator on the query
    RunTurn { query: String },

    /// Create the meeting for the selected slot
    CreateMeeting { slot: Slot, email: String },

    /// Tell clients the booking sub-state changed
    NotifyState,

    /// The current user input has been fully handled
    TurnDone,
}

impl Effect {
    pub fn record_user(text: impl Into<String>) -> Self {
        Effect::RecordMessage {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn reply(text: impl Into<String>) -> Self {
        Effect::RecordMessage {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}
