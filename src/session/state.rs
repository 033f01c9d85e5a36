//! Session state types

use crate::calendar::Slot;
use crate::config::ContactInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Booking sub-state of a session. Pending and selected slots live inside
/// the variant that needs them, so the sub-states cannot overlap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    /// Slots were offered; a number in `1..=slots.len()` picks one
    AwaitingSlotChoice { slots: Vec<Slot> },
    /// A slot was picked; waiting for the attendee email
    AwaitingEmail { slot: Slot },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingSlotChoice { .. } => "awaiting_slot_choice",
            SessionState::AwaitingEmail { .. } => "awaiting_email",
        }
    }

    pub fn pending_slots(&self) -> &[Slot] {
        match self {
            SessionState::AwaitingSlotChoice { slots } => slots,
            _ => &[],
        }
    }

    pub fn selected_slot(&self) -> Option<&Slot> {
        match self {
            SessionState::AwaitingEmail { slot } => Some(slot),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry of the session transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            created_at: Utc::now(),
        }
    }
}

/// Immutable per-session context
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    /// Opaque id handed to the orchestrator with every turn
    pub thread_id: String,
    pub contact: ContactInfo,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, contact: ContactInfo) -> Self {
        let session_id = session_id.into();
        Self {
            thread_id: format!("thread-{session_id}"),
            session_id,
            contact,
        }
    }
}
