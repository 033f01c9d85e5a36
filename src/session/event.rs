//! Events that drive a session

use crate::calendar::Slot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Text typed by the user
    UserMessage { text: String },

    /// The orchestrator finished a turn. `answer` is the terminal node's reply.
    TurnCompleted {
        answer: Option<String>,
        booking_slots: Vec<Slot>,
    },

    /// The calendar accepted the meeting
    MeetingBooked {
        slot: Slot,
        email: String,
        link: Option<String>,
    },

    /// The calendar rejected or could not be reached
    MeetingFailed { error: String },
}
