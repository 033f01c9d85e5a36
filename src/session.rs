//! Session driver
//!
//! Implements the Elm Architecture pattern: a pure transition function over
//! the booking sub-state, and a runtime that executes the resulting effects.

mod effect;
mod event;
mod manager;
mod runtime;
mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use manager::{SessionError, SessionInfo, SessionManager};
pub use runtime::{SessionSnapshot, SessionUpdate};
pub use state::{ChatMessage, ChatRole, SessionState};
