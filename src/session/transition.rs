//! Pure session transition function
//!
//! One state machine covers both the multi-turn booking sub-flow and the
//! hand-off to the single-turn orchestrator, so the two cannot drift apart.

use super::effect::Effect;
use super::event::SessionEvent;
use super::state::{SessionContext, SessionState};
use crate::calendar::Slot;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

pub const EMPTY_ANSWER: &str = "Sorry, something went wrong.";

pub const INVALID_EMAIL: &str = "⚠️ That doesn't look like a valid email address. Please provide a valid email (e.g., yourname@example.com) so I can send you the calendar invitation.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: SessionState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: SessionState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function: same inputs, same outputs, no I/O.
pub fn transition(
    state: &SessionState,
    context: &SessionContext,
    event: SessionEvent,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        (_, SessionEvent::UserMessage { text }) if text.trim().is_empty() => {
            Err(TransitionError::EmptyMessage)
        }

        // Normal routing
        (SessionState::Idle, SessionEvent::UserMessage { text }) => {
            Ok(TransitionResult::new(SessionState::Idle)
                .with_effect(Effect::record_user(text.clone()))
                .with_effect(Effect::RunTurn { query: text }))
        }

        // Slot selection; anything that is not a valid choice falls through to routing
        (SessionState::AwaitingSlotChoice { slots }, SessionEvent::UserMessage { text }) => {
            match parse_slot_choice(&text, slots.len()).and_then(|i| slots.get(i)) {
                Some(slot) => Ok(TransitionResult::new(SessionState::AwaitingEmail {
                    slot: slot.clone(),
                })
                .with_effect(Effect::record_user(text))
                .with_effect(Effect::reply(slot_selected_reply(slot)))
                .with_effect(Effect::NotifyState)
                .with_effect(Effect::TurnDone)),
                None => Ok(TransitionResult::new(state.clone())
                    .with_effect(Effect::record_user(text.clone()))
                    .with_effect(Effect::RunTurn { query: text })),
            }
        }

        // Email gate
        (SessionState::AwaitingEmail { slot }, SessionEvent::UserMessage { text }) => {
            if is_valid_email(&text) {
                let email = text.trim().to_string();
                Ok(TransitionResult::new(SessionState::Idle)
                    .with_effect(Effect::record_user(text))
                    .with_effect(Effect::CreateMeeting {
                        slot: slot.clone(),
                        email,
                    })
                    .with_effect(Effect::NotifyState))
            } else {
                Ok(TransitionResult::new(state.clone())
                    .with_effect(Effect::record_user(text))
                    .with_effect(Effect::reply(INVALID_EMAIL))
                    .with_effect(Effect::TurnDone))
            }
        }

        (
            SessionState::AwaitingEmail { .. },
            SessionEvent::TurnCompleted { .. },
        ) => Err(TransitionError::InvalidTransition(
            "turn completed while awaiting email".to_string(),
        )),

        // Orchestrator reply; new booking slots start the sub-flow
        (
            SessionState::Idle | SessionState::AwaitingSlotChoice { .. },
            SessionEvent::TurnCompleted {
                answer,
                booking_slots,
            },
        ) => {
            let reply = answer
                .filter(|a| !a.trim().is_empty())
                .unwrap_or_else(|| EMPTY_ANSWER.to_string());
            if booking_slots.is_empty() {
                Ok(TransitionResult::new(state.clone())
                    .with_effect(Effect::reply(reply))
                    .with_effect(Effect::TurnDone))
            } else {
                Ok(TransitionResult::new(SessionState::AwaitingSlotChoice {
                    slots: booking_slots,
                })
                .with_effect(Effect::reply(reply))
                .with_effect(Effect::NotifyState)
                .with_effect(Effect::TurnDone))
            }
        }

        // Meeting outcome; the sub-flow already returned to idle
        (SessionState::Idle, SessionEvent::MeetingBooked { slot, email, link }) => {
            Ok(TransitionResult::new(SessionState::Idle)
                .with_effect(Effect::reply(meeting_booked_reply(
                    &slot,
                    &email,
                    link.as_deref(),
                )))
                .with_effect(Effect::TurnDone))
        }

        (SessionState::Idle, SessionEvent::MeetingFailed { error }) => {
            tracing::debug!(error = %error, "Meeting creation failed");
            Ok(TransitionResult::new(SessionState::Idle)
                .with_effect(Effect::reply(meeting_failed_reply(context)))
                .with_effect(Effect::TurnDone))
        }

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{} cannot handle {event:?}",
            state.name()
        ))),
    }
}

/// Zero-based index for a 1-based choice within `1..=count`
pub fn parse_slot_choice(text: &str, count: usize) -> Option<usize> {
    let n: usize = text.trim().parse().ok()?;
    (1..=count).contains(&n).then(|| n - 1)
}

/// Permissive check: local part, `@`, domain, dot, 2+ letter suffix
pub fn is_valid_email(text: &str) -> bool {
    EMAIL_RE.is_match(text.trim())
}

fn slot_selected_reply(slot: &Slot) -> String {
    format!(
        "Great choice! You've selected **{}**.\n\n\
         📧 Please provide your email address so I can send you the calendar invitation.",
        slot.display
    )
}

fn meeting_booked_reply(slot: &Slot, email: &str, link: Option<&str>) -> String {
    let link_line = link
        .map(|l| format!("📅 [View in Google Calendar]({l})\n\n"))
        .unwrap_or_default();
    format!(
        "✅ Perfect! Your meeting has been booked for **{}**.\n\n\
         {link_line}\
         📧 A calendar invitation has been sent to **{email}**.\n\n\
         Is there anything else I can help you with?",
        slot.display
    )
}

fn meeting_failed_reply(context: &SessionContext) -> String {
    format!(
        "I'm sorry, there was an issue creating the meeting. \
         Please try again or contact us directly at:\n\n{}",
        context.contact.direct_lines()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContactInfo;
    use crate::session::state::ChatRole;
    use crate::testing::utc;

    fn context() -> SessionContext {
        SessionContext::new("s1", ContactInfo::default())
    }

    fn slots(n: u32) -> Vec<Slot> {
        (0..n)
            .map(|i| Slot {
                start: utc(2025, 3, 3, 7 + i, 0),
                end: utc(2025, 3, 3, 7 + i, 30),
                display: format!("Slot {}", i + 1),
            })
            .collect()
    }

    fn user(text: &str) -> SessionEvent {
        SessionEvent::UserMessage {
            text: text.to_string(),
        }
    }

    #[test]
    fn test_idle_message_runs_turn() {
        let result = transition(&SessionState::Idle, &context(), user("hi")).unwrap();
        assert_eq!(result.new_state, SessionState::Idle);
        assert_eq!(
            result.effects,
            vec![
                Effect::record_user("hi"),
                Effect::RunTurn {
                    query: "hi".to_string()
                }
            ]
        );
    }

    #[test]
    fn test_empty_message_rejected() {
        assert_eq!(
            transition(&SessionState::Idle, &context(), user("   ")).unwrap_err(),
            TransitionError::EmptyMessage
        );
    }

    #[test]
    fn test_valid_choice_selects_slot() {
        let state = SessionState::AwaitingSlotChoice { slots: slots(5) };
        let result = transition(&state, &context(), user("3")).unwrap();

        assert_eq!(
            result.new_state,
            SessionState::AwaitingEmail {
                slot: slots(5)[2].clone()
            }
        );
        assert!(matches!(
            &result.effects[1],
            Effect::RecordMessage { role: ChatRole::Assistant, text }
                if text.starts_with("Great choice! You've selected **Slot 3**.")
        ));
        assert!(!result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::RunTurn { .. })));
    }

    #[test]
    fn test_invalid_choice_falls_through_to_routing() {
        let state = SessionState::AwaitingSlotChoice { slots: slots(5) };
        for input in ["9", "0", "abc", "-1", "2.5"] {
            let result = transition(&state, &context(), user(input)).unwrap();
            assert_eq!(result.new_state, state, "input {input}");
            assert!(result.effects.contains(&Effect::RunTurn {
                query: input.to_string()
            }));
        }
    }

    #[test]
    fn test_valid_email_creates_meeting_and_returns_to_idle() {
        let slot = slots(1).remove(0);
        let state = SessionState::AwaitingEmail { slot: slot.clone() };
        let result = transition(&state, &context(), user(" user@example.com ")).unwrap();

        assert_eq!(result.new_state, SessionState::Idle);
        assert!(result.effects.contains(&Effect::CreateMeeting {
            slot,
            email: "user@example.com".to_string()
        }));
    }

    #[test]
    fn test_invalid_email_reprompts_without_state_change() {
        let state = SessionState::AwaitingEmail {
            slot: slots(1).remove(0),
        };
        let result = transition(&state, &context(), user("not-an-email")).unwrap();

        assert_eq!(result.new_state, state);
        assert!(result.effects.contains(&Effect::reply(INVALID_EMAIL)));
        assert!(!result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::CreateMeeting { .. } | Effect::RunTurn { .. })));
    }

    #[test]
    fn test_turn_with_slots_enters_slot_choice() {
        let event = SessionEvent::TurnCompleted {
            answer: Some("Here are the slots".to_string()),
            booking_slots: slots(5),
        };
        let result = transition(&SessionState::Idle, &context(), event).unwrap();
        assert_eq!(
            result.new_state,
            SessionState::AwaitingSlotChoice { slots: slots(5) }
        );
        assert!(result.effects.contains(&Effect::NotifyState));
    }

    #[test]
    fn test_turn_without_slots_keeps_pending_choice() {
        let state = SessionState::AwaitingSlotChoice { slots: slots(3) };
        let event = SessionEvent::TurnCompleted {
            answer: Some("We ship worldwide.".to_string()),
            booking_slots: vec![],
        };
        let result = transition(&state, &context(), event).unwrap();
        assert_eq!(result.new_state, state);
        assert_eq!(result.effects[0], Effect::reply("We ship worldwide."));
    }

    #[test]
    fn test_empty_answer_replaced() {
        let event = SessionEvent::TurnCompleted {
            answer: Some("  ".to_string()),
            booking_slots: vec![],
        };
        let result = transition(&SessionState::Idle, &context(), event).unwrap();
        assert_eq!(result.effects[0], Effect::reply(EMPTY_ANSWER));
    }

    #[test]
    fn test_turn_completed_while_awaiting_email_is_invalid() {
        let state = SessionState::AwaitingEmail {
            slot: slots(1).remove(0),
        };
        let event = SessionEvent::TurnCompleted {
            answer: None,
            booking_slots: vec![],
        };
        assert!(matches!(
            transition(&state, &context(), event),
            Err(TransitionError::InvalidTransition(_))
        ));
    }

    #[test]
    fn test_meeting_outcomes() {
        let slot = slots(1).remove(0);
        let booked = SessionEvent::MeetingBooked {
            slot: slot.clone(),
            email: "user@example.com".to_string(),
            link: Some("https://calendar/e1".to_string()),
        };
        let result = transition(&SessionState::Idle, &context(), booked).unwrap();
        assert_eq!(result.new_state, SessionState::Idle);
        match &result.effects[0] {
            Effect::RecordMessage { text, .. } => {
                assert!(text.contains("booked for **Slot 1**"));
                assert!(text.contains("(https://calendar/e1)"));
                assert!(text.contains("**user@example.com**"));
            }
            other => panic!("unexpected effect {other:?}"),
        }

        let failed = SessionEvent::MeetingFailed {
            error: "403".to_string(),
        };
        let result = transition(&SessionState::Idle, &context(), failed).unwrap();
        match &result.effects[0] {
            Effect::RecordMessage { text, .. } => {
                assert!(text.starts_with("I'm sorry, there was an issue creating the meeting."));
                assert!(text.contains("support@jashanmal.com"));
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn test_parse_slot_choice() {
        assert_eq!(parse_slot_choice(" 3 ", 5), Some(2));
        assert_eq!(parse_slot_choice("+1", 5), Some(0));
        assert_eq!(parse_slot_choice("5", 5), Some(4));
        assert_eq!(parse_slot_choice("6", 5), None);
        assert_eq!(parse_slot_choice("0", 5), None);
        assert_eq!(parse_slot_choice("three", 5), None);
    }

    #[test]
    fn test_email_pattern_is_permissive() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.co.uk"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@example.c"));
        assert!(!is_valid_email("user @example.com"));
    }
}
