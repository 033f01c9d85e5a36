//! Property-based tests for the session state machine
//!
//! A small synchronous driver plays the runtime's role: it feeds effects
//! back as events the way `SessionRuntime` does, so whole conversations can
//! be generated.

use super::effect::Effect;
use super::event::SessionEvent;
use super::state::{SessionContext, SessionState};
use super::transition::{is_valid_email, transition};
use crate::calendar::Slot;
use crate::config::ContactInfo;
use crate::testing::utc;
use chrono::Duration;
use proptest::prelude::*;

fn test_context() -> SessionContext {
    SessionContext::new("prop-session", ContactInfo::default())
}

fn make_slots(n: usize) -> Vec<Slot> {
    (0..n)
        .map(|i| {
            let start = utc(2025, 3, 3, 7, 0) + Duration::hours(i64::try_from(i).unwrap_or(0));
            Slot {
                start,
                end: start + Duration::minutes(30),
                display: format!("Slot {i}"),
            }
        })
        .collect()
}

/// What the simulated outside world does when asked
#[derive(Debug, Clone)]
struct World {
    /// Slots returned by each simulated turn, cycled
    turn_slots: Vec<usize>,
    meeting_succeeds: bool,
}

fn arb_input() -> impl Strategy<Value = String> {
    prop_oneof![
        (0usize..8).prop_map(|n| n.to_string()),
        Just("user@example.com".to_string()),
        Just("not-an-email".to_string()),
        Just("book a call".to_string()),
        "[a-z@. ]{1,12}",
    ]
}

fn arb_world() -> impl Strategy<Value = World> {
    (proptest::collection::vec(0usize..=5, 1..4), any::<bool>()).prop_map(
        |(turn_slots, meeting_succeeds)| World {
            turn_slots,
            meeting_succeeds,
        },
    )
}

/// Run one user input to completion. Returns the effects seen.
fn drive(
    state: &mut SessionState,
    input: &str,
    world: &World,
    turn_counter: &mut usize,
) -> Result<Vec<Effect>, TestCaseError> {
    let context = test_context();
    let mut seen = Vec::new();
    let mut pending = vec![SessionEvent::UserMessage {
        text: input.to_string(),
    }];

    while let Some(event) = pending.pop() {
        let result = match transition(state, &context, event) {
            Ok(r) => r,
            Err(super::transition::TransitionError::EmptyMessage) => return Ok(seen),
            Err(e) => return Err(TestCaseError::fail(e.to_string())),
        };
        *state = result.new_state;
        for effect in result.effects {
            match &effect {
                Effect::RunTurn { .. } => {
                    let n = world.turn_slots[*turn_counter % world.turn_slots.len()];
                    *turn_counter += 1;
                    pending.push(SessionEvent::TurnCompleted {
                        answer: Some("reply".to_string()),
                        booking_slots: make_slots(n),
                    });
                }
                Effect::CreateMeeting { slot, email } => {
                    pending.push(if world.meeting_succeeds {
                        SessionEvent::MeetingBooked {
                            slot: slot.clone(),
                            email: email.clone(),
                            link: None,
                        }
                    } else {
                        SessionEvent::MeetingFailed {
                            error: "down".to_string(),
                        }
                    });
                }
                _ => {}
            }
            seen.push(effect);
        }
    }
    Ok(seen)
}

proptest! {
    #[test]
    fn prop_conversations_never_reach_invalid_transitions(
        inputs in proptest::collection::vec(arb_input(), 1..12),
        world in arb_world(),
    ) {
        let mut state = SessionState::Idle;
        let mut turns = 0;
        for input in &inputs {
            let effects = drive(&mut state, input, &world, &mut turns)?;

            // Each handled input ends with exactly one TurnDone
            let done = effects.iter().filter(|e| matches!(e, Effect::TurnDone)).count();
            prop_assert_eq!(done, usize::from(!input.trim().is_empty()));

            // Sub-state invariants
            match &state {
                SessionState::Idle => {}
                SessionState::AwaitingSlotChoice { slots } => prop_assert!(!slots.is_empty()),
                SessionState::AwaitingEmail { .. } => {
                    prop_assert!(state.pending_slots().is_empty());
                    prop_assert!(state.selected_slot().is_some());
                }
            }
        }
    }

    #[test]
    fn prop_choice_in_range_selects_that_slot(n in 1usize..=5, pick in 1usize..=5) {
        prop_assume!(pick <= n);
        let slots = make_slots(n);
        let state = SessionState::AwaitingSlotChoice { slots: slots.clone() };
        let result = transition(&state, &test_context(), SessionEvent::UserMessage {
            text: pick.to_string(),
        }).map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(result.new_state, SessionState::AwaitingEmail { slot: slots[pick - 1].clone() });
    }

    #[test]
    fn prop_choice_out_of_range_falls_through(n in 1usize..=5, pick in 0usize..20) {
        prop_assume!(pick == 0 || pick > n);
        let state = SessionState::AwaitingSlotChoice { slots: make_slots(n) };
        let text = pick.to_string();
        let result = transition(&state, &test_context(), SessionEvent::UserMessage {
            text: text.clone(),
        }).map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(&result.new_state, &state);
        let expected = Effect::RunTurn { query: text };
        prop_assert!(result.effects.contains(&expected));
    }

    #[test]
    fn prop_invalid_email_never_changes_state(text in "[a-z0-9 .-]{1,20}") {
        prop_assume!(!text.trim().is_empty() && !is_valid_email(&text));
        let state = SessionState::AwaitingEmail { slot: make_slots(1).remove(0) };
        let result = transition(&state, &test_context(), SessionEvent::UserMessage { text })
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(result.new_state, state);
    }
}
