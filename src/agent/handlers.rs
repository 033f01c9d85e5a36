//! Intent handlers
//!
//! Each handler returns a [`NodeUpdate`] and never fails: external errors are
//! logged and turned into a fixed reply so the turn always reaches a terminal
//! node.

use super::prompts;
use super::state::{Node, NodeUpdate, RetrievalOutcome, TurnEvent, TurnState};
use crate::calendar::{find_available_slots, AvailabilityRules, CalendarProvider, Slot};
use crate::config::ContactInfo;
use crate::llm::{LlmRequest, LlmService};
use crate::retrieval::{KnowledgeRetriever, RetrievalError};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Passages requested per query
pub const RETRIEVAL_K: usize = 5;
/// Slots offered to the user out of the computed candidates
pub const BOOKING_CHOICES: usize = 5;

pub type Clock = fn() -> DateTime<Utc>;

/// Collaborators shared by all handlers
pub struct Handlers {
    llm: Arc<dyn LlmService>,
    retriever: Arc<dyn KnowledgeRetriever>,
    calendar: Arc<dyn CalendarProvider>,
    rules: AvailabilityRules,
    contact: ContactInfo,
    clock: Clock,
}

impl Handlers {
    pub fn new(
        llm: Arc<dyn LlmService>,
        retriever: Arc<dyn KnowledgeRetriever>,
        calendar: Arc<dyn CalendarProvider>,
        rules: AvailabilityRules,
        contact: ContactInfo,
    ) -> Self {
        Self {
            llm,
            retriever,
            calendar,
            rules,
            contact,
            clock: Utc::now,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub async fn retrieve(&self, turn: &TurnState) -> NodeUpdate {
        let update = NodeUpdate::new(Node::Retrieve);
        match self.retriever.search(&turn.query, RETRIEVAL_K).await {
            Ok(passages) => {
                tracing::debug!(count = passages.len(), "Retrieved passages");
                update.with_retrieval(passages, RetrievalOutcome::Found)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Knowledge retrieval failed");
                let reason = match e {
                    RetrievalError::Unavailable(reason) => reason,
                    other => other.to_string(),
                };
                update.with_retrieval(Vec::new(), RetrievalOutcome::Unavailable { reason })
            }
        }
    }

    /// Grounded answer. The model is only called when passages were found.
    pub async fn answer(&self, turn: &TurnState, events: &mpsc::Sender<TurnEvent>) -> NodeUpdate {
        let update = NodeUpdate::new(Node::Answer);
        if let RetrievalOutcome::Unavailable { .. } = turn.retrieval {
            return update.with_answer(prompts::RETRIEVAL_UNAVAILABLE);
        }
        if turn.passages.is_empty() {
            return update.with_answer(prompts::NO_INFORMATION);
        }

        let context = turn
            .passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let request =
            LlmRequest::prompt(prompts::answer(&self.contact.brand, &context, &turn.query));

        let mut stream = match self.llm.stream(&request).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(error = %e, "Answer generation failed to start");
                return update.with_answer(prompts::ANSWER_FAILED);
            }
        };

        let mut full = String::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    full.push_str(&fragment);
                    // Receiver may be gone; the turn still completes
                    let _ = events.send(TurnEvent::Fragment { text: fragment }).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Answer stream interrupted");
                    return update.with_answer(prompts::ANSWER_FAILED);
                }
            }
        }

        update.with_answer(full.trim())
    }

    pub fn contact(&self) -> NodeUpdate {
        NodeUpdate::new(Node::Contact).with_answer(self.contact.contact_block())
    }

    pub async fn booking(&self) -> NodeUpdate {
        let update = NodeUpdate::new(Node::Booking);
        let now = (self.clock)();

        let slots = match find_available_slots(self.calendar.as_ref(), &self.rules, now).await {
            Ok(slots) => slots,
            Err(e) => {
                tracing::warn!(error = %e, "Availability lookup failed");
                return update.with_answer(prompts::booking_no_slots(&self.contact));
            }
        };
        if slots.is_empty() {
            tracing::info!("No free slots in the lookahead window");
            return update.with_answer(prompts::booking_no_slots(&self.contact));
        }

        let offered: Vec<Slot> = slots.into_iter().take(BOOKING_CHOICES).collect();
        let numbered = numbered_slots(&offered);
        update
            .with_answer(prompts::booking_slots(&numbered, offered.len()))
            .with_booking_slots(offered)
    }

    pub async fn greeting(&self, turn: &TurnState) -> NodeUpdate {
        let prompt = prompts::greeting(&self.contact.brand, &turn.query);
        let answer = self.complete_or(prompt, prompts::GREETING_FAILED).await;
        NodeUpdate::new(Node::Greeting).with_answer(answer)
    }

    pub async fn fallback(&self, turn: &TurnState) -> NodeUpdate {
        let prompt = prompts::fallback(&self.contact.brand, &turn.query);
        let answer = self.complete_or(prompt, prompts::FALLBACK_FAILED).await;
        NodeUpdate::new(Node::Fallback).with_answer(answer)
    }

    async fn complete_or(&self, prompt: String, canned: &str) -> String {
        match self.llm.complete(&LlmRequest::prompt(prompt)).await {
            Ok(response) => response.text.trim().to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Reply generation failed, using canned reply");
                canned.to_string()
            }
        }
    }
}

fn numbered_slots(slots: &[Slot]) -> String {
    let mut out = String::new();
    for (i, slot) in slots.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(out, "**{}.** {}", i + 1, slot.display);
    }
    out
}
