//! Single-turn state and the per-node deltas emitted while a turn runs

use super::intent::Intent;
use crate::calendar::Slot;
use crate::retrieval::Passage;
use serde::{Deserialize, Serialize};

/// Graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Router,
    Retrieve,
    Answer,
    Contact,
    Booking,
    Greeting,
    Fallback,
}

impl Node {
    pub fn name(self) -> &'static str {
        match self {
            Node::Router => "router",
            Node::Retrieve => "retrieve",
            Node::Answer => "answer",
            Node::Contact => "contact",
            Node::Booking => "booking",
            Node::Greeting => "greeting",
            Node::Fallback => "fallback",
        }
    }

    /// Progress label for clients while the turn runs
    pub fn status_label(self) -> &'static str {
        match self {
            Node::Router => "Analyzing your question...",
            Node::Retrieve => "Searching knowledge base...",
            Node::Answer => "Generating response...",
            Node::Contact => "Fetching contact details...",
            Node::Booking => "Checking available times...",
            Node::Greeting | Node::Fallback => "Writing a reply...",
        }
    }
}

/// How the retrieve node went
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalOutcome {
    #[default]
    NotRun,
    /// Search succeeded; the passage list may still be empty
    Found,
    /// Backend unreachable or not configured
    Unavailable { reason: String },
}

/// Fields written by one node. `None` means the node left the field alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeUpdate {
    pub node: Node,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passages: Option<Vec<Passage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking_slots: Option<Vec<Slot>>,
}

impl NodeUpdate {
    pub fn new(node: Node) -> Self {
        Self {
            node,
            route: None,
            passages: None,
            retrieval: None,
            answer: None,
            booking_slots: None,
        }
    }

    pub fn with_route(mut self, route: Intent) -> Self {
        self.route = Some(route);
        self
    }

    pub fn with_retrieval(mut self, passages: Vec<Passage>, outcome: RetrievalOutcome) -> Self {
        self.passages = Some(passages);
        self.retrieval = Some(outcome);
        self
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    pub fn with_booking_slots(mut self, slots: Vec<Slot>) -> Self {
        self.booking_slots = Some(slots);
        self
    }
}

/// Accumulated state of one turn. Created per turn, discarded afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TurnState {
    pub query: String,
    pub route: Option<Intent>,
    pub passages: Vec<Passage>,
    pub retrieval: RetrievalOutcome,
    pub answer: Option<String>,
    pub booking_slots: Vec<Slot>,
}

impl TurnState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Merge a node's delta. Only fields the node wrote are touched.
    pub fn apply(&mut self, update: &NodeUpdate) {
        if let Some(route) = update.route {
            self.route = Some(route);
        }
        if let Some(passages) = &update.passages {
            self.passages.clone_from(passages);
        }
        if let Some(retrieval) = &update.retrieval {
            self.retrieval = retrieval.clone();
        }
        if let Some(answer) = &update.answer {
            self.answer = Some(answer.clone());
        }
        if let Some(slots) = &update.booking_slots {
            self.booking_slots.clone_from(slots);
        }
    }
}

/// Item of the turn stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A node finished; exactly one per executed node, in execution order
    Node(NodeUpdate),
    /// Raw model output while the answer node streams
    Fragment { text: String },
}
