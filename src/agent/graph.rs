//! Single-turn conversation graph
//!
//! ```text
//! router ─┬─ rag ──────> retrieve ──> answer
//!         ├─ contact ──> contact
//!         ├─ booking ──> booking
//!         ├─ greeting ─> greeting
//!         └─ fallback ─> fallback
//! ```

use super::handlers::Handlers;
use super::intent::{Intent, Router};
use super::state::{Node, NodeUpdate, TurnEvent, TurnState};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

/// Lazy, finite stream of turn events
pub type TurnStream = ReceiverStream<TurnEvent>;

/// Node that runs after `node`, given the state it produced. `None` ends the turn.
pub fn next_node(node: Node, turn: &TurnState) -> Option<Node> {
    match node {
        Node::Router => Some(turn.route.unwrap_or(Intent::Fallback).entry_node()),
        Node::Retrieve => Some(Node::Answer),
        Node::Answer | Node::Contact | Node::Booking | Node::Greeting | Node::Fallback => None,
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    router: Router,
    handlers: Arc<Handlers>,
}

impl Orchestrator {
    pub fn new(router: Router, handlers: Arc<Handlers>) -> Self {
        Self { router, handlers }
    }

    /// Start a turn in the background and return its event stream.
    /// Dropping the stream does not stop the turn.
    pub fn submit(&self, query: impl Into<String>, session_id: &str) -> TurnStream {
        let (tx, rx) = mpsc::channel(64);
        let this = self.clone();
        let query = query.into();
        let span = tracing::info_span!("turn", session_id = %session_id);
        tokio::spawn(
            async move {
                this.run(query, &tx).await;
            }
            .instrument(span),
        );
        ReceiverStream::new(rx)
    }

    /// Execute a turn from `router` to a terminal node, emitting one node
    /// event per executed node. Returns the final turn state.
    pub async fn run(&self, query: String, events: &mpsc::Sender<TurnEvent>) -> TurnState {
        let mut turn = TurnState::new(query);
        let mut current = Some(Node::Router);

        while let Some(node) = current {
            let update = self.execute(node, &turn, events).await;
            turn.apply(&update);
            let _ = events.send(TurnEvent::Node(update)).await;
            current = next_node(node, &turn);
        }

        tracing::info!(
            route = turn.route.map(Intent::label),
            passages = turn.passages.len(),
            slots = turn.booking_slots.len(),
            "Turn complete"
        );
        turn
    }

    async fn execute(
        &self,
        node: Node,
        turn: &TurnState,
        events: &mpsc::Sender<TurnEvent>,
    ) -> NodeUpdate {
        tracing::debug!(node = node.name(), "Executing node");
        match node {
            Node::Router => {
                let route = self.router.classify(&turn.query).await;
                NodeUpdate::new(Node::Router).with_route(route)
            }
            Node::Retrieve => self.handlers.retrieve(turn).await,
            Node::Answer => self.handlers.answer(turn, events).await,
            Node::Contact => self.handlers.contact(),
            Node::Booking => self.handlers.booking().await,
            Node::Greeting => self.handlers.greeting(turn).await,
            Node::Fallback => self.handlers.fallback(turn).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::intent::Intent;
    use crate::agent::state::RetrievalOutcome;
    use crate::calendar::AvailabilityRules;
    use crate::config::ContactInfo;
    use crate::retrieval::Passage;
    use crate::testing::{utc, MockCalendar, MockLlm, MockRetriever};
    use tokio_stream::StreamExt;

    fn orchestrator(
        llm: &Arc<MockLlm>,
        retriever: &Arc<MockRetriever>,
        calendar: &Arc<MockCalendar>,
    ) -> Orchestrator {
        let handlers = Handlers::new(
            llm.clone(),
            retriever.clone(),
            calendar.clone(),
            AvailabilityRules::default(),
            ContactInfo::default(),
        )
        .with_clock(|| utc(2025, 3, 3, 4, 0));
        Orchestrator::new(Router::new(llm.clone()), Arc::new(handlers))
    }

    fn node_names(events: &[TurnEvent]) -> Vec<&'static str> {
        events
            .iter()
            .filter_map(|e| match e {
                TurnEvent::Node(update) => Some(update.node.name()),
                TurnEvent::Fragment { .. } => None,
            })
            .collect()
    }

    #[test]
    fn test_edges() {
        let mut turn = TurnState::new("q");
        turn.route = Some(Intent::Rag);
        assert_eq!(next_node(Node::Router, &turn), Some(Node::Retrieve));
        assert_eq!(next_node(Node::Retrieve, &turn), Some(Node::Answer));
        assert_eq!(next_node(Node::Answer, &turn), None);

        turn.route = Some(Intent::Booking);
        assert_eq!(next_node(Node::Router, &turn), Some(Node::Booking));
        assert_eq!(next_node(Node::Booking, &turn), None);
    }

    #[tokio::test]
    async fn test_greeting_turn_skips_retrieval() {
        let llm = Arc::new(MockLlm::new());
        let retriever = Arc::new(MockRetriever::new());
        let calendar = Arc::new(MockCalendar::new());
        llm.queue_completion("greeting");
        llm.queue_completion("Hi there! 👋 How can I help you today?");

        let events: Vec<TurnEvent> = orchestrator(&llm, &retriever, &calendar)
            .submit("hi", "s1")
            .collect()
            .await;

        assert_eq!(node_names(&events), vec!["router", "greeting"]);
        match &events[0] {
            TurnEvent::Node(update) => assert_eq!(update.route, Some(Intent::Greeting)),
            TurnEvent::Fragment { .. } => panic!("expected node event"),
        }
        match events.last() {
            Some(TurnEvent::Node(update)) => assert_eq!(
                update.answer.as_deref(),
                Some("Hi there! 👋 How can I help you today?")
            ),
            other => panic!("unexpected last event: {other:?}"),
        }
        assert!(retriever.queries().is_empty());
    }

    #[tokio::test]
    async fn test_rag_turn_is_grounded_in_passages() {
        let llm = Arc::new(MockLlm::new());
        let retriever = Arc::new(MockRetriever::new());
        let calendar = Arc::new(MockCalendar::new());
        retriever.set_passages(vec![Passage {
            text: "Question: Do you ship internationally?\nAnswer: Yes, to the GCC.".into(),
            category: "shipping".into(),
            source: "https://example.com/faq".into(),
        }]);
        llm.queue_completion("rag");
        llm.queue_stream(&["Yes, we ", "ship to the GCC."]);

        let orch = orchestrator(&llm, &retriever, &calendar);
        let (tx, mut rx) = mpsc::channel(64);
        let turn = orch.run("Do you ship internationally?".to_string(), &tx).await;
        drop(tx);

        assert_eq!(turn.route, Some(Intent::Rag));
        assert_eq!(turn.retrieval, RetrievalOutcome::Found);
        assert_eq!(turn.answer.as_deref(), Some("Yes, we ship to the GCC."));

        let answer_prompt = &llm.recorded_prompts()[1];
        assert!(answer_prompt.contains("Answer: Yes, to the GCC."));

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(node_names(&events), vec!["router", "retrieve", "answer"]);
        let fragments = events
            .iter()
            .filter(|e| matches!(e, TurnEvent::Fragment { .. }))
            .count();
        assert_eq!(fragments, 2);
    }

    #[tokio::test]
    async fn test_unrecognized_route_runs_fallback() {
        let llm = Arc::new(MockLlm::new());
        llm.queue_completion("weather");
        llm.queue_completion("I can help with orders and shipping.");
        let orch = orchestrator(&llm, &Arc::new(MockRetriever::new()), &Arc::new(MockCalendar::new()));

        let (tx, _rx) = mpsc::channel(64);
        let turn = orch.run("what's the weather?".to_string(), &tx).await;
        assert_eq!(turn.route, Some(Intent::Fallback));
        assert_eq!(turn.answer.as_deref(), Some("I can help with orders and shipping."));
    }

    #[tokio::test]
    async fn test_booking_turn_carries_slots() {
        let llm = Arc::new(MockLlm::new());
        llm.queue_completion("booking");
        let orch = orchestrator(&llm, &Arc::new(MockRetriever::new()), &Arc::new(MockCalendar::new()));

        let events: Vec<TurnEvent> = orch.submit("book a call", "s1").collect().await;
        assert_eq!(node_names(&events), vec!["router", "booking"]);
        match events.last() {
            Some(TurnEvent::Node(update)) => {
                assert_eq!(update.booking_slots.as_ref().map(Vec::len), Some(5));
            }
            other => panic!("unexpected last event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dropped_stream_still_completes_turn() {
        let llm = Arc::new(MockLlm::new());
        llm.queue_completion("contact");
        let orch = orchestrator(&llm, &Arc::new(MockRetriever::new()), &Arc::new(MockCalendar::new()));

        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let turn = orch.run("phone number?".to_string(), &tx).await;
        assert_eq!(turn.answer, Some(ContactInfo::default().contact_block()));
    }
}
