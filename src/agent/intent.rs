//! Query routing

use super::prompts;
use super::state::Node;
use crate::llm::{LlmRequest, LlmService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Routing category for a user query. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Rag,
    Contact,
    Booking,
    Greeting,
    Fallback,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::Rag,
        Intent::Contact,
        Intent::Booking,
        Intent::Greeting,
        Intent::Fallback,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Intent::Rag => "rag",
            Intent::Contact => "contact",
            Intent::Booking => "booking",
            Intent::Greeting => "greeting",
            Intent::Fallback => "fallback",
        }
    }

    /// Exact label match; `None` for anything outside the closed set
    pub fn from_label(label: &str) -> Option<Intent> {
        Intent::ALL.into_iter().find(|i| i.label() == label)
    }

    /// Normalize raw classifier output. Unrecognized output routes to `Fallback`.
    pub fn from_model_output(output: &str) -> Intent {
        let normalized = output.trim().to_lowercase();
        match Intent::from_label(&normalized) {
            Some(intent) => intent,
            None => {
                tracing::debug!(output = %normalized, "Unrecognized route label, using fallback");
                Intent::Fallback
            }
        }
    }

    /// First node executed after the router
    pub fn entry_node(self) -> Node {
        match self {
            Intent::Rag => Node::Retrieve,
            Intent::Contact => Node::Contact,
            Intent::Booking => Node::Booking,
            Intent::Greeting => Node::Greeting,
            Intent::Fallback => Node::Fallback,
        }
    }
}

/// LLM-backed intent classifier
#[derive(Clone)]
pub struct Router {
    llm: Arc<dyn LlmService>,
}

impl Router {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }

    pub async fn classify(&self, query: &str) -> Intent {
        let request = LlmRequest::prompt(prompts::router(query));
        match self.llm.complete(&request).await {
            Ok(response) => Intent::from_model_output(&response.text),
            Err(e) => {
                tracing::warn!(error = %e, "Router classification failed, using fallback");
                Intent::Fallback
            }
        }
    }
}
