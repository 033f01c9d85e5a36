//! Query routing and intent handling for a single user turn

mod graph;
mod handlers;
mod intent;
mod prompts;
mod state;

pub use graph::{next_node, Orchestrator, TurnStream};
pub use handlers::Handlers;
pub use intent::Router;
pub use state::{Node, TurnEvent, TurnState};
