//! Server-Sent Events support

use crate::agent::{TurnEvent, TurnStream};
use crate::session::{SessionSnapshot, SessionUpdate};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

fn keep_alive() -> KeepAlive {
    KeepAlive::new()
        .interval(Duration::from_secs(15))
        .text("ping")
}

/// Session stream: an `init` snapshot followed by live updates
pub fn session_stream(
    session_id: String,
    snapshot: SessionSnapshot,
    broadcast_rx: tokio::sync::broadcast::Receiver<SessionUpdate>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let init = json!({
        "type": "init",
        "session_id": session_id,
        "booking": snapshot.state,
        "messages": snapshot.messages,
        "working": snapshot.working,
    });
    let init = futures::stream::once(async move {
        Ok(Event::default().event("init").data(init.to_string()))
    });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(|result| match result {
        Ok(update) => Some(Ok(session_update_to_axum(update))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(init.chain(broadcasts)).keep_alive(keep_alive())
}

/// Raw orchestrator events for one turn
pub fn turn_stream(stream: TurnStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = stream.map(|event| Ok(turn_event_to_axum(&event)));
    let done = futures::stream::once(async {
        Ok(Event::default()
            .event("turn_done")
            .data(json!({"type": "turn_done"}).to_string()))
    });
    Sse::new(events.chain(done)).keep_alive(keep_alive())
}

fn session_update_to_axum(update: SessionUpdate) -> Event {
    let (event_type, data) = match update {
        SessionUpdate::Status { node, label } => (
            "status",
            json!({
                "type": "status",
                "node": node.name(),
                "label": label
            }),
        ),
        SessionUpdate::Fragment { text } => (
            "fragment",
            json!({
                "type": "fragment",
                "text": text
            }),
        ),
        SessionUpdate::Message { message } => (
            "message",
            json!({
                "type": "message",
                "message": message
            }),
        ),
        SessionUpdate::Booking { state } => (
            "booking",
            json!({
                "type": "booking",
                "state": state
            }),
        ),
        SessionUpdate::Error { message } => (
            "error",
            json!({
                "type": "error",
                "message": message
            }),
        ),
        SessionUpdate::TurnDone => (
            "turn_done",
            json!({
                "type": "turn_done"
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}

fn turn_event_to_axum(event: &TurnEvent) -> Event {
    let event_type = match event {
        TurnEvent::Node(update) => update.node.name(),
        TurnEvent::Fragment { .. } => "fragment",
    };
    let data = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    Event::default().event(event_type).data(data)
}
