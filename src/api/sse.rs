//! Server-Sent Events support

use crate::orchestrator::AgentEvent;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Events sent to SSE clients
#[derive(Debug, Clone)]
pub enum SseEvent {
    Init {
        session_id: String,
        prompt_version: String,
        agent_working: bool,
    },
    Agent(AgentEvent),
    /// The step finished with an answer
    Done,
    Cancelled,
    Error {
        message: String,
    },
}

/// Convert broadcast stream to SSE stream
pub fn sse_stream(
    init_event: SseEvent,
    broadcast_rx: tokio::sync::broadcast::Receiver<SseEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = match &init_event {
        SseEvent::Init { session_id, .. } => session_id.clone(),
        _ => String::new(),
    };
    let init = futures::stream::once(async move { Ok(sse_event_to_axum(init_event, "")) });

    let broadcasts = BroadcastStream::new(broadcast_rx).filter_map(move |result| match result {
        Ok(event) => Some(Ok(sse_event_to_axum(event, &session_id))),
        Err(_) => None, // Skip lagged messages
    });

    Sse::new(init.chain(broadcasts)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

fn sse_event_to_axum(event: SseEvent, session_id: &str) -> Event {
    let (event_type, data) = match event {
        SseEvent::Init {
            session_id,
            prompt_version,
            agent_working,
        } => (
            "init",
            json!({
                "type": "init",
                "session_id": session_id,
                "prompt_version": prompt_version,
                "agent_working": agent_working
            }),
        ),
        SseEvent::Agent(AgentEvent::Chart { id, path }) => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            (
                "chart",
                json!({
                    "type": "chart",
                    "id": id,
                    "url": format!("/api/sessions/{session_id}/charts/{name}")
                }),
            )
        }
        SseEvent::Agent(event) => {
            let data = serde_json::to_value(&event).unwrap_or_default();
            let event_type = match event {
                AgentEvent::Thinking { .. } => "thinking",
                AgentEvent::ToolStarted { .. } => "tool_started",
                AgentEvent::ToolFinished { .. } => "tool_finished",
                AgentEvent::Chart { .. } => "chart",
                AgentEvent::Answer { .. } => "answer",
            };
            (event_type, data)
        }
        SseEvent::Done => ("agent_done", json!({"type": "agent_done"})),
        SseEvent::Cancelled => ("cancelled", json!({"type": "cancelled"})),
        SseEvent::Error { message } => (
            "error",
            json!({
                "type": "error",
                "message": message
            }),
        ),
    };

    Event::default().event(event_type).data(data.to_string())
}
