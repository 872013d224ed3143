//! Progress events emitted while a step runs
//!
//! Front-ends render these; the loop itself never prints.

use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Reasoning text the model produced alongside tool calls
    Thinking { text: String },
    ToolStarted {
        id: String,
        goal: String,
        code: String,
    },
    ToolFinished {
        id: String,
        output: String,
        is_error: bool,
    },
    /// A chart produced by tool call `id`
    Chart { id: String, path: PathBuf },
    Answer { text: String },
}

pub trait AgentObserver: Send + Sync {
    fn on_event(&self, event: &AgentEvent);
}

/// Observer that discards every event
pub struct NoopObserver;

impl AgentObserver for NoopObserver {
    fn on_event(&self, _event: &AgentEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_shape() {
        let event = AgentEvent::ToolFinished {
            id: "toolu_1".to_string(),
            output: "100\n".to_string(),
            is_error: false,
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "tool_finished", "id": "toolu_1", "output": "100\n", "is_error": false})
        );

        let chart = AgentEvent::Chart {
            id: "toolu_2".to_string(),
            path: PathBuf::from("/w/charts/toolu_2.png"),
        };
        assert_eq!(serde_json::to_value(&chart).unwrap()["path"], "/w/charts/toolu_2.png");
    }
}
