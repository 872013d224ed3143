//! Test doubles for the orchestrator's collaborators
//!
//! These mocks let the loop run without a model service or an interpreter.

use super::{AgentEvent, AgentObserver, ToolExecutor};
use crate::conversation::{ToolCall, ToolResult};
use crate::llm::{
    ContentBlock, LlmError, LlmRequest, LlmResponse, LlmService, StopSignal, ToolDefinition, Usage,
};
use crate::tools::Dispatched;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Mock model service
// ============================================================================

/// Model service that returns queued responses
pub struct MockLlmService {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    requests: Mutex<Vec<LlmRequest>>,
    delay: Option<Duration>,
}

impl MockLlmService {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Sleep before answering (for cancellation tests)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn response(content: Vec<ContentBlock>, stop: StopSignal) -> LlmResponse {
        LlmResponse {
            content,
            stop,
            usage: Usage::default(),
        }
    }

    pub fn end_turn(content: Vec<ContentBlock>) -> LlmResponse {
        Self::response(content, StopSignal::EndOfTurn)
    }

    /// A `tool_use` stop, which the protocol reports as Continue
    pub fn tool_use(content: Vec<ContentBlock>) -> LlmResponse {
        Self::response(content, StopSignal::Continue)
    }
}

impl Default for MockLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        "mock-model"
    }
}

// ============================================================================
// Mock tool executor
// ============================================================================

/// Tool executor that records calls and answers `ran <id>` unless told otherwise
pub struct MockToolExecutor {
    results: HashMap<String, ToolResult>,
    artifacts: HashMap<String, PathBuf>,
    delay: Option<Duration>,
    calls: Mutex<Vec<ToolCall>>,
    /// Notified when an execution starts
    pub execution_started: Arc<Notify>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            artifacts: HashMap::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
            execution_started: Arc::new(Notify::new()),
        }
    }

    /// Return `result` for the call with the same id
    pub fn with_result(mut self, result: ToolResult) -> Self {
        self.results.insert(result.tool_call_id.clone(), result);
        self
    }

    /// Report a chart for the call `id`
    pub fn with_artifact(mut self, id: impl Into<String>, path: PathBuf) -> Self {
        self.artifacts.insert(id.into(), path);
        self
    }

    /// Block each execution until `delay` passes or the step is cancelled
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn recorded_calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> Dispatched {
        self.calls.lock().unwrap().push(call.clone());
        self.execution_started.notify_one();

        if let Some(delay) = self.delay {
            tokio::select! {
                () = cancel.cancelled() => {
                    return Dispatched {
                        result: ToolResult {
                            tool_call_id: call.id.clone(),
                            content: "[error]: execution cancelled".to_string(),
                            is_error: true,
                        },
                        artifact: None,
                    };
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        let result = self.results.get(&call.id).cloned().unwrap_or_else(|| ToolResult {
            tool_call_id: call.id.clone(),
            content: format!("ran {}", call.id),
            is_error: false,
        });
        Dispatched {
            result,
            artifact: self.artifacts.get(&call.id).cloned(),
        }
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "execute_python".to_string(),
            description: "Mock execute_python".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["code", "goal"],
                "properties": {
                    "code": {"type": "string"},
                    "goal": {"type": "string"}
                }
            }),
        }]
    }
}

// ============================================================================
// Recording observer
// ============================================================================

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<AgentEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<AgentEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AgentObserver for RecordingObserver {
    fn on_event(&self, event: &AgentEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
