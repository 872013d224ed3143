//! Tool dispatch for model-issued tool calls
//!
//! Every tool call gets exactly one result. Unknown tool names and malformed
//! arguments become error results rather than propagated errors, so the model
//! always sees what went wrong.

mod execute_python;

pub use execute_python::{ExecutePythonTool, CHARTS_DIR};

use crate::conversation::{ToolCall, ToolResult};
use crate::dataset::DatasetContext;
use crate::llm::ToolDefinition;
use crate::orchestrator::ToolExecutor;
use crate::sandbox::SandboxExecutor;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
    /// Out-of-band artifact (a chart) for the presentation layer
    pub artifact: Option<PathBuf>,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            artifact: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Option<PathBuf>) -> Self {
        self.artifact = artifact;
        self
    }
}

/// Per-call context handed to a tool
#[derive(Clone)]
pub struct ToolContext {
    pub cancel: CancellationToken,
    pub session_id: String,
    pub tool_call_id: String,
    pub dataset: DatasetContext,
}

/// A capability the model can invoke
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput;
}

/// What dispatching one tool call produced
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub result: ToolResult,
    pub artifact: Option<PathBuf>,
}

/// Routes tool calls for one session to its tools
pub struct ToolDispatcher {
    tools: Vec<Arc<dyn Tool>>,
    session_id: String,
    dataset: DatasetContext,
}

impl ToolDispatcher {
    /// Standard dispatcher: `execute_python` backed by `executor`
    pub fn new(session_id: impl Into<String>, executor: SandboxExecutor, dataset: DatasetContext) -> Self {
        Self::with_tools(session_id, dataset, vec![Arc::new(ExecutePythonTool::new(executor))])
    }

    pub fn with_tools(
        session_id: impl Into<String>,
        dataset: DatasetContext,
        tools: Vec<Arc<dyn Tool>>,
    ) -> Self {
        Self {
            tools,
            session_id: session_id.into(),
            dataset,
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub async fn dispatch(&self, call: &ToolCall, cancel: &CancellationToken) -> Dispatched {
        let Some(tool) = self.tools.iter().find(|t| t.name() == call.name) else {
            tracing::warn!(session_id = %self.session_id, tool = %call.name, "Unknown tool requested");
            let known: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
            return Dispatched {
                result: ToolResult {
                    tool_call_id: call.id.clone(),
                    content: format!(
                        "[error]: unknown tool '{}'. Available tools: {}",
                        call.name,
                        known.join(", ")
                    ),
                    is_error: true,
                },
                artifact: None,
            };
        };

        let ctx = ToolContext {
            cancel: cancel.clone(),
            session_id: self.session_id.clone(),
            tool_call_id: call.id.clone(),
            dataset: self.dataset.clone(),
        };
        let output = tool.run(call.arguments.clone(), ctx).await;

        Dispatched {
            result: ToolResult {
                tool_call_id: call.id.clone(),
                content: output.content,
                is_error: output.is_error,
            },
            artifact: output.artifact,
        }
    }
}

#[async_trait]
impl ToolExecutor for ToolDispatcher {
    async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> Dispatched {
        self.dispatch(call, cancel).await
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        ToolDispatcher::definitions(self)
    }
}
