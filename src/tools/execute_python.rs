//! `execute_python` tool - runs an analysis snippet against the session dataset

use super::{Tool, ToolContext, ToolOutput};
use crate::dataset::DATASET_BINDING;
use crate::sandbox::{
    ExecutionRequest, SandboxExecutor, CHART_FILENAME, PANDAS_BINDING, PLOT_BINDING,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;

pub const TOOL_NAME: &str = "execute_python";

/// Collected charts live here, relative to the sandbox working directory
pub const CHARTS_DIR: &str = "charts";

#[derive(Debug, Deserialize)]
struct ExecutePythonInput {
    code: String,
    /// Only used to label the step for humans
    goal: String,
}

/// Python execution tool backed by a [`SandboxExecutor`]
pub struct ExecutePythonTool {
    executor: SandboxExecutor,
}

impl ExecutePythonTool {
    pub fn new(executor: SandboxExecutor) -> Self {
        Self { executor }
    }

    /// Per-call chart file, so the next run cannot clobber it before the
    /// presentation layer reads it
    fn chart_destination(&self, tool_call_id: &str) -> PathBuf {
        self.executor
            .working_dir()
            .join(CHARTS_DIR)
            .join(format!("{}.png", sanitize_file_stem(tool_call_id)))
    }
}

fn sanitize_file_stem(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[async_trait]
impl Tool for ExecutePythonTool {
    fn name(&self) -> &'static str {
        TOOL_NAME
    }

    fn description(&self) -> String {
        format!(
            r"Execute Python code for data analysis.

Pre-loaded:
- pandas as {PANDAS_BINDING}
- matplotlib.pyplot as {PLOT_BINDING} (non-interactive backend)
- {DATASET_BINDING}: the dataset as a DataFrame

Start by exploring {DATASET_BINDING}.head() and {DATASET_BINDING}.dtypes to understand the schema.
Use print() for output; print({DATASET_BINDING}.to_markdown()) renders readable tables.
Save charts with {PLOT_BINDING}.savefig('{CHART_FILENAME}') so they are detected.
Each call runs in a fresh process with a 30 second limit; variables do not persist between calls."
        )
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["code", "goal"],
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Python code to execute"
                },
                "goal": {
                    "type": "string",
                    "description": "What this analysis step accomplishes"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> ToolOutput {
        let input: ExecutePythonInput = match serde_json::from_value(input) {
            Ok(i) => i,
            Err(e) => return ToolOutput::error(format!("[error]: invalid input: {e}")),
        };

        tracing::info!(
            session_id = %ctx.session_id,
            tool_use_id = %ctx.tool_call_id,
            goal = %input.goal,
            "Executing snippet"
        );

        let request = ExecutionRequest {
            code: input.code,
            dataset: ctx.dataset,
            chart_destination: Some(self.chart_destination(&ctx.tool_call_id)),
        };
        let result = self.executor.run(&request, &ctx.cancel).await;

        let output = if result.failure.is_some() {
            ToolOutput::error(result.output_text)
        } else {
            ToolOutput::success(result.output_text)
        };
        output.with_artifact(result.artifact_path)
    }
}
