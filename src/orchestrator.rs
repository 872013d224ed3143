//! Conversation orchestrator
//!
//! Drives one analysis session: sends the conversation to the model, runs
//! every requested tool call in order, appends the results, and repeats until
//! the model ends its turn without asking for tools.
//!
//! Front-ends (console, chat UI, prompt comparison) all share this loop and
//! only render the [`AgentEvent`]s it emits.

mod events;

#[cfg(test)]
pub mod testing;

pub use events::{AgentEvent, AgentObserver, NoopObserver};

use crate::conversation::{AssistantContent, ConversationState, StopSignal, ToolCall, Turn};
use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService, ToolDefinition};
use crate::prompts::{PromptRegistry, UnknownPromptVersion};
use crate::tools::Dispatched;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Upper bound on model requests within one step
pub const DEFAULT_MAX_ROUNDS: u32 = 50;

/// Executor for tool calls
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run one call; always yields a result for it, never an error
    async fn execute(&self, call: &ToolCall, cancel: &CancellationToken) -> Dispatched;

    /// Get tool definitions for the model
    fn definitions(&self) -> Vec<ToolDefinition>;
}

/// Hard failures of a step. The conversation is left as it was before the step.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model service error: {0}")]
    ModelService(#[from] LlmError),
    #[error("step cancelled")]
    Cancelled,
    #[error("model made {0} requests without finishing")]
    RoundLimitExceeded(u32),
}

/// Where the loop is within a step
#[derive(Debug)]
enum Phase {
    AwaitingModel,
    ExecutingTools(Vec<ToolCall>),
    Done,
}

pub struct Orchestrator {
    session_id: String,
    llm: Arc<dyn LlmService>,
    tools: Arc<dyn ToolExecutor>,
    prompts: Arc<PromptRegistry>,
    prompt_version: &'static str,
    prompt_text: &'static str,
    state: ConversationState,
    max_tokens: Option<u32>,
    max_rounds: u32,
    observer: Arc<dyn AgentObserver>,
}

impl Orchestrator {
    /// Create a session using `prompt_version`, or the latest prompt when `None`.
    ///
    /// Fails before any turn runs if the version is unknown.
    pub fn new(
        session_id: impl Into<String>,
        llm: Arc<dyn LlmService>,
        tools: Arc<dyn ToolExecutor>,
        prompts: Arc<PromptRegistry>,
        prompt_version: Option<&str>,
    ) -> Result<Self, UnknownPromptVersion> {
        let (prompt_version, prompt_text) = prompts.select(prompt_version)?;
        Ok(Self {
            session_id: session_id.into(),
            llm,
            tools,
            prompts,
            prompt_version,
            prompt_text,
            state: ConversationState::new(),
            max_tokens: None,
            max_rounds: DEFAULT_MAX_ROUNDS,
            observer: Arc::new(NoopObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn AgentObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn prompt_version(&self) -> &'static str {
        self.prompt_version
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Forget the conversation so far
    pub fn reset(&mut self) {
        tracing::info!(session_id = %self.session_id, turns = self.state.len(), "Resetting conversation");
        self.state.reset();
    }

    /// Switch to another prompt version. Starts a fresh conversation.
    pub fn set_prompt(&mut self, version: &str) -> Result<(), UnknownPromptVersion> {
        let (version, text) = self.prompts.select(Some(version))?;
        self.prompt_version = version;
        self.prompt_text = text;
        self.reset();
        Ok(())
    }

    /// Answer `question`, or continue the existing conversation when `None`.
    ///
    /// Returns the text of the final assistant turn. On error or
    /// cancellation every turn this step produced is discarded.
    pub async fn step(
        &mut self,
        question: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        let checkpoint = self.state.len();
        let start = Instant::now();

        let result = self.run_loop(question, cancel).await;
        match &result {
            Ok(answer) => tracing::info!(
                session_id = %self.session_id,
                prompt = %self.prompt_version,
                duration_ms = %start.elapsed().as_millis(),
                turns = self.state.len(),
                answer_len = answer.len(),
                "Step completed"
            ),
            Err(e) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    error = %e,
                    discarded_turns = self.state.len() - checkpoint,
                    "Step failed, rolling back"
                );
                self.state.rollback_to(checkpoint);
            }
        }
        result
    }

    async fn run_loop(
        &mut self,
        question: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<String, AgentError> {
        if let Some(text) = question {
            self.state.push(Turn::User { text });
        }

        let mut phase = Phase::AwaitingModel;
        let mut rounds = 0;
        // Set after a Continue response without tool calls
        let mut continuing = false;

        loop {
            phase = match phase {
                Phase::AwaitingModel => {
                    if rounds >= self.max_rounds {
                        return Err(AgentError::RoundLimitExceeded(self.max_rounds));
                    }
                    rounds += 1;

                    let response = self.request_model(cancel).await?;
                    let stop = response.stop;
                    let content = AssistantContent::from_blocks(response.content);
                    let has_calls = content
                        .iter()
                        .any(|c| matches!(c, AssistantContent::ToolCall(_)));

                    if has_calls {
                        self.emit_thinking(&content);
                    }
                    self.append_assistant(content, continuing);

                    if has_calls {
                        // A merged turn only gains calls from this response
                        let calls: Vec<ToolCall> = self
                            .state
                            .last()
                            .map(|turn| turn.tool_calls().into_iter().cloned().collect())
                            .unwrap_or_default();
                        continuing = false;
                        Phase::ExecutingTools(calls)
                    } else if stop == StopSignal::EndOfTurn {
                        Phase::Done
                    } else {
                        tracing::debug!(session_id = %self.session_id, "Continue without tool calls, requesting more");
                        // The partial turn goes back as the final message
                        self.state.trim_assistant_tail();
                        continuing = true;
                        Phase::AwaitingModel
                    }
                }
                Phase::ExecutingTools(calls) => {
                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        if cancel.is_cancelled() {
                            return Err(AgentError::Cancelled);
                        }
                        self.observer.on_event(&AgentEvent::ToolStarted {
                            id: call.id.clone(),
                            goal: call.goal().to_string(),
                            code: call
                                .arguments
                                .get("code")
                                .and_then(serde_json::Value::as_str)
                                .unwrap_or_default()
                                .to_string(),
                        });

                        let dispatched = self.tools.execute(call, cancel).await;
                        if cancel.is_cancelled() {
                            return Err(AgentError::Cancelled);
                        }

                        self.observer.on_event(&AgentEvent::ToolFinished {
                            id: call.id.clone(),
                            output: dispatched.result.content.clone(),
                            is_error: dispatched.result.is_error,
                        });
                        if let Some(path) = dispatched.artifact {
                            self.observer.on_event(&AgentEvent::Chart {
                                id: call.id.clone(),
                                path,
                            });
                        }
                        results.push(dispatched.result);
                    }
                    self.state.push(Turn::ToolResults { results });
                    Phase::AwaitingModel
                }
                Phase::Done => {
                    let answer = match self.state.last() {
                        Some(turn @ Turn::Assistant { .. }) => turn.text(),
                        _ => String::new(),
                    };
                    self.observer.on_event(&AgentEvent::Answer {
                        text: answer.clone(),
                    });
                    return Ok(answer);
                }
            };
        }
    }

    async fn request_model(&self, cancel: &CancellationToken) -> Result<LlmResponse, AgentError> {
        let request = LlmRequest {
            system: self.prompt_text.to_string(),
            messages: self.state.to_messages(),
            tools: self.tools.definitions(),
            max_tokens: self.max_tokens,
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AgentError::Cancelled),
            result = self.llm.complete(&request) => Ok(result?),
        }
    }

    /// Append a response's content, extending the current assistant turn when
    /// the previous response stopped early without tool calls.
    fn append_assistant(&mut self, content: Vec<AssistantContent>, continuing: bool) {
        if continuing {
            if let Some(Turn::Assistant { content: existing }) = self.state.last_mut() {
                existing.extend(content);
                return;
            }
        }
        // An empty assistant message is rejected by the model service on the next request
        if !content.is_empty() {
            self.state.push(Turn::Assistant { content });
        }
    }

    fn emit_thinking(&self, content: &[AssistantContent]) {
        for item in content {
            if let AssistantContent::Text { text } = item {
                if !text.trim().is_empty() {
                    self.observer.on_event(&AgentEvent::Thinking { text: text.clone() });
                }
            }
        }
    }
}
