//! Model service abstraction
//!
//! The orchestrator talks to the model through [`LlmService`] so that tests can
//! substitute a scripted service and front-ends can share one client.

mod anthropic;
mod error;
mod types;

pub use anthropic::AnthropicService;
pub use error::{LlmError, LlmErrorKind};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Default model used when `ANALYST_MODEL` is not set
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Common interface for model services
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Make a completion request
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Configuration for the model service
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<String>,
    /// Gateway base URL; when set the gateway handles authentication
    pub gateway: Option<String>,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            gateway: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self {
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            gateway: std::env::var("LLM_GATEWAY").ok(),
            model: std::env::var("ANALYST_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            max_tokens: std::env::var("ANALYST_MAX_TOKENS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_TOKENS),
        }
    }

    /// Build the logged Anthropic service described by this configuration.
    ///
    /// In gateway mode an implicit key is used; otherwise a non-empty
    /// `ANTHROPIC_API_KEY` is required.
    pub fn build_service(&self) -> Result<Arc<dyn LlmService>, LlmError> {
        let api_key = match (&self.gateway, &self.anthropic_api_key) {
            (Some(_), _) => "implicit".to_string(),
            (None, Some(key)) if !key.is_empty() => key.clone(),
            (None, _) => {
                return Err(LlmError::auth(
                    "No model credentials configured. Set ANTHROPIC_API_KEY or LLM_GATEWAY.",
                ))
            }
        };

        let service = AnthropicService::new(
            api_key,
            self.model.clone(),
            self.gateway.as_deref(),
            self.max_tokens,
        )?;
        Ok(Arc::new(LoggingService::new(Arc::new(service))))
    }
}

/// Logging wrapper for model services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    messages = request.messages.len(),
                    stop = ?response.stop,
                    tool_use = response.has_tool_use(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "Model request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "Model request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
