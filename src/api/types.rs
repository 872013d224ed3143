//! API request and response types

use serde::{Deserialize, Serialize};

/// Request to open a new session
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub prompt_version: Option<String>,
    pub data_file: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub prompt_version: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteSessionResponse {
    pub deleted: bool,
}

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

/// Response for chat action
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub queued: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetPromptRequest {
    pub prompt_version: String,
}

#[derive(Debug, Serialize)]
pub struct SetPromptResponse {
    pub prompt_version: String,
}

/// Response for cancel action
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub ok: bool,
}

#[derive(Debug, Serialize)]
pub struct PromptsResponse {
    pub prompts: Vec<String>,
    pub default: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub version: String,
    pub text: String,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
