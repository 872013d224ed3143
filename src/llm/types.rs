//! Wire-neutral types for model turns

use serde::{Deserialize, Serialize};

/// Request sent for one model turn
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

/// Message in conversation
#[derive(Debug, Clone)]
pub struct LlmMessage {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

/// Content block in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn tool_use(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Value,
    ) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// Tool definition presented to the model
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Whether a response is final or expects more tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopSignal {
    Continue,
    EndOfTurn,
}

impl StopSignal {
    /// Anything other than an explicit `end_turn` means "keep going".
    pub fn from_stop_reason(reason: Option<&str>) -> Self {
        match reason {
            Some("end_turn") => StopSignal::EndOfTurn,
            _ => StopSignal::Continue,
        }
    }
}

/// Response to one model turn
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub stop: StopSignal,
    pub usage: Usage,
}

impl LlmResponse {
    /// Get text content from the response
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn has_tool_use(&self) -> bool {
        self.content
            .iter()
            .any(|block| matches!(block, ContentBlock::ToolUse { .. }))
    }
}

/// Usage statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(StopSignal::from_stop_reason(Some("end_turn")), StopSignal::EndOfTurn);
        assert_eq!(StopSignal::from_stop_reason(Some("tool_use")), StopSignal::Continue);
        assert_eq!(StopSignal::from_stop_reason(Some("max_tokens")), StopSignal::Continue);
        assert_eq!(StopSignal::from_stop_reason(None), StopSignal::Continue);
    }

    #[test]
    fn test_response_text_skips_tool_use() {
        let response = LlmResponse {
            content: vec![
                ContentBlock::text("Looking at "),
                ContentBlock::tool_use("t1", "execute_python", json!({})),
                ContentBlock::text("the data."),
            ],
            stop: StopSignal::Continue,
            usage: Usage::default(),
        };
        assert_eq!(response.text(), "Looking at the data.");
        assert!(response.has_tool_use());
    }
}
