//! Conversation state for one analysis session
//!
//! The state is an append-only list of turns in production order. Tool calls
//! and tool results are correlated solely by the id the model assigned.

use crate::llm::{ContentBlock, LlmMessage, MessageRole};
use serde::Serialize;
use serde_json::Value;

pub use crate::llm::StopSignal;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Human-facing label for the call; never affects execution
    pub fn goal(&self) -> &str {
        self.arguments
            .get("goal")
            .and_then(Value::as_str)
            .unwrap_or("analyzing")
    }
}

/// Result for exactly one [`ToolCall`], echoing its id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
}

/// One piece of an assistant turn, in the order the model produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantContent {
    Text { text: String },
    ToolCall(ToolCall),
}

impl AssistantContent {
    /// Keep text and tool-use blocks in the order the model produced them
    pub fn from_blocks(blocks: Vec<ContentBlock>) -> Vec<Self> {
        blocks
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(AssistantContent::Text { text }),
                ContentBlock::ToolUse { id, name, input } => {
                    Some(AssistantContent::ToolCall(ToolCall::new(id, name, input)))
                }
                ContentBlock::ToolResult { .. } => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    User { text: String },
    Assistant { content: Vec<AssistantContent> },
    ToolResults { results: Vec<ToolResult> },
}

impl Turn {
    /// Tool calls in this turn, in the order received
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        match self {
            Turn::Assistant { content } => content
                .iter()
                .filter_map(|c| match c {
                    AssistantContent::ToolCall(call) => Some(call),
                    AssistantContent::Text { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Concatenated text segments of an assistant turn
    pub fn text(&self) -> String {
        match self {
            Turn::User { text } => text.clone(),
            Turn::Assistant { content } => content
                .iter()
                .filter_map(|c| match c {
                    AssistantContent::Text { text } => Some(text.as_str()),
                    AssistantContent::ToolCall(_) => None,
                })
                .collect(),
            Turn::ToolResults { .. } => String::new(),
        }
    }

    fn to_message(&self) -> LlmMessage {
        match self {
            Turn::User { text } => LlmMessage {
                role: MessageRole::User,
                content: vec![ContentBlock::text(text.clone())],
            },
            Turn::Assistant { content } => LlmMessage {
                role: MessageRole::Assistant,
                content: content
                    .iter()
                    .map(|c| match c {
                        AssistantContent::Text { text } => ContentBlock::text(text.clone()),
                        AssistantContent::ToolCall(call) => ContentBlock::tool_use(
                            call.id.clone(),
                            call.name.clone(),
                            call.arguments.clone(),
                        ),
                    })
                    .collect(),
            },
            Turn::ToolResults { results } => LlmMessage {
                role: MessageRole::User,
                content: results
                    .iter()
                    .map(|r| ContentBlock::ToolResult {
                        tool_use_id: r.tool_call_id.clone(),
                        content: r.content.clone(),
                        is_error: r.is_error,
                    })
                    .collect(),
            },
        }
    }
}

/// Ordered, append-only turn history owned by a single session
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut Turn> {
        self.turns.last_mut()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop every turn produced after `len`; used to discard a failed step
    pub fn rollback_to(&mut self, len: usize) {
        self.turns.truncate(len);
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    /// Strip trailing whitespace from a final assistant turn so it can be
    /// sent back as a prefill. A turn left with no content is dropped.
    pub fn trim_assistant_tail(&mut self) {
        let Some(Turn::Assistant { content }) = self.turns.last_mut() else {
            return;
        };
        if let Some(AssistantContent::Text { text }) = content.last_mut() {
            text.truncate(text.trim_end().len());
            if text.is_empty() {
                content.pop();
            }
        }
        if content.is_empty() {
            self.turns.pop();
        }
    }

    /// Render the history as model-service messages
    pub fn to_messages(&self) -> Vec<LlmMessage> {
        self.turns.iter().map(Turn::to_message).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_assistant() -> Turn {
        Turn::Assistant {
            content: AssistantContent::from_blocks(vec![
                ContentBlock::text("First I'll look at the schema. "),
                ContentBlock::tool_use("t1", "execute_python", json!({"code": "print(df.dtypes)", "goal": "schema"})),
                ContentBlock::text("Then the totals."),
                ContentBlock::tool_use("t2", "execute_python", json!({"code": "print(df.sum())"})),
            ]),
        }
    }

    #[test]
    fn test_assistant_turn_preserves_interleaving() {
        let turn = sample_assistant();
        let Turn::Assistant { content } = &turn else {
            panic!("expected assistant turn");
        };
        assert!(matches!(content[0], AssistantContent::Text { .. }));
        assert!(matches!(&content[1], AssistantContent::ToolCall(c) if c.id == "t1"));
        assert!(matches!(content[2], AssistantContent::Text { .. }));
        assert!(matches!(&content[3], AssistantContent::ToolCall(c) if c.id == "t2"));

        let ids: Vec<_> = turn.tool_calls().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["t1", "t2"]);
        assert_eq!(turn.text(), "First I'll look at the schema. Then the totals.");
    }

    #[test]
    fn test_goal_label_defaults() {
        let turn = sample_assistant();
        let calls = turn.tool_calls();
        assert_eq!(calls[0].goal(), "schema");
        assert_eq!(calls[1].goal(), "analyzing");
    }

    #[test]
    fn test_messages_alternate_roles() {
        let mut state = ConversationState::new();
        state.push(Turn::User { text: "Best CPA?".to_string() });
        state.push(sample_assistant());
        state.push(Turn::ToolResults {
            results: vec![
                ToolResult { tool_call_id: "t1".to_string(), content: "a".to_string(), is_error: false },
                ToolResult { tool_call_id: "t2".to_string(), content: "b".to_string(), is_error: true },
            ],
        });

        let messages = state.to_messages();
        let roles: Vec<_> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [MessageRole::User, MessageRole::Assistant, MessageRole::User]);
        assert_eq!(
            messages[2].content[1],
            ContentBlock::ToolResult {
                tool_use_id: "t2".to_string(),
                content: "b".to_string(),
                is_error: true
            }
        );
    }

    #[test]
    fn test_rollback_and_reset() {
        let mut state = ConversationState::new();
        state.push(Turn::User { text: "one".to_string() });
        let mark = state.len();
        state.push(Turn::User { text: "two".to_string() });
        state.push(sample_assistant());
        state.rollback_to(mark);
        assert_eq!(state.len(), 1);
        assert_eq!(state.last().map(Turn::text).as_deref(), Some("one"));

        state.reset();
        assert!(state.is_empty());
    }

    #[test]
    fn test_trim_assistant_tail() {
        let mut state = ConversationState::new();
        state.push(Turn::User { text: "q".to_string() });
        state.push(Turn::Assistant {
            content: AssistantContent::from_blocks(vec![ContentBlock::text("Part one. \n")]),
        });
        state.trim_assistant_tail();
        assert_eq!(state.last().map(Turn::text).as_deref(), Some("Part one."));

        // Whitespace-only turns disappear entirely
        state.push(Turn::Assistant {
            content: AssistantContent::from_blocks(vec![ContentBlock::text("  ")]),
        });
        state.trim_assistant_tail();
        assert_eq!(state.len(), 2);

        // Non-assistant tails are left alone
        state.push(Turn::User { text: "next ".to_string() });
        state.trim_assistant_tail();
        assert_eq!(state.last().map(Turn::text).as_deref(), Some("next "));
    }
}
