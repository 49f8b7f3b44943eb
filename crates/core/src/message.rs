//! Canonical message types.
//!
//! Every provider adapter converts to and from these. A message body is
//! either plain text or a list of typed [`ContentBlock`]s; tool calls and
//! their results travel as blocks so they can be correlated by id.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::tool::{ToolCall, ToolResult};

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A typed piece of message content.
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
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Build a `tool_result` block whose content is the JSON-encoded result.
    pub fn tool_result(tool_use_id: impl Into<String>, result: &ToolResult) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: serde_json::to_string(result).unwrap_or_else(|_| "{}".into()),
            is_error: !result.success,
        }
    }
}

/// Message body: a bare string or a list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content.into())
    }

    /// An assistant message carrying one `tool_use` block per call.
    pub fn tool_uses(calls: &[ToolCall]) -> Self {
        let blocks = calls
            .iter()
            .map(|c| ContentBlock::ToolUse {
                id: c.id.clone(),
                name: c.name.clone(),
                input: c.input.clone(),
            })
            .collect();
        Self::new(Role::Assistant, MessageContent::Blocks(blocks))
    }

    /// A user message carrying `tool_result` blocks.
    pub fn tool_results(blocks: Vec<ContentBlock>) -> Self {
        Self::new(Role::User, MessageContent::Blocks(blocks))
    }

    /// Concatenated text of the message, ignoring tool blocks.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// The message as blocks; plain text becomes a single text block.
    pub fn blocks(&self) -> Vec<ContentBlock> {
        match &self.content {
            MessageContent::Text(s) => vec![ContentBlock::text(s.clone())],
            MessageContent::Blocks(blocks) => blocks.clone(),
        }
    }

    pub fn tool_use_ids(&self) -> Vec<&str> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// Check that every `tool_result` references a `tool_use` emitted earlier.
///
/// Returns the first dangling `tool_use_id` on failure.
pub fn validate_exchange(messages: &[Message]) -> std::result::Result<(), String> {
    let mut seen: HashSet<&str> = HashSet::new();
    for msg in messages {
        let MessageContent::Blocks(blocks) = &msg.content else {
            continue;
        };
        for block in blocks {
            match block {
                ContentBlock::ToolUse { id, .. } => {
                    seen.insert(id.as_str());
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    if !seen.contains(tool_use_id.as_str()) {
                        return Err(tool_use_id.clone());
                    }
                }
                ContentBlock::Text { .. } => {}
            }
        }
    }
    Ok(())
}
