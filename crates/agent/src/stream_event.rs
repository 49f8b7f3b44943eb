//! Client-facing streaming events.
//!
//! `StreamEvent` is what the orchestrator produces and what the gateway
//! writes to clients as SSE frames:
//! - `content_delta`     partial text from the model
//! - `tool_invocation`   a tool started or finished
//! - `progress`          free-form status
//! - `agent_activation`  a handoff switched agents
//! - `message_start` / `message_complete`  turn boundaries around a handoff
//! - `complete`          final answer and metadata
//! - `error`             the turn failed; the stream ends

use chrono::Utc;
use serde::{Deserialize, Serialize};
use toolrelay_core::tool::{ClientCallback, ToolResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ContentDelta {
        delta: String,
        full_content: String,
    },

    ToolInvocation {
        #[serde(rename = "toolEvent")]
        tool_event: ToolEvent,
    },

    Progress {
        message: String,
        #[serde(flatten)]
        fields: serde_json::Map<String, serde_json::Value>,
    },

    AgentActivation {
        agent_name: String,
        agent_role: String,
        message: String,
    },

    MessageStart {
        agent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        timestamp: String,
    },

    MessageComplete {
        agent_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        timestamp: String,
    },

    Complete {
        full_content: String,
        token_count: u32,
        tool_results: Vec<ToolResultSummary>,
        metadata: CompleteMetadata,
    },

    Error {
        error: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventKind {
    ToolStart,
    ToolComplete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolEvent {
    #[serde(rename = "type")]
    pub kind: ToolEventKind,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
    pub agent_id: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultSummary {
    pub name: String,
    pub success: bool,
}

/// One executed tool and what it returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    pub function: String,
    pub result: ToolResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompleteMetadata {
    pub agent_switch_occurred: bool,
    pub functions_called: Vec<String>,
    pub function_results: Vec<FunctionResult>,
    #[serde(
        default,
        rename = "clientCallbacks",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub client_callbacks: Vec<ClientCallback>,
}

pub(crate) fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

impl StreamEvent {
    pub fn tool_start(name: &str, parameters: serde_json::Value, agent_id: &str) -> Self {
        Self::ToolInvocation {
            tool_event: ToolEvent {
                kind: ToolEventKind::ToolStart,
                tool_name: name.to_string(),
                parameters: Some(parameters),
                result: None,
                agent_id: agent_id.to_string(),
                timestamp: timestamp(),
            },
        }
    }

    pub fn tool_complete(name: &str, result: ToolResult, agent_id: &str) -> Self {
        Self::ToolInvocation {
            tool_event: ToolEvent {
                kind: ToolEventKind::ToolComplete,
                tool_name: name.to_string(),
                parameters: None,
                result: Some(result),
                agent_id: agent_id.to_string(),
                timestamp: timestamp(),
            },
        }
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::Progress {
            message: message.into(),
            fields: serde_json::Map::new(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// Wire name of this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ContentDelta { .. } => "content_delta",
            Self::ToolInvocation { .. } => "tool_invocation",
            Self::Progress { .. } => "progress",
            Self::AgentActivation { .. } => "agent_activation",
            Self::MessageStart { .. } => "message_start",
            Self::MessageComplete { .. } => "message_complete",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// The event as one SSE frame: `data: <json>\n\n`.
    pub fn to_sse_frame(&self) -> String {
        let json = serde_json::to_string(self)
            .unwrap_or_else(|e| format!(r#"{{"type":"error","error":"{e}"}}"#));
        format!("data: {json}\n\n")
    }
}
