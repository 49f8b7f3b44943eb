//! Wire types for the Anthropic Messages format, shared by the direct API
//! and Bedrock. Canonical messages already use the same block vocabulary,
//! so they are serialized as-is.

use serde::{Deserialize, Serialize};
use toolrelay_core::error::ProviderError;
use toolrelay_core::message::{Message, Role};
use toolrelay_core::provider::{Completion, CompletionRequest, ToolDefinition, Usage};
use toolrelay_core::tool::ToolCall;

pub(crate) const BEDROCK_ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

#[derive(Debug, Serialize)]
pub(crate) struct MessagesBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub anthropic_version: Option<&'static str>,

    pub max_tokens: u32,

    pub temperature: f32,

    pub messages: Vec<&'a Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "no_tools")]
    pub tools: &'a [ToolDefinition],

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

fn no_tools(tools: &&[ToolDefinition]) -> bool {
    tools.is_empty()
}

impl<'a> MessagesBody<'a> {
    /// System-role messages are lifted into the top-level `system` field,
    /// after the request's own system prompt.
    pub fn new(request: &'a CompletionRequest, max_tokens: u32, temperature: f32) -> Self {
        let mut system_parts: Vec<&str> = Vec::new();
        if let Some(prompt) = request.system_prompt.as_deref() {
            system_parts.push(prompt);
        }
        let mut messages = Vec::with_capacity(request.messages.len());
        for msg in &request.messages {
            match msg.role {
                Role::System => {
                    if let toolrelay_core::MessageContent::Text(text) = &msg.content {
                        system_parts.push(text);
                    }
                }
                _ => messages.push(msg),
            }
        }

        Self {
            model: None,
            anthropic_version: None,
            max_tokens: request.max_tokens.unwrap_or(max_tokens),
            temperature,
            messages,
            system: (!system_parts.is_empty()).then(|| system_parts.join("\n\n")),
            tools: &request.tools,
            stream: false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    pub model: Option<String>,

    pub content: Vec<ResponseBlock>,

    #[serde(default)]
    pub usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ApiUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

impl MessagesResponse {
    pub fn parse(body: &[u8]) -> Result<Self, ProviderError> {
        serde_json::from_slice(body)
            .map_err(|e| ProviderError::Decode(format!("messages response: {e}")))
    }

    pub fn into_completion(self) -> Completion {
        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in self.content {
            match block {
                ResponseBlock::Text { text: t } => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&t);
                }
                ResponseBlock::ToolUse { id, name, input } => {
                    tool_calls.push(ToolCall { id, name, input })
                }
                ResponseBlock::Other => {}
            }
        }
        Completion {
            text,
            tool_calls,
            usage: Usage {
                input_tokens: self.usage.input_tokens,
                output_tokens: self.usage.output_tokens,
            },
            model: self.model,
        }
    }
}
