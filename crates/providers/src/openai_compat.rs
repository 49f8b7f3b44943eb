//! OpenAI-compatible chat completions provider.
//!
//! Canonical messages are rewritten into the chat-completions shape:
//! - system prompt becomes the first `system` message
//! - assistant `tool_use` blocks become `tool_calls` with stringified arguments
//! - `tool_result` blocks become standalone `role: "tool"` messages
//!
//! Streaming falls back to the trait default (one completion replayed as
//! chunks).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use toolrelay_core::error::ProviderError;
use toolrelay_core::message::{ContentBlock, Message, MessageContent, Role};
use toolrelay_core::provider::{Completion, CompletionRequest, Provider, ToolDefinition, Usage};
use toolrelay_core::tool::ToolCall;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// An OpenAI-compatible chat completions provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            max_tokens: 4000,
            temperature: 0.3,
            client: crate::http_client(),
        }
    }

    /// OpenAI itself (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new("openai", DEFAULT_BASE_URL, api_key)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Convert canonical messages to the chat-completions format.
    fn to_api_messages(system_prompt: Option<&str>, messages: &[Message]) -> Vec<ApiMessage> {
        let mut out = Vec::with_capacity(messages.len() + 1);
        if let Some(prompt) = system_prompt {
            out.push(ApiMessage::text("system", prompt));
        }

        for msg in messages {
            let blocks = match &msg.content {
                MessageContent::Text(text) => {
                    out.push(ApiMessage::text(msg.role.as_str(), text));
                    continue;
                }
                MessageContent::Blocks(blocks) => blocks,
            };

            let mut text = String::new();
            let mut tool_calls = Vec::new();
            let mut tool_messages = Vec::new();
            for block in blocks {
                match block {
                    ContentBlock::Text { text: t } => text.push_str(t),
                    ContentBlock::ToolUse { id, name, input } => tool_calls.push(ApiToolCall {
                        id: Some(id.clone()),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: name.clone(),
                            arguments: input.to_string(),
                        },
                    }),
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } => tool_messages.push(ApiMessage {
                        role: "tool".into(),
                        content: Some(content.clone()),
                        tool_calls: None,
                        tool_call_id: Some(tool_use_id.clone()),
                    }),
                }
            }

            if msg.role == Role::Assistant && !tool_calls.is_empty() {
                out.push(ApiMessage {
                    role: "assistant".into(),
                    content: (!text.is_empty()).then_some(text),
                    tool_calls: Some(tool_calls),
                    tool_call_id: None,
                });
            } else if !text.is_empty() {
                out.push(ApiMessage::text(msg.role.as_str(), &text));
            }
            out.extend(tool_messages);
        }
        out
    }

    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.input_schema.clone(),
                },
            })
            .collect()
    }

    fn parse_tool_call(tc: ApiToolCall) -> ToolCall {
        let id = tc
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4()));
        let input = match serde_json::from_str(&tc.function.arguments) {
            Ok(v) => v,
            Err(e) => {
                warn!(tool = %tc.function.name, error = %e, "Tool arguments are not valid JSON");
                serde_json::json!({ "__raw_arguments": tc.function.arguments })
            }
        };
        ToolCall::new(id, tc.function.name, input)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": Self::to_api_messages(request.system_prompt.as_deref(), &request.messages),
            "temperature": self.temperature,
            "max_completion_tokens": request.max_tokens.unwrap_or(self.max_tokens),
        });
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
            body["tool_choice"] = serde_json::json!("auto");
        }

        debug!(provider = %self.name, model = %self.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(crate::transport_error)?;
        let response = crate::ensure_success(&self.name, response).await?;

        let bytes = response.bytes().await.map_err(crate::transport_error)?;
        let api_response: ApiResponse = serde_json::from_slice(&bytes)
            .map_err(|e| ProviderError::Decode(format!("chat completion: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("no choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(Self::parse_tool_call)
            .collect();

        let usage = api_response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(Completion {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            usage,
            model: api_response.model,
        })
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}
