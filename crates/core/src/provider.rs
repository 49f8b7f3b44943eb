//! Provider trait, the abstraction over model backends.
//!
//! A provider takes the canonical conversation plus the tools the current
//! agent may use and returns text and tool calls, either in one piece or as
//! a stream of [`StreamChunk`]s.
//!
//! Implementations: Anthropic direct, Bedrock (signed requests),
//! OpenAI-compatible chat completions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::Message;
use crate::tool::ToolCall;

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,

    pub description: String,

    /// JSON Schema describing the tool input
    pub input_schema: serde_json::Value,
}

/// One completion request, already shaped for the current agent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Falls back to the adapter's configured default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    pub fn add(&mut self, other: Usage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// A finished completion, streamed or not.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,

    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default)]
    pub usage: Usage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// A single event in a streaming response, in arrival order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Text delta
    Text { content: String },

    /// A fully assembled tool call
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Usage report; never forwarded to clients
    Usage {
        usage: Usage,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },
}

/// Folds a chunk stream into a [`Completion`].
#[derive(Debug, Default)]
pub struct StreamCollector {
    completion: Completion,
}

impl StreamCollector {
    pub fn push(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::Text { content } => self.completion.text.push_str(&content),
            StreamChunk::ToolUse { id, name, input } => {
                self.completion.tool_calls.push(ToolCall { id, name, input })
            }
            StreamChunk::Usage { usage, model } => {
                self.completion.usage.add(usage);
                if model.is_some() {
                    self.completion.model = model;
                }
            }
        }
    }

    pub fn text(&self) -> &str {
        &self.completion.text
    }

    pub fn finish(self) -> Completion {
        self.completion
    }
}

/// Drain a provider stream, calling `on_chunk` for every text and tool-use
/// chunk before resolving with the assembled completion.
pub async fn collect_stream<F>(
    mut rx: mpsc::Receiver<Result<StreamChunk, ProviderError>>,
    mut on_chunk: F,
) -> Result<Completion, ProviderError>
where
    F: FnMut(&StreamChunk),
{
    let mut collector = StreamCollector::default();
    while let Some(item) = rx.recv().await {
        let chunk = item?;
        if !matches!(chunk, StreamChunk::Usage { .. }) {
            on_chunk(&chunk);
        }
        collector.push(chunk);
    }
    Ok(collector.finish())
}

/// The core Provider trait.
///
/// The orchestrator only talks to `dyn Provider`; which wire protocol sits
/// behind it is a configuration choice.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A short name for logs (e.g. "anthropic", "bedrock").
    fn name(&self) -> &str;

    /// Send a request and get the complete response.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;

    /// Send a request and get a stream of chunks. The channel closes when the
    /// response is finished; dropping the receiver cancels the stream.
    ///
    /// The default implementation calls `complete()` and replays the result
    /// as one `tool_use` chunk per call followed by one `text` chunk.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        let completion = self.complete(request).await?;
        let (tx, rx) = mpsc::channel(completion.tool_calls.len() + 2);
        for call in completion.tool_calls {
            let _ = tx
                .send(Ok(StreamChunk::ToolUse {
                    id: call.id,
                    name: call.name,
                    input: call.input,
                }))
                .await;
        }
        if !completion.text.is_empty() {
            let _ = tx
                .send(Ok(StreamChunk::Text {
                    content: completion.text,
                }))
                .await;
        }
        let _ = tx
            .send(Ok(StreamChunk::Usage {
                usage: completion.usage,
                model: completion.model,
            }))
            .await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedProvider;

    #[async_trait]
    impl Provider for CannedProvider {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
            Ok(Completion {
                text: "done".into(),
                tool_calls: vec![
                    ToolCall::new("call_1", "first", serde_json::json!({"a": 1})),
                    ToolCall::new("call_2", "second", serde_json::json!({})),
                ],
                usage: Usage {
                    input_tokens: 12,
                    output_tokens: 3,
                },
                model: Some("canned-1".into()),
            })
        }
    }

    #[tokio::test]
    async fn default_stream_replays_tool_calls_then_text() {
        let rx = CannedProvider
            .stream(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();

        let mut seen = Vec::new();
        let completion = collect_stream(rx, |chunk| seen.push(chunk.clone()))
            .await
            .unwrap();

        assert_eq!(seen.len(), 3);
        assert!(matches!(&seen[0], StreamChunk::ToolUse { id, .. } if id == "call_1"));
        assert!(matches!(&seen[1], StreamChunk::ToolUse { id, .. } if id == "call_2"));
        assert!(matches!(&seen[2], StreamChunk::Text { content } if content == "done"));

        assert_eq!(completion.text, "done");
        assert_eq!(completion.tool_calls.len(), 2);
        assert_eq!(completion.usage.total(), 15);
        assert_eq!(completion.model.as_deref(), Some("canned-1"));
    }

    #[tokio::test]
    async fn collect_stream_propagates_errors() {
        let (tx, rx) = mpsc::channel(4);
        tx.send(Ok(StreamChunk::Text {
            content: "partial".into(),
        }))
        .await
        .unwrap();
        tx.send(Err(ProviderError::StreamInterrupted("reset".into())))
            .await
            .unwrap();
        drop(tx);

        let err = collect_stream(rx, |_| {}).await.unwrap_err();
        assert!(matches!(err, ProviderError::StreamInterrupted(_)));
    }

    #[test]
    fn usage_saturates_instead_of_overflowing() {
        let mut usage = Usage {
            input_tokens: u32::MAX - 1,
            output_tokens: 10,
        };
        usage.add(Usage {
            input_tokens: 5,
            output_tokens: 2,
        });
        assert_eq!(usage.input_tokens, u32::MAX);
        assert_eq!(usage.output_tokens, 12);
        assert_eq!(usage.total(), u32::MAX);
    }

    #[test]
    fn chunk_wire_shape() {
        let chunk = StreamChunk::ToolUse {
            id: "toolu_1".into(),
            name: "lookup".into(),
            input: serde_json::json!({"q": "x"}),
        };
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["input"]["q"], "x");
    }
}
