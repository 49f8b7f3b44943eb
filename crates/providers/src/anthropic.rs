//! Anthropic native provider implementation.
//!
//! Uses the Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as a top-level field
//! - Native `tool_use` / `tool_result` content blocks
//! - Streaming via SSE `data:` lines carrying `content_block_*` events

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use toolrelay_core::error::ProviderError;
use toolrelay_core::provider::{Completion, CompletionRequest, Provider, StreamChunk};
use tracing::{debug, trace};

use crate::content_blocks::{ContentBlockAccumulator, dispatch, send_all};
use crate::messages_api::{MessagesBody, MessagesResponse};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            client: crate::http_client(),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
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

    fn body<'a>(&'a self, request: &'a CompletionRequest, stream: bool) -> MessagesBody<'a> {
        let mut body = MessagesBody::new(request, self.max_tokens, self.temperature);
        body.model = Some(&self.model);
        body.stream = stream;
        body
    }

    async fn post(
        &self,
        body: &MessagesBody<'_>,
        accept: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("accept", accept)
            .json(body)
            .send()
            .await
            .map_err(crate::transport_error)?;
        crate::ensure_success(&self.name, response).await
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        debug!(provider = "anthropic", model = %self.model, messages = request.messages.len(), "Sending completion request");

        let body = self.body(&request, false);
        let response = self.post(&body, "application/json").await?;
        let bytes = response.bytes().await.map_err(crate::transport_error)?;
        Ok(MessagesResponse::parse(&bytes)?.into_completion())
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        debug!(provider = "anthropic", model = %self.model, messages = request.messages.len(), "Sending streaming request");

        let body = self.body(&request, true);
        let response = self.post(&body, "text/event-stream").await?;

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut lines = SseLineBuffer::default();
            let mut acc = ContentBlockAccumulator::new();

            while let Some(next) = byte_stream.next().await {
                let bytes = match next {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                for data in lines.push(&bytes) {
                    let event: serde_json::Value = match serde_json::from_str(&data) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, data = %data, "Ignoring unparseable SSE data");
                            continue;
                        }
                    };
                    if !dispatch(&mut acc, &event, &tx).await {
                        return;
                    }
                }
            }

            send_all(acc.finish(), &tx).await;
        });

        Ok(rx)
    }
}

/// Splits an SSE byte stream into `data:` payloads. Buffers raw bytes so a
/// multi-byte character split across transport chunks survives.
#[derive(Debug, Default)]
pub(crate) struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if !data.is_empty() && data != "[DONE]" {
                    out.push(data.to_string());
                }
            }
        }
        out
    }
}
