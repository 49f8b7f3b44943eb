//! AWS Bedrock provider for Anthropic models.
//!
//! Requests use the Messages body with `anthropic_version` instead of a
//! `model` field (the model lives in the URL) and are signed with SigV4.
//! Streaming responses arrive as binary event-stream frames whose `chunk`
//! payloads wrap the same JSON events as the direct API.

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use reqwest::Url;
use tokio::sync::mpsc;
use toolrelay_core::error::ProviderError;
use toolrelay_core::provider::{Completion, CompletionRequest, Provider, StreamChunk};
use tracing::{debug, warn};

use crate::content_blocks::{ChunkSender, ContentBlockAccumulator, dispatch, send_all};
use crate::event_stream::{EventStreamDecoder, Frame, decode_chunk_payload};
use crate::messages_api::{BEDROCK_ANTHROPIC_VERSION, MessagesBody, MessagesResponse};
use crate::sigv4::{Credentials, SigV4Signer};

const SERVICE: &str = "bedrock";
const DEFAULT_MAX_TOKENS: u32 = 4000;
const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Bedrock runtime provider.
pub struct BedrockProvider {
    signer: SigV4Signer,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    client: reqwest::Client,
}

impl BedrockProvider {
    pub fn new(
        credentials: Credentials,
        region: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let region = region.into();
        let endpoint = format!("https://bedrock-runtime.{region}.amazonaws.com");
        Ok(Self {
            signer: SigV4Signer::new(credentials, region, SERVICE)?,
            endpoint,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            client: crate::http_client(),
        })
    }

    /// Override the runtime endpoint (VPC endpoints, local test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
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

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self, action: &str) -> Result<Url, ProviderError> {
        let raw = format!("{}/model/{}/{action}", self.endpoint, self.model);
        Url::parse(&raw).map_err(|e| ProviderError::NotConfigured(format!("bad endpoint {raw}: {e}")))
    }

    async fn post(
        &self,
        request: &CompletionRequest,
        action: &str,
        accept: &str,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut body = MessagesBody::new(request, self.max_tokens, self.temperature);
        body.anthropic_version = Some(BEDROCK_ANTHROPIC_VERSION);
        let payload = serde_json::to_vec(&body)
            .map_err(|e| ProviderError::Decode(format!("request body: {e}")))?;

        let url = self.url(action)?;
        let signed = self.signer.sign(
            "POST",
            &url,
            &[("content-type", "application/json"), ("accept", accept)],
            &payload,
            Utc::now(),
        )?;

        let mut builder = self.client.post(url);
        for (name, value) in &signed {
            // reqwest derives Host from the URL.
            if name != "host" {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }

        let response = builder
            .body(payload)
            .send()
            .await
            .map_err(crate::transport_error)?;
        crate::ensure_success("bedrock", response).await
    }
}

#[async_trait]
impl Provider for BedrockProvider {
    fn name(&self) -> &str {
        "bedrock"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        debug!(provider = "bedrock", model = %self.model, region = self.signer.region(), "Sending completion request");

        let response = self.post(&request, "invoke", "application/json").await?;
        let bytes = response.bytes().await.map_err(crate::transport_error)?;
        let mut completion = MessagesResponse::parse(&bytes)?.into_completion();
        if completion.model.is_none() {
            completion.model = Some(self.model.clone());
        }
        Ok(completion)
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        debug!(provider = "bedrock", model = %self.model, region = self.signer.region(), "Sending streaming request");

        let response = self
            .post(
                &request,
                "invoke-with-response-stream",
                "application/vnd.amazon.eventstream",
            )
            .await?;

        let (tx, rx) = mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = EventStreamDecoder::new();
            let mut acc = ContentBlockAccumulator::new();

            while let Some(next) = byte_stream.next().await {
                match next {
                    Ok(bytes) => decoder.push(&bytes),
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                }

                loop {
                    let frame = match decoder.next_frame() {
                        Ok(Some(frame)) => frame,
                        Ok(None) => break,
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    };
                    if !handle_frame(&mut acc, frame, &tx).await {
                        return;
                    }
                }
            }

            if decoder.pending() > 0 {
                warn!(bytes = decoder.pending(), "Event stream ended mid-frame");
            }
            send_all(acc.finish(), &tx).await;
        });

        Ok(rx)
    }
}

/// Returns `false` once the stream should stop.
async fn handle_frame(acc: &mut ContentBlockAccumulator, frame: Frame, tx: &ChunkSender) -> bool {
    if frame.message_type() != "event" {
        let _ = tx.send(Err(exception_error(&frame))).await;
        return false;
    }
    if frame.event_type() != Some("chunk") {
        debug!(event_type = ?frame.event_type(), "Skipping non-chunk frame");
        return true;
    }
    match decode_chunk_payload(&frame.payload) {
        Ok(event) => dispatch(acc, &event, tx).await,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            false
        }
    }
}

fn exception_error(frame: &Frame) -> ProviderError {
    let kind = frame.exception_type().unwrap_or("unknownException");
    let status_code = match kind {
        "throttlingException" => 429,
        "validationException" => 400,
        "modelStreamErrorException" => 424,
        "serviceUnavailableException" => 503,
        _ => 500,
    };
    let detail = serde_json::from_slice::<serde_json::Value>(&frame.payload)
        .ok()
        .and_then(|v| v["message"].as_str().map(String::from))
        .unwrap_or_else(|| String::from_utf8_lossy(&frame.payload).into_owned());
    warn!(exception = kind, status_code, "Bedrock stream exception");
    ProviderError::ApiError {
        status_code,
        message: format!("{kind}: {detail}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_stream::{encode_chunk, encode_frame};
    use crate::test_server::serve_once;
    use serde_json::json;
    use toolrelay_core::message::Message;
    use toolrelay_core::provider::collect_stream;

    fn creds() -> Credentials {
        Credentials {
            access_key_id: "AKIDEXAMPLE".into(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".into(),
            session_token: None,
        }
    }

    fn provider(endpoint: &str) -> BedrockProvider {
        BedrockProvider::new(creds(), "us-east-1", "anthropic.claude-3-5-sonnet-20241022-v2:0")
            .unwrap()
            .with_endpoint(endpoint)
    }

    #[test]
    fn default_endpoint_uses_region() {
        let p = BedrockProvider::new(creds(), "eu-west-1", "m").unwrap();
        assert_eq!(p.endpoint, "https://bedrock-runtime.eu-west-1.amazonaws.com");
        assert_eq!(p.name(), "bedrock");
    }

    #[test]
    fn missing_secret_is_rejected() {
        let mut c = creds();
        c.secret_access_key.clear();
        assert!(matches!(
            BedrockProvider::new(c, "us-east-1", "m"),
            Err(ProviderError::Signing(_))
        ));
    }

    #[test]
    fn model_id_colon_survives_in_url() {
        let p = provider("https://bedrock-runtime.us-east-1.amazonaws.com");
        let url = p.url("invoke").unwrap();
        assert_eq!(
            url.path(),
            "/model/anthropic.claude-3-5-sonnet-20241022-v2:0/invoke"
        );
    }

    #[test]
    fn exception_frames_map_to_status() {
        let frame = Frame {
            headers: vec![(
                ":exception-type".into(),
                crate::event_stream::HeaderValue::String("throttlingException".into()),
            )],
            payload: br#"{"message":"slow down"}"#.to_vec(),
        };
        match exception_error(&frame) {
            ProviderError::ApiError {
                status_code,
                message,
            } => {
                assert_eq!(status_code, 429);
                assert_eq!(message, "throttlingException: slow down");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_signs_request() {
        let body = br#"{"content":[{"type":"text","text":"ok"}],"usage":{"input_tokens":1,"output_tokens":1}}"#;
        let (url, server) = serve_once(200, "application/json", body.to_vec()).await;

        let completion = provider(&url)
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(completion.text, "ok");
        assert_eq!(
            completion.model.as_deref(),
            Some("anthropic.claude-3-5-sonnet-20241022-v2:0")
        );

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /model/anthropic.claude-3-5-sonnet-20241022-v2:0/invoke "));
        let lower = raw.to_lowercase();
        assert!(lower.contains("authorization: aws4-hmac-sha256 credential=akidexample/"));
        assert!(lower.contains("/us-east-1/bedrock/aws4_request"));
        assert!(lower.contains("x-amz-date: "));
        assert!(raw.contains(r#""anthropic_version":"bedrock-2023-05-31""#));
        assert!(!raw.contains(r#""model""#));
    }

    #[tokio::test]
    async fn stream_decodes_event_frames() {
        let events = [
            json!({"type":"message_start","message":{"model":"claude-b","usage":{"input_tokens":4,"output_tokens":0}}}),
            json!({"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"toolu_9","name":"switch_agent","input":{}}}),
            json!({"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"agent\":\"billing\"}"}}),
            json!({"type":"content_block_stop","index":0}),
            json!({"type":"message_delta","usage":{"output_tokens":7}}),
        ];
        let mut bytes = Vec::new();
        for e in &events {
            bytes.extend(encode_chunk(e));
        }
        let (url, server) = serve_once(200, "application/vnd.amazon.eventstream", bytes).await;

        let rx = provider(&url)
            .stream(CompletionRequest::new(vec![Message::user("route me")]))
            .await
            .unwrap();
        let completion = collect_stream(rx, |_| {}).await.unwrap();
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(completion.tool_calls[0].input["agent"], "billing");
        assert_eq!(completion.usage.input_tokens, 4);
        assert_eq!(completion.usage.output_tokens, 7);

        let raw = server.await.unwrap();
        assert!(raw.contains("/invoke-with-response-stream"));
        assert!(raw.to_lowercase().contains("accept: application/vnd.amazon.eventstream"));
    }

    #[tokio::test]
    async fn stream_exception_surfaces_as_error() {
        let mut bytes = encode_chunk(&json!({"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}));
        bytes.extend(encode_frame(
            &[
                (":message-type", "exception"),
                (":exception-type", "modelStreamErrorException"),
            ],
            br#"{"message":"model failed"}"#,
        ));
        let (url, _server) = serve_once(200, "application/vnd.amazon.eventstream", bytes).await;

        let rx = provider(&url)
            .stream(CompletionRequest::new(vec![Message::user("x")]))
            .await
            .unwrap();
        let err = collect_stream(rx, |_| {}).await.unwrap_err();
        assert_eq!(err.status_code(), Some(424));
    }
}
