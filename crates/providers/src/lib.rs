//! Model provider implementations for toolrelay.
//!
//! All providers implement the `toolrelay_core::Provider` trait.
//! [`router::build_from_config`] picks one based on configuration.
//!
//! - [`AnthropicProvider`]: direct Messages API, SSE streaming
//! - [`BedrockProvider`]: SigV4-signed requests, binary event-stream streaming
//! - [`OpenAiCompatProvider`]: chat completions, synthesized streaming

pub mod anthropic;
pub mod bedrock;
pub mod content_blocks;
pub mod event_stream;
mod messages_api;
pub mod openai_compat;
pub mod router;
pub mod sigv4;

pub use anthropic::AnthropicProvider;
pub use bedrock::BedrockProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;

use toolrelay_core::error::ProviderError;
use tracing::warn;

/// Default HTTP timeout for a single provider call.
pub(crate) const REQUEST_TIMEOUT_SECS: u64 = 300;

pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_default()
}

pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Turn any non-2xx response into `ApiError` carrying the raw body.
pub(crate) async fn ensure_success(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    warn!(provider, status = status.as_u16(), body = %body, "Provider returned an error");
    Err(ProviderError::ApiError {
        status_code: status.as_u16(),
        message: body,
    })
}

/// One-shot HTTP server for adapter tests. Returns the base URL and a
/// handle resolving to the raw request it received.
#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    pub(crate) async fn serve_once(
        status: u16,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = find(&raw, b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&raw[..pos]).to_lowercase();
                    let len = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= pos + 4 + len {
                        break;
                    }
                }
            }
            let head = format!(
                "HTTP/1.1 {status} Test\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (format!("http://{addr}"), handle)
    }
}
