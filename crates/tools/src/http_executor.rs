//! Tool executor that forwards calls to an external HTTP service.
//!
//! Request body: `{"tool_call": {id, name, input}, "session_id", "agent_id"}`.
//! The service answers with a `ToolResult` JSON object. A 2xx response whose
//! body says `success: false` is a normal failed result, not an error.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use toolrelay_core::error::ToolError;
use toolrelay_core::tool::{ToolCall, ToolExecutor, ToolResult};
use tracing::{debug, warn};

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    tool_call: &'a ToolCall,
    session_id: &'a str,
    agent_id: &'a str,
}

pub struct HttpToolExecutor {
    url: String,
    api_key: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpToolExecutor {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            url: url.into(),
            api_key: None,
            timeout_secs,
            client,
        }
    }

    /// Send `Authorization: Bearer <key>` with every call.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl ToolExecutor for HttpToolExecutor {
    async fn execute(
        &self,
        call: &ToolCall,
        session_id: &str,
        agent_id: &str,
    ) -> Result<ToolResult, ToolError> {
        debug!(tool = %call.name, call_id = %call.id, agent_id, "Forwarding tool call");

        let mut request = self.client.post(&self.url).json(&ExecuteRequest {
            tool_call: call,
            session_id,
            agent_id,
        });
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout {
                    tool_name: call.name.clone(),
                    timeout_secs: self.timeout_secs,
                }
            } else {
                ToolError::ExecutionFailed {
                    tool_name: call.name.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if status.as_u16() == 404 {
            return Err(ToolError::NotFound(call.name.clone()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(tool = %call.name, status = status.as_u16(), "Tool service returned an error");
            return Err(ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: format!("status {}: {body}", status.as_u16()),
            });
        }

        response
            .json::<ToolResult>()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: call.name.clone(),
                reason: format!("malformed tool result: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn serve_once(status: u16, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
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
                let text = String::from_utf8_lossy(&raw).to_string();
                if let Some(pos) = text.find("\r\n\r\n") {
                    let len = text[..pos]
                        .to_lowercase()
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:").map(|v| v.trim().to_string()))
                        .and_then(|v| v.parse::<usize>().ok())
                        .unwrap_or(0);
                    if raw.len() >= pos + 4 + len {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (format!("http://{addr}/execute"), handle)
    }

    fn call() -> ToolCall {
        ToolCall::new("toolu_1", "create_and_set_rfp", serde_json::json!({"name": "Chairs"}))
    }

    #[tokio::test]
    async fn posts_call_and_parses_result() {
        let (url, server) = serve_once(
            200,
            r#"{"success":true,"data":{"id":42},"clientCallbacks":[{"type":"ui_refresh","target":"rfp_context","payload":{}}],"current_rfp_id":42}"#,
        )
        .await;

        let executor = HttpToolExecutor::new(url, 5).with_api_key("svc-key");
        let result = executor.execute(&call(), "sess-1", "agent-a").await.unwrap();
        assert!(result.success);
        assert_eq!(result.data.unwrap()["id"], 42);
        assert_eq!(result.client_callbacks.len(), 1);
        assert_eq!(result.extra["current_rfp_id"], 42);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /execute"));
        assert!(raw.to_lowercase().contains("authorization: bearer svc-key"));
        assert!(raw.contains(r#""session_id":"sess-1""#));
        assert!(raw.contains(r#""agent_id":"agent-a""#));
        assert!(raw.contains(r#""name":"create_and_set_rfp""#));
    }

    #[tokio::test]
    async fn failed_result_is_a_value() {
        let (url, _server) = serve_once(200, r#"{"success":false,"error":"RFP name taken"}"#).await;
        let result = HttpToolExecutor::new(url, 5)
            .execute(&call(), "s", "a")
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("RFP name taken"));
    }

    #[tokio::test]
    async fn server_error_is_execution_failed() {
        let (url, _server) = serve_once(500, "boom").await;
        let err = HttpToolExecutor::new(url, 5)
            .execute(&call(), "s", "a")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { ref reason, .. } if reason.contains("boom")));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let (url, _server) = serve_once(404, "{}").await;
        let err = HttpToolExecutor::new(url, 5)
            .execute(&call(), "s", "a")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "create_and_set_rfp"));
    }
}
