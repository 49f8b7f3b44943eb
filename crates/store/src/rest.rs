//! Agent store backed by a PostgREST-style HTTP endpoint.
//!
//! `GET {base_url}/agents?id=eq.{id}&select=*` with `apikey` and bearer
//! headers. The endpoint answers with a JSON array of rows.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use toolrelay_core::agent::{Agent, AgentStore};
use toolrelay_core::error::AgentStoreError;
use tracing::{debug, warn};

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Columns may be `null` in the table, so every field is optional here.
#[derive(Debug, Deserialize)]
struct AgentRow {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    instructions: Option<String>,
    #[serde(default)]
    initial_prompt: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    access: Option<Vec<String>>,
    #[serde(default)]
    parent_agent_id: Option<String>,
    #[serde(default)]
    is_abstract: Option<bool>,
    #[serde(default)]
    access_override: Option<bool>,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Agent {
            name: row.name.unwrap_or_else(|| row.id.clone()),
            id: row.id,
            instructions: row.instructions,
            initial_prompt: row.initial_prompt,
            role: row.role,
            access: row.access.unwrap_or_default(),
            parent_agent_id: row.parent_agent_id.filter(|p| !p.is_empty()),
            is_abstract: row.is_abstract.unwrap_or(false),
            access_override: row.access_override.unwrap_or(false),
        }
    }
}

pub struct RestAgentStore {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RestAgentStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        }
    }

    fn classify_status(id: &str, status: u16, body: &str) -> AgentStoreError {
        match status {
            404 => AgentStoreError::NotFound(id.to_string()),
            401 | 403 => AgentStoreError::PermissionDenied(id.to_string()),
            500..=599 => AgentStoreError::Database(format!("status {status}: {body}")),
            _ => AgentStoreError::Network(format!("unexpected status {status}: {body}")),
        }
    }

    /// Fetch the rows matching one column filter, e.g. `("id", "eq.abc")`.
    async fn query(&self, key: &str, column: &str, filter: &str) -> Result<Vec<AgentRow>, AgentStoreError> {
        let url = format!("{}/agents", self.base_url);

        let mut request = self
            .client
            .get(&url)
            .query(&[(column, filter), ("select", "*")]);
        if let Some(api_key) = &self.api_key {
            request = request
                .header("apikey", api_key)
                .header("Authorization", format!("Bearer {api_key}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentStoreError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(agent = %key, status, "Agent store returned an error");
            return Err(Self::classify_status(key, status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| AgentStoreError::Database(format!("malformed agent row: {e}")))
    }
}

#[async_trait]
impl AgentStore for RestAgentStore {
    async fn get_agent_by_id(&self, id: &str) -> Result<Agent, AgentStoreError> {
        debug!(agent_id = %id, "Fetching agent definition");
        self.query(id, "id", &format!("eq.{id}"))
            .await?
            .into_iter()
            .next()
            .map(Agent::from)
            .ok_or_else(|| AgentStoreError::NotFound(id.to_string()))
    }

    async fn find_agent_by_name(&self, name: &str) -> Result<Option<Agent>, AgentStoreError> {
        debug!(agent_name = %name, "Looking up agent by name");
        match self.query(name, "name", &format!("ilike.{}", name.trim())).await {
            Ok(rows) => Ok(rows.into_iter().next().map(Agent::from)),
            Err(AgentStoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// Answers one request and hands back the raw request head.
    async fn serve_once(status: u16, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 2048];
            while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (format!("http://{addr}"), handle)
    }

    #[tokio::test]
    async fn fetches_and_maps_row() {
        let (url, server) = serve_once(
            200,
            r#"[{"id":"design","name":"RFP Design","instructions":null,"role":"design",
                "access":["create_and_set_rfp"],"parent_agent_id":"base",
                "is_abstract":null,"access_override":true,"created_at":"2025-01-01"}]"#,
        )
        .await;

        let store = RestAgentStore::new(url, Some("anon-key".into()));
        let agent = store.get_agent_by_id("design").await.unwrap();
        assert_eq!(agent.name, "RFP Design");
        assert!(agent.instructions.is_none());
        assert!(!agent.is_abstract);
        assert!(agent.access_override);
        assert_eq!(agent.parent_agent_id.as_deref(), Some("base"));

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /agents?id=eq.design&select=*"));
        let lower = raw.to_lowercase();
        assert!(lower.contains("apikey: anon-key"));
        assert!(lower.contains("authorization: bearer anon-key"));
    }

    #[tokio::test]
    async fn find_by_name_uses_ilike() {
        let (url, server) = serve_once(200, r#"[{"id":"sourcing","name":"Sourcing"}]"#).await;
        let store = RestAgentStore::new(url, None);
        let agent = store.find_agent_by_name("sourcing").await.unwrap().unwrap();
        assert_eq!(agent.id, "sourcing");
        assert!(agent.access.is_empty());
        assert!(server.await.unwrap().starts_with("GET /agents?name=ilike.sourcing&select=*"));
    }

    #[tokio::test]
    async fn empty_result_is_not_found() {
        let (url, _server) = serve_once(200, "[]").await;
        let store = RestAgentStore::new(url, None);
        assert!(matches!(
            store.get_agent_by_id("ghost").await,
            Err(AgentStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn forbidden_is_permission_denied() {
        let (url, _server) = serve_once(403, r#"{"message":"rls"}"#).await;
        let store = RestAgentStore::new(url, None);
        let err = store.get_agent_by_id("a").await.unwrap_err();
        assert!(matches!(err, AgentStoreError::PermissionDenied(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn server_error_is_retryable_database_error() {
        let (url, _server) = serve_once(503, "down").await;
        let store = RestAgentStore::new(url, None);
        let err = store.get_agent_by_id("a").await.unwrap_err();
        assert!(matches!(err, AgentStoreError::Database(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = RestAgentStore::new(format!("http://{addr}"), None);
        assert!(matches!(
            store.get_agent_by_id("a").await,
            Err(AgentStoreError::Network(_))
        ));
    }
}
