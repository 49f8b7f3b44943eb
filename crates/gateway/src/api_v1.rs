//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST   /v1/chat`                    Run a turn; JSON, or SSE when `stream: true`
//! - `POST   /v1/chat/stream`             Run a turn as an SSE stream
//! - `POST   /v1/agents/{id}/invalidate`  Drop one merged agent from the cache
//! - `DELETE /v1/agents/cache`            Clear the agent cache
//! - `GET    /v1/agents/cache`            Agent cache statistics

use axum::{
    Router,
    extract::rejection::JsonRejection,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, Sse},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use toolrelay_agent::{
    AgentResolutionError, CacheStats, ChannelSink, CollectingSink, ContextRef, EventSink,
    FunctionResult, LoginEvidence, OrchestratorError, PromptContext, StreamEvent, TurnRequest,
    UserProfile,
};
use toolrelay_core::error::ProviderError;
use toolrelay_core::message::{Message, validate_exchange};
use toolrelay_core::provider::Usage;
use toolrelay_core::tool::ClientCallback;

use crate::SharedState;

/// Events buffered between the orchestrator task and the SSE body.
const SSE_BUFFER: usize = 64;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/chat/stream", post(chat_stream_handler))
        .route("/agents/{id}/invalidate", post(invalidate_agent_handler))
        .route("/agents/cache", delete(clear_cache_handler))
        .route("/agents/cache", get(cache_stats_handler))
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub user_message: Option<String>,

    /// Full history; takes precedence over `userMessage`
    #[serde(default)]
    pub messages: Option<Vec<Message>>,

    /// Earlier turns to prepend to `userMessage`
    #[serde(default)]
    pub conversation_history: Vec<Message>,

    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub agent_id: Option<String>,

    #[serde(default)]
    pub stream: bool,

    #[serde(default)]
    pub user_profile: Option<UserProfile>,

    #[serde(default)]
    pub login_evidence: Option<LoginEvidence>,

    #[serde(default)]
    pub context: Vec<ContextRef>,
}

impl ChatRequest {
    /// Check the body's shape. Needs `messages` or `userMessage`, and every
    /// `tool_result` must answer an earlier `tool_use`.
    fn into_pending(self) -> Result<PendingTurn, ApiError> {
        let parts = PromptParts {
            session_id: self.session_id,
            user_profile: self.user_profile,
            login_evidence: self.login_evidence,
            context: self.context,
        };
        let messages = match self.messages.filter(|m| !m.is_empty()) {
            Some(messages) => messages,
            None => match self.user_message.filter(|m| !m.trim().is_empty()) {
                Some(text) => {
                    let mut messages = self.conversation_history;
                    messages.push(Message::user(text));
                    messages
                }
                None => {
                    return Err(ApiError::bad_request(
                        "Either messages array or userMessage is required",
                    ));
                }
            },
        };

        validate_exchange(&messages).map_err(|id| {
            ApiError::bad_request(format!("tool_result references unknown tool_use id {id}"))
        })?;

        Ok(PendingTurn {
            agent_id: self.agent_id,
            messages,
            parts,
        })
    }
}

/// A well-formed request whose agent is not resolved yet.
struct PendingTurn {
    agent_id: Option<String>,
    messages: Vec<Message>,
    parts: PromptParts,
}

struct PromptParts {
    session_id: Option<String>,
    user_profile: Option<UserProfile>,
    login_evidence: Option<LoginEvidence>,
    context: Vec<ContextRef>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub success: bool,
    pub response: String,
    pub tools_used: Vec<String>,
    pub tool_results: Vec<FunctionResult>,
    pub usage: Usage,
    pub session_id: String,
    pub agent_id: String,
    pub agent_switch_occurred: bool,
    pub client_callbacks: Vec<ClientCallback>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InvalidateResponse {
    success: bool,
    agent_id: String,
    invalidated: bool,
}

#[derive(Serialize)]
struct ClearResponse {
    success: bool,
    cleared: usize,
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn timeout(state: &SharedState) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            format!(
                "Request timed out after {}s",
                state.request_timeout.as_secs_f32()
            ),
        )
    }
}

impl From<AgentResolutionError> for ApiError {
    fn from(err: AgentResolutionError) -> Self {
        let status = match &err {
            AgentResolutionError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentResolutionError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            AgentResolutionError::NoDefault => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Agent(e) => e.into(),
            OrchestratorError::Provider(ref e) => {
                let status = match e {
                    ProviderError::ApiError { .. }
                    | ProviderError::StreamInterrupted(_)
                    | ProviderError::Decode(_)
                    | ProviderError::Timeout(_)
                    | ProviderError::Network(_) => StatusCode::BAD_GATEWAY,
                    ProviderError::NotConfigured(_) | ProviderError::Signing(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                Self::new(status, err.to_string())
            }
            OrchestratorError::ClientDisconnected => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                success: false,
                error: self.message,
                timestamp: chrono::Utc::now().to_rfc3339(),
            }),
        )
            .into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

fn parse_request(
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<ChatRequest, ApiError> {
    let Json(value) = payload?;
    serde_json::from_value(value).map_err(|e| ApiError::bad_request(format!("Invalid request: {e}")))
}

/// Resolve the agent and assemble the orchestrator input.
async fn resolve_turn(
    state: &SharedState,
    pending: PendingTurn,
) -> Result<TurnRequest, AgentResolutionError> {
    let agent = state
        .resolver
        .resolve_or_default(pending.agent_id.as_deref())
        .await?;
    let parts = pending.parts;

    let session_id = parts
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    debug!(
        session_id = %session_id,
        agent = %agent.name(),
        messages = pending.messages.len(),
        "Prepared turn"
    );

    Ok(TurnRequest {
        prompt: PromptContext {
            session_id: Some(session_id.clone()),
            user_profile: parts.user_profile,
            login_evidence: parts.login_evidence,
            context: parts.context,
        },
        session_id,
        agent,
        messages: pending.messages,
    })
}

/// `POST /v1/chat`
async fn chat_handler(
    State(state): State<SharedState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = parse_request(payload)?;
    info!(stream = request.stream, agent_id = ?request.agent_id, "v1/chat request");

    let stream = request.stream;
    let pending = request.into_pending()?;
    if stream {
        return Ok(stream_turn(state, pending).into_response());
    }

    let turn = resolve_turn(&state, pending).await?;
    let session_id = turn.session_id.clone();
    let mut sink = CollectingSink::without_deltas();
    let outcome = tokio::time::timeout(state.request_timeout, state.orchestrator.run(turn, &mut sink))
        .await
        .map_err(|_| ApiError::timeout(&state))??;

    Ok(Json(ChatResponse {
        success: true,
        response: outcome.text,
        tools_used: outcome.tools_used,
        tool_results: outcome.tool_results,
        usage: outcome.usage,
        session_id,
        agent_id: outcome.agent_id,
        agent_switch_occurred: outcome.agent_switch_occurred,
        client_callbacks: outcome.client_callbacks,
    })
    .into_response())
}

/// `POST /v1/chat/stream`
async fn chat_stream_handler(
    State(state): State<SharedState>,
    payload: Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = parse_request(payload)?;
    info!(agent_id = ?request.agent_id, "v1/chat/stream SSE request");
    let pending = request.into_pending()?;
    Ok(stream_turn(state, pending).into_response())
}

/// Resolve and run the turn in its own task and stream its events. Body
/// faults are rejected before this point; anything later, agent resolution
/// included, is reported as an `error` frame. Dropping the response body
/// closes the channel, which stops the orchestrator.
fn stream_turn(
    state: SharedState,
    pending: PendingTurn,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let (mut sink, rx) = ChannelSink::channel(SSE_BUFFER);
    let limit = state.request_timeout;

    tokio::spawn(async move {
        let run = async {
            match resolve_turn(&state, pending).await {
                Ok(turn) => state.orchestrator.run(turn, &mut sink).await,
                Err(e) => Err(OrchestratorError::from(e)),
            }
        };
        let error = match tokio::time::timeout(limit, run).await {
            Ok(Ok(_)) => None,
            Ok(Err(OrchestratorError::ClientDisconnected)) => {
                debug!("Client disconnected, turn abandoned");
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("Request timed out after {}s", limit.as_secs_f32())),
        };
        if let Some(error) = error {
            warn!(error = %error, "Streaming turn failed");
            let _ = sink.send(StreamEvent::error(error)).await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().data(data))
    });
    Sse::new(stream)
}

/// `POST /v1/agents/{id}/invalidate`
async fn invalidate_agent_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Json<InvalidateResponse> {
    let invalidated = state.cache.invalidate(&id);
    info!(agent_id = %id, invalidated, "Agent cache invalidation requested");
    Json(InvalidateResponse {
        success: true,
        agent_id: id,
        invalidated,
    })
}

/// `DELETE /v1/agents/cache`
async fn clear_cache_handler(State(state): State<SharedState>) -> Json<ClearResponse> {
    let cleared = state.cache.clear();
    info!(cleared, "Agent cache cleared");
    Json(ClearResponse {
        success: true,
        cleared,
    })
}

/// `GET /v1/agents/cache`
async fn cache_stats_handler(State(state): State<SharedState>) -> Json<CacheStats> {
    Json(state.cache.stats())
}

// ── Tests ─────────────────────────────────────────────────────────────────
