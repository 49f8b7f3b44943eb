//! The tool-call orchestrator.
//!
//! One turn is a sequence of provider rounds. Each round streams a
//! completion, forwards text as `content_delta` events and buffers tool
//! calls. Buffered calls run one at a time, in order. Their results are
//! fed back as the next round's input, unless one of them is a successful
//! `switch_agent` result, in which case the turn continues under the new
//! agent with a fresh conversation.
//!
//! The loop is bounded by `max_depth` rounds. Hitting the bound is not an
//! error: whatever was produced so far is reported.

use std::sync::Arc;

use toolrelay_core::agent::MergedAgent;
use toolrelay_core::error::ProviderError;
use toolrelay_core::message::{ContentBlock, Message, MessageContent, Role};
use toolrelay_core::provider::{CompletionRequest, Provider, StreamChunk, ToolDefinition, Usage};
use toolrelay_core::tool::{AgentHandoff, ClientCallback, ToolCall, ToolCatalog, ToolExecutor, ToolResult};
use tracing::{debug, info, warn};

use crate::emitter::EventSink;
use crate::resolver::{AgentResolutionError, AgentResolver};
use crate::stream_event::{
    timestamp, CompleteMetadata, FunctionResult, StreamEvent, ToolResultSummary,
};
use crate::system_prompt::{build_system_prompt, handoff_seed_message, PromptContext};

pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Agent(#[from] AgentResolutionError),

    #[error("client disconnected")]
    ClientDisconnected,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_depth: usize,
    pub switch_tool: String,
    pub max_tokens: Option<u32>,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            switch_tool: "switch_agent".into(),
            max_tokens: None,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &toolrelay_config::OrchestratorConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            switch_tool: config.switch_tool.clone(),
            max_tokens: Some(config.max_tokens),
        }
    }
}

/// Input for one conversational turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub session_id: String,
    pub agent: Arc<MergedAgent>,
    pub messages: Vec<Message>,
    pub prompt: PromptContext,
}

/// What a turn produced. `text`, `agent_id`, `tools_used` and
/// `tool_results` belong to the agent that finished the turn; earlier
/// agents' tool calls were reported through their `tool_invocation` events.
/// Client callbacks and usage cover the whole turn.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub text: String,
    pub agent_id: String,
    pub tools_used: Vec<String>,
    pub tool_results: Vec<FunctionResult>,
    pub usage: Usage,
    pub agent_switch_occurred: bool,
    pub client_callbacks: Vec<ClientCallback>,
    pub rounds: usize,
    pub depth_limited: bool,
}

/// State threaded through the rounds of one turn.
struct RecursionContext {
    depth: usize,
    agent: Arc<MergedAgent>,
    system_prompt: String,
    tools: Vec<ToolDefinition>,
    messages: Vec<Message>,
    text: String,
    tools_used: Vec<String>,
    executed: Vec<FunctionResult>,
    callbacks: Vec<ClientCallback>,
    usage: Usage,
    switched: bool,
}

impl RecursionContext {
    fn record_tool(&mut self, name: &str) {
        if !self.tools_used.iter().any(|t| t == name) {
            self.tools_used.push(name.to_string());
        }
    }
}

pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    executor: Arc<dyn ToolExecutor>,
    resolver: Arc<AgentResolver>,
    catalog: Arc<ToolCatalog>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        executor: Arc<dyn ToolExecutor>,
        resolver: Arc<AgentResolver>,
        catalog: Arc<ToolCatalog>,
    ) -> Self {
        Self {
            provider,
            executor,
            resolver,
            catalog,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn resolver(&self) -> &Arc<AgentResolver> {
        &self.resolver
    }

    /// Run one turn, writing events to `sink`. Ends with a `complete` event
    /// on success; the caller reports errors.
    pub async fn run(
        &self,
        request: TurnRequest,
        sink: &mut dyn EventSink,
    ) -> Result<TurnOutcome, OrchestratorError> {
        let TurnRequest {
            session_id,
            agent,
            messages,
            prompt,
        } = request;

        let last_user_text = last_user_text(&messages);
        let mut ctx = RecursionContext {
            depth: 0,
            system_prompt: build_system_prompt(&agent, &prompt, last_user_text.as_deref()),
            tools: self.catalog.for_access(&agent.merged_access),
            agent,
            messages,
            text: String::new(),
            tools_used: Vec::new(),
            executed: Vec::new(),
            callbacks: Vec::new(),
            usage: Usage::default(),
            switched: false,
        };
        let mut depth_limited = false;

        info!(
            session_id = %session_id,
            agent = %ctx.agent.name(),
            tools = ctx.tools.len(),
            provider = self.provider.name(),
            "Starting turn"
        );

        loop {
            if ctx.depth >= self.settings.max_depth {
                warn!(
                    depth = ctx.depth,
                    max_depth = self.settings.max_depth,
                    "Maximum tool-call depth reached, returning partial results"
                );
                depth_limited = true;
                break;
            }

            let (round_text, pending) = self.stream_round(&mut ctx, sink).await?;
            if pending.is_empty() {
                break;
            }

            debug!(depth = ctx.depth, calls = pending.len(), "Executing tool calls");
            let mut result_blocks = Vec::with_capacity(pending.len());
            let mut handoff: Option<AgentHandoff> = None;
            for call in &pending {
                let result = self.execute_tool(&mut ctx, call, &session_id, sink).await?;
                if handoff.is_none() && call.name == self.settings.switch_tool {
                    handoff = result.handoff();
                }
                result_blocks.push(ContentBlock::tool_result(&call.id, &result));
            }

            if let Some(handoff) = handoff {
                if ctx.depth + 1 < self.settings.max_depth {
                    let fallback = last_user_text.clone().unwrap_or_default();
                    if self
                        .switch_agent(&mut ctx, handoff, &fallback, &prompt, sink)
                        .await?
                    {
                        continue;
                    }
                } else {
                    warn!(depth = ctx.depth, "No depth left for agent handoff, continuing with current agent");
                }
            }

            ctx.messages.push(assistant_round(&round_text, &pending));
            ctx.messages.push(Message::tool_results(result_blocks));
            ctx.depth += 1;
        }

        let outcome = TurnOutcome {
            text: ctx.text,
            agent_id: ctx.agent.id().to_string(),
            tools_used: ctx.tools_used,
            tool_results: ctx.executed,
            usage: ctx.usage,
            agent_switch_occurred: ctx.switched,
            client_callbacks: ctx.callbacks,
            rounds: ctx.depth,
            depth_limited,
        };

        emit(sink, complete_event(&outcome)).await?;
        info!(
            agent_id = %outcome.agent_id,
            tools = outcome.tools_used.len(),
            tokens = outcome.usage.total(),
            switched = outcome.agent_switch_occurred,
            "Turn complete"
        );
        Ok(outcome)
    }

    /// Stream one completion. Returns the text of this round and the
    /// buffered tool calls.
    async fn stream_round(
        &self,
        ctx: &mut RecursionContext,
        sink: &mut dyn EventSink,
    ) -> Result<(String, Vec<ToolCall>), OrchestratorError> {
        let mut request = CompletionRequest::new(ctx.messages.clone())
            .with_tools(ctx.tools.clone())
            .with_system_prompt(ctx.system_prompt.clone());
        request.max_tokens = self.settings.max_tokens;

        debug!(depth = ctx.depth, messages = ctx.messages.len(), "Requesting completion");
        let mut rx = self.provider.stream(request).await?;

        let mut round_text = String::new();
        let mut pending = Vec::new();
        while let Some(item) = rx.recv().await {
            match item? {
                StreamChunk::Text { content } => {
                    round_text.push_str(&content);
                    ctx.text.push_str(&content);
                    emit(
                        sink,
                        StreamEvent::ContentDelta {
                            delta: content,
                            full_content: ctx.text.clone(),
                        },
                    )
                    .await?;
                }
                StreamChunk::ToolUse { id, name, input } => {
                    pending.push(ToolCall { id, name, input });
                }
                StreamChunk::Usage { usage, .. } => ctx.usage.add(usage),
            }
        }
        Ok((round_text, pending))
    }

    async fn execute_tool(
        &self,
        ctx: &mut RecursionContext,
        call: &ToolCall,
        session_id: &str,
        sink: &mut dyn EventSink,
    ) -> Result<ToolResult, OrchestratorError> {
        let agent_id = ctx.agent.id().to_string();
        emit(sink, StreamEvent::tool_start(&call.name, call.input.clone(), &agent_id)).await?;

        let result = match self.executor.execute(call, session_id, &agent_id).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                ToolResult::failure(e.to_string())
            }
        };

        ctx.record_tool(&call.name);
        ctx.callbacks.extend(result.client_callbacks.iter().cloned());
        ctx.executed.push(FunctionResult {
            function: call.name.clone(),
            result: result.clone(),
        });

        emit(sink, StreamEvent::tool_complete(&call.name, result.clone(), &agent_id)).await?;
        Ok(result)
    }

    /// Move the turn to the handoff target. Returns false when the target
    /// cannot be resolved, leaving the current agent in charge.
    async fn switch_agent(
        &self,
        ctx: &mut RecursionContext,
        handoff: AgentHandoff,
        fallback_text: &str,
        prompt: &PromptContext,
        sink: &mut dyn EventSink,
    ) -> Result<bool, OrchestratorError> {
        let next = match self.resolver.resolve(&handoff.new_agent.id).await {
            Ok(agent) => agent,
            Err(e) => {
                warn!(agent = %handoff.new_agent.id, error = %e, "Handoff target could not be resolved");
                return Ok(false);
            }
        };

        emit(
            sink,
            StreamEvent::MessageComplete {
                agent_id: ctx.agent.id().to_string(),
                content: Some(ctx.text.clone()),
                timestamp: timestamp(),
            },
        )
        .await?;

        info!(from = %ctx.agent.id(), to = %next.id(), depth = ctx.depth, "Agent handoff");
        emit(
            sink,
            StreamEvent::AgentActivation {
                agent_name: next.name().to_string(),
                agent_role: next.role().to_string(),
                message: format!("Switched to {}", next.name()),
            },
        )
        .await?;
        emit(
            sink,
            StreamEvent::MessageStart {
                agent_id: next.id().to_string(),
                content: None,
                timestamp: timestamp(),
            },
        )
        .await?;

        let request = handoff
            .context_message
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(fallback_text);
        let seed = handoff_seed_message(request);

        ctx.system_prompt = build_system_prompt(&next, prompt, Some(&seed));
        ctx.tools = self.catalog.for_access(&next.merged_access);
        ctx.messages = vec![Message::user(seed)];
        ctx.text.clear();
        ctx.tools_used.clear();
        ctx.executed.clear();
        ctx.agent = next;
        ctx.switched = true;
        ctx.depth += 1;
        Ok(true)
    }
}

async fn emit(sink: &mut dyn EventSink, event: StreamEvent) -> Result<(), OrchestratorError> {
    sink.send(event)
        .await
        .map_err(|_| OrchestratorError::ClientDisconnected)
}

/// Latest plain user text, skipping tool-result messages.
fn last_user_text(messages: &[Message]) -> Option<String> {
    messages
        .iter()
        .rev()
        .filter(|m| m.role == Role::User)
        .map(Message::text)
        .find(|text| !text.trim().is_empty())
}

fn assistant_round(text: &str, calls: &[ToolCall]) -> Message {
    if text.is_empty() {
        return Message::tool_uses(calls);
    }
    let mut blocks = vec![ContentBlock::text(text)];
    blocks.extend(Message::tool_uses(calls).blocks());
    Message::new(Role::Assistant, MessageContent::Blocks(blocks))
}

fn complete_event(outcome: &TurnOutcome) -> StreamEvent {
    StreamEvent::Complete {
        full_content: outcome.text.clone(),
        token_count: outcome.usage.total(),
        tool_results: outcome
            .tool_results
            .iter()
            .map(|r| ToolResultSummary {
                name: r.function.clone(),
                success: r.result.success,
            })
            .collect(),
        metadata: CompleteMetadata {
            agent_switch_occurred: outcome.agent_switch_occurred,
            functions_called: outcome.tools_used.clone(),
            function_results: outcome.tool_results.clone(),
            client_callbacks: outcome.client_callbacks.clone(),
        },
    }
}
