//! Agent resolution and the tool-call orchestrator.
//!
//! A turn goes through three stages:
//!
//! 1. **Resolve** the requested agent and its ancestors into a
//!    [`MergedAgent`](toolrelay_core::MergedAgent), served from an
//!    [`AgentCache`] while fresh
//! 2. **Orchestrate**: stream completions, run tool calls in order, feed
//!    results back, follow `switch_agent` handoffs
//! 3. **Emit** every step as a [`StreamEvent`] into an [`EventSink`]
//!
//! The loop ends when the model answers without tool calls or the depth
//! limit is reached.

pub mod cache;
pub mod emitter;
pub mod orchestrator;
pub mod resolver;
pub mod stream_event;
pub mod system_prompt;

pub use cache::{AgentCache, CacheEntryStats, CacheStats};
pub use emitter::{ChannelSink, CollectingSink, EventSink, SinkClosed};
pub use orchestrator::{
    Orchestrator, OrchestratorError, OrchestratorSettings, TurnOutcome, TurnRequest,
};
pub use resolver::{describe_chain, AgentResolutionError, AgentResolver, ResolverSettings};
pub use stream_event::{
    CompleteMetadata, FunctionResult, StreamEvent, ToolEvent, ToolEventKind, ToolResultSummary,
};
pub use system_prompt::{build_system_prompt, ContextRef, LoginEvidence, PromptContext, UserProfile};
