//! # toolrelay core
//!
//! Domain types, traits, and error definitions for the toolrelay
//! orchestration engine. This crate has no HTTP or framework dependencies;
//! it defines the model every other crate implements against.
//!
//! ## Seams
//!
//! Each external collaborator is a trait here:
//! - [`Provider`] for model backends
//! - [`ToolExecutor`] for the tool execution service
//! - [`AgentStore`] for agent definitions
//!
//! Implementations live in their own crates.

pub mod agent;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

pub use agent::{Agent, AgentStore, InheritanceLink, MergedAgent};
pub use error::{AgentStoreError, Error, ProviderError, Result, SigningError, ToolError};
pub use message::{ContentBlock, Message, MessageContent, Role};
pub use provider::{
    Completion, CompletionRequest, Provider, StreamChunk, StreamCollector, ToolDefinition, Usage,
};
pub use tool::{AgentHandoff, ClientCallback, ToolCall, ToolCatalog, ToolExecutor, ToolResult};
