//! Tool execution for toolrelay.
//!
//! The engine treats tools as opaque named operations with JSON input and
//! output. This crate provides:
//! - [`HttpToolExecutor`]: forwards calls to an external execution service
//! - [`LocalToolExecutor`]: handles the built-in `switch_agent` tool itself
//!   and delegates the rest
//! - [`catalog::load_catalog`]: reads tool definitions from disk
//! - [`switch_agent`]: the handoff tool's definition and result shape

pub mod catalog;
pub mod http_executor;
pub mod local;
pub mod switch_agent;

pub use catalog::{CatalogError, default_catalog, load_catalog};
pub use http_executor::HttpToolExecutor;
pub use local::{LocalToolExecutor, UnavailableExecutor};
pub use switch_agent::SwitchAgentTool;
