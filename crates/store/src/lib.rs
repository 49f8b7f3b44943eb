//! Agent definition stores for toolrelay.
//!
//! Both implement `toolrelay_core::AgentStore`:
//! - [`InMemoryAgentStore`]: a map, optionally seeded from a TOML file
//! - [`RestAgentStore`]: a PostgREST-style `agents` table over HTTP

pub mod in_memory;
pub mod rest;

pub use in_memory::InMemoryAgentStore;
pub use rest::RestAgentStore;

use std::path::PathBuf;

/// Failure loading agent definitions from disk.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read agent definitions {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse agent definitions {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Duplicate agent id '{0}'")]
    DuplicateId(String),
}
