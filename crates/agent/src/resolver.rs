//! Agent inheritance resolution.
//!
//! An agent's parent chain is walked leaf to root, then folded root to leaf:
//! instructions are concatenated with a visible separator and tool access
//! is unioned, unless the leaf sets `access_override`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use toolrelay_core::agent::{Agent, AgentStore, InheritanceLink, MergedAgent};
use toolrelay_core::error::AgentStoreError;
use tracing::{debug, info, warn};

use crate::cache::AgentCache;

pub const MAX_INHERITANCE_DEPTH: usize = 10;

const SEPARATOR_WIDTH: usize = 80;

#[derive(Debug, thiserror::Error)]
pub enum AgentResolutionError {
    #[error("agent not found: {0}")]
    NotFound(String),

    #[error("permission denied for agent {0}")]
    PermissionDenied(String),

    #[error("agent store network error: {0}")]
    Network(String),

    #[error("agent store database error: {0}")]
    Database(String),

    #[error("cyclic inheritance: {}", chain.join(" -> "))]
    CyclicInheritance { chain: Vec<String> },

    #[error("inheritance chain deeper than {max} levels")]
    DepthExceeded { max: usize },

    #[error("no agent requested and no default agent configured")]
    NoDefault,
}

impl AgentResolutionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Database(_))
    }
}

impl From<AgentStoreError> for AgentResolutionError {
    fn from(err: AgentStoreError) -> Self {
        match err {
            AgentStoreError::NotFound(id) => Self::NotFound(id),
            AgentStoreError::PermissionDenied(id) => Self::PermissionDenied(id),
            AgentStoreError::Network(msg) => Self::Network(msg),
            AgentStoreError::Database(msg) => Self::Database(msg),
        }
    }
}

/// Retry and fallback policy for [`AgentResolver::resolve_or_default`].
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub max_depth: usize,
    pub retry_attempts: u32,
    pub retry_base_delay: Duration,
    pub default_agent_id: Option<String>,
    pub default_agent_name: Option<String>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_depth: MAX_INHERITANCE_DEPTH,
            retry_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
            default_agent_id: None,
            default_agent_name: None,
        }
    }
}

impl ResolverSettings {
    pub fn from_config(config: &toolrelay_config::AgentsConfig) -> Self {
        Self {
            max_depth: config.max_inheritance_depth,
            retry_attempts: config.retry_attempts,
            retry_base_delay: config.retry_base_delay(),
            default_agent_id: config.default_agent_id.clone(),
            default_agent_name: Some(config.default_agent_name.clone())
                .filter(|name| !name.trim().is_empty()),
        }
    }
}

pub struct AgentResolver {
    store: Arc<dyn AgentStore>,
    cache: Arc<AgentCache>,
    settings: ResolverSettings,
}

impl AgentResolver {
    pub fn new(store: Arc<dyn AgentStore>, cache: Arc<AgentCache>) -> Self {
        Self {
            store,
            cache,
            settings: ResolverSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ResolverSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn cache(&self) -> &Arc<AgentCache> {
        &self.cache
    }

    /// Resolve `agent_id` to its merged form, serving from the cache while
    /// the entry is fresh.
    pub async fn resolve(&self, agent_id: &str) -> Result<Arc<MergedAgent>, AgentResolutionError> {
        if let Some(hit) = self.cache.get(agent_id) {
            debug!(agent_id, "Agent cache hit");
            return Ok(hit);
        }

        let chain = self.load_chain(agent_id).await?;
        let merged = Arc::new(merge_chain(chain));
        info!(
            agent_id,
            agent = %merged.name(),
            levels = merged.inheritance_chain.len(),
            tools = merged.merged_access.len(),
            "Resolved agent"
        );
        self.cache.insert(agent_id, merged.clone());
        Ok(merged)
    }

    /// Resolve the requested agent, retrying transient store failures, then
    /// fall back to the configured default agent.
    pub async fn resolve_or_default(
        &self,
        agent_id: Option<&str>,
    ) -> Result<Arc<MergedAgent>, AgentResolutionError> {
        let Some(agent_id) = agent_id.filter(|id| !id.trim().is_empty()) else {
            return self.resolve_default().await;
        };

        match self.resolve_with_retry(agent_id).await {
            Ok(agent) => Ok(agent),
            Err(e) if e.is_retryable() => {
                warn!(agent_id, error = %e, "Agent store unavailable, using default agent");
                self.resolve_default().await.map_err(|_| e)
            }
            Err(e) => Err(e),
        }
    }

    async fn resolve_with_retry(&self, agent_id: &str) -> Result<Arc<MergedAgent>, AgentResolutionError> {
        let mut attempt = 0u32;
        loop {
            match self.resolve(agent_id).await {
                Err(e) if e.is_retryable() && attempt + 1 < self.settings.retry_attempts => {
                    let delay = self.settings.retry_base_delay * 2u32.saturating_pow(attempt);
                    warn!(agent_id, attempt, ?delay, error = %e, "Retrying agent resolution");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn resolve_default(&self) -> Result<Arc<MergedAgent>, AgentResolutionError> {
        if let Some(id) = &self.settings.default_agent_id {
            return self.resolve(id).await;
        }
        if let Some(name) = &self.settings.default_agent_name {
            let agent = self
                .store
                .find_agent_by_name(name)
                .await?
                .ok_or_else(|| AgentResolutionError::NotFound(name.clone()))?;
            return self.resolve(&agent.id).await;
        }
        Err(AgentResolutionError::NoDefault)
    }

    /// Walk from the leaf to the root. Returned root first.
    async fn load_chain(&self, agent_id: &str) -> Result<Vec<Agent>, AgentResolutionError> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut order: Vec<String> = Vec::new();
        let mut chain: Vec<Agent> = Vec::new();
        let mut next = Some(agent_id.to_string());

        while let Some(id) = next.take() {
            if !visited.insert(id.clone()) {
                order.push(id);
                return Err(AgentResolutionError::CyclicInheritance { chain: order });
            }
            if chain.len() > self.settings.max_depth {
                return Err(AgentResolutionError::DepthExceeded {
                    max: self.settings.max_depth,
                });
            }
            order.push(id.clone());

            let agent = match self.store.get_agent_by_id(&id).await {
                Ok(agent) => agent,
                Err(AgentStoreError::NotFound(_)) if !chain.is_empty() => {
                    let child = chain.last().map(|a| a.id.as_str()).unwrap_or_default();
                    warn!(child, parent = %id, "Parent agent missing, treating child as root");
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            next = agent.parent_agent_id.clone().filter(|p| !p.is_empty());
            chain.push(agent);
        }

        chain.reverse();
        Ok(chain)
    }
}

/// Fold a root-first chain into a merged agent.
fn merge_chain(chain: Vec<Agent>) -> MergedAgent {
    let leaf_index = chain.len().saturating_sub(1);
    let links = chain
        .iter()
        .enumerate()
        .map(|(i, agent)| InheritanceLink::for_agent(agent, leaf_index - i))
        .collect();

    let mut instructions = String::new();
    let mut access: Vec<String> = Vec::new();
    for (i, agent) in chain.iter().enumerate() {
        if i == 0 {
            instructions = agent.instructions_text().to_string();
        } else {
            instructions = append_specialization(&instructions, agent);
        }
        for tool in &agent.access {
            if !access.contains(tool) {
                access.push(tool.clone());
            }
        }
    }

    let mut chain = chain;
    let leaf = chain.pop().unwrap_or_else(|| Agent::new("", ""));
    if leaf.access_override {
        access = leaf.access.clone();
    }

    MergedAgent {
        agent: leaf,
        inheritance_chain: links,
        merged_instructions: instructions,
        merged_access: access,
        cache_timestamp: Utc::now(),
    }
}

fn append_specialization(parent: &str, child: &Agent) -> String {
    let rule = "=".repeat(SEPARATOR_WIDTH);
    format!(
        "{parent}\n\n{rule}\n## SPECIALIZED AGENT: {}\n{rule}\n{}",
        child.name,
        child.instructions_text()
    )
}

/// Human-readable inheritance breakdown.
pub fn describe_chain(agent: &MergedAgent) -> String {
    let mut out = format!("{} ({})\n", agent.name(), agent.id());
    for link in &agent.inheritance_chain {
        out.push_str(&format!(
            "  {}{} [{}] depth={} instructions={} tools={}\n",
            "  ".repeat(agent.inheritance_chain.len() - 1 - link.depth),
            link.agent_name,
            link.agent_id,
            link.depth,
            link.instructions_length,
            link.tools_count,
        ));
    }
    let mode = if agent.agent.access_override {
        "override"
    } else {
        "inherited"
    };
    out.push_str(&format!(
        "  access ({mode}): {}\n",
        if agent.merged_access.is_empty() {
            "(all tools)".to_string()
        } else {
            agent.merged_access.join(", ")
        }
    ));
    out
}
