//! In-memory agent store, useful for tests and single-node deployments.
//!
//! Definitions can be seeded from a TOML file:
//!
//! ```toml
//! [[agents]]
//! id = "base"
//! name = "Solutions"
//! instructions = "You help buyers."
//! access = ["switch_agent"]
//!
//! [[agents]]
//! id = "design"
//! name = "RFP Design"
//! parent_agent_id = "base"
//! access = ["create_and_set_rfp"]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use toolrelay_core::agent::{Agent, AgentStore};
use toolrelay_core::error::AgentStoreError;
use tracing::{debug, info};

use crate::LoadError;

#[derive(Debug, Deserialize)]
struct DefinitionsFile {
    #[serde(default)]
    agents: Vec<Agent>,
}

/// Agents held in a map keyed by id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentStore {
    agents: Arc<RwLock<HashMap<String, Agent>>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agents(agents: impl IntoIterator<Item = Agent>) -> Self {
        let map = agents.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self {
            agents: Arc::new(RwLock::new(map)),
        }
    }

    /// Parse `[[agents]]` tables. Ids must be unique.
    pub fn from_toml_str(source: &str, path: &Path) -> Result<Self, LoadError> {
        let file: DefinitionsFile = toml::from_str(source).map_err(|e| LoadError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut map = HashMap::with_capacity(file.agents.len());
        for agent in file.agents {
            if map.contains_key(&agent.id) {
                return Err(LoadError::DuplicateId(agent.id));
            }
            map.insert(agent.id.clone(), agent);
        }
        Ok(Self {
            agents: Arc::new(RwLock::new(map)),
        })
    }

    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let source = std::fs::read_to_string(path).map_err(|e| LoadError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let store = Self::from_toml_str(&source, path)?;
        info!(path = %path.display(), "Loaded agent definitions");
        Ok(store)
    }

    /// Insert or replace. Returns the previous record, if any.
    pub async fn upsert(&self, agent: Agent) -> Option<Agent> {
        debug!(agent_id = %agent.id, "Upserting agent");
        self.agents.write().await.insert(agent.id.clone(), agent)
    }

    pub async fn remove(&self, id: &str) -> Option<Agent> {
        self.agents.write().await.remove(id)
    }

    /// Case-insensitive lookup by display name.
    pub async fn find_by_name(&self, name: &str) -> Option<Agent> {
        let agents = self.agents.read().await;
        agents
            .values()
            .find(|a| a.name.eq_ignore_ascii_case(name.trim()))
            .cloned()
    }

    /// All agents, sorted by id.
    pub async fn list(&self) -> Vec<Agent> {
        let mut all: Vec<Agent> = self.agents.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.agents.read().await.is_empty()
    }
}

#[async_trait]
impl AgentStore for InMemoryAgentStore {
    async fn get_agent_by_id(&self, id: &str) -> Result<Agent, AgentStoreError> {
        self.agents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| AgentStoreError::NotFound(id.to_string()))
    }

    async fn find_agent_by_name(&self, name: &str) -> Result<Option<Agent>, AgentStoreError> {
        Ok(self.find_by_name(name).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DEFINITIONS: &str = r#"
        [[agents]]
        id = "base"
        name = "Solutions"
        instructions = "You help buyers."
        access = ["switch_agent"]

        [[agents]]
        id = "design"
        name = "RFP Design"
        role = "design"
        parent_agent_id = "base"
        access = ["create_and_set_rfp", "create_form_artifact"]
    "#;

    #[tokio::test]
    async fn parses_definitions() {
        let store = InMemoryAgentStore::from_toml_str(DEFINITIONS, Path::new("agents.toml")).unwrap();
        assert_eq!(store.len().await, 2);

        let design = store.get_agent_by_id("design").await.unwrap();
        assert_eq!(design.parent_agent_id.as_deref(), Some("base"));
        assert_eq!(design.role.as_deref(), Some("design"));
        assert!(!design.access_override);
        assert_eq!(design.access.len(), 2);
    }

    #[tokio::test]
    async fn missing_agent_is_not_found() {
        let store = InMemoryAgentStore::new();
        assert!(matches!(
            store.get_agent_by_id("ghost").await,
            Err(AgentStoreError::NotFound(id)) if id == "ghost"
        ));
    }

    #[tokio::test]
    async fn upsert_remove_and_find() {
        let store = InMemoryAgentStore::new();
        assert!(store.upsert(Agent::new("a", "Sourcing")).await.is_none());
        let previous = store
            .upsert(Agent::new("a", "Sourcing").with_role("sourcing"))
            .await;
        assert!(previous.is_some());

        assert_eq!(store.find_by_name(" sourcing ").await.unwrap().id, "a");
        assert!(store.find_by_name("nobody").await.is_none());

        assert!(store.remove("a").await.is_some());
        assert!(store.is_empty().await);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let source = r#"
            [[agents]]
            id = "x"
            name = "One"
            [[agents]]
            id = "x"
            name = "Two"
        "#;
        assert!(matches!(
            InMemoryAgentStore::from_toml_str(source, Path::new("a.toml")),
            Err(LoadError::DuplicateId(id)) if id == "x"
        ));
    }

    #[test]
    fn parse_error_names_the_file() {
        let err = InMemoryAgentStore::from_toml_str("[[agents]\n", Path::new("broken.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[tokio::test]
    async fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DEFINITIONS.as_bytes()).unwrap();

        let store = InMemoryAgentStore::load(file.path()).unwrap();
        let ids: Vec<String> = store.list().await.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["base", "design"]);
    }

    #[test]
    fn missing_file_is_read_error() {
        assert!(matches!(
            InMemoryAgentStore::load(Path::new("/nonexistent/agents.toml")),
            Err(LoadError::Read { .. })
        ));
    }
}
