//! Agent definitions and the agent store seam.
//!
//! Agents form a tree through `parent_agent_id`. A [`MergedAgent`] is an
//! agent with its ancestors folded in: instructions concatenated root to
//! leaf and tool access unioned (unless the leaf overrides it).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentStoreError;

/// An agent record as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub instructions: Option<String>,

    #[serde(default)]
    pub initial_prompt: Option<String>,

    #[serde(default)]
    pub role: Option<String>,

    /// Tool names this agent may call
    #[serde(default)]
    pub access: Vec<String>,

    #[serde(default)]
    pub parent_agent_id: Option<String>,

    /// Abstract agents only exist to be inherited from
    #[serde(default)]
    pub is_abstract: bool,

    /// When true, `access` replaces the inherited tool set
    #[serde(default)]
    pub access_override: bool,
}

impl Agent {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            instructions: None,
            initial_prompt: None,
            role: None,
            access: Vec::new(),
            parent_agent_id: None,
            is_abstract: false,
            access_override: false,
        }
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_agent_id = Some(parent_id.into());
        self
    }

    pub fn with_access<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn instructions_text(&self) -> &str {
        self.instructions.as_deref().unwrap_or("")
    }
}

/// One hop of an inheritance chain. Depth 0 is the requested leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritanceLink {
    pub agent_id: String,
    pub agent_name: String,
    pub depth: usize,
    pub instructions_length: usize,
    pub tools_count: usize,
}

impl InheritanceLink {
    pub fn for_agent(agent: &Agent, depth: usize) -> Self {
        Self {
            agent_id: agent.id.clone(),
            agent_name: agent.name.clone(),
            depth,
            instructions_length: agent.instructions_text().len(),
            tools_count: agent.access.len(),
        }
    }
}

/// An agent with its ancestors merged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedAgent {
    /// The leaf record as stored
    pub agent: Agent,

    /// Root ancestor first, requested leaf last
    pub inheritance_chain: Vec<InheritanceLink>,

    pub merged_instructions: String,

    pub merged_access: Vec<String>,

    pub cache_timestamp: DateTime<Utc>,
}

impl MergedAgent {
    pub fn id(&self) -> &str {
        &self.agent.id
    }

    pub fn name(&self) -> &str {
        &self.agent.name
    }

    pub fn role(&self) -> &str {
        self.agent.role.as_deref().unwrap_or("")
    }

    pub fn has_inheritance(&self) -> bool {
        self.inheritance_chain.len() > 1
    }
}

/// Source of agent records.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn get_agent_by_id(&self, id: &str) -> std::result::Result<Agent, AgentStoreError>;

    /// Look an agent up by display name. Stores without a name index
    /// return `Ok(None)`.
    async fn find_agent_by_name(
        &self,
        _name: &str,
    ) -> std::result::Result<Option<Agent>, AgentStoreError> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_deserializes_with_defaults() {
        let agent: Agent = serde_json::from_value(serde_json::json!({
            "id": "a1",
            "name": "Solutions",
            "instructions": "Help the user."
        }))
        .unwrap();
        assert!(agent.access.is_empty());
        assert!(agent.parent_agent_id.is_none());
        assert!(!agent.access_override);
        assert_eq!(agent.instructions_text(), "Help the user.");
    }

    #[test]
    fn inheritance_link_serializes_camel_case() {
        let agent = Agent::new("a1", "Base")
            .with_instructions("abc")
            .with_access(["x", "y"]);
        let json = serde_json::to_value(InheritanceLink::for_agent(&agent, 2)).unwrap();
        assert_eq!(json["agentId"], "a1");
        assert_eq!(json["instructionsLength"], 3);
        assert_eq!(json["toolsCount"], 2);
        assert_eq!(json["depth"], 2);
    }
}
