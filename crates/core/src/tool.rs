//! Tool calls, tool results, and the executor seam.
//!
//! Tools are opaque named operations with JSON input and output. The engine
//! never runs a tool itself; it hands each [`ToolCall`] to a
//! [`ToolExecutor`] and feeds the [`ToolResult`] back to the model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request from the model to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call id, echoed back in the matching `tool_result`
    pub id: String,

    pub name: String,

    pub input: serde_json::Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// An instruction for the client UI, passed through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientCallback {
    #[serde(rename = "type")]
    pub kind: String,

    pub target: String,

    #[serde(default)]
    pub payload: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
}

/// The result of a tool execution.
///
/// Fields the engine does not interpret (`trigger_continuation`,
/// `new_agent`, tool-specific keys) are kept in `extra` so they survive
/// the round trip back to the model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default)]
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(
        default,
        rename = "clientCallbacks",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub client_callbacks: Vec<ClientCallback>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ToolResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_callback(mut self, callback: ClientCallback) -> Self {
        self.client_callbacks.push(callback);
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// The handoff signal carried by this result, if any.
    pub fn handoff(&self) -> Option<AgentHandoff> {
        AgentHandoff::from_result(self)
    }
}

/// Where a handoff wants the conversation to continue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffTarget {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// An agent switch requested from inside a tool result.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentHandoff {
    pub new_agent: HandoffTarget,

    /// Seed for the new agent's first message
    pub context_message: Option<String>,
}

impl AgentHandoff {
    /// Recognised only when `success` and `trigger_continuation` are both
    /// true and a `new_agent` with an id is present.
    pub fn from_result(result: &ToolResult) -> Option<Self> {
        if !result.success {
            return None;
        }
        let triggered = result
            .extra
            .get("trigger_continuation")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if !triggered {
            return None;
        }

        let new_agent = result
            .extra
            .get("new_agent")
            .or_else(|| result.data.as_ref().and_then(|d| d.get("new_agent")))?;
        let new_agent: HandoffTarget = serde_json::from_value(new_agent.clone()).ok()?;
        if new_agent.id.is_empty() {
            return None;
        }

        let context_message = result
            .extra
            .get("context_message")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Some(Self {
            new_agent,
            context_message,
        })
    }
}

/// The external tool execution service.
///
/// Implementations should report tool failures as `ToolResult::failure`
/// values where they can; an `Err` is converted into one by the caller.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        call: &ToolCall,
        session_id: &str,
        agent_id: &str,
    ) -> std::result::Result<ToolResult, ToolError>;
}

/// The set of tool definitions known to the engine.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
    pinned: HashSet<String>,
}

impl ToolCatalog {
    pub fn new(definitions: Vec<ToolDefinition>) -> Self {
        Self {
            definitions,
            pinned: HashSet::new(),
        }
    }

    /// Add a definition, replacing any existing one with the same name.
    pub fn register(&mut self, definition: ToolDefinition) {
        self.definitions.retain(|d| d.name != definition.name);
        self.definitions.push(definition);
    }

    /// Make a tool available to every agent regardless of its access list.
    pub fn pin(&mut self, name: impl Into<String>) {
        self.pinned.insert(name.into());
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.iter().find(|d| d.name == name)
    }

    /// Definitions an agent with the given access list may use.
    ///
    /// An empty list or a `"*"` entry grants everything.
    pub fn for_access(&self, access: &[String]) -> Vec<ToolDefinition> {
        if access.is_empty() || access.iter().any(|a| a == "*") {
            return self.definitions.clone();
        }
        self.definitions
            .iter()
            .filter(|d| self.pinned.contains(&d.name) || access.iter().any(|a| a == &d.name))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: format!("{name} tool"),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    #[test]
    fn result_keeps_unknown_fields() {
        let raw = serde_json::json!({
            "success": true,
            "data": {"id": 7},
            "record_url": "/r/7",
            "clientCallbacks": [{"type": "ui_refresh", "target": "panel", "payload": {}}]
        });
        let result: ToolResult = serde_json::from_value(raw.clone()).unwrap();
        assert!(result.success);
        assert_eq!(result.extra["record_url"], "/r/7");
        assert_eq!(result.client_callbacks[0].kind, "ui_refresh");
        assert_eq!(serde_json::to_value(&result).unwrap(), raw);
    }

    #[test]
    fn handoff_requires_success_and_trigger() {
        let base = ToolResult::ok(serde_json::json!({}))
            .with_field("new_agent", serde_json::json!({"id": "B", "name": "Sourcing"}));
        assert!(base.handoff().is_none());

        let triggered = base
            .clone()
            .with_field("trigger_continuation", serde_json::json!(true))
            .with_field("context_message", serde_json::json!("continue here"));
        let handoff = triggered.handoff().unwrap();
        assert_eq!(handoff.new_agent.id, "B");
        assert_eq!(handoff.new_agent.name.as_deref(), Some("Sourcing"));
        assert_eq!(handoff.context_message.as_deref(), Some("continue here"));

        let mut failed = triggered;
        failed.success = false;
        assert!(failed.handoff().is_none());
    }

    #[test]
    fn handoff_ignores_missing_agent_id() {
        let result = ToolResult::ok(serde_json::json!({}))
            .with_field("trigger_continuation", serde_json::json!(true))
            .with_field("new_agent", serde_json::json!({"name": "nameless"}));
        assert!(result.handoff().is_none());
    }

    #[test]
    fn catalog_filters_by_access() {
        let mut catalog = ToolCatalog::new(vec![def("a"), def("b"), def("switch_agent")]);
        catalog.pin("switch_agent");

        let names = |defs: Vec<ToolDefinition>| defs.into_iter().map(|d| d.name).collect::<Vec<_>>();

        assert_eq!(names(catalog.for_access(&["b".into()])), vec!["b", "switch_agent"]);
        assert_eq!(names(catalog.for_access(&[])), vec!["a", "b", "switch_agent"]);
        assert_eq!(names(catalog.for_access(&["*".into()])).len(), 3);
    }

    #[test]
    fn catalog_register_replaces_by_name() {
        let mut catalog = ToolCatalog::new(vec![def("a")]);
        let mut updated = def("a");
        updated.description = "new".into();
        catalog.register(updated);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("a").unwrap().description, "new");
    }
}
