//! Executor that resolves `switch_agent` in-process.

use std::sync::Arc;

use async_trait::async_trait;
use toolrelay_core::agent::{Agent, AgentStore};
use toolrelay_core::error::{AgentStoreError, ToolError};
use toolrelay_core::tool::{ToolCall, ToolExecutor, ToolResult};
use tracing::{debug, info, warn};

use crate::switch_agent::{SwitchAgentInput, SwitchAgentTool};

/// Handles `switch_agent` through the agent store and hands every other
/// call to `inner`.
pub struct LocalToolExecutor {
    store: Arc<dyn AgentStore>,
    inner: Arc<dyn ToolExecutor>,
    switch: SwitchAgentTool,
}

impl LocalToolExecutor {
    pub fn new(store: Arc<dyn AgentStore>, inner: Arc<dyn ToolExecutor>) -> Self {
        Self {
            store,
            inner,
            switch: SwitchAgentTool,
        }
    }

    async fn find_target(&self, input: &SwitchAgentInput) -> Result<Option<Agent>, AgentStoreError> {
        if let Some(id) = input.agent_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            match self.store.get_agent_by_id(id).await {
                Ok(agent) => return Ok(Some(agent)),
                // Models sometimes put the display name in agent_id.
                Err(AgentStoreError::NotFound(_)) => {
                    if let Some(agent) = self.store.find_agent_by_name(id).await? {
                        return Ok(Some(agent));
                    }
                }
                Err(e) => return Err(e),
            }
        }
        match input.agent_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(name) => self.store.find_agent_by_name(name).await,
            None => Ok(None),
        }
    }

    async fn switch_agent(&self, call: &ToolCall, agent_id: &str) -> ToolResult {
        let input = match self.switch.parse_input(&call.input) {
            Ok(input) => input,
            Err(e) => return ToolResult::failure(e.to_string()),
        };

        let target = match self.find_target(&input).await {
            Ok(Some(agent)) => agent,
            Ok(None) => {
                let wanted = input.agent_id.or(input.agent_name).unwrap_or_default();
                warn!(agent = %wanted, "Handoff target not found");
                return ToolResult::failure(format!("Agent not found: {wanted}"));
            }
            Err(e) => return ToolResult::failure(e.to_string()),
        };

        if target.is_abstract {
            return ToolResult::failure(format!(
                "Agent {} is abstract and cannot take over a conversation",
                target.name
            ));
        }
        if target.id == agent_id {
            return ToolResult::failure(format!("Already talking to {}", target.name));
        }

        info!(from = %agent_id, to = %target.id, reason = ?input.reason, "Agent switch requested");
        self.switch.success(&target, &input)
    }
}

#[async_trait]
impl ToolExecutor for LocalToolExecutor {
    async fn execute(
        &self,
        call: &ToolCall,
        session_id: &str,
        agent_id: &str,
    ) -> Result<ToolResult, ToolError> {
        if call.name == self.switch.name() {
            return Ok(self.switch_agent(call, agent_id).await);
        }
        debug!(tool = %call.name, "Delegating tool call");
        self.inner.execute(call, session_id, agent_id).await
    }
}

/// Inner executor for deployments without a tool service. Every call
/// comes back as a failed result the model can read.
pub struct UnavailableExecutor;

#[async_trait]
impl ToolExecutor for UnavailableExecutor {
    async fn execute(
        &self,
        call: &ToolCall,
        _session_id: &str,
        _agent_id: &str,
    ) -> Result<ToolResult, ToolError> {
        Ok(ToolResult::failure(format!(
            "No tool executor is configured for '{}'",
            call.name
        )))
    }
}
