//! The built-in agent handoff tool.
//!
//! A successful call returns a result carrying `trigger_continuation: true`
//! and a `new_agent` descriptor, which the orchestrator recognises as a
//! request to continue the conversation under that agent.

use serde::Deserialize;
use toolrelay_core::agent::Agent;
use toolrelay_core::error::ToolError;
use toolrelay_core::provider::ToolDefinition;
use toolrelay_core::tool::{ClientCallback, ToolResult};

pub const SWITCH_AGENT: &str = "switch_agent";

/// Parsed `switch_agent` input.
#[derive(Debug, Clone, Deserialize)]
pub struct SwitchAgentInput {
    #[serde(default)]
    pub agent_id: Option<String>,

    #[serde(default)]
    pub agent_name: Option<String>,

    /// The user's request, passed on verbatim to the new agent
    #[serde(default)]
    pub user_input: Option<String>,

    #[serde(default)]
    pub reason: Option<String>,
}

pub struct SwitchAgentTool;

impl SwitchAgentTool {
    pub fn name(&self) -> &str {
        SWITCH_AGENT
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: SWITCH_AGENT.into(),
            description: "Hand the conversation to a different specialist agent. Use this when \
                          the user's request belongs to another agent's domain. Pass the user's \
                          original request in user_input so the new agent can act on it \
                          immediately."
                .into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "agent_name": {
                        "type": "string",
                        "description": "Display name of the agent to switch to"
                    },
                    "agent_id": {
                        "type": "string",
                        "description": "Id of the agent to switch to (alternative to agent_name)"
                    },
                    "user_input": {
                        "type": "string",
                        "description": "The user's request to pass to the new agent"
                    },
                    "reason": {
                        "type": "string",
                        "description": "Why the switch is needed"
                    }
                },
                "required": ["user_input"]
            }),
        }
    }

    pub fn parse_input(&self, input: &serde_json::Value) -> Result<SwitchAgentInput, ToolError> {
        let parsed: SwitchAgentInput = serde_json::from_value(input.clone())
            .map_err(|e| ToolError::InvalidArguments(format!("{SWITCH_AGENT}: {e}")))?;
        let has_target = parsed.agent_id.as_deref().is_some_and(|s| !s.trim().is_empty())
            || parsed.agent_name.as_deref().is_some_and(|s| !s.trim().is_empty());
        if !has_target {
            return Err(ToolError::InvalidArguments(format!(
                "{SWITCH_AGENT} requires agent_id or agent_name"
            )));
        }
        Ok(parsed)
    }

    /// Result announcing a successful switch to `agent`.
    pub fn success(&self, agent: &Agent, input: &SwitchAgentInput) -> ToolResult {
        let new_agent = serde_json::json!({
            "id": agent.id,
            "name": agent.name,
            "role": agent.role,
        });

        let mut result = ToolResult::ok(serde_json::json!({ "new_agent": new_agent.clone() }))
            .with_message(format!(
                "Successfully switched to {} agent. The {} will respond in the next message.",
                agent.name, agent.name
            ))
            .with_field("trigger_continuation", serde_json::Value::Bool(true))
            .with_field("new_agent", new_agent)
            .with_callback(ClientCallback {
                kind: "ui_refresh".into(),
                target: "agent_context".into(),
                payload: serde_json::json!({
                    "agent_id": agent.id,
                    "agent_name": agent.name,
                    "agent_role": agent.role,
                    "message": format!("Successfully switched to {} agent", agent.name),
                }),
                priority: Some("high".into()),
            });

        if let Some(reason) = &input.reason {
            result = result.with_field("switch_reason", serde_json::Value::String(reason.clone()));
        }
        if let Some(user_input) = input.user_input.as_deref().filter(|s| !s.trim().is_empty()) {
            result = result.with_field(
                "context_message",
                serde_json::Value::String(user_input.to_string()),
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn design_agent() -> Agent {
        Agent::new("design", "RFP Design").with_role("design")
    }

    #[test]
    fn definition_requires_user_input() {
        let def = SwitchAgentTool.definition();
        assert_eq!(def.name, "switch_agent");
        assert_eq!(def.input_schema["required"][0], "user_input");
    }

    #[test]
    fn parse_requires_a_target() {
        let err = SwitchAgentTool
            .parse_input(&serde_json::json!({"user_input": "hi"}))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let ok = SwitchAgentTool
            .parse_input(&serde_json::json!({"agent_name": "RFP Design", "user_input": "hi"}))
            .unwrap();
        assert_eq!(ok.agent_name.as_deref(), Some("RFP Design"));
    }

    #[test]
    fn success_result_is_a_handoff() {
        let input = SwitchAgentTool
            .parse_input(&serde_json::json!({
                "agent_id": "design",
                "user_input": "Create an RFP for office chairs",
                "reason": "needs RFP design"
            }))
            .unwrap();
        let result = SwitchAgentTool.success(&design_agent(), &input);

        let handoff = result.handoff().expect("handoff signal");
        assert_eq!(handoff.new_agent.id, "design");
        assert_eq!(handoff.new_agent.role.as_deref(), Some("design"));
        assert_eq!(
            handoff.context_message.as_deref(),
            Some("Create an RFP for office chairs")
        );
        assert_eq!(result.client_callbacks[0].kind, "ui_refresh");
        assert_eq!(result.extra["switch_reason"], "needs RFP design");
    }

    #[test]
    fn blank_user_input_has_no_context_message() {
        let input = SwitchAgentTool
            .parse_input(&serde_json::json!({"agent_id": "design", "user_input": "  "}))
            .unwrap();
        let result = SwitchAgentTool.success(&design_agent(), &input);
        assert!(result.handoff().unwrap().context_message.is_none());
    }
}
