//! Per-agent system prompt construction.

use serde::{Deserialize, Serialize};
use toolrelay_core::agent::MergedAgent;
use tracing::debug;

pub const DEFAULT_PROMPT: &str = "You are a helpful AI assistant.";

/// Prefix of the seed message the orchestrator writes after a handoff.
pub const HANDOFF_CONTEXT_PREFIX: &str = "User context from previous agent:";

pub const AUTO_PROCESSING_MARKER: &str = "AUTO-PROCESSING:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// What the client knows about earlier logins on this device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginEvidence {
    #[serde(default)]
    pub has_previous_login: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_time: Option<String>,
}

/// A record the user is currently working on, e.g. `{kind: "RFP", id, label}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextRef {
    pub kind: String,
    pub id: String,
    #[serde(default)]
    pub label: String,
}

/// Request-level inputs to the prompt. Survives agent switches unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptContext {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_profile: Option<UserProfile>,
    #[serde(default)]
    pub login_evidence: Option<LoginEvidence>,
    #[serde(default)]
    pub context: Vec<ContextRef>,
}

/// Build the system prompt for `agent`. `user_message` is the latest user
/// text; a handoff seed message switches on auto-processing instructions.
pub fn build_system_prompt(
    agent: &MergedAgent,
    ctx: &PromptContext,
    user_message: Option<&str>,
) -> String {
    let mut prompt = base_prompt(agent);

    if let Some(request) = user_message.and_then(handoff_request) {
        debug!(agent = %agent.name(), "Handoff context detected, adding auto-processing section");
        push_auto_processing(&mut prompt, agent, &request);
    }

    push_user_context(&mut prompt, ctx);

    if let Some(session_id) = ctx.session_id.as_deref().filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("\n\nCurrent session: {session_id}"));
    }
    for item in &ctx.context {
        let label = if item.label.is_empty() {
            item.id.as_str()
        } else {
            item.label.as_str()
        };
        prompt.push_str(&format!("\n\nCurrent {}: {label} (ID: {})", item.kind, item.id));
    }

    debug!(agent = %agent.name(), length = prompt.len(), "Built system prompt");
    prompt
}

fn base_prompt(agent: &MergedAgent) -> String {
    if !agent.merged_instructions.trim().is_empty() {
        return agent.merged_instructions.clone();
    }
    match agent.agent.initial_prompt.as_deref() {
        Some(initial) if !initial.trim().is_empty() => initial.to_string(),
        _ => DEFAULT_PROMPT.to_string(),
    }
}

/// The quoted original request inside a handoff seed message.
fn handoff_request(message: &str) -> Option<String> {
    if !message.contains(HANDOFF_CONTEXT_PREFIX) && !message.contains(AUTO_PROCESSING_MARKER) {
        return None;
    }
    let start = message.find(HANDOFF_CONTEXT_PREFIX)? + HANDOFF_CONTEXT_PREFIX.len();
    let rest = message[start..].trim_start().strip_prefix('"')?;
    let end = rest.find('"')?;
    let request = &rest[..end];
    (!request.is_empty()).then(|| request.to_string())
}

/// The seed message for a new agent when a handoff carried no context.
pub fn handoff_seed_message(previous_user_text: &str) -> String {
    let quoted = previous_user_text.replace('"', "'");
    format!("{HANDOFF_CONTEXT_PREFIX} \"{quoted}\"")
}

fn push_auto_processing(prompt: &mut String, agent: &MergedAgent, request: &str) {
    prompt.push_str("\n\nAGENT SWITCH AUTO-PROCESSING MODE:\n");
    prompt.push_str("- You are continuing a conversation that was handed off from a previous agent\n");
    prompt.push_str(&format!("- Original user request: \"{request}\"\n"));
    prompt.push_str(&format!("- Your role: {} ({})\n", agent.name(), agent.role()));
    prompt.push_str("\nAUTO-PROCESS INSTRUCTIONS:\n");
    prompt.push_str("1. IMMEDIATELY take appropriate action based on your role and the user's request\n");
    prompt.push_str("2. Execute relevant functions to fulfill the original request\n");
    prompt.push_str("3. Provide status and results of your actions\n");
    prompt.push_str(
        "\nCRITICAL: This is an automatic handoff. Take action immediately without asking for clarification.\n",
    );
}

fn push_user_context(prompt: &mut String, ctx: &PromptContext) {
    prompt.push_str("\n\nUSER CONTEXT:");
    if let Some(profile) = &ctx.user_profile {
        prompt.push_str("\n- User Status: AUTHENTICATED");
        prompt.push_str(&format!("\n- User ID: {}", profile.id));
        prompt.push_str(&format!("\n- Email: {}", profile.email));
        if let Some(name) = profile.full_name.as_deref().filter(|s| !s.is_empty()) {
            prompt.push_str(&format!("\n- Name: {name}"));
        }
        if let Some(role) = profile.role.as_deref().filter(|s| !s.is_empty()) {
            prompt.push_str(&format!("\n- Role: {role}"));
        }
        return;
    }

    prompt.push_str("\n- User Status: ANONYMOUS (not logged in)");
    match &ctx.login_evidence {
        Some(evidence) if evidence.has_previous_login => {
            prompt.push_str(
                "\n- Previous Login History: YES - This user has logged in before on this device",
            );
            if let Some(count) = evidence.login_count.filter(|c| *c > 0) {
                prompt.push_str(&format!("\n- Login Count: {count} previous logins"));
            }
            if let Some(last) = &evidence.last_login_time {
                prompt.push_str(&format!("\n- Last Login: {last}"));
            }
            prompt.push_str(
                "\n- Recommendation: This is a returning user who should be encouraged to log back in rather than sign up",
            );
        }
        _ => {
            prompt.push_str("\n- Previous Login History: NO - This appears to be a new user");
            prompt.push_str(
                "\n- Recommendation: This user is a potential customer who has not yet signed up",
            );
        }
    }
}
