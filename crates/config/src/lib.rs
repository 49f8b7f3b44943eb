//! Configuration loading and validation for toolrelay.
//!
//! Loads configuration from `~/.toolrelay/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.toolrelay/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Which model backend serves completions
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default)]
    pub anthropic: AnthropicConfig,

    #[serde(default)]
    pub bedrock: BedrockConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub agents: AgentsConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Anthropic,
    Bedrock,
    Openai,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::Bedrock => "bedrock",
            Self::Openai => "openai",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "bedrock" | "aws" => Ok(Self::Bedrock),
            "openai" => Ok(Self::Openai),
            other => Err(ConfigError::ValidationError(format!(
                "unknown provider '{other}' (expected anthropic, bedrock or openai)"
            ))),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_anthropic_url")]
    pub base_url: String,

    #[serde(default = "default_anthropic_model")]
    pub model: String,
}

fn default_anthropic_url() -> String {
    "https://api.anthropic.com".into()
}
fn default_anthropic_model() -> String {
    "claude-sonnet-4-5-20250929".into()
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_anthropic_url(),
            model: default_anthropic_model(),
        }
    }
}

impl std::fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BedrockConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_bedrock_model")]
    pub model: String,

    /// Overrides `https://bedrock-runtime.{region}.amazonaws.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_region() -> String {
    "us-east-1".into()
}
fn default_bedrock_model() -> String {
    "anthropic.claude-3-5-sonnet-20241022-v2:0".into()
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            region: default_region(),
            model: default_bedrock_model(),
            endpoint: None,
        }
    }
}

impl std::fmt::Debug for BedrockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("session_token", &redact(&self.session_token))
            .field("region", &self.region)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_openai_url")]
    pub base_url: String,

    #[serde(default = "default_openai_model")]
    pub model: String,
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_openai_model() -> String {
    "gpt-4o".into()
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_url(),
            model: default_openai_model(),
        }
    }
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Provider rounds per turn before the soft cap stops the loop
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Tool whose results may hand the conversation to another agent
    #[serde(default = "default_switch_tool")]
    pub switch_tool: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_max_depth() -> usize {
    10
}
fn default_max_tokens() -> u32 {
    4000
}
fn default_temperature() -> f32 {
    0.3
}
fn default_switch_tool() -> String {
    "switch_agent".into()
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            switch_tool: default_switch_tool(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl OrchestratorConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    #[serde(default = "default_max_inheritance_depth")]
    pub max_inheritance_depth: usize,

    /// Used when a request names no agent or resolution keeps failing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_agent_id: Option<String>,

    #[serde(default = "default_agent_name")]
    pub default_agent_name: String,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default)]
    pub store: StoreConfig,
}

fn default_cache_ttl() -> u64 {
    300
}
fn default_max_inheritance_depth() -> usize {
    10
}
fn default_agent_name() -> String {
    "Solutions".into()
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_retry_base_delay() -> u64 {
    200
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl(),
            max_inheritance_depth: default_max_inheritance_depth(),
            default_agent_id: None,
            default_agent_name: default_agent_name(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay(),
            store: StoreConfig::default(),
        }
    }
}

impl AgentsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Rest,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,

    /// TOML file with `[[agents]]` entries for the memory store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definitions_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rest_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("kind", &self.kind)
            .field("definitions_path", &self.definitions_path)
            .field("rest_url", &self.rest_url)
            .field("api_key", &redact(&self.api_key))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Remote tool service; without it only local tools run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_url: Option<String>,

    /// JSON or TOML file with tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_tool_timeout() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            executor_url: None,
            catalog_path: None,
            timeout_secs: default_tool_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8787
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location with env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in
    /// production; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("TOOLRELAY_PROVIDER") {
            self.provider = provider.parse()?;
        }
        if lookup("USE_AWS_BEDROCK").is_some_and(|v| v.eq_ignore_ascii_case("true")) {
            self.provider = ProviderKind::Bedrock;
        }

        if self.anthropic.api_key.is_none() {
            self.anthropic.api_key =
                lookup("ANTHROPIC_API_KEY").or_else(|| lookup("CLAUDE_API_KEY"));
        }
        if let Some(model) = lookup("ANTHROPIC_MODEL") {
            self.anthropic.model = model;
        }

        if self.bedrock.access_key_id.is_none() {
            self.bedrock.access_key_id = lookup("AWS_ACCESS_KEY_ID");
        }
        if self.bedrock.secret_access_key.is_none() {
            self.bedrock.secret_access_key = lookup("AWS_SECRET_ACCESS_KEY");
        }
        if self.bedrock.session_token.is_none() {
            self.bedrock.session_token = lookup("AWS_SESSION_TOKEN");
        }
        if let Some(region) = lookup("AWS_REGION") {
            self.bedrock.region = region;
        }
        if let Some(model) = lookup("AWS_BEDROCK_MODEL") {
            self.bedrock.model = model;
        }

        if self.openai.api_key.is_none() {
            self.openai.api_key = lookup("OPENAI_API_KEY");
        }
        if let Some(url) = lookup("OPENAI_BASE_URL") {
            self.openai.base_url = url;
        }
        if let Some(model) = lookup("OPENAI_MODEL") {
            self.openai.model = model;
        }

        if let Some(url) = lookup("TOOLRELAY_TOOL_EXECUTOR_URL") {
            self.tools.executor_url = Some(url);
        }
        if let Some(url) = lookup("TOOLRELAY_AGENT_STORE_URL") {
            self.agents.store.kind = StoreKind::Rest;
            self.agents.store.rest_url = Some(url);
        }
        if self.agents.store.api_key.is_none() {
            self.agents.store.api_key = lookup("TOOLRELAY_AGENT_STORE_KEY");
        }

        Ok(())
    }

    /// Get the config directory path (~/.toolrelay).
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".toolrelay")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.orchestrator.temperature) {
            return Err(ConfigError::ValidationError(
                "orchestrator.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.orchestrator.max_depth == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_depth must be at least 1".into(),
            ));
        }
        if self.orchestrator.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "orchestrator.max_tokens must be greater than 0".into(),
            ));
        }
        if self.agents.cache_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "agents.cache_ttl_secs must be greater than 0".into(),
            ));
        }
        if self.agents.store.kind == StoreKind::Rest && self.agents.store.rest_url.is_none() {
            return Err(ConfigError::ValidationError(
                "agents.store.rest_url is required for the rest store".into(),
            ));
        }
        Ok(())
    }

    /// Check that the selected provider has the credentials it needs.
    pub fn require_provider_credentials(&self) -> Result<(), ConfigError> {
        let missing = match self.provider {
            ProviderKind::Anthropic if self.anthropic.api_key.is_none() => {
                Some("ANTHROPIC_API_KEY")
            }
            ProviderKind::Bedrock if self.bedrock.access_key_id.is_none() => {
                Some("AWS_ACCESS_KEY_ID")
            }
            ProviderKind::Bedrock if self.bedrock.secret_access_key.is_none() => {
                Some("AWS_SECRET_ACCESS_KEY")
            }
            ProviderKind::Openai if self.openai.api_key.is_none() => Some("OPENAI_API_KEY"),
            _ => None,
        };
        match missing {
            Some(var) => Err(ConfigError::ValidationError(format!(
                "provider '{}' requires {var}",
                self.provider.as_str()
            ))),
            None => Ok(()),
        }
    }

    /// The model name the selected provider will use.
    pub fn active_model(&self) -> &str {
        match self.provider {
            ProviderKind::Anthropic => &self.anthropic.model,
            ProviderKind::Bedrock => &self.bedrock.model,
            ProviderKind::Openai => &self.openai.model,
        }
    }

    /// Copy with every secret replaced by a placeholder, for display.
    pub fn redacted(&self) -> Self {
        fn mask(secret: &mut Option<String>) {
            if secret.is_some() {
                *secret = Some("[REDACTED]".into());
            }
        }

        let mut config = self.clone();
        mask(&mut config.anthropic.api_key);
        mask(&mut config.bedrock.secret_access_key);
        mask(&mut config.bedrock.session_token);
        mask(&mut config.openai.api_key);
        mask(&mut config.agents.store.api_key);
        config
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider, ProviderKind::Anthropic);
        assert_eq!(config.orchestrator.max_depth, 10);
        assert_eq!(config.agents.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.bedrock.region, "us-east-1");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.port, config.gateway.port);
        assert_eq!(parsed.orchestrator.switch_tool, "switch_agent");
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.orchestrator.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rest_store_requires_url() {
        let mut config = AppConfig::default();
        config.agents.store.kind = StoreKind::Rest;
        assert!(config.validate().is_err());
        config.agents.store.rest_url = Some("http://localhost:3000".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.provider, ProviderKind::Anthropic);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
provider = "openai"

[openai]
api_key = "sk-test"
model = "gpt-4o-mini"

[orchestrator]
max_depth = 4

[agents]
default_agent_id = "agent-solutions"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.provider, ProviderKind::Openai);
        assert_eq!(config.active_model(), "gpt-4o-mini");
        assert_eq!(config.orchestrator.max_depth, 4);
        assert_eq!(config.orchestrator.max_tokens, 4000);
        assert_eq!(config.agents.default_agent_id.as_deref(), Some("agent-solutions"));
        assert!(config.require_provider_credentials().is_ok());
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "provider = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config
            .apply_env(env(&[
                ("USE_AWS_BEDROCK", "true"),
                ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
                ("AWS_SECRET_ACCESS_KEY", "secret"),
                ("AWS_REGION", "eu-west-1"),
                ("CLAUDE_API_KEY", "sk-ant"),
            ]))
            .unwrap();

        assert_eq!(config.provider, ProviderKind::Bedrock);
        assert_eq!(config.bedrock.region, "eu-west-1");
        assert_eq!(config.anthropic.api_key.as_deref(), Some("sk-ant"));
        assert!(config.require_provider_credentials().is_ok());
    }

    #[test]
    fn file_keys_win_over_env_keys() {
        let mut config = AppConfig::default();
        config.anthropic.api_key = Some("from-file".into());
        config
            .apply_env(env(&[("ANTHROPIC_API_KEY", "from-env")]))
            .unwrap();
        assert_eq!(config.anthropic.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn unknown_provider_env_is_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_env(env(&[("TOOLRELAY_PROVIDER", "llama")]))
            .unwrap_err();
        assert!(err.to_string().contains("llama"));
    }

    #[test]
    fn missing_credentials_reported() {
        let config = AppConfig::default();
        let err = config.require_provider_credentials().unwrap_err();
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = AppConfig::default();
        config.bedrock.secret_access_key = Some("super-secret".into());
        config.openai.api_key = Some("sk-live".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("sk-live"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn redacted_copy_masks_secrets_only() {
        let mut config = AppConfig::default();
        config.anthropic.api_key = Some("sk-ant-live".into());
        config.agents.store.api_key = Some("store-key".into());
        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-ant-live"));
        assert!(!shown.contains("store-key"));
        assert!(shown.contains("[REDACTED]"));
        assert!(!shown.contains("secret_access_key"));
        assert_eq!(config.anthropic.api_key.as_deref(), Some("sk-ant-live"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("switch_agent"));
        assert!(toml_str.contains("8787"));
    }
}
