//! Provider selection, picking the configured backend.

use std::sync::Arc;

use toolrelay_config::{AppConfig, ProviderKind};
use toolrelay_core::error::ProviderError;
use toolrelay_core::provider::Provider;
use tracing::info;

use crate::anthropic::AnthropicProvider;
use crate::bedrock::BedrockProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::sigv4::Credentials;

/// Build the provider named by `config.provider`.
///
/// Fails with [`ProviderError::NotConfigured`] when its credentials are missing.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    config
        .require_provider_credentials()
        .map_err(|e| ProviderError::NotConfigured(e.to_string()))?;

    let max_tokens = config.orchestrator.max_tokens;
    let temperature = config.orchestrator.temperature;

    let provider: Arc<dyn Provider> = match config.provider {
        ProviderKind::Anthropic => {
            let c = &config.anthropic;
            Arc::new(
                AnthropicProvider::new(c.api_key.clone().unwrap_or_default())
                    .with_base_url(&c.base_url)
                    .with_model(&c.model)
                    .with_max_tokens(max_tokens)
                    .with_temperature(temperature),
            )
        }
        ProviderKind::Bedrock => {
            let c = &config.bedrock;
            let credentials = Credentials {
                access_key_id: c.access_key_id.clone().unwrap_or_default(),
                secret_access_key: c.secret_access_key.clone().unwrap_or_default(),
                session_token: c.session_token.clone(),
            };
            let mut provider = BedrockProvider::new(credentials, &c.region, &c.model)?
                .with_max_tokens(max_tokens)
                .with_temperature(temperature);
            if let Some(endpoint) = &c.endpoint {
                provider = provider.with_endpoint(endpoint);
            }
            Arc::new(provider)
        }
        ProviderKind::Openai => {
            let c = &config.openai;
            Arc::new(
                OpenAiCompatProvider::new("openai", &c.base_url, c.api_key.clone().unwrap_or_default())
                    .with_model(&c.model)
                    .with_max_tokens(max_tokens)
                    .with_temperature(temperature),
            )
        }
    };

    info!(provider = provider.name(), model = config.active_model(), "Provider ready");
    Ok(provider)
}
