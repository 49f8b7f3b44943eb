//! `toolrelay agents`: inspect resolved agents.

use std::sync::Arc;

use toolrelay_agent::{AgentCache, AgentResolver, ResolverSettings, describe_chain};
use toolrelay_config::AppConfig;

/// Resolve `id` through the configured store and print its chain.
pub async fn show(config: &AppConfig, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = toolrelay_gateway::build_store(config)?;
    let resolver = AgentResolver::new(store, Arc::new(AgentCache::new(config.agents.cache_ttl())))
        .with_settings(ResolverSettings::from_config(&config.agents));

    let agent = resolver.resolve(id).await?;
    print!("{}", describe_chain(&agent));
    Ok(())
}
