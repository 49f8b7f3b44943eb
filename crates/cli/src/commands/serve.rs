//! `toolrelay serve`: start the HTTP gateway.

use toolrelay_config::AppConfig;

pub async fn run(
    mut config: AppConfig,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    config.require_provider_credentials()?;

    println!("toolrelay gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:  {} ({})", config.provider.as_str(), config.active_model());

    toolrelay_gateway::start(config).await?;

    Ok(())
}
