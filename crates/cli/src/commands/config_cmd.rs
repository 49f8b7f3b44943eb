//! `toolrelay config`: print the effective configuration.

use toolrelay_config::AppConfig;

pub fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render(config)?);
    println!(
        "# config file: {}",
        AppConfig::config_dir().join("config.toml").display()
    );
    Ok(())
}

fn render(config: &AppConfig) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&config.redacted())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_config_hides_keys() {
        let mut config = AppConfig::default();
        config.openai.api_key = Some("sk-openai-live".into());
        let out = render(&config).unwrap();
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("sk-openai-live"));
        assert!(out.contains("switch_agent"));
    }
}
