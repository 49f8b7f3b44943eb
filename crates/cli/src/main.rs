//! toolrelay CLI, the main entry point.
//!
//! Commands:
//! - `serve`   Start the HTTP gateway
//! - `chat`    Run one turn and print its SSE frames
//! - `agents`  Inspect resolved agents
//! - `config`  Show the effective configuration

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use toolrelay_config::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "toolrelay",
    about = "toolrelay: streaming multi-agent tool-call orchestration",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.toolrelay/config.toml)
    #[arg(short, long, global = true, env = "TOOLRELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one message and stream the events to stdout
    Chat {
        #[arg(short, long)]
        message: String,

        /// Agent id; the configured default agent otherwise
        #[arg(short, long)]
        agent: Option<String>,

        #[arg(short, long)]
        session: Option<String>,
    },

    /// Agent inspection
    Agents {
        #[command(subcommand)]
        command: AgentsCommand,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}

#[derive(Subcommand)]
enum AgentsCommand {
    /// Show an agent's inheritance chain and merged tool access
    Show { id: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config, port).await?,
        Commands::Chat {
            message,
            agent,
            session,
        } => commands::chat::run(config, message, agent, session).await?,
        Commands::Agents {
            command: AgentsCommand::Show { id },
        } => commands::agents::show(&config, &id).await?,
        Commands::Config => commands::config_cmd::show(&config)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    // Logs go to stderr so `chat` output stays parseable.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}
