//! Market-data pipeline CLI application.

mod cli;
mod lock;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use feed_config::{load_config, AppConfig, LogFormat};
use feed_monitor::setup_logging;
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = "config/default.toml";

/// An explicit path must exist; the default file is optional.
fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG);
        default.exists().then_some(default)
    })
}

fn load(path: Option<&Path>) -> Result<AppConfig> {
    load_config(path).with_context(|| match path {
        Some(p) => format!("Failed to load configuration from {}", p.display()),
        None => "Failed to load configuration".to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = config_path(cli.config);

    if let Commands::ValidateConfig = cli.command {
        return cli::commands::validate::run(path.as_deref()).await;
    }

    let config = load(path.as_deref())?;

    // Command-line flags win over the file
    let level = cli
        .log_level
        .map(|l| l.as_str())
        .unwrap_or(config.logging.level.as_str());
    let json = cli.json_logs || config.logging.format == LogFormat::Json;
    let _guard = setup_logging(level, json, config.logging.file.as_deref().map(Path::new));

    match cli.command {
        Commands::Run => cli::commands::run::run(&config).await,
        Commands::Analyze(args) => cli::commands::analyze::run(args).await,
        Commands::ValidateConfig => Ok(()),
    }
}
