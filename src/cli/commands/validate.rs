//! Validate configuration command.

use anyhow::Result;
use feed_config::load_config;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<()> {
    match config_path {
        Some(path) => println!("Validating configuration: {:?}", path),
        None => println!("Validating built-in defaults and environment overrides"),
    }

    match load_config(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("App: {}", config.app.name);
            println!("Environment: {}", config.app.environment);
            println!("Log level: {}", config.logging.level);
            println!("Exchange: {:?}", config.exchange.kind);
            println!("Symbols: {}", config.scheduler.symbols.join(", "));
            println!("Update interval: {}s", config.scheduler.update_interval_secs);
            println!();
            println!("{}", config.to_toml_string()?);
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
