//! Configuration management.

mod settings;

pub use settings::{
    AppConfig, AppSettings, CacheSettings, ExchangeKind, ExchangeSettings, HealthSettings,
    LogFormat, LoggingConfig, SchedulerSettings,
};

use config::{Config, Environment, File, Map};
use std::path::Path;
use thiserror::Error;

/// Environment variable prefix; nested keys use `__`, e.g. `MARKETFEED__SCHEDULER__SYMBOLS`.
pub const ENV_PREFIX: &str = "MARKETFEED";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

fn environment(vars: Option<Map<String, String>>) -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("scheduler.symbols")
        .source(vars)
}

fn build(path: Option<&Path>, env: Environment) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    let config = builder.add_source(env).build()?;
    let app: AppConfig = config.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Load configuration from file and environment, then validate it.
///
/// Without a file, built-in defaults apply and the environment may still
/// override them.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    build(path, environment(None))
}
