//! Configuration structures.

use feed_core::types::Timeframe;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigError;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub cache: CacheSettings,
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
    /// Advisory lock file guarding against a second running instance
    pub lock_file: String,
    /// Grace period for tasks to stop before they are aborted
    pub shutdown_grace_secs: u64,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "marketfeed".to_string(),
            environment: "development".to_string(),
            lock_file: "marketfeed.lock".to_string(),
            shutdown_grace_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    #[default]
    Bybit,
    /// Offline replay of `<SYMBOL>.csv` files
    Replay,
}

/// Exchange collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExchangeSettings {
    pub kind: ExchangeKind,
    pub testnet: bool,
    /// Overrides the mainnet/testnet URL when set
    pub base_url: Option<String>,
    /// Bybit product category: spot, linear or inverse
    pub category: String,
    pub timeout_secs: u64,
    pub replay_dir: Option<String>,
    /// Bars visible before the first replayed request
    pub replay_warmup: usize,
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            kind: ExchangeKind::Bybit,
            testnet: false,
            base_url: None,
            category: "spot".to_string(),
            timeout_secs: 10,
            replay_dir: None,
            replay_warmup: 60,
        }
    }
}

impl ExchangeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Update scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerSettings {
    pub symbols: Vec<String>,
    pub interval: Timeframe,
    pub kline_limit: usize,
    pub order_book_depth: usize,
    pub trades_limit: usize,
    pub update_interval_secs: u64,
    /// Fetch attempts per symbol per cycle
    pub max_retries: u32,
    pub retry_base_secs: u64,
    pub retry_max_secs: u64,
    /// Failed cycles in a row before the scheduler halts
    pub max_consecutive_errors: u32,
    pub cycle_backoff_base_secs: u64,
    pub cycle_backoff_max_secs: u64,
    /// How long the health gate may stay closed before the scheduler halts
    pub max_unhealthy_secs: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            interval: Timeframe::Minute1,
            kline_limit: 100,
            order_book_depth: 100,
            trades_limit: 50,
            update_interval_secs: 60,
            max_retries: 3,
            retry_base_secs: 2,
            retry_max_secs: 60,
            max_consecutive_errors: 3,
            cycle_backoff_base_secs: 30,
            cycle_backoff_max_secs: 300,
            max_unhealthy_secs: 600,
        }
    }
}

impl SchedulerSettings {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }
}

/// Health monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthSettings {
    pub latency_threshold_ms: f64,
    pub error_rate_threshold: f64,
    pub consecutive_failures: u32,
    pub rate_limit_threshold: f64,
    pub request_timeout_secs: u64,
    pub check_interval_secs: u64,
    /// Check period while the gate is closed
    pub recovery_interval_secs: u64,
    pub summary_interval_secs: u64,
    pub capacity: usize,
    /// Measured calls the gate's error rate looks back over
    pub error_window: usize,
    pub requests_per_minute: u32,
    pub probe_symbol: String,
    pub metrics_file: Option<String>,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            latency_threshold_ms: 2000.0,
            error_rate_threshold: 0.1,
            consecutive_failures: 3,
            rate_limit_threshold: 0.8,
            request_timeout_secs: 5,
            check_interval_secs: 60,
            recovery_interval_secs: 5,
            summary_interval_secs: 300,
            capacity: 1000,
            error_window: 20,
            requests_per_minute: 600,
            probe_symbol: "BTCUSDT".to_string(),
            metrics_file: Some("logs/metrics.json".to_string()),
        }
    }
}

impl HealthSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_secs(self.recovery_interval_secs)
    }

    pub fn summary_interval(&self) -> Duration {
        Duration::from_secs(self.summary_interval_secs)
    }
}

/// Cache and history retention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub cache_retention_hours: u64,
    pub history_retention_days: u64,
    pub sweep_interval_minutes: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            cache_retention_hours: 24,
            history_retention_days: 30,
            sweep_interval_minutes: 60,
        }
    }
}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn check(ok: bool, message: impl FnOnce() -> String) -> Result<(), ConfigError> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::Invalid(message()))
    }
}

fn fraction(name: &str, value: f64) -> Result<(), ConfigError> {
    check(value > 0.0 && value <= 1.0, || {
        format!("{} must be in (0, 1], got {}", name, value)
    })
}

impl AppConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.logging.level.to_lowercase();
        check(LOG_LEVELS.contains(&level.as_str()), || {
            format!("logging.level {:?} is not one of {:?}", self.logging.level, LOG_LEVELS)
        })?;

        let s = &self.scheduler;
        check(!s.symbols.is_empty(), || "scheduler.symbols is empty".into())?;
        if let Some(bad) = s
            .symbols
            .iter()
            .find(|sym| sym.is_empty() || !sym.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(ConfigError::Invalid(format!("invalid symbol {:?}", bad)));
        }
        check((1..=1000).contains(&s.kline_limit), || {
            format!("scheduler.kline_limit must be 1..=1000, got {}", s.kline_limit)
        })?;
        check(s.order_book_depth > 0 && s.trades_limit > 0, || {
            "scheduler.order_book_depth and trades_limit must be positive".into()
        })?;
        check(s.update_interval_secs > 0, || "scheduler.update_interval_secs must be positive".into())?;
        check(s.max_retries > 0, || "scheduler.max_retries must be at least 1".into())?;
        check(s.max_consecutive_errors > 0, || {
            "scheduler.max_consecutive_errors must be at least 1".into()
        })?;
        check(s.retry_base_secs <= s.retry_max_secs, || {
            "scheduler.retry_base_secs exceeds retry_max_secs".into()
        })?;
        check(s.cycle_backoff_base_secs <= s.cycle_backoff_max_secs, || {
            "scheduler.cycle_backoff_base_secs exceeds cycle_backoff_max_secs".into()
        })?;
        check(s.max_unhealthy_secs > 0, || "scheduler.max_unhealthy_secs must be positive".into())?;

        let h = &self.health;
        fraction("health.error_rate_threshold", h.error_rate_threshold)?;
        fraction("health.rate_limit_threshold", h.rate_limit_threshold)?;
        check(h.latency_threshold_ms > 0.0, || "health.latency_threshold_ms must be positive".into())?;
        check(h.consecutive_failures > 0, || "health.consecutive_failures must be at least 1".into())?;
        check(
            h.request_timeout_secs > 0 && h.check_interval_secs > 0 && h.recovery_interval_secs > 0,
            || "health timeouts and intervals must be positive".into(),
        )?;
        check(h.error_window > 0 && h.error_window <= h.capacity, || {
            format!("health.error_window must be 1..=capacity, got {}", h.error_window)
        })?;
        check(h.capacity > 0, || "health.capacity must be positive".into())?;
        check(h.requests_per_minute > 0, || "health.requests_per_minute must be positive".into())?;

        let c = &self.cache;
        check(c.cache_retention_hours > 0 && c.history_retention_days > 0, || {
            "cache retention windows must be positive".into()
        })?;

        let e = &self.exchange;
        check(
            matches!(e.category.to_lowercase().as_str(), "spot" | "linear" | "inverse"),
            || format!("exchange.category {:?} is not spot, linear or inverse", e.category),
        )?;
        check(e.timeout_secs > 0, || "exchange.timeout_secs must be positive".into())?;
        if e.kind == ExchangeKind::Replay {
            check(e.replay_dir.is_some(), || {
                "exchange.replay_dir is required for the replay exchange".into()
            })?;
        }

        Ok(())
    }

    /// Effective configuration rendered as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
