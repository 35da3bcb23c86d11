//! Run command: the long-lived update pipeline.

use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use feed_config::{AppConfig, CacheSettings, ExchangeKind, ExchangeSettings, HealthSettings, SchedulerSettings};
use feed_core::traits::ExchangeClient;
use feed_exchange::{BybitCategory, BybitClient, BybitConfig, CsvReplayExchange};
use feed_indicators::IndicatorEngine;
use feed_monitor::{HealthMonitor, HealthThresholds, MonitorSettings};
use feed_scheduler::{HaltPolicy, MarketView, RetryPolicy, SchedulerConfig, UpdateScheduler};
use feed_store::{MemoryStore, RetentionPolicy, StoreAdapter};

use crate::lock::InstanceLock;

pub async fn run(config: &AppConfig) -> Result<()> {
    let _lock = InstanceLock::acquire(&config.app.lock_file)?;
    info!(
        app = %config.app.name,
        environment = %config.app.environment,
        symbols = ?config.scheduler.symbols,
        "Starting market-data pipeline"
    );

    let exchange = build_exchange(&config.exchange, &config.scheduler.symbols)?;
    let monitor = Arc::new(HealthMonitor::new(exchange.clone(), monitor_settings(&config.health)));
    let store = Arc::new(StoreAdapter::new(
        Arc::new(MemoryStore::new()),
        retention_policy(&config.cache),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Arc::new(UpdateScheduler::new(
        scheduler_config(&config.scheduler),
        exchange.clone(),
        monitor.clone(),
        Arc::new(IndicatorEngine::new()),
        store.clone(),
        shutdown_rx.clone(),
    ));
    let view = MarketView::new(store, monitor.clone(), scheduler.clone());

    if !monitor.check_availability().await {
        warn!(exchange = exchange.name(), "Exchange unavailable at startup; cycles wait for it to recover");
    }

    let monitor_task = tokio::spawn(monitor.clone().run(shutdown_rx));
    let mut scheduler_task = tokio::spawn(scheduler.run());

    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown requested");
            None
        }
        joined = &mut scheduler_task => Some(joined),
    };

    let _ = shutdown_tx.send(true);
    let grace = Duration::from_secs(config.app.shutdown_grace_secs);

    let outcome = match finished {
        Some(joined) => Some(joined.context("Scheduler task panicked")?),
        None => join_with_grace("scheduler", scheduler_task, grace).await,
    };
    join_with_grace("health-monitor", monitor_task, grace).await;

    report(&view, &config.scheduler.symbols).await;
    if let Some(path) = &config.health.metrics_file {
        if let Err(err) = monitor.export_metrics(Path::new(path)) {
            warn!(error = %err, "Final metrics export failed");
        }
    }

    match outcome {
        Some(result) => result.context("Update scheduler stopped"),
        None => Ok(()),
    }
}

/// Wait for a task to stop, aborting it once the grace period runs out.
async fn join_with_grace<T>(name: &str, mut handle: JoinHandle<T>, grace: Duration) -> Option<T> {
    match tokio::time::timeout(grace, &mut handle).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            error!(task = name, error = %err, "Task failed");
            None
        }
        Err(_) => {
            warn!(task = name, grace_secs = grace.as_secs(), "Task did not stop in time; aborting");
            handle.abort();
            None
        }
    }
}

async fn report(view: &MarketView, symbols: &[String]) {
    let summary = view.health_summary();
    info!(
        status = %summary.status,
        requests = summary.total_requests,
        error_rate = summary.error_rate,
        halted = view.is_halted(),
        "Final health summary"
    );
    for symbol in symbols {
        match view.latest_indicators(symbol).await {
            Ok(Some(set)) => info!(symbol, signal = %set.global_signal(), at = %set.timestamp, "Latest indicators"),
            Ok(None) => info!(symbol, "No indicators computed"),
            Err(err) => warn!(symbol, error = %err, "Could not read latest indicators"),
        }
    }
}

pub fn build_exchange(
    settings: &ExchangeSettings,
    symbols: &[String],
) -> Result<Arc<dyn ExchangeClient>> {
    match settings.kind {
        ExchangeKind::Bybit => {
            let category: BybitCategory = settings.category.parse().map_err(anyhow::Error::msg)?;
            let mut config = if settings.testnet {
                BybitConfig::testnet()
            } else {
                BybitConfig::default()
            };
            if let Some(url) = &settings.base_url {
                config.base_url = url.clone();
            }
            config.category = category;
            config.timeout = settings.timeout();
            info!(url = %config.base_url, category = %category, "Using Bybit exchange");
            Ok(Arc::new(BybitClient::new(config).context("Failed to build Bybit client")?))
        }
        ExchangeKind::Replay => {
            let dir = settings
                .replay_dir
                .as_deref()
                .map(PathBuf::from)
                .context("exchange.replay_dir is not set")?;
            let mut replay = CsvReplayExchange::new(settings.replay_warmup);
            for symbol in symbols {
                let path = dir.join(format!("{}.csv", symbol));
                replay = replay
                    .with_csv(symbol.as_str(), &path)
                    .with_context(|| format!("Failed to load replay data {}", path.display()))?;
            }
            Ok(Arc::new(replay))
        }
    }
}

pub fn monitor_settings(health: &HealthSettings) -> MonitorSettings {
    MonitorSettings {
        thresholds: HealthThresholds {
            latency_ms: health.latency_threshold_ms,
            error_rate: health.error_rate_threshold,
            consecutive_failures: health.consecutive_failures,
            rate_limit_usage: health.rate_limit_threshold,
        },
        request_timeout: health.request_timeout(),
        check_interval: health.check_interval(),
        recovery_interval: health.recovery_interval(),
        summary_interval: health.summary_interval(),
        capacity: health.capacity,
        error_window: health.error_window,
        requests_per_minute: health.requests_per_minute,
        probe_symbol: health.probe_symbol.clone(),
        metrics_path: health.metrics_file.as_ref().map(PathBuf::from),
    }
}

pub fn retention_policy(cache: &CacheSettings) -> RetentionPolicy {
    RetentionPolicy {
        cache_retention: ChronoDuration::hours(cache.cache_retention_hours as i64),
        history_retention: ChronoDuration::days(cache.history_retention_days as i64),
        sweep_interval: ChronoDuration::minutes(cache.sweep_interval_minutes as i64),
    }
}

pub fn scheduler_config(s: &SchedulerSettings) -> SchedulerConfig {
    SchedulerConfig {
        symbols: s.symbols.clone(),
        interval: s.interval,
        kline_limit: s.kline_limit,
        order_book_depth: s.order_book_depth,
        trades_limit: s.trades_limit,
        update_interval: s.update_interval(),
        retry: RetryPolicy {
            max_retries: s.max_retries,
            base_delay: Duration::from_secs(s.retry_base_secs),
            max_delay: Duration::from_secs(s.retry_max_secs),
        },
        halt: HaltPolicy {
            max_consecutive_errors: s.max_consecutive_errors,
            base_delay: Duration::from_secs(s.cycle_backoff_base_secs),
            max_delay: Duration::from_secs(s.cycle_backoff_max_secs),
            max_unhealthy: Duration::from_secs(s.max_unhealthy_secs),
        },
    }
}
