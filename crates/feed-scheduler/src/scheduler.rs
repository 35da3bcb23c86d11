//! Update scheduler.

use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use feed_core::error::{ExchangeError, FeedError};
use feed_core::traits::ExchangeClient;
use feed_core::types::{MarketSnapshot, SnapshotId, Timeframe};
use feed_indicators::IndicatorEngine;
use feed_monitor::HealthMonitor;
use feed_store::StoreAdapter;

use crate::backoff::{HaltPolicy, RetryPolicy};
use crate::error::SchedulerError;
use crate::state::{SymbolPhase, UpdateState};

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub symbols: Vec<String>,
    pub interval: Timeframe,
    pub kline_limit: usize,
    pub order_book_depth: usize,
    pub trades_limit: usize,
    /// Pause between cycles
    pub update_interval: Duration,
    pub retry: RetryPolicy,
    pub halt: HaltPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            interval: Timeframe::Minute1,
            kline_limit: 100,
            order_book_depth: 100,
            trades_limit: 50,
            update_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            halt: HaltPolicy::default(),
        }
    }
}

/// How one symbol fared in a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    Updated {
        symbol: String,
        snapshot_id: SnapshotId,
        /// False when indicator computation failed; the snapshot is stored regardless
        indicators_saved: bool,
        attempts: u32,
    },
    Failed {
        symbol: String,
        attempts: u32,
        error: String,
    },
    /// Shutdown arrived during back-off
    Cancelled { symbol: String },
}

impl SymbolOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            SymbolOutcome::Updated { symbol, .. }
            | SymbolOutcome::Failed { symbol, .. }
            | SymbolOutcome::Cancelled { symbol } => symbol,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SymbolOutcome::Failed { .. })
    }
}

/// Result of one scheduler cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
    /// Health gate closed; no exchange call was made
    Skipped { reason: String },
    Completed { outcomes: Vec<SymbolOutcome> },
}

impl CycleReport {
    pub fn outcomes(&self) -> &[SymbolOutcome] {
        match self {
            CycleReport::Skipped { .. } => &[],
            CycleReport::Completed { outcomes } => outcomes,
        }
    }

    pub fn updated(&self) -> usize {
        self.outcomes()
            .iter()
            .filter(|o| matches!(o, SymbolOutcome::Updated { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes().iter().filter(|o| o.is_failed()).count()
    }

    /// Every symbol failed; counts toward the halt policy.
    pub fn all_failed(&self) -> bool {
        let outcomes = self.outcomes();
        !outcomes.is_empty() && outcomes.iter().all(SymbolOutcome::is_failed)
    }
}

enum Attempt {
    Done(SymbolOutcome),
    Retry(Duration),
}

/// Drives fetch, compute and persist for every configured symbol.
pub struct UpdateScheduler {
    config: SchedulerConfig,
    exchange: Arc<dyn ExchangeClient>,
    monitor: Arc<HealthMonitor>,
    engine: Arc<IndicatorEngine>,
    store: Arc<StoreAdapter>,
    states: BTreeMap<String, Mutex<UpdateState>>,
    /// Set once by the halt policy
    halted: OnceLock<SchedulerError>,
    shutdown: watch::Receiver<bool>,
}

impl UpdateScheduler {
    pub fn new(
        config: SchedulerConfig,
        exchange: Arc<dyn ExchangeClient>,
        monitor: Arc<HealthMonitor>,
        engine: Arc<IndicatorEngine>,
        store: Arc<StoreAdapter>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let states = config
            .symbols
            .iter()
            .map(|s| (s.clone(), Mutex::new(UpdateState::default())))
            .collect();
        Self {
            config,
            exchange,
            monitor,
            engine,
            store,
            states,
            halted: OnceLock::new(),
            shutdown,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_halted(&self) -> bool {
        self.halted.get().is_some()
    }

    /// Copy of a symbol's state.
    pub async fn state(&self, symbol: &str) -> Option<UpdateState> {
        match self.states.get(symbol) {
            Some(state) => Some(state.lock().await.clone()),
            None => None,
        }
    }

    async fn set_phase(&self, symbol: &str, phase: SymbolPhase) {
        if let Some(state) = self.states.get(symbol) {
            state.lock().await.enter(phase);
        }
    }

    /// Sleep for `duration` unless shutdown is requested first. Returns true on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        let mut shutdown = self.shutdown.clone();
        let deadline = Instant::now() + duration;
        loop {
            if *shutdown.borrow_and_update() {
                return true;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return false,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender dropped: wait out the full duration
                        tokio::time::sleep_until(deadline).await;
                        return false;
                    }
                }
            }
        }
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn fetch(&self, symbol: &str) -> Result<MarketSnapshot, ExchangeError> {
        let cfg = &self.config;
        let ex = &self.exchange;
        let m = &self.monitor;

        let (klines, _) = m
            .measure_latency("get_klines", ex.get_klines(symbol, cfg.interval, cfg.kline_limit))
            .await?;
        if klines.is_empty() {
            return Err(ExchangeError::NoData(symbol.to_string()));
        }
        let (ticker, _) = m.measure_latency("get_ticker", ex.get_ticker(symbol)).await?;
        let (order_book, _) = m
            .measure_latency("get_order_book", ex.get_order_book(symbol, cfg.order_book_depth))
            .await?;
        let (trades, _) = m
            .measure_latency("get_recent_trades", ex.get_recent_trades(symbol, cfg.trades_limit))
            .await?;

        Ok(MarketSnapshot {
            id: SnapshotId::new(),
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            exchange: ex.name().to_string(),
            ticker,
            klines,
            order_book: Some(order_book),
            trades: Some(trades),
        })
    }

    /// Compute and persist a fetched snapshot. Returns whether indicators were stored.
    async fn process(&self, symbol: &str, snapshot: MarketSnapshot) -> Result<bool, FeedError> {
        self.set_phase(symbol, SymbolPhase::Computing).await;
        let computed = self.engine.compute_all(&snapshot);
        self.monitor.record_indicator_outcome(symbol, computed.is_ok());
        if let Err(err) = &computed {
            warn!(symbol, error = %err, "Indicator computation failed; storing market data only");
        }

        self.set_phase(symbol, SymbolPhase::Persisting).await;
        let snapshot_id = self.store.save_snapshot(snapshot).await?;
        match computed {
            Ok(set) => {
                self.store.save_indicators(&set).await?;
                self.store
                    .update_cached_indicators(snapshot_id, set.values.clone())
                    .await?;
                debug!(
                    symbol,
                    global = %set.global_signal(),
                    last_close = ?set.last_close,
                    "Indicators updated"
                );
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn attempt(&self, symbol: &str, attempt: u32) -> Attempt {
        self.set_phase(symbol, SymbolPhase::Fetching).await;

        let result = match self.fetch(symbol).await {
            Ok(snapshot) => {
                let snapshot_id = snapshot.id;
                self.process(symbol, snapshot)
                    .await
                    .map(|indicators_saved| (snapshot_id, indicators_saved))
            }
            Err(err) => Err(FeedError::Exchange(err)),
        };

        let Some(state) = self.states.get(symbol) else {
            return Attempt::Done(SymbolOutcome::Failed {
                symbol: symbol.to_string(),
                attempts: attempt + 1,
                error: "unknown symbol".to_string(),
            });
        };
        let mut state = state.lock().await;

        match result {
            Ok((snapshot_id, indicators_saved)) => {
                state.record_success(Utc::now());
                Attempt::Done(SymbolOutcome::Updated {
                    symbol: symbol.to_string(),
                    snapshot_id,
                    indicators_saved,
                    attempts: attempt + 1,
                })
            }
            Err(err) => {
                let attempts = attempt + 1;
                if attempts < self.config.retry.max_retries {
                    let delay = self.config.retry.delay(attempt);
                    let until = chrono::Duration::from_std(delay)
                        .ok()
                        .map(|d| Utc::now() + d);
                    state.record_failure(err.to_string(), until);
                    warn!(
                        symbol,
                        attempt = attempts,
                        max_retries = self.config.retry.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Update failed, backing off"
                    );
                    Attempt::Retry(delay)
                } else {
                    state.record_failure(err.to_string(), None);
                    error!(
                        symbol,
                        attempts,
                        consecutive_errors = state.consecutive_errors,
                        error = %err,
                        "Retries exhausted; symbol failed for this cycle"
                    );
                    Attempt::Done(SymbolOutcome::Failed {
                        symbol: symbol.to_string(),
                        attempts,
                        error: err.to_string(),
                    })
                }
            }
        }
    }

    async fn update_symbol(&self, symbol: &str) -> SymbolOutcome {
        let mut attempt = 0;
        loop {
            match self.attempt(symbol, attempt).await {
                Attempt::Done(outcome) => return outcome,
                Attempt::Retry(delay) => {
                    if self.pause(delay).await {
                        self.set_phase(symbol, SymbolPhase::Idle).await;
                        return SymbolOutcome::Cancelled {
                            symbol: symbol.to_string(),
                        };
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Run one update cycle over every symbol.
    pub async fn run_cycle(&self) -> Result<CycleReport, SchedulerError> {
        if let Some(err) = self.halted.get() {
            return Err(err.clone());
        }

        if !self.monitor.is_healthy() {
            let summary = self.monitor.health_summary();
            warn!(
                status = %summary.status,
                error_rate = summary.recent_error_rate,
                consecutive_failures = summary.consecutive_failures,
                "Exchange unhealthy, skipping update cycle"
            );
            return Ok(CycleReport::Skipped {
                reason: format!(
                    "status {}, error rate {:.2}, {} consecutive failures",
                    summary.status, summary.recent_error_rate, summary.consecutive_failures
                ),
            });
        }

        let started = Instant::now();
        let outcomes = join_all(self.config.symbols.iter().map(|s| self.update_symbol(s))).await;

        match self.store.cleanup_expired_cache(Utc::now()).await {
            Ok(Some(report)) => info!(
                caches_reset = report.caches_reset,
                indicators_deleted = report.indicators_deleted,
                snapshots_deleted = report.snapshots_deleted,
                "Cache sweep finished"
            ),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "Cache sweep failed"),
        }

        let report = CycleReport::Completed { outcomes };
        info!(
            updated = report.updated(),
            failed = report.failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Update cycle finished"
        );
        Ok(report)
    }

    async fn halt(&self, err: SchedulerError) -> SchedulerError {
        let _ = self.halted.set(err.clone());
        for state in self.states.values() {
            state.lock().await.enter(SymbolPhase::Halted);
        }
        error!(error = %err, "Halting until restarted");
        err
    }

    /// Cycle loop. Returns `Ok` on shutdown and an error once the halt policy trips.
    ///
    /// A cycle where every symbol failed counts toward `max_consecutive_errors`.
    /// Skipped cycles leave that count alone, but the gate may only stay
    /// closed for `max_unhealthy` before the scheduler halts.
    pub async fn run(self: Arc<Self>) -> Result<(), SchedulerError> {
        info!(
            symbols = ?self.config.symbols,
            interval = %self.config.interval,
            update_interval_secs = self.config.update_interval.as_secs(),
            exchange = self.exchange.name(),
            "Update scheduler running"
        );
        let mut failed_cycles = 0u32;
        let mut unhealthy_since: Option<Instant> = None;

        loop {
            if self.shutdown_requested() {
                break;
            }

            let report = self.run_cycle().await?;
            let wait = match &report {
                CycleReport::Skipped { reason } => {
                    let unhealthy = unhealthy_since.get_or_insert_with(Instant::now).elapsed();
                    if self.config.halt.should_halt_unhealthy(unhealthy) {
                        let err = SchedulerError::Unhealthy {
                            unhealthy_secs: unhealthy.as_secs(),
                        };
                        return Err(self.halt(err).await);
                    }
                    debug!(%reason, unhealthy_secs = unhealthy.as_secs(), "Waiting for the health gate");
                    self.config.update_interval
                }
                CycleReport::Completed { .. } if report.all_failed() => {
                    unhealthy_since = None;
                    failed_cycles += 1;
                    if self.config.halt.should_halt(failed_cycles) {
                        return Err(self.halt(SchedulerError::Halted { failed_cycles }).await);
                    }
                    let wait = self.config.halt.delay(failed_cycles);
                    warn!(
                        failed_cycles,
                        wait_secs = wait.as_secs(),
                        "Every symbol failed this cycle"
                    );
                    wait
                }
                CycleReport::Completed { .. } => {
                    unhealthy_since = None;
                    failed_cycles = 0;
                    self.config.update_interval
                }
            };

            if self.pause(wait).await {
                break;
            }
        }

        info!("Update scheduler stopped");
        Ok(())
    }
}
