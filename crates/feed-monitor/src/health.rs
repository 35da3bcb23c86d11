//! Exchange health monitor.
//!
//! Every call the scheduler makes to the exchange goes through
//! [`HealthMonitor::measure_latency`], which times it under a hard timeout and
//! appends a record to a bounded buffer. Summaries and alerts are derived from
//! that buffer on demand.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use feed_core::error::{ExchangeError, FeedError};
use feed_core::traits::ExchangeClient;
use feed_core::types::{Alert, HealthRecord, HealthStatus, HealthSummary, MetricKind};

const AVAILABILITY_ENDPOINT: &str = "ping";
const RATE_LIMIT_ENDPOINT: &str = "rate_limit";
const PROBE_ENDPOINT: &str = "get_ticker";

/// Alert thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthThresholds {
    pub latency_ms: f64,
    pub error_rate: f64,
    pub consecutive_failures: u32,
    pub rate_limit_usage: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            latency_ms: 2000.0,
            error_rate: 0.10,
            consecutive_failures: 3,
            rate_limit_usage: 0.80,
        }
    }
}

/// Monitor tuning.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub thresholds: HealthThresholds,
    /// Hard timeout around every measured call
    pub request_timeout: Duration,
    /// Period of the health-check loop
    pub check_interval: Duration,
    /// Period of the health-check loop while the gate is closed
    pub recovery_interval: Duration,
    /// Period of the summary log line
    pub summary_interval: Duration,
    /// Record buffer capacity
    pub capacity: usize,
    /// Most recent measured calls the gate's error rate is taken over
    pub error_window: usize,
    /// Request budget used when the exchange does not report usage
    pub requests_per_minute: u32,
    /// Symbol queried by the latency probe
    pub probe_symbol: String,
    /// Where the loop exports metrics after each summary
    pub metrics_path: Option<std::path::PathBuf>,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            thresholds: HealthThresholds::default(),
            request_timeout: Duration::from_secs(5),
            check_interval: Duration::from_secs(60),
            recovery_interval: Duration::from_secs(5),
            summary_interval: Duration::from_secs(300),
            capacity: 1000,
            error_window: 20,
            requests_per_minute: 600,
            probe_symbol: "BTCUSDT".to_string(),
            metrics_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitState {
    Ok,
    Critical,
}

/// Result of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitStatus {
    pub usage: f64,
    pub status: RateLimitState,
}

/// Health tracker shared by the scheduler and the health-check loop.
pub struct HealthMonitor {
    exchange: Arc<dyn ExchangeClient>,
    settings: MonitorSettings,
    records: Mutex<VecDeque<HealthRecord>>,
    consecutive_failures: AtomicU32,
    /// Consecutive indicator failures per symbol
    indicator_failures: Mutex<HashMap<String, u32>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HealthMonitor {
    pub fn new(exchange: Arc<dyn ExchangeClient>, settings: MonitorSettings) -> Self {
        Self {
            exchange,
            records: Mutex::new(VecDeque::with_capacity(settings.capacity.min(4096))),
            settings,
            consecutive_failures: AtomicU32::new(0),
            indicator_failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn thresholds(&self) -> &HealthThresholds {
        &self.settings.thresholds
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    fn record(&self, record: HealthRecord) {
        let mut records = lock(&self.records);
        records.push_back(record);
        while records.len() > self.settings.capacity {
            records.pop_front();
        }
    }

    /// Copy of the record buffer, oldest first.
    pub fn records(&self) -> Vec<HealthRecord> {
        lock(&self.records).iter().cloned().collect()
    }

    /// Await `call` under the request timeout and record the outcome.
    ///
    /// Returns the call's value with the measured latency.
    pub async fn measure_latency<T, F>(
        &self,
        endpoint: &str,
        call: F,
    ) -> Result<(T, Duration), ExchangeError>
    where
        F: Future<Output = Result<T, ExchangeError>>,
    {
        let timeout = self.settings.request_timeout;
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, call).await;
        let elapsed = started.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        let result = match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(ExchangeError::Timeout {
                endpoint: endpoint.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        match result {
            Ok(value) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                self.record(HealthRecord::new(endpoint, MetricKind::Latency, elapsed_ms));
                if elapsed_ms > self.settings.thresholds.latency_ms {
                    warn!(endpoint, latency_ms = elapsed_ms, "High latency detected");
                } else {
                    debug!(endpoint, latency_ms = elapsed_ms, "Call succeeded");
                }
                Ok((value, elapsed))
            }
            Err(err) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                self.record(HealthRecord::new(endpoint, MetricKind::Error, elapsed_ms));
                if failures >= self.settings.thresholds.consecutive_failures {
                    error!(endpoint, failures, error = %err, "Multiple consecutive failures detected");
                } else {
                    warn!(endpoint, failures, error = %err, "Exchange call failed");
                }
                Err(err)
            }
        }
    }

    /// Probe the exchange with `ping` under the request timeout.
    pub async fn check_availability(&self) -> bool {
        let outcome = tokio::time::timeout(self.settings.request_timeout, self.exchange.ping()).await;
        let available = matches!(outcome, Ok(Ok(())));
        if !available {
            match outcome {
                Ok(Err(err)) => error!(exchange = self.exchange.name(), error = %err, "Exchange unavailable"),
                _ => error!(exchange = self.exchange.name(), "Availability probe timed out"),
            }
        }
        self.record(HealthRecord::new(
            AVAILABILITY_ENDPOINT,
            MetricKind::Availability,
            if available { 1.0 } else { 0.0 },
        ));
        available
    }

    /// Share of the request budget in use.
    ///
    /// Prefers the exchange-reported figure; otherwise counts calls made in
    /// the last minute against `requests_per_minute`.
    pub fn check_rate_limits(&self) -> RateLimitStatus {
        let usage = match self.exchange.rate_limit_usage() {
            Some(usage) => usage,
            None => {
                let since = Utc::now() - ChronoDuration::seconds(60);
                let recent = lock(&self.records)
                    .iter()
                    .filter(|r| matches!(r.kind, MetricKind::Latency | MetricKind::Error))
                    .filter(|r| r.timestamp >= since)
                    .count();
                recent as f64 / f64::from(self.settings.requests_per_minute.max(1))
            }
        };

        let status = if usage >= self.settings.thresholds.rate_limit_usage {
            error!(usage, "Rate limit threshold exceeded");
            RateLimitState::Critical
        } else {
            RateLimitState::Ok
        };
        self.record(HealthRecord::new(RATE_LIMIT_ENDPOINT, MetricKind::RateLimit, usage));
        RateLimitStatus { usage, status }
    }

    /// Track whether indicator computation succeeded for a symbol.
    pub fn record_indicator_outcome(&self, symbol: &str, ok: bool) {
        let mut failures = lock(&self.indicator_failures);
        if ok {
            failures.remove(symbol);
        } else {
            let count = failures.entry(symbol.to_string()).or_insert(0);
            *count += 1;
            if *count >= self.settings.thresholds.consecutive_failures {
                warn!(symbol, failures = *count, "Indicator computation keeps failing");
            }
        }
    }

    fn error_rate_of<'a>(records: impl Iterator<Item = &'a HealthRecord>) -> f64 {
        let (mut ok, mut failed) = (0usize, 0usize);
        for record in records {
            match record.kind {
                MetricKind::Latency => ok += 1,
                MetricKind::Error => failed += 1,
                _ => {}
            }
        }
        if ok + failed == 0 {
            0.0
        } else {
            failed as f64 / (ok + failed) as f64
        }
    }

    fn recent_error_rate_of(records: &VecDeque<HealthRecord>, window: usize) -> f64 {
        Self::error_rate_of(
            records
                .iter()
                .rev()
                .filter(|r| matches!(r.kind, MetricKind::Latency | MetricKind::Error))
                .take(window),
        )
    }

    /// Errors over all measured calls in the buffer.
    pub fn error_rate(&self) -> f64 {
        Self::error_rate_of(lock(&self.records).iter())
    }

    /// Errors over the last `error_window` measured calls; what the gate checks.
    pub fn recent_error_rate(&self) -> f64 {
        Self::recent_error_rate_of(&lock(&self.records), self.settings.error_window)
    }

    fn last_of(records: &VecDeque<HealthRecord>, kind: MetricKind) -> Option<&HealthRecord> {
        records.iter().rev().find(|r| r.kind == kind)
    }

    fn last_probe_failed(records: &VecDeque<HealthRecord>) -> bool {
        Self::last_of(records, MetricKind::Availability).map_or(false, |r| r.value == 0.0)
    }

    /// Conditions currently over threshold.
    pub fn active_alerts(&self) -> Vec<Alert> {
        let thresholds = &self.settings.thresholds;
        let mut alerts = Vec::new();
        {
            let records = lock(&self.records);
            if let Some(last) = Self::last_of(&records, MetricKind::Latency) {
                if last.value > thresholds.latency_ms {
                    alerts.push(Alert::HighLatency {
                        endpoint: last.endpoint.clone(),
                        latency_ms: last.value,
                    });
                }
            }
            let error_rate = Self::recent_error_rate_of(&records, self.settings.error_window);
            if error_rate > thresholds.error_rate {
                alerts.push(Alert::HighErrorRate { error_rate });
            }
            if let Some(last) = Self::last_of(&records, MetricKind::RateLimit) {
                if last.value >= thresholds.rate_limit_usage {
                    alerts.push(Alert::RateLimitExceeded { usage: last.value });
                }
            }
        }

        let count = self.consecutive_failures();
        if count >= thresholds.consecutive_failures {
            alerts.push(Alert::ConsecutiveFailures { count });
        }

        let mut degraded: Vec<(String, u32)> = lock(&self.indicator_failures)
            .iter()
            .filter(|(_, n)| **n >= thresholds.consecutive_failures)
            .map(|(s, n)| (s.clone(), *n))
            .collect();
        degraded.sort();
        alerts.extend(
            degraded
                .into_iter()
                .map(|(symbol, failures)| Alert::IndicatorDegraded { symbol, failures }),
        );
        alerts
    }

    pub fn health_summary(&self) -> HealthSummary {
        let alerts = self.active_alerts();
        let records = lock(&self.records);

        let latencies: Vec<f64> = records
            .iter()
            .filter(|r| r.kind == MetricKind::Latency)
            .map(|r| r.value)
            .collect();
        let errors = records.iter().filter(|r| r.kind == MetricKind::Error).count();
        let (avg, min, max) = if latencies.is_empty() {
            (None, None, None)
        } else {
            let sum: f64 = latencies.iter().sum();
            (
                Some(sum / latencies.len() as f64),
                latencies.iter().copied().reduce(f64::min),
                latencies.iter().copied().reduce(f64::max),
            )
        };

        let probe_failed = Self::last_probe_failed(&records);
        let status = if probe_failed {
            HealthStatus::Critical
        } else if !alerts.is_empty() {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        };

        HealthSummary {
            status,
            available: !probe_failed,
            avg_latency_ms: avg,
            min_latency_ms: min,
            max_latency_ms: max,
            total_requests: latencies.len() + errors,
            error_rate: Self::error_rate_of(records.iter()),
            recent_error_rate: Self::recent_error_rate_of(&records, self.settings.error_window),
            consecutive_failures: self.consecutive_failures(),
            rate_limit_usage: Self::last_of(&records, MetricKind::RateLimit).map(|r| r.value),
            alerts,
        }
    }

    /// Gate consulted by the scheduler before each cycle.
    pub fn is_healthy(&self) -> bool {
        let thresholds = &self.settings.thresholds;
        let records = lock(&self.records);
        !Self::last_probe_failed(&records)
            && Self::recent_error_rate_of(&records, self.settings.error_window) <= thresholds.error_rate
            && self.consecutive_failures() < thresholds.consecutive_failures
    }

    /// Drop records older than `cutoff`. Returns how many were removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        before - records.len()
    }

    /// Write the record buffer to `path` as a JSON array.
    pub fn export_metrics(&self, path: &Path) -> Result<(), FeedError> {
        let records = self.records();
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| FeedError::Serialization(e.to_string()))?;
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, json)?;
        debug!(path = %path.display(), records = records.len(), "Exported metrics");
        Ok(())
    }

    fn log_summary(&self) {
        let summary = self.health_summary();
        info!(
            status = %summary.status,
            available = summary.available,
            avg_latency_ms = ?summary.avg_latency_ms,
            max_latency_ms = ?summary.max_latency_ms,
            total_requests = summary.total_requests,
            error_rate = summary.error_rate,
            consecutive_failures = summary.consecutive_failures,
            rate_limit_usage = ?summary.rate_limit_usage,
            alerts = summary.alerts.len(),
            "Health summary"
        );
        for alert in &summary.alerts {
            warn!(%alert, "Active alert");
        }
        if let Some(path) = &self.settings.metrics_path {
            if let Err(err) = self.export_metrics(path) {
                error!(error = %err, path = %path.display(), "Failed to export metrics");
            }
        }
    }

    /// One pass of the health-check loop.
    pub async fn check_once(&self) {
        if self.check_availability().await {
            let symbol = self.settings.probe_symbol.clone();
            let _ = self
                .measure_latency(PROBE_ENDPOINT, self.exchange.get_ticker(&symbol))
                .await;
        }
        self.check_rate_limits();
    }

    /// Health-check loop; returns once `shutdown` flips to true.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(
            exchange = self.exchange.name(),
            interval_secs = self.settings.check_interval.as_secs(),
            "Health monitor running"
        );
        let mut last_summary = Instant::now();

        loop {
            if *shutdown.borrow() {
                break;
            }

            self.check_once().await;
            if last_summary.elapsed() >= self.settings.summary_interval {
                self.log_summary();
                last_summary = Instant::now();
            }

            let pause = if self.is_healthy() {
                self.settings.check_interval
            } else {
                self.settings.recovery_interval
            };
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.log_summary();
        info!("Health monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use feed_core::types::{Bar, OrderBook, PublicTrade, Ticker, Timeframe};
    use rust_decimal::Decimal;
    use std::sync::atomic::AtomicBool;

    /// Exchange whose ping result can be flipped.
    #[derive(Default)]
    struct MockExchange {
        down: AtomicBool,
        usage: Mutex<Option<f64>>,
        ticker_calls: AtomicU32,
    }

    #[async_trait]
    impl ExchangeClient for MockExchange {
        async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
            self.ticker_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Ticker {
                symbol: symbol.to_string(),
                price: Decimal::ONE,
                volume_24h: Decimal::ZERO,
                timestamp: Utc::now(),
            })
        }

        async fn get_klines(&self, _: &str, _: Timeframe, _: usize) -> Result<Vec<Bar>, ExchangeError> {
            Ok(Vec::new())
        }

        async fn get_order_book(&self, _: &str, _: usize) -> Result<OrderBook, ExchangeError> {
            Ok(OrderBook::default())
        }

        async fn get_recent_trades(&self, _: &str, _: usize) -> Result<Vec<PublicTrade>, ExchangeError> {
            Ok(Vec::new())
        }

        async fn ping(&self) -> Result<(), ExchangeError> {
            if self.down.load(Ordering::SeqCst) {
                Err(ExchangeError::Connection("refused".into()))
            } else {
                Ok(())
            }
        }

        fn rate_limit_usage(&self) -> Option<f64> {
            *self.usage.lock().unwrap()
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn monitor_with(exchange: Arc<MockExchange>, settings: MonitorSettings) -> HealthMonitor {
        HealthMonitor::new(exchange, settings)
    }

    fn monitor() -> (Arc<MockExchange>, HealthMonitor) {
        let exchange = Arc::new(MockExchange::default());
        (exchange.clone(), monitor_with(exchange, MonitorSettings::default()))
    }

    async fn ok_call(monitor: &HealthMonitor) {
        monitor
            .measure_latency("get_klines", async { Ok::<_, ExchangeError>(()) })
            .await
            .unwrap();
    }

    async fn failing_call(monitor: &HealthMonitor) {
        let err = monitor
            .measure_latency("get_klines", async {
                Err::<(), _>(ExchangeError::Connection("reset".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, ExchangeError::Connection("reset".into()));
    }

    #[tokio::test]
    async fn test_success_resets_failure_counter() {
        let (_, monitor) = monitor();
        failing_call(&monitor).await;
        failing_call(&monitor).await;
        assert_eq!(monitor.consecutive_failures(), 2);

        ok_call(&monitor).await;
        assert_eq!(monitor.consecutive_failures(), 0);

        let summary = monitor.health_summary();
        assert_eq!(summary.total_requests, 3);
        assert!((summary.error_rate - 2.0 / 3.0).abs() < 1e-12);
        assert!(summary.avg_latency_ms.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_recorded_as_error() {
        let (_, monitor) = monitor();
        let err = monitor
            .measure_latency("get_ticker", async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, ExchangeError>(())
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            ExchangeError::Timeout {
                endpoint: "get_ticker".into(),
                timeout_ms: 5000
            }
        );
        assert_eq!(monitor.consecutive_failures(), 1);
        let records = monitor.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, MetricKind::Error);
        assert!(records[0].value >= 5000.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_raises_latency_alert() {
        let (_, monitor) = monitor();
        let (_, latency) = monitor
            .measure_latency("get_klines", async {
                tokio::time::sleep(Duration::from_millis(2500)).await;
                Ok::<_, ExchangeError>(())
            })
            .await
            .unwrap();
        assert!(latency >= Duration::from_millis(2500));

        let alerts = monitor.active_alerts();
        assert!(matches!(alerts.as_slice(), [Alert::HighLatency { endpoint, .. }] if endpoint == "get_klines"));
        assert_eq!(monitor.health_summary().status, HealthStatus::Warning);
        assert!(monitor.is_healthy());
    }

    #[tokio::test]
    async fn test_gate_closes_on_error_rate() {
        let (_, monitor) = monitor();
        for _ in 0..8 {
            ok_call(&monitor).await;
        }
        failing_call(&monitor).await;
        ok_call(&monitor).await;
        // 1 of 10
        assert!(monitor.is_healthy());

        failing_call(&monitor).await;
        ok_call(&monitor).await;
        // 2 of 12
        assert!(!monitor.is_healthy());
        assert!(monitor
            .active_alerts()
            .iter()
            .any(|a| matches!(a, Alert::HighErrorRate { .. })));
    }

    #[tokio::test]
    async fn test_gate_reopens_after_outage() {
        let (_, monitor) = monitor();
        for _ in 0..6 {
            failing_call(&monitor).await;
        }
        assert!(!monitor.is_healthy());

        for _ in 0..10 {
            ok_call(&monitor).await;
        }
        // 6 of the last 16 calls failed
        assert_eq!(monitor.consecutive_failures(), 0);
        assert!(!monitor.is_healthy());

        for _ in 0..10 {
            ok_call(&monitor).await;
        }
        assert_eq!(monitor.recent_error_rate(), 0.0);
        assert!(monitor.error_rate() > 0.2);
        assert!(monitor.is_healthy());
        assert!(monitor.active_alerts().is_empty());

        let summary = monitor.health_summary();
        assert_eq!(summary.total_requests, 26);
        assert_eq!(summary.recent_error_rate, 0.0);
        assert_eq!(summary.status, HealthStatus::Ok);
    }

    #[tokio::test]
    async fn test_gate_closes_on_consecutive_failures() {
        let exchange = Arc::new(MockExchange::default());
        let settings = MonitorSettings {
            thresholds: HealthThresholds {
                error_rate: 1.0,
                ..HealthThresholds::default()
            },
            ..MonitorSettings::default()
        };
        let monitor = monitor_with(exchange, settings);
        for _ in 0..2 {
            failing_call(&monitor).await;
        }
        assert!(monitor.is_healthy());
        failing_call(&monitor).await;
        assert!(!monitor.is_healthy());
        assert!(monitor
            .active_alerts()
            .contains(&Alert::ConsecutiveFailures { count: 3 }));
    }

    #[tokio::test]
    async fn test_failed_probe_is_critical() {
        let (exchange, monitor) = monitor();
        assert!(monitor.check_availability().await);
        assert!(monitor.health_summary().available);

        exchange.down.store(true, Ordering::SeqCst);
        assert!(!monitor.check_availability().await);
        let summary = monitor.health_summary();
        assert_eq!(summary.status, HealthStatus::Critical);
        assert!(!summary.available);
        assert!(!monitor.is_healthy());

        exchange.down.store(false, Ordering::SeqCst);
        assert!(monitor.check_availability().await);
        assert_eq!(monitor.health_summary().status, HealthStatus::Ok);
    }

    #[tokio::test]
    async fn test_rate_limits_prefer_exchange_figure() {
        let exchange = Arc::new(MockExchange::default());
        let settings = MonitorSettings {
            requests_per_minute: 4,
            ..MonitorSettings::default()
        };
        let monitor = monitor_with(exchange.clone(), settings);

        ok_call(&monitor).await;
        let status = monitor.check_rate_limits();
        assert_eq!(status.usage, 0.25);
        assert_eq!(status.status, RateLimitState::Ok);

        *exchange.usage.lock().unwrap() = Some(0.9);
        let status = monitor.check_rate_limits();
        assert_eq!(status.status, RateLimitState::Critical);
        assert_eq!(monitor.health_summary().rate_limit_usage, Some(0.9));
        assert!(monitor
            .active_alerts()
            .contains(&Alert::RateLimitExceeded { usage: 0.9 }));
    }

    #[tokio::test]
    async fn test_indicator_degradation() {
        let (_, monitor) = monitor();
        for _ in 0..3 {
            monitor.record_indicator_outcome("ETHUSDT", false);
        }
        monitor.record_indicator_outcome("BTCUSDT", false);
        assert_eq!(
            monitor.active_alerts(),
            vec![Alert::IndicatorDegraded {
                symbol: "ETHUSDT".into(),
                failures: 3
            }]
        );
        assert_eq!(monitor.health_summary().status, HealthStatus::Warning);
        // Indicator trouble does not close the fetch gate
        assert!(monitor.is_healthy());

        monitor.record_indicator_outcome("ETHUSDT", true);
        assert!(monitor.active_alerts().is_empty());
    }

    #[tokio::test]
    async fn test_buffer_is_bounded_and_prunable() {
        let exchange = Arc::new(MockExchange::default());
        let settings = MonitorSettings {
            capacity: 5,
            ..MonitorSettings::default()
        };
        let monitor = monitor_with(exchange, settings);
        for _ in 0..8 {
            ok_call(&monitor).await;
        }
        assert_eq!(monitor.records().len(), 5);

        assert_eq!(monitor.prune_before(Utc::now() - ChronoDuration::hours(1)), 0);
        assert_eq!(monitor.prune_before(Utc::now() + ChronoDuration::seconds(1)), 5);
        assert!(monitor.records().is_empty());
    }

    #[tokio::test]
    async fn test_export_metrics() {
        let (_, monitor) = monitor();
        ok_call(&monitor).await;
        failing_call(&monitor).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("metrics.json");
        monitor.export_metrics(&path).unwrap();

        let exported: Vec<HealthRecord> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(exported.len(), 2);
        assert_eq!(exported[1].kind, MetricKind::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_checks_until_shutdown() {
        let exchange = Arc::new(MockExchange::default());
        let settings = MonitorSettings {
            check_interval: Duration::from_secs(10),
            ..MonitorSettings::default()
        };
        let monitor = Arc::new(monitor_with(exchange.clone(), settings));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(monitor.clone().run(rx));
        tokio::time::sleep(Duration::from_secs(25)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(exchange.ticker_calls.load(Ordering::SeqCst), 3);
        let availability = monitor
            .records()
            .iter()
            .filter(|r| r.kind == MetricKind::Availability)
            .count();
        assert_eq!(availability, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_checks_faster_while_unhealthy() {
        let exchange = Arc::new(MockExchange::default());
        exchange.down.store(true, Ordering::SeqCst);
        let monitor = Arc::new(monitor_with(exchange.clone(), MonitorSettings::default()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(monitor.clone().run(rx));
        // Checks at t=0, 5, 10 fail
        tokio::time::sleep(Duration::from_secs(12)).await;
        exchange.down.store(false, Ordering::SeqCst);
        // t=15 succeeds, then back to the normal interval
        tokio::time::sleep(Duration::from_secs(18)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        let probes: Vec<f64> = monitor
            .records()
            .iter()
            .filter(|r| r.kind == MetricKind::Availability)
            .map(|r| r.value)
            .collect();
        assert_eq!(probes, vec![0.0, 0.0, 0.0, 1.0]);
        assert_eq!(exchange.ticker_calls.load(Ordering::SeqCst), 1);
        assert!(monitor.is_healthy());
    }
}
