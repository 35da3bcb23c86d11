//! Fixtures shared by the scheduler tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use feed_core::error::ExchangeError;
use feed_core::traits::ExchangeClient;
use feed_core::types::{Bar, OrderBook, PublicTrade, Ticker, Timeframe};
use feed_indicators::IndicatorEngine;
use feed_monitor::{HealthMonitor, HealthThresholds, MonitorSettings};
use feed_store::{MemoryStore, RetentionPolicy, StoreAdapter};
use rust_decimal::Decimal;

use crate::scheduler::{SchedulerConfig, UpdateScheduler};

/// Exchange serving a synthetic series; listed symbols fail until `recover`.
pub(crate) struct MockExchange {
    pub bars: usize,
    pub failing: Mutex<HashSet<String>>,
    pub unordered: bool,
    pub kline_calls: AtomicU32,
}

impl MockExchange {
    pub fn new(bars: usize) -> Self {
        Self {
            bars,
            failing: Mutex::new(HashSet::new()),
            unordered: false,
            kline_calls: AtomicU32::new(0),
        }
    }

    pub fn failing(mut self, symbols: &[&str]) -> Self {
        self.failing = Mutex::new(symbols.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn calls(&self) -> u32 {
        self.kline_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        Ok(Ticker {
            symbol: symbol.to_string(),
            price: Decimal::new(100, 0),
            volume_24h: Decimal::new(1000, 0),
            timestamp: Utc::now(),
        })
    }

    async fn get_klines(
        &self,
        symbol: &str,
        _interval: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, ExchangeError> {
        self.kline_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(symbol) {
            return Err(ExchangeError::Connection("connection reset".into()));
        }
        let mut bars: Vec<Bar> = (0..self.bars.min(limit))
            .map(|i| {
                let c = 100.0 + (i as f64 * 0.3).sin() * 5.0;
                Bar::new(i as i64 * 60_000, c - 0.2, c + 1.0, c - 1.0, c, 50.0 + i as f64)
            })
            .collect();
        if self.unordered {
            bars.reverse();
        }
        Ok(bars)
    }

    async fn get_order_book(&self, _: &str, _: usize) -> Result<OrderBook, ExchangeError> {
        Ok(OrderBook::default())
    }

    async fn get_recent_trades(&self, _: &str, _: usize) -> Result<Vec<PublicTrade>, ExchangeError> {
        Ok(Vec::new())
    }

    async fn ping(&self) -> Result<(), ExchangeError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

pub(crate) struct Harness {
    pub scheduler: Arc<UpdateScheduler>,
    pub exchange: Arc<MockExchange>,
    pub monitor: Arc<HealthMonitor>,
    pub store: Arc<StoreAdapter>,
    pub memory: Arc<MemoryStore>,
    pub shutdown: watch::Sender<bool>,
}

pub(crate) fn harness(exchange: MockExchange, thresholds: HealthThresholds) -> Harness {
    let exchange = Arc::new(exchange);
    let monitor = Arc::new(HealthMonitor::new(
        exchange.clone(),
        MonitorSettings {
            thresholds,
            ..MonitorSettings::default()
        },
    ));
    let memory = Arc::new(MemoryStore::new());
    let store = Arc::new(StoreAdapter::new(memory.clone(), RetentionPolicy::default()));
    let (shutdown, rx) = watch::channel(false);
    let scheduler = Arc::new(UpdateScheduler::new(
        SchedulerConfig::default(),
        exchange.clone(),
        monitor.clone(),
        Arc::new(IndicatorEngine::new()),
        store.clone(),
        rx,
    ));
    Harness {
        scheduler,
        exchange,
        monitor,
        store,
        memory,
        shutdown,
    }
}

/// Thresholds that never close the gate.
pub(crate) fn lenient() -> HealthThresholds {
    HealthThresholds {
        error_rate: 1.0,
        consecutive_failures: u32::MAX,
        ..HealthThresholds::default()
    }
}

