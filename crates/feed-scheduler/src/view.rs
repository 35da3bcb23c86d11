//! Consumer-facing read side.

use chrono::Utc;
use std::sync::Arc;

use feed_core::error::StoreError;
use feed_core::types::{HealthSummary, IndicatorSet};
use feed_monitor::HealthMonitor;
use feed_store::StoreAdapter;

use crate::scheduler::UpdateScheduler;
use crate::state::UpdateState;

/// Read-only facade over the pipeline for the trading loop.
#[derive(Clone)]
pub struct MarketView {
    store: Arc<StoreAdapter>,
    monitor: Arc<HealthMonitor>,
    scheduler: Arc<UpdateScheduler>,
}

impl MarketView {
    pub fn new(
        store: Arc<StoreAdapter>,
        monitor: Arc<HealthMonitor>,
        scheduler: Arc<UpdateScheduler>,
    ) -> Self {
        Self {
            store,
            monitor,
            scheduler,
        }
    }

    /// Newest indicator set for a symbol.
    ///
    /// `None` if nothing was computed yet or the newest set is older than the
    /// cache retention window.
    pub async fn latest_indicators(&self, symbol: &str) -> Result<Option<IndicatorSet>, StoreError> {
        let cutoff = Utc::now() - self.store.policy().cache_retention;
        Ok(self
            .store
            .latest_indicator_set(symbol)
            .await?
            .filter(|set| set.timestamp >= cutoff))
    }

    pub fn health_summary(&self) -> HealthSummary {
        self.monitor.health_summary()
    }

    pub async fn symbol_state(&self, symbol: &str) -> Option<UpdateState> {
        self.scheduler.state(symbol).await
    }

    pub fn is_halted(&self) -> bool {
        self.scheduler.is_halted()
    }
}
