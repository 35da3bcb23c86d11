//! Cache/store adapter over a [`MarketStore`] backend.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use feed_core::error::StoreError;
use feed_core::traits::MarketStore;
use feed_core::types::{
    CacheEntry, IndicatorRecord, IndicatorSet, IndicatorValue, MarketSnapshot, RecordFilter,
    SnapshotId, SnapshotRecord,
};

use crate::legacy::decode_indicator_document;

/// Retention windows for the cache projection and stored history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetentionPolicy {
    /// Age after which a cache entry is stale
    pub cache_retention: Duration,
    /// Age after which history rows are pruned (newest row per symbol kept)
    pub history_retention: Duration,
    /// Minimum spacing between cleanup sweeps
    pub sweep_interval: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            cache_retention: Duration::hours(24),
            history_retention: Duration::days(30),
            sweep_interval: Duration::hours(1),
        }
    }
}

/// Outcome of one cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub caches_reset: usize,
    pub indicators_deleted: usize,
    pub snapshots_deleted: usize,
}

/// Persistence facade used by the scheduler and consumers.
pub struct StoreAdapter {
    store: Arc<dyn MarketStore>,
    policy: RetentionPolicy,
    last_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl StoreAdapter {
    pub fn new(store: Arc<dyn MarketStore>, policy: RetentionPolicy) -> Self {
        Self {
            store,
            policy,
            last_sweep: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Persist a fetched snapshot with an empty cache projection.
    pub async fn save_snapshot(&self, snapshot: MarketSnapshot) -> Result<SnapshotId, StoreError> {
        let id = snapshot.id;
        let symbol = snapshot.symbol.clone();
        self.store.insert_snapshot(SnapshotRecord::new(snapshot)).await?;
        debug!(%symbol, snapshot_id = %id, "Stored market snapshot");
        Ok(id)
    }

    /// Persist an indicator set. Repeated calls for the same snapshot replace the row.
    pub async fn save_indicators(&self, set: &IndicatorSet) -> Result<(), StoreError> {
        self.store
            .upsert_indicators(IndicatorRecord::from_set(set.clone()))
            .await?;
        debug!(symbol = %set.symbol, snapshot_id = %set.snapshot_id, "Stored indicators");
        Ok(())
    }

    pub async fn latest_snapshot(&self, symbol: &str) -> Result<Option<MarketSnapshot>, StoreError> {
        Ok(self
            .store
            .find_latest_snapshot(symbol)
            .await?
            .map(|r| r.snapshot))
    }

    /// Newest indicator sets for a symbol, most recent first.
    pub async fn latest_indicators(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<IndicatorSet>, StoreError> {
        Ok(self
            .store
            .find_latest_indicators(symbol, limit)
            .await?
            .into_iter()
            .map(|r| r.indicators)
            .collect())
    }

    pub async fn latest_indicator_set(&self, symbol: &str) -> Result<Option<IndicatorSet>, StoreError> {
        Ok(self.latest_indicators(symbol, 1).await?.into_iter().next())
    }

    /// Replace the cache projection of a stored snapshot, stamped with the current time.
    pub async fn update_cached_indicators(
        &self,
        snapshot_id: SnapshotId,
        indicators: BTreeMap<String, IndicatorValue>,
    ) -> Result<(), StoreError> {
        let entry = CacheEntry::new(Utc::now().timestamp(), indicators);
        if self.store.update_cache(snapshot_id, entry).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("snapshot {}", snapshot_id)))
        }
    }

    /// Cached indicators of the symbol's latest snapshot, if fresh and non-empty.
    pub async fn cached_indicators(
        &self,
        symbol: &str,
    ) -> Result<Option<BTreeMap<String, IndicatorValue>>, StoreError> {
        self.cached_indicators_at(symbol, Utc::now()).await
    }

    pub async fn cached_indicators_at(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<BTreeMap<String, IndicatorValue>>, StoreError> {
        let retention = self.policy.cache_retention.num_seconds();
        Ok(self
            .store
            .find_latest_snapshot(symbol)
            .await?
            .map(|r| r.cache)
            .filter(|cache| cache.is_fresh(now.timestamp(), retention))
            .map(|cache| cache.indicators))
    }

    /// Cleanup sweep, run at most once per sweep interval.
    ///
    /// Returns `None` when skipped. Stale cache projections are emptied;
    /// indicator rows and snapshots older than the history retention are
    /// deleted except each symbol's newest row.
    pub async fn cleanup_expired_cache(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Option<CleanupReport>, StoreError> {
        let mut last_sweep = self.last_sweep.lock().await;
        if let Some(last) = *last_sweep {
            if now - last < self.policy.sweep_interval {
                return Ok(None);
            }
        }

        let mut report = CleanupReport::default();
        let retention = self.policy.cache_retention.num_seconds();

        for (id, symbol, cache) in self.store.list_cache_entries().await? {
            if !cache.is_empty() && cache.is_stale(now.timestamp(), retention) {
                let cleared = CacheEntry::new(cache.last_update, BTreeMap::new());
                if self.store.update_cache(id, cleared).await? {
                    debug!(%symbol, snapshot_id = %id, "Reset stale cache entry");
                    report.caches_reset += 1;
                }
            }
        }

        let cutoff = now - self.policy.history_retention;
        for symbol in self.store.list_symbols().await? {
            let mut keep_indicators = Vec::new();
            if let Some(newest) = self.store.find_latest_indicators(&symbol, 1).await?.first() {
                keep_indicators.push(newest.snapshot_id);
            }
            let filter = RecordFilter {
                symbol: Some(symbol.clone()),
                before: Some(cutoff),
                ..RecordFilter::default()
            };
            report.indicators_deleted += self
                .store
                .delete_indicators(&filter.clone().excluding(keep_indicators))
                .await?;

            let keep_snapshots: Vec<SnapshotId> = self
                .store
                .find_latest_snapshot(&symbol)
                .await?
                .map(|r| r.id())
                .into_iter()
                .collect();
            report.snapshots_deleted += self
                .store
                .delete_snapshots(&filter.excluding(keep_snapshots))
                .await?;
        }

        *last_sweep = Some(now);
        info!(
            caches_reset = report.caches_reset,
            indicators_deleted = report.indicators_deleted,
            snapshots_deleted = report.snapshots_deleted,
            "Cleanup sweep complete"
        );
        Ok(Some(report))
    }

    /// Snapshots for a symbol in `[start, end)`, oldest first.
    pub async fn historical_snapshots(
        &self,
        symbol: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MarketSnapshot>, StoreError> {
        let filter = RecordFilter {
            symbol: Some(symbol.to_string()),
            from: Some(start),
            before: Some(end),
            ..RecordFilter::default()
        };
        Ok(self
            .store
            .find_snapshots(&filter)
            .await?
            .into_iter()
            .map(|r| r.snapshot)
            .collect())
    }

    /// Import indicator documents (a JSON array or a single object) in any
    /// supported layout. Returns the number of rows written.
    pub async fn import_indicator_documents(&self, json: &str) -> Result<usize, StoreError> {
        let parsed: Value = serde_json::from_str(json)
            .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;
        let documents = match parsed {
            Value::Array(items) => items,
            other => vec![other],
        };

        let records = documents
            .iter()
            .map(decode_indicator_document)
            .collect::<Result<Vec<_>, _>>()?;
        let count = records.len();
        for record in records {
            self.store.upsert_indicators(record).await?;
        }
        info!(count, "Imported indicator documents");
        Ok(count)
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.store.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use feed_core::types::{Bar, Signal, Ticker};
    use rust_decimal::Decimal;

    fn snapshot(symbol: &str, timestamp: DateTime<Utc>) -> MarketSnapshot {
        MarketSnapshot {
            id: SnapshotId::new(),
            symbol: symbol.to_string(),
            timestamp,
            exchange: "test".into(),
            ticker: Ticker {
                symbol: symbol.to_string(),
                price: Decimal::new(100, 0),
                volume_24h: Decimal::ZERO,
                timestamp,
            },
            klines: vec![Bar::new(timestamp.timestamp_millis(), 100.0, 101.0, 99.0, 100.0, 10.0)],
            order_book: None,
            trades: None,
        }
    }

    fn indicator_set(snapshot: &MarketSnapshot, rsi: f64) -> IndicatorSet {
        IndicatorSet {
            symbol: snapshot.symbol.clone(),
            snapshot_id: snapshot.id,
            timestamp: snapshot.timestamp,
            last_close: Some(100.0),
            prev_close: None,
            values: BTreeMap::from([("rsi_14".to_string(), IndicatorValue::scalar(Some(rsi)))]),
            signals: BTreeMap::from([("rsi".to_string(), Signal::Neutral)]),
        }
    }

    fn adapter() -> (Arc<MemoryStore>, StoreAdapter) {
        let store = Arc::new(MemoryStore::new());
        let adapter = StoreAdapter::new(store.clone(), RetentionPolicy::default());
        (store, adapter)
    }

    #[tokio::test]
    async fn test_save_indicators_is_idempotent() {
        let (store, adapter) = adapter();
        let snap = snapshot("BTCUSDT", Utc::now());
        adapter.save_snapshot(snap.clone()).await.unwrap();

        adapter.save_indicators(&indicator_set(&snap, 40.0)).await.unwrap();
        adapter.save_indicators(&indicator_set(&snap, 45.0)).await.unwrap();

        assert_eq!(store.indicator_count().await, 1);
        let latest = adapter.latest_indicator_set("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(latest.values["rsi_14"].as_scalar(), Some(45.0));
    }

    #[tokio::test]
    async fn test_latest_indicators_ordering() {
        let (_, adapter) = adapter();
        let now = Utc::now();
        for (i, rsi) in [30.0, 40.0, 50.0].into_iter().enumerate() {
            let snap = snapshot("BTCUSDT", now + Duration::minutes(i as i64));
            adapter.save_indicators(&indicator_set(&snap, rsi)).await.unwrap();
        }

        let latest = adapter.latest_indicators("BTCUSDT", 2).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].values["rsi_14"].as_scalar(), Some(50.0));
        assert_eq!(latest[1].values["rsi_14"].as_scalar(), Some(40.0));
    }

    #[tokio::test]
    async fn test_cached_indicators_round_trip() {
        let (_, adapter) = adapter();
        let snap = snapshot("BTCUSDT", Utc::now());
        let id = adapter.save_snapshot(snap.clone()).await.unwrap();

        assert!(adapter.cached_indicators("BTCUSDT").await.unwrap().is_none());

        let set = indicator_set(&snap, 55.0);
        adapter.update_cached_indicators(id, set.values.clone()).await.unwrap();
        assert_eq!(
            adapter.cached_indicators("BTCUSDT").await.unwrap(),
            Some(set.values)
        );

        // Past retention the entry is not served
        let later = Utc::now() + Duration::hours(25);
        assert!(adapter
            .cached_indicators_at("BTCUSDT", later)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_cache_unknown_snapshot() {
        let (_, adapter) = adapter();
        let result = adapter
            .update_cached_indicators(SnapshotId::new(), BTreeMap::new())
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sweep_resets_stale_cache_but_keeps_latest_row() {
        let (_, adapter) = adapter();
        let snap = snapshot("BTCUSDT", Utc::now());
        let id = adapter.save_snapshot(snap.clone()).await.unwrap();
        let set = indicator_set(&snap, 60.0);
        adapter.save_indicators(&set).await.unwrap();
        adapter.update_cached_indicators(id, set.values.clone()).await.unwrap();

        let report = adapter
            .cleanup_expired_cache(Utc::now() + Duration::hours(25))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.caches_reset, 1);
        assert!(adapter
            .cached_indicators_at("BTCUSDT", Utc::now())
            .await
            .unwrap()
            .is_none());
        assert!(adapter.latest_indicator_set("BTCUSDT").await.unwrap().is_some());
        assert!(adapter.latest_snapshot("BTCUSDT").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_prunes_history_except_newest() {
        let (store, adapter) = adapter();
        let now = Utc::now();
        for days_ago in [90, 60, 45] {
            let snap = snapshot("BTCUSDT", now - Duration::days(days_ago));
            adapter.save_snapshot(snap.clone()).await.unwrap();
            adapter.save_indicators(&indicator_set(&snap, 50.0)).await.unwrap();
        }
        let recent = snapshot("ETHUSDT", now);
        adapter.save_snapshot(recent.clone()).await.unwrap();

        let report = adapter.cleanup_expired_cache(now).await.unwrap().unwrap();

        assert_eq!(report.indicators_deleted, 2);
        assert_eq!(report.snapshots_deleted, 2);
        assert_eq!(store.snapshot_count().await, 2);
        let newest = adapter.latest_snapshot("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(newest.timestamp, now - Duration::days(45));
    }

    #[tokio::test]
    async fn test_sweep_is_rate_limited() {
        let (_, adapter) = adapter();
        let now = Utc::now();

        assert!(adapter.cleanup_expired_cache(now).await.unwrap().is_some());
        assert!(adapter
            .cleanup_expired_cache(now + Duration::minutes(30))
            .await
            .unwrap()
            .is_none());
        assert!(adapter
            .cleanup_expired_cache(now + Duration::minutes(61))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_historical_snapshots_range() {
        let (_, adapter) = adapter();
        let now = Utc::now();
        for hours_ago in [5, 3, 1] {
            adapter
                .save_snapshot(snapshot("BTCUSDT", now - Duration::hours(hours_ago)))
                .await
                .unwrap();
        }

        let found = adapter
            .historical_snapshots("BTCUSDT", now - Duration::hours(4), now)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(found[0].timestamp < found[1].timestamp);
    }

    #[tokio::test]
    async fn test_import_mixed_layouts() {
        let (store, adapter) = adapter();
        let json = r#"[
            {"symbol": "BTCUSDT", "timestamp": 1709294400, "indicators": {"rsi_14": 40.0}},
            {"symbol": "BTCUSDT", "timestamp": 1709294460, "RSI": 42.0, "MFI": 55.0}
        ]"#;

        assert_eq!(adapter.import_indicator_documents(json).await.unwrap(), 2);
        assert_eq!(store.indicator_count().await, 2);
        let latest = adapter.latest_indicator_set("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(latest.values["rsi_14"].as_scalar(), Some(42.0));

        assert!(matches!(
            adapter.import_indicator_documents("{not json").await,
            Err(StoreError::InvalidDocument(_))
        ));
    }
}
