//! In-memory store backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use tokio::sync::RwLock;

use feed_core::error::StoreError;
use feed_core::traits::MarketStore;
use feed_core::types::{CacheEntry, IndicatorRecord, RecordFilter, SnapshotId, SnapshotRecord};

/// Position of a row in its symbol's series: timestamp, then insertion sequence.
type Key = (DateTime<Utc>, u64);

type Series<T> = HashMap<String, BTreeMap<Key, T>>;

#[derive(Default)]
struct Collections {
    snapshots: Series<SnapshotRecord>,
    snapshot_keys: HashMap<SnapshotId, (String, Key)>,
    /// Snapshots whose cache projection is non-empty
    cached: HashSet<SnapshotId>,
    indicators: Series<IndicatorRecord>,
    indicator_keys: HashMap<(SnapshotId, String), Key>,
    seq: u64,
}

impl Collections {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

/// Keys of the rows `filter` selects, using the time bounds to narrow each series.
fn matching_keys<T>(
    series: &Series<T>,
    filter: &RecordFilter,
    id_of: impl Fn(&T) -> SnapshotId,
) -> Vec<(String, Key)> {
    if let (Some(from), Some(before)) = (filter.from, filter.before) {
        if from >= before {
            return Vec::new();
        }
    }
    let bounds = (
        filter.from.map_or(Bound::Unbounded, |from| Bound::Included((from, 0))),
        filter.before.map_or(Bound::Unbounded, |before| Bound::Excluded((before, 0))),
    );

    let mut keys = Vec::new();
    for (symbol, rows) in series {
        if filter.symbol.as_deref().is_some_and(|s| s != symbol) {
            continue;
        }
        for (key, row) in rows.range(bounds) {
            if !filter.exclude.contains(&id_of(row)) {
                keys.push((symbol.clone(), *key));
            }
        }
    }
    keys
}

/// Store keeping one time-ordered series per symbol behind a `tokio::sync::RwLock`.
///
/// Among rows with equal timestamps the one inserted last counts as newest.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub async fn snapshot_count(&self) -> usize {
        self.inner.read().await.snapshot_keys.len()
    }

    /// Number of stored indicator rows.
    pub async fn indicator_count(&self) -> usize {
        self.inner.read().await.indicator_keys.len()
    }
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn insert_snapshot(&self, record: SnapshotRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let id = record.id();
        if inner.snapshot_keys.contains_key(&id) {
            return Err(StoreError::Internal(format!("duplicate snapshot id {}", id)));
        }

        let key = (record.timestamp(), inner.next_seq());
        let symbol = record.symbol().to_string();
        if !record.cache.is_empty() {
            inner.cached.insert(id);
        }
        inner.snapshot_keys.insert(id, (symbol.clone(), key));
        inner.snapshots.entry(symbol).or_default().insert(key, record);
        Ok(())
    }

    async fn find_latest_snapshot(
        &self,
        symbol: &str,
    ) -> Result<Option<SnapshotRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .snapshots
            .get(symbol)
            .and_then(|rows| rows.values().next_back())
            .cloned())
    }

    async fn find_snapshots(
        &self,
        filter: &RecordFilter,
    ) -> Result<Vec<SnapshotRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut found: Vec<SnapshotRecord> = matching_keys(&inner.snapshots, filter, |r| r.id())
            .into_iter()
            .filter_map(|(symbol, key)| inner.snapshots.get(&symbol)?.get(&key).cloned())
            .collect();
        found.sort_by_key(|r| r.timestamp());
        Ok(found)
    }

    async fn update_cache(&self, id: SnapshotId, cache: CacheEntry) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let Some((symbol, key)) = inner.snapshot_keys.get(&id) else {
            return Ok(false);
        };
        let Some(record) = inner.snapshots.get_mut(symbol).and_then(|rows| rows.get_mut(key)) else {
            return Ok(false);
        };

        if cache.is_empty() {
            inner.cached.remove(&id);
        } else {
            inner.cached.insert(id);
        }
        record.cache = cache;
        Ok(true)
    }

    async fn list_cache_entries(
        &self,
    ) -> Result<Vec<(SnapshotId, String, CacheEntry)>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .cached
            .iter()
            .filter_map(|id| {
                let (symbol, key) = inner.snapshot_keys.get(id)?;
                let record = inner.snapshots.get(symbol)?.get(key)?;
                Some((*id, symbol.clone(), record.cache.clone()))
            })
            .collect())
    }

    async fn upsert_indicators(&self, record: IndicatorRecord) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let id = (record.snapshot_id, record.symbol.clone());

        // A replaced row keeps its sequence so ties resolve as before the upsert
        let seq = match inner.indicator_keys.get(&id).copied() {
            Some(old) => {
                if let Some(rows) = inner.indicators.get_mut(&record.symbol) {
                    rows.remove(&old);
                }
                old.1
            }
            None => inner.next_seq(),
        };

        let key = (record.timestamp, seq);
        inner.indicator_keys.insert(id, key);
        inner
            .indicators
            .entry(record.symbol.clone())
            .or_default()
            .insert(key, record);
        Ok(())
    }

    async fn find_latest_indicators(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<IndicatorRecord>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .indicators
            .get(symbol)
            .map(|rows| rows.values().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn delete_indicators(&self, filter: &RecordFilter) -> Result<usize, StoreError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let keys = matching_keys(&inner.indicators, filter, |r| r.snapshot_id);

        let mut deleted = 0;
        for (symbol, key) in keys {
            if let Some(rows) = inner.indicators.get_mut(&symbol) {
                if let Some(record) = rows.remove(&key) {
                    inner.indicator_keys.remove(&(record.snapshot_id, symbol.clone()));
                    deleted += 1;
                }
                if rows.is_empty() {
                    inner.indicators.remove(&symbol);
                }
            }
        }
        Ok(deleted)
    }

    async fn delete_snapshots(&self, filter: &RecordFilter) -> Result<usize, StoreError> {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let keys = matching_keys(&inner.snapshots, filter, |r| r.id());

        let mut deleted = 0;
        for (symbol, key) in keys {
            if let Some(rows) = inner.snapshots.get_mut(&symbol) {
                if let Some(record) = rows.remove(&key) {
                    inner.snapshot_keys.remove(&record.id());
                    inner.cached.remove(&record.id());
                    deleted += 1;
                }
                if rows.is_empty() {
                    inner.snapshots.remove(&symbol);
                }
            }
        }
        Ok(deleted)
    }

    async fn list_symbols(&self) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.read().await;
        let symbols: BTreeSet<String> = inner
            .snapshots
            .keys()
            .chain(inner.indicators.keys())
            .cloned()
            .collect();
        Ok(symbols.into_iter().collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use feed_core::types::{IndicatorSet, IndicatorValue, MarketSnapshot, Ticker};
    use rust_decimal::Decimal;

    fn record(symbol: &str, timestamp: DateTime<Utc>) -> SnapshotRecord {
        SnapshotRecord::new(MarketSnapshot {
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
            klines: Vec::new(),
            order_book: None,
            trades: None,
        })
    }

    fn indicators(snapshot: &SnapshotRecord, timestamp: DateTime<Utc>) -> IndicatorRecord {
        IndicatorRecord::from_set(IndicatorSet {
            symbol: snapshot.symbol().to_string(),
            snapshot_id: snapshot.id(),
            timestamp,
            last_close: None,
            prev_close: None,
            values: BTreeMap::new(),
            signals: BTreeMap::new(),
        })
    }

    fn filled(at: i64) -> CacheEntry {
        CacheEntry::new(
            at,
            BTreeMap::from([("sma_20".to_string(), IndicatorValue::scalar(Some(1.0)))]),
        )
    }

    #[tokio::test]
    async fn test_latest_snapshot_per_symbol() {
        let store = MemoryStore::new();
        let now = Utc::now();
        // Inserted out of order
        for minutes in [5, 1, 9, 3] {
            store.insert_snapshot(record("BTCUSDT", now + Duration::minutes(minutes))).await.unwrap();
        }
        store.insert_snapshot(record("ETHUSDT", now + Duration::minutes(20))).await.unwrap();

        let latest = store.find_latest_snapshot("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(latest.timestamp(), now + Duration::minutes(9));
        assert!(store.find_latest_snapshot("SOLUSDT").await.unwrap().is_none());

        // Equal timestamps: the later insert wins
        let tie = record("BTCUSDT", now + Duration::minutes(9));
        let tie_id = tie.id();
        store.insert_snapshot(tie).await.unwrap();
        let latest = store.find_latest_snapshot("BTCUSDT").await.unwrap().unwrap();
        assert_eq!(latest.id(), tie_id);

        let dup = latest.clone();
        assert!(store.insert_snapshot(dup).await.is_err());
        assert_eq!(store.snapshot_count().await, 6);
    }

    #[tokio::test]
    async fn test_cache_entries_track_non_empty_projections() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = record("BTCUSDT", now);
        let second = record("BTCUSDT", now + Duration::minutes(1));
        let (first_id, second_id) = (first.id(), second.id());
        store.insert_snapshot(first).await.unwrap();
        store.insert_snapshot(second).await.unwrap();
        assert!(store.list_cache_entries().await.unwrap().is_empty());

        assert!(store.update_cache(first_id, filled(1)).await.unwrap());
        assert!(store.update_cache(second_id, filled(2)).await.unwrap());
        assert_eq!(store.list_cache_entries().await.unwrap().len(), 2);

        assert!(store.update_cache(first_id, CacheEntry::default()).await.unwrap());
        let entries = store.list_cache_entries().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, second_id);
        assert_eq!(entries[0].1, "BTCUSDT");

        assert!(!store.update_cache(SnapshotId::new(), filled(3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_deletes_keep_indexes_consistent() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let old = record("BTCUSDT", now - Duration::days(40));
        let recent = record("BTCUSDT", now);
        let old_id = old.id();
        store.insert_snapshot(old.clone()).await.unwrap();
        store.insert_snapshot(recent.clone()).await.unwrap();
        store.update_cache(old_id, filled(1)).await.unwrap();
        store.upsert_indicators(indicators(&old, old.timestamp())).await.unwrap();
        store.upsert_indicators(indicators(&recent, recent.timestamp())).await.unwrap();

        let cutoff = now - Duration::days(30);
        assert_eq!(store.delete_snapshots(&RecordFilter::older_than(cutoff)).await.unwrap(), 1);
        assert_eq!(store.delete_indicators(&RecordFilter::older_than(cutoff)).await.unwrap(), 1);

        assert_eq!(store.snapshot_count().await, 1);
        assert_eq!(store.indicator_count().await, 1);
        assert!(store.list_cache_entries().await.unwrap().is_empty());
        assert!(!store.update_cache(old_id, filled(2)).await.unwrap());
        // The id is free again once deleted
        store.insert_snapshot(old).await.unwrap();

        // Excluded ids survive a matching filter
        let keep = RecordFilter::symbol("BTCUSDT").excluding(vec![recent.id()]);
        store.delete_indicators(&keep).await.unwrap();
        assert_eq!(store.indicator_count().await, 1);
    }

    #[tokio::test]
    async fn test_upsert_moves_row_with_new_timestamp() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let a = record("BTCUSDT", now);
        let b = record("BTCUSDT", now + Duration::minutes(1));
        store.upsert_indicators(indicators(&a, now)).await.unwrap();
        store.upsert_indicators(indicators(&b, now + Duration::minutes(1))).await.unwrap();

        store.upsert_indicators(indicators(&a, now + Duration::minutes(2))).await.unwrap();
        let latest = store.find_latest_indicators("BTCUSDT", 5).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].snapshot_id, a.id());
        assert_eq!(latest[1].snapshot_id, b.id());
    }

    #[tokio::test]
    async fn test_find_snapshots_range() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for minutes in 0..10 {
            store.insert_snapshot(record("BTCUSDT", now + Duration::minutes(minutes))).await.unwrap();
            store.insert_snapshot(record("ETHUSDT", now + Duration::minutes(minutes))).await.unwrap();
        }

        let filter = RecordFilter {
            symbol: Some("BTCUSDT".into()),
            from: Some(now + Duration::minutes(2)),
            before: Some(now + Duration::minutes(5)),
            ..RecordFilter::default()
        };
        let found = store.find_snapshots(&filter).await.unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
        assert!(found.iter().all(|r| r.symbol() == "BTCUSDT"));

        let inverted = RecordFilter {
            from: Some(now + Duration::minutes(5)),
            before: Some(now),
            ..RecordFilter::default()
        };
        assert!(store.find_snapshots(&inverted).await.unwrap().is_empty());
        assert_eq!(store.list_symbols().await.unwrap(), vec!["BTCUSDT", "ETHUSDT"]);
    }
}
