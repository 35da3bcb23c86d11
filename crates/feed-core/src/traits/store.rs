//! Persistent store collaborator trait.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::types::{CacheEntry, IndicatorRecord, RecordFilter, SnapshotId, SnapshotRecord};

/// Transport and query engine behind the store adapter.
///
/// Mirrors a document store: insert, find, update-with-filter and
/// delete-with-filter over two collections (snapshots and indicators).
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Insert a new snapshot record.
    async fn insert_snapshot(&self, record: SnapshotRecord) -> Result<(), StoreError>;

    /// Most recent snapshot for a symbol.
    async fn find_latest_snapshot(&self, symbol: &str)
        -> Result<Option<SnapshotRecord>, StoreError>;

    /// Snapshots matching the filter, oldest first.
    async fn find_snapshots(&self, filter: &RecordFilter)
        -> Result<Vec<SnapshotRecord>, StoreError>;

    /// Replace the cache projection of a snapshot. Returns false if the id is unknown.
    async fn update_cache(&self, id: SnapshotId, cache: CacheEntry) -> Result<bool, StoreError>;

    /// Non-empty cache projections with their snapshot id and symbol.
    async fn list_cache_entries(&self) -> Result<Vec<(SnapshotId, String, CacheEntry)>, StoreError>;

    /// Insert or replace the row keyed by (snapshot id, symbol).
    async fn upsert_indicators(&self, record: IndicatorRecord) -> Result<(), StoreError>;

    /// Newest indicator rows for a symbol, timestamp descending.
    async fn find_latest_indicators(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<IndicatorRecord>, StoreError>;

    /// Delete indicator rows matching the filter; returns the count.
    async fn delete_indicators(&self, filter: &RecordFilter) -> Result<usize, StoreError>;

    /// Delete snapshots matching the filter; returns the count.
    async fn delete_snapshots(&self, filter: &RecordFilter) -> Result<usize, StoreError>;

    /// Every symbol present in either collection.
    async fn list_symbols(&self) -> Result<Vec<String>, StoreError>;

    /// Connectivity check.
    async fn ping(&self) -> Result<(), StoreError>;
}
