//! Persisted record shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{IndicatorSet, IndicatorValue, MarketSnapshot, SnapshotId};

/// Cache projection attached to a symbol's latest snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CacheEntry {
    /// Epoch seconds of the last write
    pub last_update: i64,
    pub indicators: BTreeMap<String, IndicatorValue>,
}

impl CacheEntry {
    pub fn new(last_update: i64, indicators: BTreeMap<String, IndicatorValue>) -> Self {
        Self {
            last_update,
            indicators,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.indicators.is_empty()
    }

    /// Older than `retention_secs` at `now` (epoch seconds).
    pub fn is_stale(&self, now: i64, retention_secs: i64) -> bool {
        now - self.last_update > retention_secs
    }

    /// Usable for serving: non-empty and within retention.
    pub fn is_fresh(&self, now: i64, retention_secs: i64) -> bool {
        !self.is_empty() && !self.is_stale(now, retention_secs)
    }
}

/// Stored market snapshot plus its cache projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub snapshot: MarketSnapshot,
    #[serde(default)]
    pub cache: CacheEntry,
}

impl SnapshotRecord {
    pub fn new(snapshot: MarketSnapshot) -> Self {
        Self {
            snapshot,
            cache: CacheEntry::default(),
        }
    }

    pub fn id(&self) -> SnapshotId {
        self.snapshot.id
    }

    pub fn symbol(&self) -> &str {
        &self.snapshot.symbol
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.snapshot.timestamp
    }
}

/// One row of indicator history, keyed by (snapshot id, symbol).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    pub snapshot_id: SnapshotId,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub indicators: IndicatorSet,
}

impl IndicatorRecord {
    pub fn from_set(set: IndicatorSet) -> Self {
        Self {
            snapshot_id: set.snapshot_id,
            symbol: set.symbol.clone(),
            timestamp: set.timestamp,
            indicators: set,
        }
    }
}

/// Selection used by store deletes and range queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    pub symbol: Option<String>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound
    pub before: Option<DateTime<Utc>>,
    /// Records never matched regardless of the other fields
    pub exclude: Vec<SnapshotId>,
}

impl RecordFilter {
    pub fn symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: Some(symbol.into()),
            ..Self::default()
        }
    }

    pub fn older_than(cutoff: DateTime<Utc>) -> Self {
        Self {
            before: Some(cutoff),
            ..Self::default()
        }
    }

    pub fn excluding(mut self, ids: Vec<SnapshotId>) -> Self {
        self.exclude = ids;
        self
    }

    pub fn matches(&self, id: SnapshotId, symbol: &str, timestamp: DateTime<Utc>) -> bool {
        if self.exclude.contains(&id) {
            return false;
        }
        if let Some(s) = &self.symbol {
            if s != symbol {
                return false;
            }
        }
        if let Some(from) = self.from {
            if timestamp < from {
                return false;
            }
        }
        if let Some(before) = self.before {
            if timestamp >= before {
                return false;
            }
        }
        true
    }
}
