//! Core data types for the market-data pipeline.

mod health;
mod indicator_set;
mod market;
mod ohlcv;
mod store;
mod timeframe;

pub use health::{Alert, HealthRecord, HealthStatus, HealthSummary, MetricKind};
pub use indicator_set::{IndicatorKind, IndicatorSet, IndicatorValue, Signal, Vote, GLOBAL_SIGNAL};
pub use market::{
    MarketSnapshot, OrderBook, PriceLevel, PublicTrade, SnapshotId, Ticker, TradeSide,
};
pub use ohlcv::{Bar, OhlcvColumns};
pub use store::{CacheEntry, IndicatorRecord, RecordFilter, SnapshotRecord};
pub use timeframe::Timeframe;
