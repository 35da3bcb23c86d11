//! Core types and traits for the market-data pipeline.
//!
//! This crate provides the foundational building blocks including:
//! - Market data types (Bar, MarketSnapshot, Ticker, OrderBook)
//! - Indicator output types (IndicatorSet, IndicatorValue, Signal)
//! - Store records (SnapshotRecord, IndicatorRecord, CacheEntry)
//! - Exchange health records and summaries
//! - Core traits for indicators, exchange clients and stores

pub mod types;
pub mod traits;
pub mod error;

pub use error::{FeedError, FeedResult};
pub use types::*;
pub use traits::*;
