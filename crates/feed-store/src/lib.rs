//! Cache/store adapter for market snapshots and indicator history.
//!
//! [`StoreAdapter`] wraps any [`MarketStore`](feed_core::traits::MarketStore)
//! backend and owns the cache-freshness and retention rules. [`MemoryStore`]
//! is the bundled backend.

mod adapter;
pub mod legacy;
mod memory;

pub use adapter::{CleanupReport, RetentionPolicy, StoreAdapter};
pub use legacy::decode_indicator_document;
pub use memory::MemoryStore;
