//! Core traits for the market-data pipeline.

mod exchange;
mod indicator;
mod store;

pub use exchange::ExchangeClient;
pub use indicator::{Indicator, MultiOutputIndicator, OhlcvIndicator};
pub use store::MarketStore;
