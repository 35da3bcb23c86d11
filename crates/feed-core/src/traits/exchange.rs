//! Exchange collaborator trait.

use async_trait::async_trait;

use crate::error::ExchangeError;
use crate::types::{Bar, OrderBook, PublicTrade, Ticker, Timeframe};

/// Read-only market data source.
///
/// Implementations must return klines ordered oldest to newest.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Latest ticker for a symbol.
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError>;

    /// Up to `limit` most recent klines.
    async fn get_klines(
        &self,
        symbol: &str,
        interval: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, ExchangeError>;

    /// Order book with up to `limit` levels per side.
    async fn get_order_book(&self, symbol: &str, limit: usize) -> Result<OrderBook, ExchangeError>;

    /// Up to `limit` most recent public trades.
    async fn get_recent_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<PublicTrade>, ExchangeError>;

    /// Lightweight availability probe.
    async fn ping(&self) -> Result<(), ExchangeError>;

    /// Fraction of the request budget in use, if the exchange reports it.
    fn rate_limit_usage(&self) -> Option<f64> {
        None
    }

    /// Exchange name.
    fn name(&self) -> &str;
}
