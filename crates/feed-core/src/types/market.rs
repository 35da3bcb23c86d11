//! Market snapshot types fetched from the exchange collaborator.

use chrono::{DateTime, Utc};
use num_traits::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::Bar;

/// Identifier of a persisted market snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub Uuid);

impl SnapshotId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Last-price ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    /// Last traded price
    pub price: Decimal,
    /// Rolling 24h volume
    pub volume_24h: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Ticker {
    /// Last price as f64, if representable.
    pub fn price_f64(&self) -> Option<f64> {
        self.price.to_f64()
    }
}

/// One price level of an order book side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Order book snapshot, best levels first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OrderBook {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// Exchange-side update time (unix ms)
    pub timestamp: i64,
}

impl OrderBook {
    /// Best bid price.
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first().map(|l| l.price)
    }

    /// Best ask price.
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first().map(|l| l.price)
    }

    /// Spread between best ask and best bid.
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()? - self.best_bid()?)
    }
}

/// Taker side of a public trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Public trade print.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicTrade {
    pub id: String,
    pub price: Decimal,
    pub quantity: Decimal,
    /// Trade time (unix ms)
    pub timestamp: i64,
    pub side: TradeSide,
}

/// Everything fetched for one symbol in one update cycle.
///
/// Immutable once fetched; the scheduler hands it to the store adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub id: SnapshotId,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub ticker: Ticker,
    /// Klines ordered oldest to newest
    pub klines: Vec<Bar>,
    pub order_book: Option<OrderBook>,
    pub trades: Option<Vec<PublicTrade>>,
}

impl MarketSnapshot {
    /// Close of the newest kline.
    pub fn last_close(&self) -> Option<f64> {
        self.klines.last().map(|b| b.close)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_order_book_spread() {
        let book = OrderBook {
            bids: vec![PriceLevel {
                price: dec!(99.5),
                quantity: dec!(2),
            }],
            asks: vec![PriceLevel {
                price: dec!(100.25),
                quantity: dec!(1),
            }],
            timestamp: 0,
        };
        assert_eq!(book.spread(), Some(dec!(0.75)));
        assert_eq!(OrderBook::default().spread(), None);
    }

    #[test]
    fn test_ticker_price_conversion() {
        let ticker = Ticker {
            symbol: "BTCUSDT".into(),
            price: dec!(64250.5),
            volume_24h: dec!(1200),
            timestamp: Utc::now(),
        };
        assert_eq!(ticker.price_f64(), Some(64250.5));
    }

    #[test]
    fn test_snapshot_ids_are_unique() {
        assert_ne!(SnapshotId::new(), SnapshotId::new());
    }
}
