//! CSV replay exchange.
//!
//! Serves OHLCV history from CSV files as if it were live: every kline
//! request reveals one more bar. Ticker, order book and trades are
//! synthesized from the current bar.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use feed_core::error::ExchangeError;
use feed_core::traits::ExchangeClient;
use feed_core::types::{Bar, OrderBook, PriceLevel, PublicTrade, Ticker, Timeframe, TradeSide};

/// Half-spread applied around the close for the synthetic book, as a fraction of price.
const HALF_SPREAD: f64 = 0.0005;

/// CSV record format.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(alias = "Date", alias = "date", alias = "timestamp", alias = "Timestamp")]
    date: String,
    #[serde(alias = "Open", alias = "open")]
    open: f64,
    #[serde(alias = "High", alias = "high")]
    high: f64,
    #[serde(alias = "Low", alias = "low")]
    low: f64,
    #[serde(alias = "Close", alias = "close", alias = "Adj Close")]
    close: f64,
    #[serde(alias = "Volume", alias = "volume", default)]
    volume: f64,
}

/// Parse the timestamp formats found in exported OHLCV files into unix ms.
fn parse_timestamp(raw: &str) -> Result<i64, ExchangeError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%d-%m-%Y",
    ];
    for format in formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(dt.and_utc().timestamp_millis());
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, format) {
            return Ok(d.and_time(NaiveTime::MIN).and_utc().timestamp_millis());
        }
    }

    if let Ok(ts) = raw.parse::<i64>() {
        // Assume milliseconds if > 10 digits
        return Ok(if ts > 10_000_000_000 { ts } else { ts * 1000 });
    }

    Err(ExchangeError::InvalidResponse(format!(
        "could not parse date: {}",
        raw
    )))
}

/// Load bars from a CSV file, sorted oldest first with duplicate timestamps dropped.
pub fn load_csv_bars(path: impl AsRef<Path>) -> Result<Vec<Bar>, ExchangeError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ExchangeError::NoData(path.display().to_string()));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| ExchangeError::InvalidResponse(format!("{}: {}", path.display(), e)))?;

    let mut bars = Vec::new();
    for (line, result) in reader.deserialize().enumerate() {
        let record: CsvRecord = result.map_err(|e| {
            ExchangeError::InvalidResponse(format!("{} row {}: {}", path.display(), line + 1, e))
        })?;
        bars.push(Bar::new(
            parse_timestamp(&record.date)?,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume,
        ));
    }

    bars.sort_by_key(|b| b.timestamp);
    let before = bars.len();
    bars.dedup_by_key(|b| b.timestamp);
    if bars.len() < before {
        debug!(path = %path.display(), dropped = before - bars.len(), "Dropped duplicate timestamps");
    }

    Ok(bars)
}

fn to_decimal(value: f64, field: &str) -> Result<Decimal, ExchangeError> {
    Decimal::from_f64_retain(value)
        .map(|d| d.round_dp(8))
        .ok_or_else(|| ExchangeError::InvalidResponse(format!("{} {} is not representable", field, value)))
}

struct Series {
    bars: Vec<Bar>,
    /// Number of bars revealed so far
    cursor: usize,
}

/// Exchange that replays recorded bars, one per kline request.
pub struct CsvReplayExchange {
    series: Mutex<HashMap<String, Series>>,
    warmup: usize,
}

impl CsvReplayExchange {
    /// Empty exchange; `warmup` bars are visible before the first request.
    pub fn new(warmup: usize) -> Self {
        Self {
            series: Mutex::new(HashMap::new()),
            warmup,
        }
    }

    /// Register bars for a symbol.
    pub fn with_bars(self, symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        let cursor = self.warmup.min(bars.len());
        if let Ok(mut series) = self.series.lock() {
            series.insert(symbol.into(), Series { bars, cursor });
        }
        self
    }

    /// Register a CSV file for a symbol.
    pub fn with_csv(self, symbol: impl Into<String>, path: impl AsRef<Path>) -> Result<Self, ExchangeError> {
        let symbol = symbol.into();
        let bars = load_csv_bars(&path)?;
        info!(symbol = %symbol, bars = bars.len(), path = %path.as_ref().display(), "Loaded replay data");
        Ok(self.with_bars(symbol, bars))
    }

    /// Bars revealed so far for a symbol.
    pub fn position(&self, symbol: &str) -> Option<usize> {
        let series = self.series.lock().ok()?;
        series.get(symbol).map(|s| s.cursor)
    }

    fn with_series<T>(
        &self,
        symbol: &str,
        f: impl FnOnce(&mut Series) -> Result<T, ExchangeError>,
    ) -> Result<T, ExchangeError> {
        let mut series = self
            .series
            .lock()
            .map_err(|_| ExchangeError::Connection("replay state poisoned".into()))?;
        let entry = series
            .get_mut(symbol)
            .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))?;
        f(entry)
    }

    fn current_bar(&self, symbol: &str) -> Result<Bar, ExchangeError> {
        self.with_series(symbol, |s| {
            s.cursor
                .checked_sub(1)
                .and_then(|i| s.bars.get(i))
                .copied()
                .ok_or_else(|| ExchangeError::NoData(symbol.to_string()))
        })
    }
}

#[async_trait]
impl ExchangeClient for CsvReplayExchange {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let bar = self.current_bar(symbol)?;
        Ok(Ticker {
            symbol: symbol.to_string(),
            price: to_decimal(bar.close, "close")?,
            volume_24h: to_decimal(bar.volume, "volume")?,
            timestamp: bar.datetime().ok_or_else(|| {
                ExchangeError::InvalidResponse(format!("timestamp {} out of range", bar.timestamp))
            })?,
        })
    }

    async fn get_klines(
        &self,
        symbol: &str,
        _interval: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, ExchangeError> {
        self.with_series(symbol, |s| {
            if s.cursor < s.bars.len() {
                s.cursor += 1;
            }
            if s.cursor == 0 {
                return Err(ExchangeError::NoData(symbol.to_string()));
            }
            let start = s.cursor.saturating_sub(limit);
            Ok(s.bars[start..s.cursor].to_vec())
        })
    }

    async fn get_order_book(&self, symbol: &str, limit: usize) -> Result<OrderBook, ExchangeError> {
        let bar = self.current_bar(symbol)?;
        let depth = limit.clamp(1, 5);
        let level = |offset: f64| -> Result<PriceLevel, ExchangeError> {
            Ok(PriceLevel {
                price: to_decimal(bar.close * (1.0 + offset), "price")?,
                quantity: to_decimal((bar.volume / 100.0).max(0.0), "quantity")?,
            })
        };

        let mut bids = Vec::with_capacity(depth);
        let mut asks = Vec::with_capacity(depth);
        for i in 0..depth {
            let offset = HALF_SPREAD * (i as f64 + 1.0);
            bids.push(level(-offset)?);
            asks.push(level(offset)?);
        }
        Ok(OrderBook {
            bids,
            asks,
            timestamp: bar.timestamp,
        })
    }

    async fn get_recent_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<PublicTrade>, ExchangeError> {
        let bar = self.current_bar(symbol)?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let side = if bar.close >= bar.open {
            TradeSide::Buy
        } else {
            TradeSide::Sell
        };
        Ok(vec![PublicTrade {
            id: format!("{}-{}", symbol, bar.timestamp),
            price: to_decimal(bar.close, "close")?,
            quantity: to_decimal(bar.volume, "volume")?,
            timestamp: bar.timestamp,
            side,
        }])
    }

    async fn ping(&self) -> Result<(), ExchangeError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "csv-replay"
    }
}
