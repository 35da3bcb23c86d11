//! Bybit v5 public market-data client.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::HeaderMap, Client, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use feed_core::error::ExchangeError;
use feed_core::traits::ExchangeClient;
use feed_core::types::{Bar, OrderBook, PriceLevel, PublicTrade, Ticker, Timeframe, TradeSide};

pub const MAINNET_URL: &str = "https://api.bybit.com";
pub const TESTNET_URL: &str = "https://api-testnet.bybit.com";

/// Product category queried on every endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BybitCategory {
    #[default]
    Spot,
    Linear,
    Inverse,
}

impl BybitCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BybitCategory::Spot => "spot",
            BybitCategory::Linear => "linear",
            BybitCategory::Inverse => "inverse",
        }
    }
}

impl fmt::Display for BybitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BybitCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spot" => Ok(BybitCategory::Spot),
            "linear" => Ok(BybitCategory::Linear),
            "inverse" => Ok(BybitCategory::Inverse),
            other => Err(format!("unknown Bybit category: {}", other)),
        }
    }
}

/// Bybit client configuration.
#[derive(Debug, Clone)]
pub struct BybitConfig {
    pub base_url: String,
    pub category: BybitCategory,
    /// Per-request timeout
    pub timeout: Duration,
}

impl BybitConfig {
    pub fn new(base_url: impl Into<String>, category: BybitCategory, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            category,
            timeout,
        }
    }

    /// Testnet endpoint with default settings.
    pub fn testnet() -> Self {
        Self {
            base_url: TESTNET_URL.to_string(),
            ..Self::default()
        }
    }
}

impl Default for BybitConfig {
    fn default() -> Self {
        Self {
            base_url: MAINNET_URL.to_string(),
            category: BybitCategory::Spot,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Kline interval code used by the v5 API.
pub fn bybit_interval(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::Minute1 => "1",
        Timeframe::Minute3 => "3",
        Timeframe::Minute5 => "5",
        Timeframe::Minute15 => "15",
        Timeframe::Minute30 => "30",
        Timeframe::Hour1 => "60",
        Timeframe::Hour2 => "120",
        Timeframe::Hour4 => "240",
        Timeframe::Hour6 => "360",
        Timeframe::Hour12 => "720",
        Timeframe::Daily => "D",
        Timeframe::Weekly => "W",
    }
}

/// Bybit API response types
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    #[serde(default)]
    result: Value,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitTicker {
    symbol: String,
    last_price: String,
    #[serde(rename = "volume24h", default)]
    volume_24h: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BybitOrderBook {
    #[serde(default)]
    b: Vec<[String; 2]>,
    #[serde(default)]
    a: Vec<[String; 2]>,
    #[serde(default)]
    ts: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitTrade {
    exec_id: String,
    price: String,
    size: String,
    side: String,
    time: String,
}

fn parse_decimal(field: &str, raw: &str) -> Result<Decimal, ExchangeError> {
    raw.parse::<Decimal>()
        .map_err(|e| ExchangeError::InvalidResponse(format!("{} {:?}: {}", field, raw, e)))
}

fn parse_f64(field: &str, raw: &str) -> Result<f64, ExchangeError> {
    raw.parse::<f64>()
        .map_err(|e| ExchangeError::InvalidResponse(format!("{} {:?}: {}", field, raw, e)))
}

fn parse_i64(field: &str, raw: &str) -> Result<i64, ExchangeError> {
    raw.parse::<i64>()
        .map_err(|e| ExchangeError::InvalidResponse(format!("{} {:?}: {}", field, raw, e)))
}

/// Kline rows arrive as `[start, open, high, low, close, volume, turnover]` strings.
fn parse_kline(row: &[String]) -> Result<Bar, ExchangeError> {
    if row.len() < 6 {
        return Err(ExchangeError::InvalidResponse(format!(
            "kline row has {} fields",
            row.len()
        )));
    }
    Ok(Bar::new(
        parse_i64("start", &row[0])?,
        parse_f64("open", &row[1])?,
        parse_f64("high", &row[2])?,
        parse_f64("low", &row[3])?,
        parse_f64("close", &row[4])?,
        parse_f64("volume", &row[5])?,
    ))
}

fn parse_levels(levels: &[[String; 2]]) -> Result<Vec<PriceLevel>, ExchangeError> {
    levels
        .iter()
        .map(|[price, qty]| {
            Ok(PriceLevel {
                price: parse_decimal("price", price)?,
                quantity: parse_decimal("quantity", qty)?,
            })
        })
        .collect()
}

/// Used fraction of the request budget from `X-Bapi-Limit` / `X-Bapi-Limit-Status`.
fn usage_from_headers(headers: &HeaderMap) -> Option<f64> {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
    };
    let limit = read("X-Bapi-Limit")?;
    let remaining = read("X-Bapi-Limit-Status")?;
    if limit <= 0.0 {
        return None;
    }
    Some((1.0 - remaining / limit).clamp(0.0, 1.0))
}

/// Public market-data client for Bybit's v5 REST API.
pub struct BybitClient {
    config: BybitConfig,
    client: Client,
    rate_limit: Mutex<Option<f64>>,
}

impl BybitClient {
    /// Create a new Bybit client.
    pub fn new(config: BybitConfig) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::Connection(e.to_string()))?;

        Ok(Self {
            config,
            client,
            rate_limit: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &BybitConfig {
        &self.config
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        debug!(endpoint, ?params, "Bybit request");

        let resp = self
            .client
            .get(&url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExchangeError::Timeout {
                        endpoint: endpoint.to_string(),
                        timeout_ms: self.config.timeout.as_millis() as u64,
                    }
                } else {
                    ExchangeError::Connection(e.to_string())
                }
            })?;

        if let Some(usage) = usage_from_headers(resp.headers()) {
            if let Ok(mut slot) = self.rate_limit.lock() {
                *slot = Some(usage);
            }
        }

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            warn!(endpoint, retry_after_secs, "Bybit rate limit hit");
            return Err(ExchangeError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            return Err(ExchangeError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;

        match envelope.ret_code {
            0 => {}
            // Bybit's "too many visits" code
            10006 => return Err(ExchangeError::RateLimited { retry_after_secs: 1 }),
            code => {
                return Err(ExchangeError::Api {
                    code,
                    message: envelope.ret_msg,
                })
            }
        }

        serde_json::from_value(envelope.result)
            .map_err(|e| ExchangeError::InvalidResponse(format!("{}: {}", endpoint, e)))
    }

    fn category(&self) -> String {
        self.config.category.as_str().to_string()
    }
}

#[async_trait]
impl ExchangeClient for BybitClient {
    async fn get_ticker(&self, symbol: &str) -> Result<Ticker, ExchangeError> {
        let result: ListResult<BybitTicker> = self
            .get(
                "/v5/market/tickers",
                &[("category", self.category()), ("symbol", symbol.to_string())],
            )
            .await?;

        let ticker = result
            .list
            .into_iter()
            .find(|t| t.symbol == symbol)
            .ok_or_else(|| ExchangeError::SymbolNotFound(symbol.to_string()))?;

        let volume_24h = match ticker.volume_24h.as_deref() {
            Some(raw) if !raw.is_empty() => parse_decimal("volume24h", raw)?,
            _ => Decimal::ZERO,
        };

        Ok(Ticker {
            symbol: ticker.symbol,
            price: parse_decimal("lastPrice", &ticker.last_price)?,
            volume_24h,
            timestamp: Utc::now(),
        })
    }

    async fn get_klines(
        &self,
        symbol: &str,
        interval: Timeframe,
        limit: usize,
    ) -> Result<Vec<Bar>, ExchangeError> {
        let result: ListResult<Vec<String>> = self
            .get(
                "/v5/market/kline",
                &[
                    ("category", self.category()),
                    ("symbol", symbol.to_string()),
                    ("interval", bybit_interval(interval).to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        // Newest first on the wire
        let mut bars = result
            .list
            .iter()
            .rev()
            .map(|row| parse_kline(row))
            .collect::<Result<Vec<_>, _>>()?;
        bars.sort_by_key(|b| b.timestamp);
        bars.dedup_by_key(|b| b.timestamp);

        if bars.is_empty() {
            return Err(ExchangeError::NoData(symbol.to_string()));
        }
        Ok(bars)
    }

    async fn get_order_book(&self, symbol: &str, limit: usize) -> Result<OrderBook, ExchangeError> {
        let book: BybitOrderBook = self
            .get(
                "/v5/market/orderbook",
                &[
                    ("category", self.category()),
                    ("symbol", symbol.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        Ok(OrderBook {
            bids: parse_levels(&book.b)?,
            asks: parse_levels(&book.a)?,
            timestamp: book.ts,
        })
    }

    async fn get_recent_trades(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<PublicTrade>, ExchangeError> {
        let result: ListResult<BybitTrade> = self
            .get(
                "/v5/market/recent-trade",
                &[
                    ("category", self.category()),
                    ("symbol", symbol.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        result
            .list
            .into_iter()
            .map(|t| {
                let side = if t.side.eq_ignore_ascii_case("sell") {
                    TradeSide::Sell
                } else {
                    TradeSide::Buy
                };
                Ok(PublicTrade {
                    id: t.exec_id,
                    price: parse_decimal("price", &t.price)?,
                    quantity: parse_decimal("size", &t.size)?,
                    timestamp: parse_i64("time", &t.time)?,
                    side,
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<(), ExchangeError> {
        let _: Value = self.get("/v5/market/time", &[]).await?;
        Ok(())
    }

    fn rate_limit_usage(&self) -> Option<f64> {
        self.rate_limit.lock().ok().and_then(|slot| *slot)
    }

    fn name(&self) -> &str {
        "bybit"
    }
}

impl fmt::Debug for BybitClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BybitClient")
            .field("base_url", &self.config.base_url)
            .field("category", &self.config.category)
            .finish()
    }
}

/// Server time reported by `/v5/market/time`, used by callers that want clock skew.
pub async fn server_time(client: &BybitClient) -> Result<DateTime<Utc>, ExchangeError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct TimeResult {
        time_second: String,
    }
    let result: TimeResult = client.get("/v5/market/time", &[]).await?;
    let secs = parse_i64("timeSecond", &result.time_second)?;
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ExchangeError::InvalidResponse(format!("timeSecond {} out of range", secs)))
}
