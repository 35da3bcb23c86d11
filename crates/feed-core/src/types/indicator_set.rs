//! Indicator output types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::SnapshotId;

/// Indicators produced by the engine, keyed by their storage name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorKind {
    Sma20,
    Ema20,
    Rsi14,
    Macd,
    Bollinger,
    Adx,
    Atr14,
    Stochastic,
    Obv,
    Mfi14,
    Ichimoku,
    PivotPoints,
}

impl IndicatorKind {
    /// Every indicator, in computation order.
    pub fn all() -> &'static [IndicatorKind] {
        &[
            IndicatorKind::Sma20,
            IndicatorKind::Ema20,
            IndicatorKind::Rsi14,
            IndicatorKind::Macd,
            IndicatorKind::Bollinger,
            IndicatorKind::Adx,
            IndicatorKind::Atr14,
            IndicatorKind::Stochastic,
            IndicatorKind::Obv,
            IndicatorKind::Mfi14,
            IndicatorKind::Ichimoku,
            IndicatorKind::PivotPoints,
        ]
    }

    /// Key used in `IndicatorSet::values`.
    pub fn key(&self) -> &'static str {
        match self {
            IndicatorKind::Sma20 => "sma_20",
            IndicatorKind::Ema20 => "ema_20",
            IndicatorKind::Rsi14 => "rsi_14",
            IndicatorKind::Macd => "macd",
            IndicatorKind::Bollinger => "bollinger",
            IndicatorKind::Adx => "adx",
            IndicatorKind::Atr14 => "atr_14",
            IndicatorKind::Stochastic => "stochastic",
            IndicatorKind::Obv => "obv",
            IndicatorKind::Mfi14 => "mfi_14",
            IndicatorKind::Ichimoku => "ichimoku",
            IndicatorKind::PivotPoints => "pivot_points",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for IndicatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        IndicatorKind::all()
            .iter()
            .copied()
            .find(|k| k.key() == lower)
            .ok_or_else(|| format!("Unknown indicator: {}", s))
    }
}

/// Value of one indicator at the most recent bar.
///
/// `None` means undefined (warm-up not complete, or the span lies beyond the
/// available history). Undefined values are never replaced by a default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndicatorValue {
    Scalar {
        value: Option<f64>,
    },
    Macd {
        macd: Option<f64>,
        signal: Option<f64>,
        histogram: Option<f64>,
    },
    Bollinger {
        upper: Option<f64>,
        middle: Option<f64>,
        lower: Option<f64>,
    },
    Adx {
        adx: Option<f64>,
        plus_di: Option<f64>,
        minus_di: Option<f64>,
    },
    Stochastic {
        k: Option<f64>,
        d: Option<f64>,
    },
    Ichimoku {
        tenkan: Option<f64>,
        kijun: Option<f64>,
        senkou_a: Option<f64>,
        senkou_b: Option<f64>,
        chikou: Option<f64>,
    },
    Pivot {
        pivot: Option<f64>,
        r1: Option<f64>,
        s1: Option<f64>,
        r2: Option<f64>,
        s2: Option<f64>,
    },
}

impl IndicatorValue {
    /// Shorthand for a scalar value.
    pub fn scalar(value: Option<f64>) -> Self {
        IndicatorValue::Scalar { value }
    }

    /// The shape of `kind` with every component undefined.
    pub fn undefined(kind: IndicatorKind) -> Self {
        match kind {
            IndicatorKind::Macd => IndicatorValue::Macd {
                macd: None,
                signal: None,
                histogram: None,
            },
            IndicatorKind::Bollinger => IndicatorValue::Bollinger {
                upper: None,
                middle: None,
                lower: None,
            },
            IndicatorKind::Adx => IndicatorValue::Adx {
                adx: None,
                plus_di: None,
                minus_di: None,
            },
            IndicatorKind::Stochastic => IndicatorValue::Stochastic { k: None, d: None },
            IndicatorKind::Ichimoku => IndicatorValue::Ichimoku {
                tenkan: None,
                kijun: None,
                senkou_a: None,
                senkou_b: None,
                chikou: None,
            },
            IndicatorKind::PivotPoints => IndicatorValue::Pivot {
                pivot: None,
                r1: None,
                s1: None,
                r2: None,
                s2: None,
            },
            _ => IndicatorValue::Scalar { value: None },
        }
    }

    /// The scalar value, if this is a scalar.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            IndicatorValue::Scalar { value } => *value,
            _ => None,
        }
    }

    /// The primary component (e.g. the MACD line, the ADX, %K).
    pub fn primary(&self) -> Option<f64> {
        match *self {
            IndicatorValue::Scalar { value } => value,
            IndicatorValue::Macd { macd, .. } => macd,
            IndicatorValue::Bollinger { middle, .. } => middle,
            IndicatorValue::Adx { adx, .. } => adx,
            IndicatorValue::Stochastic { k, .. } => k,
            IndicatorValue::Ichimoku { tenkan, .. } => tenkan,
            IndicatorValue::Pivot { pivot, .. } => pivot,
        }
    }

    /// Whether at least one component is defined.
    pub fn is_defined(&self) -> bool {
        match *self {
            IndicatorValue::Scalar { value } => value.is_some(),
            IndicatorValue::Macd {
                macd,
                signal,
                histogram,
            } => macd.or(signal).or(histogram).is_some(),
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => upper.or(middle).or(lower).is_some(),
            IndicatorValue::Adx {
                adx,
                plus_di,
                minus_di,
            } => adx.or(plus_di).or(minus_di).is_some(),
            IndicatorValue::Stochastic { k, d } => k.or(d).is_some(),
            IndicatorValue::Ichimoku {
                tenkan,
                kijun,
                senkou_a,
                senkou_b,
                chikou,
            } => tenkan.or(kijun).or(senkou_a).or(senkou_b).or(chikou).is_some(),
            IndicatorValue::Pivot { pivot, .. } => pivot.is_some(),
        }
    }
}

/// Direction a signal votes for in the global aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Bullish,
    Bearish,
}

/// Categorical interpretation of one or more indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Signal {
    #[serde(rename = "oversold")]
    Oversold,
    #[serde(rename = "overbought")]
    Overbought,
    #[serde(rename = "neutral")]
    Neutral,
    #[serde(rename = "indeterminate")]
    Indeterminate,
    #[serde(rename = "buy")]
    Buy,
    #[serde(rename = "sell")]
    Sell,
    #[serde(rename = "strong uptrend")]
    StrongUptrend,
    #[serde(rename = "strong downtrend")]
    StrongDowntrend,
    #[serde(rename = "no strong trend")]
    NoStrongTrend,
    #[serde(rename = "bullish")]
    Bullish,
    #[serde(rename = "bearish")]
    Bearish,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Oversold => "oversold",
            Signal::Overbought => "overbought",
            Signal::Neutral => "neutral",
            Signal::Indeterminate => "indeterminate",
            Signal::Buy => "buy",
            Signal::Sell => "sell",
            Signal::StrongUptrend => "strong uptrend",
            Signal::StrongDowntrend => "strong downtrend",
            Signal::NoStrongTrend => "no strong trend",
            Signal::Bullish => "bullish",
            Signal::Bearish => "bearish",
        }
    }

    /// Vote cast by this signal in the global aggregate.
    pub fn vote(&self) -> Option<Vote> {
        match self {
            Signal::Buy | Signal::Oversold | Signal::StrongUptrend | Signal::Bullish => {
                Some(Vote::Bullish)
            }
            Signal::Sell | Signal::Overbought | Signal::StrongDowntrend | Signal::Bearish => {
                Some(Vote::Bearish)
            }
            Signal::Neutral | Signal::Indeterminate | Signal::NoStrongTrend => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of the aggregated signal in `IndicatorSet::signals`.
pub const GLOBAL_SIGNAL: &str = "global";

/// Indicators and signals derived from one market snapshot.
///
/// Superseded, never merged, by the next set for the same symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub symbol: String,
    pub snapshot_id: SnapshotId,
    pub timestamp: DateTime<Utc>,
    /// Close of the most recent bar
    pub last_close: Option<f64>,
    /// Close of the bar before it
    pub prev_close: Option<f64>,
    pub values: BTreeMap<String, IndicatorValue>,
    pub signals: BTreeMap<String, Signal>,
}

impl IndicatorSet {
    /// Look up an indicator value.
    pub fn value(&self, kind: IndicatorKind) -> Option<&IndicatorValue> {
        self.values.get(kind.key())
    }

    /// Look up a signal by name.
    pub fn signal(&self, name: &str) -> Option<Signal> {
        self.signals.get(name).copied()
    }

    /// The aggregated signal.
    pub fn global_signal(&self) -> Signal {
        self.signal(GLOBAL_SIGNAL).unwrap_or(Signal::Indeterminate)
    }

    /// Human-readable multi-line analysis.
    pub fn summary(&self) -> String {
        let mut lines = vec![format!("=== Technical analysis: {} ===", self.symbol)];

        match (self.last_close, self.prev_close) {
            (Some(last), Some(prev)) if prev != 0.0 => {
                let change = (last - prev) / prev * 100.0;
                lines.push(format!("Price: {:.2} ({:+.2}%)", last, change));
            }
            (Some(last), _) => lines.push(format!("Price: {:.2}", last)),
            _ => lines.push("Price: unavailable".to_string()),
        }

        let signal = |name: &str| self.signal(name).unwrap_or(Signal::Indeterminate);

        match self.value(IndicatorKind::Rsi14).and_then(|v| v.as_scalar()) {
            Some(rsi) => lines.push(format!("RSI: {:.1} - {}", rsi, signal("rsi"))),
            None => lines.push(format!("RSI: n/a - {}", signal("rsi"))),
        }

        if let Some(IndicatorValue::Macd {
            macd: Some(macd),
            signal: Some(line),
            ..
        }) = self.value(IndicatorKind::Macd)
        {
            lines.push(format!(
                "MACD: {:.2} vs signal {:.2} - {}",
                macd,
                line,
                signal("macd")
            ));
        }

        if let Some(IndicatorValue::Bollinger {
            upper: Some(upper),
            middle: Some(middle),
            lower: Some(lower),
        }) = self.value(IndicatorKind::Bollinger)
        {
            let width = if *middle != 0.0 {
                (upper - lower) / middle * 100.0
            } else {
                0.0
            };
            lines.push(format!(
                "Bollinger: {} (width {:.1}%)",
                signal("bollinger"),
                width
            ));
        }

        lines.push(format!("ADX: {}", signal("adx")));
        lines.push(format!("Global: {}", self.global_signal()));
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_serde_uses_spaced_labels() {
        let json = serde_json::to_string(&Signal::StrongUptrend).unwrap();
        assert_eq!(json, "\"strong uptrend\"");
        let back: Signal = serde_json::from_str("\"no strong trend\"").unwrap();
        assert_eq!(back, Signal::NoStrongTrend);
    }

    #[test]
    fn test_signal_votes() {
        assert_eq!(Signal::Oversold.vote(), Some(Vote::Bullish));
        assert_eq!(Signal::Sell.vote(), Some(Vote::Bearish));
        assert_eq!(Signal::Indeterminate.vote(), None);
    }

    #[test]
    fn test_indicator_value_tagged_serialization() {
        let value = IndicatorValue::Stochastic {
            k: Some(42.0),
            d: None,
        };
        let json = serde_json::to_value(value).unwrap();
        assert_eq!(json["kind"], "stochastic");
        assert!(json["d"].is_null());

        let back: IndicatorValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("RSI_14".parse::<IndicatorKind>().unwrap(), IndicatorKind::Rsi14);
        assert!("vwap".parse::<IndicatorKind>().is_err());
    }

    #[test]
    fn test_summary_mentions_values() {
        let mut set = IndicatorSet {
            symbol: "BTCUSDT".into(),
            snapshot_id: SnapshotId::new(),
            timestamp: Utc::now(),
            last_close: Some(101.0),
            prev_close: Some(100.0),
            values: BTreeMap::new(),
            signals: BTreeMap::new(),
        };
        set.values.insert(
            IndicatorKind::Rsi14.key().into(),
            IndicatorValue::scalar(Some(72.5)),
        );
        set.signals.insert("rsi".into(), Signal::Overbought);
        set.signals.insert(GLOBAL_SIGNAL.into(), Signal::Bearish);

        let summary = set.summary();
        assert!(summary.contains("Price: 101.00 (+1.00%)"));
        assert!(summary.contains("RSI: 72.5 - overbought"));
        assert!(summary.contains("Global: bearish"));
    }
}
