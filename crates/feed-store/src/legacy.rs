//! Reader for indicator documents written by older collectors.
//!
//! Two layouts exist in old data: values nested under an `indicators` object,
//! or flattened at the document root next to `symbol` and `timestamp`. Both
//! decode into the canonical [`IndicatorRecord`]; nothing else in the crate
//! looks at the legacy layouts.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

use feed_core::error::StoreError;
use feed_core::types::{
    IndicatorKind, IndicatorRecord, IndicatorSet, IndicatorValue, Signal, SnapshotId,
};

/// Root keys that never hold an indicator.
const RESERVED_KEYS: &[&str] = &["_id", "symbol", "timestamp", "snapshot_id", "signals", "indicators"];

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidDocument(message.into())
}

/// Map a legacy key onto an indicator kind.
fn kind_for_key(key: &str) -> Option<IndicatorKind> {
    let lower = key.to_lowercase();
    if let Ok(kind) = lower.parse::<IndicatorKind>() {
        return Some(kind);
    }
    match lower.as_str() {
        "sma" => Some(IndicatorKind::Sma20),
        "ema" => Some(IndicatorKind::Ema20),
        "rsi" => Some(IndicatorKind::Rsi14),
        "atr" => Some(IndicatorKind::Atr14),
        "mfi" => Some(IndicatorKind::Mfi14),
        "bollinger_bands" | "bb" => Some(IndicatorKind::Bollinger),
        "stoch" => Some(IndicatorKind::Stochastic),
        "pivot" | "pivots" => Some(IndicatorKind::PivotPoints),
        _ => None,
    }
}

fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, StoreError> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| invalid(format!("timestamp {:?}: {}", s, e))),
        Value::Number(n) => {
            let raw = n
                .as_i64()
                .ok_or_else(|| invalid(format!("timestamp {} is not an integer", n)))?;
            // Assume milliseconds if > 10 digits
            let millis = if raw > 10_000_000_000 { raw } else { raw * 1000 };
            DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| invalid(format!("timestamp {} out of range", raw)))
        }
        // Extended JSON export: {"$date": ...}
        Value::Object(obj) => match obj.get("$date") {
            Some(inner) => parse_timestamp(inner),
            None => Err(invalid("timestamp object without $date")),
        },
        _ => Err(invalid("missing or malformed timestamp")),
    }
}

fn number(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).filter(|v| v.is_finite())
}

fn decode_value(kind: IndicatorKind, value: &Value) -> Result<IndicatorValue, StoreError> {
    let obj = match value {
        Value::Null => return Ok(IndicatorValue::undefined(kind)),
        Value::Number(_) => {
            return match kind {
                IndicatorKind::Sma20
                | IndicatorKind::Ema20
                | IndicatorKind::Rsi14
                | IndicatorKind::Atr14
                | IndicatorKind::Obv
                | IndicatorKind::Mfi14 => Ok(IndicatorValue::scalar(number(Some(value)))),
                _ => Err(invalid(format!("{} expects an object", kind))),
            };
        }
        Value::Object(obj) => obj,
        _ => return Err(invalid(format!("{} has an unsupported value", kind))),
    };

    // Already canonical
    if obj.contains_key("kind") {
        return serde_json::from_value(value.clone())
            .map_err(|e| invalid(format!("{}: {}", kind, e)));
    }

    let fields: Map<String, Value> = obj
        .iter()
        .map(|(k, v)| (k.to_lowercase().replace(['+', '%'], ""), v.clone()))
        .collect();
    let get = |names: &[&str]| names.iter().find_map(|n| number(fields.get(*n)));

    Ok(match kind {
        IndicatorKind::Macd => IndicatorValue::Macd {
            macd: get(&["macd", "line"]),
            signal: get(&["signal", "signal_line"]),
            histogram: get(&["histogram", "hist"]),
        },
        IndicatorKind::Bollinger => IndicatorValue::Bollinger {
            upper: get(&["upper", "bb_upper"]),
            middle: get(&["middle", "bb_middle"]),
            lower: get(&["lower", "bb_lower"]),
        },
        IndicatorKind::Adx => IndicatorValue::Adx {
            adx: get(&["adx"]),
            plus_di: get(&["plus_di", "di"]),
            minus_di: get(&["minus_di", "-di"]),
        },
        IndicatorKind::Stochastic => IndicatorValue::Stochastic {
            k: get(&["k"]),
            d: get(&["d"]),
        },
        IndicatorKind::Ichimoku => IndicatorValue::Ichimoku {
            tenkan: get(&["tenkan", "tenkan_sen"]),
            kijun: get(&["kijun", "kijun_sen"]),
            senkou_a: get(&["senkou_a", "senkou_span_a"]),
            senkou_b: get(&["senkou_b", "senkou_span_b"]),
            chikou: get(&["chikou", "chikou_span"]),
        },
        IndicatorKind::PivotPoints => IndicatorValue::Pivot {
            pivot: get(&["pivot", "p"]),
            r1: get(&["r1"]),
            s1: get(&["s1"]),
            r2: get(&["r2"]),
            s2: get(&["s2"]),
        },
        _ => IndicatorValue::scalar(get(&["value"])),
    })
}

fn decode_signals(value: Option<&Value>) -> BTreeMap<String, Signal> {
    let Some(Value::Object(obj)) = value else {
        return BTreeMap::new();
    };
    obj.iter()
        .filter_map(|(name, v)| {
            let signal: Signal = serde_json::from_value(v.clone()).ok()?;
            Some((name.to_lowercase(), signal))
        })
        .collect()
}

/// Decode one stored indicator document, nested or flattened.
///
/// Unknown root keys are ignored. A document without `snapshot_id` gets a
/// fresh id.
pub fn decode_indicator_document(doc: &Value) -> Result<IndicatorRecord, StoreError> {
    let root = doc
        .as_object()
        .ok_or_else(|| invalid("document is not an object"))?;

    let symbol = root
        .get("symbol")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing symbol"))?
        .to_string();
    let timestamp = parse_timestamp(root.get("timestamp").unwrap_or(&Value::Null))?;
    let snapshot_id = match root.get("snapshot_id").and_then(Value::as_str) {
        Some(raw) => SnapshotId(
            Uuid::parse_str(raw).map_err(|e| invalid(format!("snapshot_id {:?}: {}", raw, e)))?,
        ),
        None => SnapshotId::new(),
    };

    let (source, nested) = match root.get("indicators") {
        Some(Value::Object(inner)) => (inner, true),
        Some(_) => return Err(invalid("indicators is not an object")),
        None => (root, false),
    };

    let mut values = BTreeMap::new();
    for (key, value) in source {
        if !nested && RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        if let Some(kind) = kind_for_key(key) {
            values.insert(kind.key().to_string(), decode_value(kind, value)?);
        }
    }
    if values.is_empty() {
        return Err(invalid(format!("no indicators in document for {}", symbol)));
    }

    let indicators = IndicatorSet {
        symbol,
        snapshot_id,
        timestamp,
        last_close: number(root.get("close")),
        prev_close: None,
        values,
        signals: decode_signals(root.get("signals")),
    };
    Ok(IndicatorRecord::from_set(indicators))
}
