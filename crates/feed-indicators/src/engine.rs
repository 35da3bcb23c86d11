//! Indicator engine: computes the full indicator battery for a snapshot.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::debug;

use feed_core::error::IndicatorError;
use feed_core::traits::{Indicator, MultiOutputIndicator, OhlcvIndicator};
use feed_core::types::{
    Bar, IndicatorKind, IndicatorSet, IndicatorValue, MarketSnapshot, OhlcvColumns, Signal,
    SnapshotId, GLOBAL_SIGNAL,
};

use crate::momentum::{Macd, Mfi, Obv, Rsi, Stochastic};
use crate::moving_average::{Ema, Sma};
use crate::signals;
use crate::trend::{Adx, Ichimoku, PivotPoints};
use crate::volatility::{Atr, BollingerBands};

/// Bars required before any of the close-based core indicators is reported.
pub const CORE_WINDOW: usize = 20;

fn defined(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn last_value(series: &[f64]) -> Option<f64> {
    series.last().copied().and_then(defined)
}

/// Close-based block that is all-or-nothing over the core window.
fn is_core(kind: IndicatorKind) -> bool {
    matches!(
        kind,
        IndicatorKind::Sma20
            | IndicatorKind::Ema20
            | IndicatorKind::Rsi14
            | IndicatorKind::Macd
            | IndicatorKind::Bollinger
    )
}

/// Name of the signal an indicator drives, if any.
fn signal_key(kind: IndicatorKind) -> Option<&'static str> {
    match kind {
        IndicatorKind::Rsi14 => Some("rsi"),
        IndicatorKind::Macd => Some("macd"),
        IndicatorKind::Bollinger => Some("bollinger"),
        IndicatorKind::Adx => Some("adx"),
        IndicatorKind::Stochastic => Some("stochastic"),
        IndicatorKind::Mfi14 => Some("mfi"),
        IndicatorKind::Ichimoku => Some("ichimoku"),
        _ => None,
    }
}

/// Computes indicators and signals from OHLCV history.
///
/// Stateless; one engine can be shared across symbols.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    sma: Sma,
    ema: Ema,
    rsi: Rsi,
    macd: Macd,
    bollinger: BollingerBands,
    adx: Adx,
    atr: Atr,
    stochastic: Stochastic,
    obv: Obv,
    mfi: Mfi,
    ichimoku: Ichimoku,
    pivot: PivotPoints,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorEngine {
    /// Engine with the standard parameter set.
    pub fn new() -> Self {
        Self {
            sma: Sma::new(20),
            ema: Ema::new(20),
            rsi: Rsi::new(14),
            macd: Macd::new(),
            bollinger: BollingerBands::new(),
            adx: Adx::new(14),
            atr: Atr::new(14),
            stochastic: Stochastic::new(),
            obv: Obv::new(),
            mfi: Mfi::new(14),
            ichimoku: Ichimoku::new(),
            pivot: PivotPoints::new(),
        }
    }

    /// Compute every indicator for a snapshot.
    ///
    /// Fails only when the kline series itself is malformed. Individual
    /// indicator failures produce undefined values and indeterminate signals.
    pub fn compute_all(&self, snapshot: &MarketSnapshot) -> Result<IndicatorSet, IndicatorError> {
        self.compute_bars(
            &snapshot.symbol,
            snapshot.id,
            snapshot.timestamp,
            &snapshot.klines,
        )
    }

    /// Compute every indicator for a bar series outside of a snapshot.
    pub fn compute_bars(
        &self,
        symbol: &str,
        snapshot_id: SnapshotId,
        timestamp: DateTime<Utc>,
        bars: &[Bar],
    ) -> Result<IndicatorSet, IndicatorError> {
        let columns = OhlcvColumns::from_bars(bars)?;
        let mut values = BTreeMap::new();
        let mut signals = BTreeMap::new();

        for &kind in IndicatorKind::all() {
            let outcome = if is_core(kind) && columns.len() < CORE_WINDOW {
                Err(IndicatorError::InsufficientData {
                    required: CORE_WINDOW,
                    available: columns.len(),
                })
            } else {
                self.evaluate(kind, &columns)
            };

            let (value, signal) = match outcome {
                Ok(result) => result,
                Err(e) => {
                    debug!(symbol, indicator = %kind, error = %e, "Indicator unavailable");
                    (
                        IndicatorValue::undefined(kind),
                        signal_key(kind).map(|_| Signal::Indeterminate),
                    )
                }
            };

            values.insert(kind.key().to_string(), value);
            if let (Some(name), Some(signal)) = (signal_key(kind), signal) {
                signals.insert(name.to_string(), signal);
            }
        }

        let global = signals::global_signal(signals.values());
        signals.insert(GLOBAL_SIGNAL.to_string(), global);

        let closes = &columns.close;
        Ok(IndicatorSet {
            symbol: symbol.to_string(),
            snapshot_id,
            timestamp,
            last_close: last_value(closes),
            prev_close: closes.len().checked_sub(2).and_then(|i| defined(closes[i])),
            values,
            signals,
        })
    }

    /// Compute one indicator for the most recent bar, propagating its error.
    pub fn compute_indicator(
        &self,
        kind: IndicatorKind,
        bars: &[Bar],
    ) -> Result<IndicatorValue, IndicatorError> {
        let columns = OhlcvColumns::from_bars(bars)?;
        self.evaluate(kind, &columns).map(|(value, _)| value)
    }

    fn evaluate(
        &self,
        kind: IndicatorKind,
        columns: &OhlcvColumns,
    ) -> Result<(IndicatorValue, Option<Signal>), IndicatorError> {
        let close = &columns.close;

        let result = match kind {
            IndicatorKind::Sma20 => {
                let value = last_value(&self.sma.calculate(close)?);
                (IndicatorValue::scalar(value), None)
            }
            IndicatorKind::Ema20 => {
                let value = last_value(&self.ema.calculate(close)?);
                (IndicatorValue::scalar(value), None)
            }
            IndicatorKind::Rsi14 => {
                let value = last_value(&self.rsi.calculate(close)?);
                (IndicatorValue::scalar(value), Some(signals::rsi_signal(value)))
            }
            IndicatorKind::Macd => {
                let series = self.macd.calculate(close)?;
                let last = series.last();
                let value = IndicatorValue::Macd {
                    macd: last.and_then(|o| defined(o.macd)),
                    signal: last.and_then(|o| defined(o.signal)),
                    histogram: last.and_then(|o| defined(o.histogram)),
                };
                (value, Some(signals::macd_signal(&series)))
            }
            IndicatorKind::Bollinger => {
                let series = self.bollinger.calculate(close)?;
                let last = series.last();
                let value = IndicatorValue::Bollinger {
                    upper: last.and_then(|o| defined(o.upper)),
                    middle: last.and_then(|o| defined(o.middle)),
                    lower: last.and_then(|o| defined(o.lower)),
                };
                (
                    value,
                    Some(signals::bollinger_signal(last_value(close), last)),
                )
            }
            IndicatorKind::Adx => {
                let series = self.adx.calculate(columns)?;
                let last = series.last();
                let adx = last.and_then(|o| defined(o.adx));
                let plus_di = last.and_then(|o| defined(o.plus_di));
                let minus_di = last.and_then(|o| defined(o.minus_di));
                (
                    IndicatorValue::Adx {
                        adx,
                        plus_di,
                        minus_di,
                    },
                    Some(signals::adx_signal(adx, plus_di, minus_di)),
                )
            }
            IndicatorKind::Atr14 => {
                let value = last_value(&self.atr.calculate(columns)?);
                (IndicatorValue::scalar(value), None)
            }
            IndicatorKind::Stochastic => {
                let series = self.stochastic.calculate(columns)?;
                let last = series.last();
                let k = last.and_then(|o| defined(o.k));
                let d = last.and_then(|o| defined(o.d));
                (
                    IndicatorValue::Stochastic { k, d },
                    Some(signals::oscillator_signal(k)),
                )
            }
            IndicatorKind::Obv => {
                let value = last_value(&self.obv.calculate(columns)?);
                (IndicatorValue::scalar(value), None)
            }
            IndicatorKind::Mfi14 => {
                let value = last_value(&self.mfi.calculate(columns)?);
                (
                    IndicatorValue::scalar(value),
                    Some(signals::oscillator_signal(value)),
                )
            }
            IndicatorKind::Ichimoku => {
                let series = self.ichimoku.calculate(columns)?;
                let last = series.last();
                let tenkan = last.and_then(|o| defined(o.tenkan));
                let kijun = last.and_then(|o| defined(o.kijun));
                (
                    IndicatorValue::Ichimoku {
                        tenkan,
                        kijun,
                        senkou_a: last.and_then(|o| defined(o.senkou_a)),
                        senkou_b: last.and_then(|o| defined(o.senkou_b)),
                        chikou: last.and_then(|o| defined(o.chikou)),
                    },
                    Some(signals::ichimoku_signal(tenkan, kijun)),
                )
            }
            IndicatorKind::PivotPoints => {
                let series = self.pivot.calculate(columns)?;
                let last = series.last();
                (
                    IndicatorValue::Pivot {
                        pivot: last.and_then(|o| defined(o.pivot)),
                        r1: last.and_then(|o| defined(o.r1)),
                        s1: last.and_then(|o| defined(o.s1)),
                        r2: last.and_then(|o| defined(o.r2)),
                        s2: last.and_then(|o| defined(o.s2)),
                    },
                    None,
                )
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar::new(i as i64 * 60_000, c, c * 1.002, c * 0.998, c, 1_000.0 + i as f64))
            .collect()
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + (i as f64 * 0.3).sin() * 5.0 + i as f64 * 0.05)
            .collect()
    }

    fn compute(closes: &[f64]) -> IndicatorSet {
        IndicatorEngine::new()
            .compute_bars("BTCUSDT", SnapshotId::new(), Utc::now(), &bars_from_closes(closes))
            .unwrap()
    }

    #[test]
    fn test_full_history_defines_everything() {
        let set = compute(&wave(60));

        for kind in IndicatorKind::all() {
            let value = set.value(*kind).unwrap();
            let signal = signal_key(*kind).and_then(|name| set.signal(name));
            let has_signal = matches!(signal, Some(s) if s != Signal::Indeterminate);
            assert!(
                value.is_defined() || has_signal,
                "{} undefined with 60 bars",
                kind
            );
        }
        assert_ne!(set.global_signal(), Signal::Indeterminate);
    }

    #[test]
    fn test_short_history_blanks_core_block() {
        let set = compute(&wave(19));

        for kind in [
            IndicatorKind::Sma20,
            IndicatorKind::Ema20,
            IndicatorKind::Rsi14,
            IndicatorKind::Bollinger,
            IndicatorKind::Macd,
        ] {
            assert!(!set.value(kind).unwrap().is_defined(), "{} defined", kind);
        }
        assert_eq!(set.signal("rsi"), Some(Signal::Indeterminate));
        assert_eq!(set.signal("bollinger"), Some(Signal::Indeterminate));
        // Non-core indicators with shorter warm-up still report
        assert!(set.value(IndicatorKind::Atr14).unwrap().is_defined());
        assert!(set.value(IndicatorKind::PivotPoints).unwrap().is_defined());
    }

    #[test]
    fn test_flat_series() {
        let set = compute(&[100.0; 100]);

        assert_eq!(set.value(IndicatorKind::Rsi14).unwrap().as_scalar(), Some(50.0));
        match set.value(IndicatorKind::Macd).unwrap() {
            IndicatorValue::Macd { macd, .. } => assert!(macd.unwrap().abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            *set.value(IndicatorKind::Bollinger).unwrap(),
            IndicatorValue::Bollinger {
                upper: Some(100.0),
                middle: Some(100.0),
                lower: Some(100.0),
            }
        );
        assert_eq!(set.signal("rsi"), Some(Signal::Neutral));
    }

    #[test]
    fn test_empty_series_is_undefined_not_error() {
        let set = compute(&[]);
        assert!(set.values.values().all(|v| !v.is_defined()));
        assert_eq!(set.global_signal(), Signal::Neutral);
        assert_eq!(set.last_close, None);
    }

    #[test]
    fn test_unordered_timestamps_rejected() {
        let mut bars = bars_from_closes(&wave(30));
        bars.swap(3, 4);
        let result = IndicatorEngine::new().compute_bars("BTCUSDT", SnapshotId::new(), Utc::now(), &bars);
        assert!(matches!(result, Err(IndicatorError::InvalidInput(_))));
    }

    #[test]
    fn test_compute_indicator_propagates_errors() {
        let engine = IndicatorEngine::new();
        let bars = bars_from_closes(&wave(10));

        assert_eq!(
            engine.compute_indicator(IndicatorKind::Rsi14, &bars),
            Err(IndicatorError::InsufficientData {
                required: 15,
                available: 10
            })
        );
        assert!(engine
            .compute_indicator(IndicatorKind::PivotPoints, &bars)
            .unwrap()
            .is_defined());
    }

    #[test]
    fn test_compute_all_uses_snapshot_identity() {
        use feed_core::types::{MarketSnapshot, Ticker};
        use rust_decimal::Decimal;

        let snapshot = MarketSnapshot {
            id: SnapshotId::new(),
            symbol: "ETHUSDT".into(),
            timestamp: Utc::now(),
            exchange: "test".into(),
            ticker: Ticker {
                symbol: "ETHUSDT".into(),
                price: Decimal::new(3000, 0),
                volume_24h: Decimal::ZERO,
                timestamp: Utc::now(),
            },
            klines: bars_from_closes(&wave(40)),
            order_book: None,
            trades: None,
        };

        let set = IndicatorEngine::new().compute_all(&snapshot).unwrap();
        assert_eq!(set.snapshot_id, snapshot.id);
        assert_eq!(set.symbol, "ETHUSDT");
        assert_eq!(set.last_close, snapshot.last_close());
    }

    proptest! {
        #[test]
        fn prop_bounded_indicators(closes in prop::collection::vec(1.0f64..1000.0, 20..120)) {
            let set = compute(&closes);

            if let Some(rsi) = set.value(IndicatorKind::Rsi14).and_then(|v| v.as_scalar()) {
                prop_assert!((0.0..=100.0).contains(&rsi));
            }
            if let Some(IndicatorValue::Adx { adx: Some(adx), .. }) = set.value(IndicatorKind::Adx) {
                prop_assert!((0.0..=100.0).contains(adx));
            }
            if let Some(IndicatorValue::Bollinger { upper: Some(u), middle: Some(m), lower: Some(l) }) =
                set.value(IndicatorKind::Bollinger)
            {
                prop_assert!(u >= m && m >= l);
            }
        }
    }
}
