//! Signal derivation from the most recent indicator values.

use feed_core::types::{Signal, Vote};

use crate::momentum::MacdOutput;
use crate::volatility::BollingerOutput;

/// RSI threshold for oversold.
pub const RSI_OVERSOLD: f64 = 30.0;
/// RSI threshold for overbought.
pub const RSI_OVERBOUGHT: f64 = 70.0;
/// Stochastic/MFI threshold for oversold.
pub const OSCILLATOR_OVERSOLD: f64 = 20.0;
/// Stochastic/MFI threshold for overbought.
pub const OSCILLATOR_OVERBOUGHT: f64 = 80.0;
/// ADX level above which a trend counts as strong.
pub const ADX_STRONG_TREND: f64 = 25.0;

fn band_signal(value: Option<f64>, oversold: f64, overbought: f64) -> Signal {
    match value {
        Some(v) if v < oversold => Signal::Oversold,
        Some(v) if v > overbought => Signal::Overbought,
        Some(_) => Signal::Neutral,
        None => Signal::Indeterminate,
    }
}

pub fn rsi_signal(rsi: Option<f64>) -> Signal {
    band_signal(rsi, RSI_OVERSOLD, RSI_OVERBOUGHT)
}

/// Stochastic %K and MFI share the 20/80 bands.
pub fn oscillator_signal(value: Option<f64>) -> Signal {
    band_signal(value, OSCILLATOR_OVERSOLD, OSCILLATOR_OVERBOUGHT)
}

/// Crossing of the MACD line over its signal line across the last two bars.
pub fn macd_signal(series: &[MacdOutput]) -> Signal {
    let [prev, last] = match series {
        [.., prev, last] => [prev, last],
        _ => return Signal::Indeterminate,
    };
    let defined = |o: &MacdOutput| o.macd.is_finite() && o.signal.is_finite();
    if !defined(prev) || !defined(last) {
        return Signal::Indeterminate;
    }

    if prev.macd <= prev.signal && last.macd > last.signal {
        Signal::Buy
    } else if prev.macd >= prev.signal && last.macd < last.signal {
        Signal::Sell
    } else {
        Signal::Neutral
    }
}

pub fn bollinger_signal(close: Option<f64>, bands: Option<&BollingerOutput>) -> Signal {
    match (close, bands) {
        (Some(close), Some(b)) if b.upper.is_finite() && b.lower.is_finite() => {
            if b.is_overbought(close) {
                Signal::Overbought
            } else if b.is_oversold(close) {
                Signal::Oversold
            } else {
                Signal::Neutral
            }
        }
        _ => Signal::Indeterminate,
    }
}

pub fn adx_signal(adx: Option<f64>, plus_di: Option<f64>, minus_di: Option<f64>) -> Signal {
    match (adx, plus_di, minus_di) {
        (Some(adx), Some(plus), Some(minus)) => {
            if adx > ADX_STRONG_TREND && plus > minus {
                Signal::StrongUptrend
            } else if adx > ADX_STRONG_TREND && minus > plus {
                Signal::StrongDowntrend
            } else {
                Signal::NoStrongTrend
            }
        }
        _ => Signal::Indeterminate,
    }
}

pub fn ichimoku_signal(tenkan: Option<f64>, kijun: Option<f64>) -> Signal {
    match (tenkan, kijun) {
        (Some(t), Some(k)) if t > k => Signal::Bullish,
        (Some(_), Some(_)) => Signal::Bearish,
        _ => Signal::Indeterminate,
    }
}

/// Majority vote over the individual signals; ties are neutral.
pub fn global_signal<'a>(signals: impl IntoIterator<Item = &'a Signal>) -> Signal {
    let (mut bullish, mut bearish) = (0usize, 0usize);
    for signal in signals {
        match signal.vote() {
            Some(Vote::Bullish) => bullish += 1,
            Some(Vote::Bearish) => bearish += 1,
            None => {}
        }
    }

    if bullish > bearish {
        Signal::Bullish
    } else if bearish > bullish {
        Signal::Bearish
    } else {
        Signal::Neutral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn macd(macd: f64, signal: f64) -> MacdOutput {
        MacdOutput {
            macd,
            signal,
            histogram: macd - signal,
        }
    }

    #[test]
    fn test_rsi_thresholds() {
        assert_eq!(rsi_signal(Some(25.0)), Signal::Oversold);
        assert_eq!(rsi_signal(Some(75.0)), Signal::Overbought);
        assert_eq!(rsi_signal(Some(30.0)), Signal::Neutral);
        assert_eq!(rsi_signal(None), Signal::Indeterminate);
    }

    #[test]
    fn test_oscillator_thresholds() {
        assert_eq!(oscillator_signal(Some(10.0)), Signal::Oversold);
        assert_eq!(oscillator_signal(Some(85.0)), Signal::Overbought);
        assert_eq!(oscillator_signal(Some(50.0)), Signal::Neutral);
    }

    #[test]
    fn test_macd_cross() {
        assert_eq!(macd_signal(&[macd(-1.0, 0.0), macd(1.0, 0.0)]), Signal::Buy);
        assert_eq!(macd_signal(&[macd(1.0, 0.0), macd(-1.0, 0.0)]), Signal::Sell);
        assert_eq!(macd_signal(&[macd(1.0, 0.0), macd(2.0, 0.0)]), Signal::Neutral);
        assert_eq!(
            macd_signal(&[macd(f64::NAN, 0.0), macd(1.0, 0.0)]),
            Signal::Indeterminate
        );
        assert_eq!(macd_signal(&[macd(1.0, 0.0)]), Signal::Indeterminate);
    }

    #[test]
    fn test_bollinger_signal() {
        let bands = BollingerOutput {
            upper: 110.0,
            middle: 100.0,
            lower: 90.0,
        };
        assert_eq!(bollinger_signal(Some(111.0), Some(&bands)), Signal::Overbought);
        assert_eq!(bollinger_signal(Some(89.0), Some(&bands)), Signal::Oversold);
        assert_eq!(bollinger_signal(Some(100.0), Some(&bands)), Signal::Neutral);
        assert_eq!(bollinger_signal(None, Some(&bands)), Signal::Indeterminate);
    }

    #[test]
    fn test_adx_signal() {
        assert_eq!(
            adx_signal(Some(30.0), Some(25.0), Some(10.0)),
            Signal::StrongUptrend
        );
        assert_eq!(
            adx_signal(Some(30.0), Some(10.0), Some(25.0)),
            Signal::StrongDowntrend
        );
        assert_eq!(
            adx_signal(Some(20.0), Some(25.0), Some(10.0)),
            Signal::NoStrongTrend
        );
        assert_eq!(adx_signal(None, Some(1.0), Some(1.0)), Signal::Indeterminate);
    }

    #[test]
    fn test_ichimoku_signal() {
        assert_eq!(ichimoku_signal(Some(2.0), Some(1.0)), Signal::Bullish);
        assert_eq!(ichimoku_signal(Some(1.0), Some(1.0)), Signal::Bearish);
        assert_eq!(ichimoku_signal(None, Some(1.0)), Signal::Indeterminate);
    }

    #[test]
    fn test_global_vote() {
        assert_eq!(
            global_signal(&[Signal::Buy, Signal::Oversold, Signal::Overbought]),
            Signal::Bullish
        );
        assert_eq!(
            global_signal(&[Signal::Sell, Signal::Neutral, Signal::StrongDowntrend]),
            Signal::Bearish
        );
        assert_eq!(
            global_signal(&[Signal::Bullish, Signal::Bearish, Signal::Indeterminate]),
            Signal::Neutral
        );
        assert_eq!(global_signal(&[]), Signal::Neutral);
    }
}
