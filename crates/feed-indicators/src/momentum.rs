//! Momentum and volume indicators.

use feed_core::error::IndicatorError;
use feed_core::traits::{Indicator, MultiOutputIndicator, OhlcvIndicator};
use feed_core::types::OhlcvColumns;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::moving_average::{ema_series, wilder_smooth};
use crate::simd;

/// Relative Strength Index (RSI).
///
/// Measures the speed and magnitude of recent price changes
/// to evaluate overbought or oversold conditions.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
}

impl Rsi {
    /// Create a new RSI indicator.
    ///
    /// Common periods are 14 (default) or 9.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self { period }
    }

    fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_gain.is_nan() || avg_loss.is_nan() {
            return f64::NAN;
        }
        if avg_gain == 0.0 && avg_loss == 0.0 {
            return 50.0;
        }
        if avg_loss == 0.0 {
            return 100.0;
        }
        (100.0 - 100.0 / (1.0 + avg_gain / avg_loss)).clamp(0.0, 100.0)
    }
}

impl Indicator for Rsi {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Result<Vec<f64>, IndicatorError> {
        self.validate_data(data)?;

        // Price changes, undefined at the first bar
        let mut gains = vec![f64::NAN; data.len()];
        let mut losses = vec![f64::NAN; data.len()];
        for i in 1..data.len() {
            let change = data[i] - data[i - 1];
            if change.is_finite() {
                gains[i] = change.max(0.0);
                losses[i] = (-change).max(0.0);
            }
        }

        let avg_gains = wilder_smooth(&gains, 1, self.period);
        let avg_losses = wilder_smooth(&losses, 1, self.period);

        Ok(avg_gains
            .iter()
            .zip(&avg_losses)
            .map(|(&gain, &loss)| Self::rsi_value(gain, loss))
            .collect())
    }

    fn period(&self) -> usize {
        self.period + 1 // Need period+1 data points
    }

    fn name(&self) -> &str {
        "RSI"
    }
}

/// MACD (Moving Average Convergence Divergence) output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MacdOutput {
    /// MACD line (fast EMA - slow EMA)
    pub macd: f64,
    /// Signal line (EMA of MACD)
    pub signal: f64,
    /// Histogram (MACD - Signal)
    pub histogram: f64,
}

/// MACD indicator.
///
/// Uses two EMAs to identify trend direction and momentum.
#[derive(Debug, Clone)]
pub struct Macd {
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
}

impl Macd {
    /// Create a new MACD with default parameters (12, 26, 9).
    pub fn new() -> Self {
        Self::with_periods(12, 26, 9)
    }

    /// Create a MACD with custom periods.
    pub fn with_periods(fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast > 0 && slow > 0 && signal > 0);
        assert!(fast < slow, "Fast period must be less than slow period");
        Self {
            fast_period: fast,
            slow_period: slow,
            signal_period: signal,
        }
    }
}

impl Default for Macd {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiOutputIndicator for Macd {
    type Outputs = MacdOutput;

    fn calculate(&self, data: &[f64]) -> Result<Vec<MacdOutput>, IndicatorError> {
        self.validate_data(data)?;

        let fast_ema = ema_series(data, self.fast_period);
        let slow_ema = ema_series(data, self.slow_period);

        // NaN until the slow EMA is defined
        let macd_line: Vec<f64> = fast_ema
            .iter()
            .zip(&slow_ema)
            .map(|(f, s)| f - s)
            .collect();

        // Seeded at the first defined MACD value
        let signal_line = ema_series(&macd_line, self.signal_period);

        Ok(macd_line
            .iter()
            .zip(&signal_line)
            .map(|(&macd, &signal)| MacdOutput {
                macd,
                signal,
                histogram: macd - signal,
            })
            .collect())
    }

    fn period(&self) -> usize {
        self.slow_period + self.signal_period - 1
    }

    fn name(&self) -> &str {
        "MACD"
    }
}

/// Stochastic oscillator output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StochasticOutput {
    /// %K (fast stochastic)
    pub k: f64,
    /// %D (slow stochastic / signal)
    pub d: f64,
}

/// Stochastic oscillator.
///
/// Compares closing price to the price range over a period.
#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    d_period: usize,
}

impl Stochastic {
    /// Create a new stochastic oscillator with default parameters (14, 3).
    pub fn new() -> Self {
        Self::with_periods(14, 3)
    }

    /// Create with custom periods.
    pub fn with_periods(k_period: usize, d_period: usize) -> Self {
        assert!(k_period > 0 && d_period > 0);
        Self { k_period, d_period }
    }

    fn calculate_hlc(&self, high: &[f64], low: &[f64], close: &[f64]) -> Vec<StochasticOutput> {
        let (highest, _) = simd::rolling_extrema(high, self.k_period);
        let (_, lowest) = simd::rolling_extrema(low, self.k_period);

        let k_values: Vec<f64> = (0..close.len())
            .map(|i| {
                let range = highest[i] - lowest[i];
                if range.is_nan() || close[i].is_nan() {
                    f64::NAN
                } else if range == 0.0 {
                    50.0 // Flat range, use midpoint
                } else {
                    ((close[i] - lowest[i]) / range * 100.0).clamp(0.0, 100.0)
                }
            })
            .collect();

        let d_values = simd::rolling_mean(&k_values, self.d_period);

        k_values
            .into_iter()
            .zip(d_values)
            .map(|(k, d)| StochasticOutput { k, d })
            .collect()
    }

    /// Close-only approximation: close stands in for high and low.
    pub fn calculate_close(&self, close: &[f64]) -> Result<Vec<StochasticOutput>, IndicatorError> {
        self.validate_columns(&[close])?;
        Ok(self.calculate_hlc(close, close, close))
    }
}

impl Default for Stochastic {
    fn default() -> Self {
        Self::new()
    }
}

impl OhlcvIndicator for Stochastic {
    type Output = StochasticOutput;

    fn calculate(&self, bars: &OhlcvColumns) -> Result<Vec<StochasticOutput>, IndicatorError> {
        match self.validate_columns(&[&bars.high, &bars.low, &bars.close]) {
            Ok(()) => Ok(self.calculate_hlc(&bars.high, &bars.low, &bars.close)),
            Err(IndicatorError::InvalidInput(reason)) => {
                debug!(%reason, "Stochastic falling back to close-only approximation");
                self.calculate_close(&bars.close)
            }
            Err(e) => Err(e),
        }
    }

    fn period(&self) -> usize {
        self.k_period + self.d_period - 1
    }

    fn name(&self) -> &str {
        "Stochastic"
    }
}

/// On-Balance Volume (OBV).
///
/// Cumulative volume signed by the direction of the close.
#[derive(Debug, Clone, Default)]
pub struct Obv;

impl Obv {
    pub fn new() -> Self {
        Self
    }
}

impl OhlcvIndicator for Obv {
    type Output = f64;

    fn calculate(&self, bars: &OhlcvColumns) -> Result<Vec<f64>, IndicatorError> {
        self.validate_columns(&[&bars.close, &bars.volume])?;

        let mut result = Vec::with_capacity(bars.len());
        let mut obv = 0.0;
        result.push(obv);

        for i in 1..bars.len() {
            let delta = bars.close[i] - bars.close[i - 1];
            let volume = bars.volume[i];
            if delta.is_finite() && volume.is_finite() {
                if delta > 0.0 {
                    obv += volume;
                } else if delta < 0.0 {
                    obv -= volume;
                }
            }
            result.push(obv);
        }
        Ok(result)
    }

    fn period(&self) -> usize {
        2
    }

    fn name(&self) -> &str {
        "OBV"
    }
}

/// Money Flow Index (MFI).
///
/// Volume-weighted RSI over typical prices.
#[derive(Debug, Clone)]
pub struct Mfi {
    period: usize,
}

impl Mfi {
    /// Create a new MFI indicator.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self { period }
    }

    fn mfi_value(positive: f64, negative: f64) -> f64 {
        if positive.is_nan() || negative.is_nan() {
            return f64::NAN;
        }
        if positive == 0.0 && negative == 0.0 {
            return 50.0;
        }
        if negative == 0.0 {
            return 100.0;
        }
        (100.0 - 100.0 / (1.0 + positive / negative)).clamp(0.0, 100.0)
    }
}

impl OhlcvIndicator for Mfi {
    type Output = f64;

    fn calculate(&self, bars: &OhlcvColumns) -> Result<Vec<f64>, IndicatorError> {
        self.validate_columns(&[&bars.high, &bars.low, &bars.close, &bars.volume])?;

        let typical = bars.typical_prices();
        let len = typical.len();
        let mut positive = vec![f64::NAN; len];
        let mut negative = vec![f64::NAN; len];

        for i in 1..len {
            let diff = typical[i] - typical[i - 1];
            let flow = typical[i] * bars.volume[i];
            if !diff.is_finite() || !flow.is_finite() {
                continue;
            }
            positive[i] = if diff > 0.0 { flow } else { 0.0 };
            negative[i] = if diff < 0.0 { flow } else { 0.0 };
        }

        let positive_sum = simd::rolling_sum(&positive, self.period);
        let negative_sum = simd::rolling_sum(&negative, self.period);

        Ok(positive_sum
            .iter()
            .zip(&negative_sum)
            .map(|(&p, &n)| Self::mfi_value(p, n))
            .collect())
    }

    fn period(&self) -> usize {
        self.period + 1
    }

    fn name(&self) -> &str {
        "MFI"
    }
}
