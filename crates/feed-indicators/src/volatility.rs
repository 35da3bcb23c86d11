//! Volatility indicators.

use feed_core::error::IndicatorError;
use feed_core::traits::{MultiOutputIndicator, OhlcvIndicator};
use feed_core::types::OhlcvColumns;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::moving_average::wilder_smooth;
use crate::simd;

/// True range per bar, undefined at the first bar.
pub(crate) fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    let len = high.len().min(low.len()).min(close.len());
    let mut tr = vec![f64::NAN; len];
    for i in 1..len {
        let high_low = high[i] - low[i];
        let high_close = (high[i] - close[i - 1]).abs();
        let low_close = (low[i] - close[i - 1]).abs();
        if high_low.is_finite() && high_close.is_finite() && low_close.is_finite() {
            tr[i] = high_low.max(high_close).max(low_close);
        }
    }
    tr
}

/// Average True Range (ATR).
///
/// Measures market volatility by decomposing the entire range
/// of an asset price for that period.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
}

impl Atr {
    /// Create a new ATR indicator.
    ///
    /// Common period is 14.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self { period }
    }

    /// Close-only approximation: close-to-close moves stand in for the true range.
    pub fn calculate_close(&self, close: &[f64]) -> Result<Vec<f64>, IndicatorError> {
        self.validate_columns(&[close])?;

        let mut tr = vec![f64::NAN; close.len()];
        for i in 1..close.len() {
            tr[i] = (close[i] - close[i - 1]).abs();
        }
        Ok(wilder_smooth(&tr, 1, self.period))
    }
}

impl OhlcvIndicator for Atr {
    type Output = f64;

    fn calculate(&self, bars: &OhlcvColumns) -> Result<Vec<f64>, IndicatorError> {
        match self.validate_columns(&[&bars.high, &bars.low, &bars.close]) {
            Ok(()) => {
                let tr = true_range(&bars.high, &bars.low, &bars.close);
                Ok(wilder_smooth(&tr, 1, self.period))
            }
            Err(IndicatorError::InvalidInput(reason)) => {
                debug!(%reason, "ATR falling back to close-only approximation");
                self.calculate_close(&bars.close)
            }
            Err(e) => Err(e),
        }
    }

    fn period(&self) -> usize {
        self.period + 1
    }

    fn name(&self) -> &str {
        "ATR"
    }
}

/// Bollinger Bands output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BollingerOutput {
    /// Upper band
    pub upper: f64,
    /// Middle band (SMA)
    pub middle: f64,
    /// Lower band
    pub lower: f64,
}

impl BollingerOutput {
    /// Check if price is above upper band.
    pub fn is_overbought(&self, price: f64) -> bool {
        price > self.upper
    }

    /// Check if price is below lower band.
    pub fn is_oversold(&self, price: f64) -> bool {
        price < self.lower
    }
}

/// Bollinger Bands.
///
/// Consists of a middle band (SMA) with upper and lower bands
/// at a specified number of sample standard deviations.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    period: usize,
    std_dev_multiplier: f64,
}

impl BollingerBands {
    /// Create new Bollinger Bands with default parameters (20, 2.0).
    pub fn new() -> Self {
        Self::with_params(20, 2.0)
    }

    /// Create Bollinger Bands with custom parameters.
    pub fn with_params(period: usize, std_dev_multiplier: f64) -> Self {
        assert!(period > 1, "Period must be greater than 1");
        assert!(
            std_dev_multiplier > 0.0,
            "Std dev multiplier must be positive"
        );
        Self {
            period,
            std_dev_multiplier,
        }
    }
}

impl Default for BollingerBands {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiOutputIndicator for BollingerBands {
    type Outputs = BollingerOutput;

    fn calculate(&self, data: &[f64]) -> Result<Vec<BollingerOutput>, IndicatorError> {
        self.validate_data(data)?;

        let middle = simd::rolling_mean(data, self.period);
        let std_dev = simd::rolling_sample_std(data, self.period);

        Ok(middle
            .iter()
            .zip(&std_dev)
            .map(|(&mean, &sd)| BollingerOutput {
                upper: mean + self.std_dev_multiplier * sd,
                middle: mean,
                lower: mean - self.std_dev_multiplier * sd,
            })
            .collect())
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "Bollinger Bands"
    }
}
