//! Moving average indicators and the smoothing primitives shared by the
//! other indicator families.

use feed_core::error::IndicatorError;
use feed_core::traits::Indicator;

use crate::simd;

/// Exponential mean with `alpha = 2 / (span + 1)`, recursive form seeded with
/// the first finite value.
///
/// Output is aligned with the input and `NaN` until `span` points have been
/// seen. A non-finite input carries the previous value forward.
pub(crate) fn ema_series(data: &[f64], span: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    let start = match data.iter().position(|v| v.is_finite()) {
        Some(start) => start,
        None => return result,
    };

    let alpha = 2.0 / (span as f64 + 1.0);
    let mut ema = data[start];
    for i in start..data.len() {
        let value = data[i];
        if i > start && value.is_finite() {
            ema = alpha * value + (1.0 - alpha) * ema;
        }
        if i + 1 >= start + span {
            result[i] = ema;
        }
    }
    result
}

/// Wilder's smoothing starting at `start`: the first output is the simple
/// mean of `period` values, then `avg = (prev * (period - 1) + value) / period`.
pub(crate) fn wilder_smooth(values: &[f64], start: usize, period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < start + period {
        return result;
    }

    let period_f64 = period as f64;
    let mut avg = simd::sum_simd(&values[start..start + period]) / period_f64;
    result[start + period - 1] = avg;

    for i in (start + period)..values.len() {
        avg = (avg * (period_f64 - 1.0) + values[i]) / period_f64;
        result[i] = avg;
    }
    result
}

/// Simple Moving Average (SMA).
///
/// Calculates the arithmetic mean of the last N values.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
}

impl Sma {
    /// Create a new SMA with the specified period.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self { period }
    }
}

impl Indicator for Sma {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Result<Vec<f64>, IndicatorError> {
        self.validate_data(data)?;
        Ok(simd::rolling_mean(data, self.period))
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "SMA"
    }
}

/// Exponential Moving Average (EMA).
///
/// Gives more weight to recent prices using an exponential decay.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
}

impl Ema {
    /// Create a new EMA with the specified span.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self { period }
    }
}

impl Indicator for Ema {
    type Output = f64;

    fn calculate(&self, data: &[f64]) -> Result<Vec<f64>, IndicatorError> {
        self.validate_data(data)?;
        Ok(ema_series(data, self.period))
    }

    fn period(&self) -> usize {
        self.period
    }

    fn name(&self) -> &str {
        "EMA"
    }
}
