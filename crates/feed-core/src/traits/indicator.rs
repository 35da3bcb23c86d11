//! Indicator trait definitions.

use crate::error::IndicatorError;
use crate::types::OhlcvColumns;

/// Check that a series is long enough and not entirely non-finite.
pub(crate) fn validate_series(
    name: &str,
    data: &[f64],
    required: usize,
) -> Result<(), IndicatorError> {
    if data.len() < required {
        return Err(IndicatorError::InsufficientData {
            required,
            available: data.len(),
        });
    }
    if !data.iter().any(|v| v.is_finite()) {
        return Err(IndicatorError::InvalidInput(format!(
            "{}: input has no finite values",
            name
        )));
    }
    Ok(())
}

/// Indicator over a single (close) price series.
///
/// Output is aligned with the input: one value per input point, with
/// `f64::NAN` during warm-up.
pub trait Indicator: Send + Sync {
    /// The output type of the indicator.
    type Output;

    /// Calculate indicator values for the given data.
    fn calculate(&self, data: &[f64]) -> Result<Vec<Self::Output>, IndicatorError>;

    /// Get the minimum data points required.
    fn period(&self) -> usize;

    /// Get the name of the indicator.
    fn name(&self) -> &str;

    /// Validate that there's enough usable data.
    fn validate_data(&self, data: &[f64]) -> Result<(), IndicatorError> {
        validate_series(self.name(), data, self.period())
    }
}

/// Multi-output indicator (e.g., Bollinger Bands, MACD).
pub trait MultiOutputIndicator: Send + Sync {
    /// The output type containing multiple values.
    type Outputs;

    /// Calculate indicator values for the given data.
    fn calculate(&self, data: &[f64]) -> Result<Vec<Self::Outputs>, IndicatorError>;

    /// Get the minimum data points required.
    fn period(&self) -> usize;

    /// Get the name of the indicator.
    fn name(&self) -> &str;

    /// Validate that there's enough usable data.
    fn validate_data(&self, data: &[f64]) -> Result<(), IndicatorError> {
        validate_series(self.name(), data, self.period())
    }
}

/// Indicator that uses full bar data (not just close).
pub trait OhlcvIndicator: Send + Sync {
    /// The output type of the indicator.
    type Output;

    /// Calculate indicator values from OHLCV columns.
    fn calculate(&self, bars: &OhlcvColumns) -> Result<Vec<Self::Output>, IndicatorError>;

    /// Get the minimum data points required.
    fn period(&self) -> usize;

    /// Get the name of the indicator.
    fn name(&self) -> &str;

    /// Validate length and the given columns.
    fn validate_columns(&self, columns: &[&[f64]]) -> Result<(), IndicatorError> {
        for column in columns {
            validate_series(self.name(), column, self.period())?;
        }
        Ok(())
    }
}
