//! Error types for the market-data pipeline.

use thiserror::Error;

/// Top-level pipeline error.
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Indicator error: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Exchange collaborator errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Request to {endpoint} timed out after {timeout_ms} ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("HTTP status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },

    #[error("API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Unsupported interval: {0}")]
    UnsupportedInterval(String),

    #[error("No data available for {0}")]
    NoData(String),
}

impl ExchangeError {
    /// Whether a retry with back-off may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Timeout { .. }
                | ExchangeError::Connection(_)
                | ExchangeError::Status { .. }
                | ExchangeError::RateLimited { .. }
        )
    }
}

/// Store collaborator errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Store error: {0}")]
    Internal(String),
}

/// Indicator calculation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndicatorError {
    #[error("Insufficient data: need {required} points, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),
}

/// Result type alias for pipeline operations.
pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let timeout = ExchangeError::Timeout {
            endpoint: "tickers".into(),
            timeout_ms: 5000,
        };
        assert!(timeout.is_transient());
        assert!(ExchangeError::Connection("reset".into()).is_transient());
        assert!(!ExchangeError::SymbolNotFound("FOO".into()).is_transient());
        assert!(!ExchangeError::InvalidResponse("bad json".into()).is_transient());
    }

    #[test]
    fn test_error_conversion() {
        let err: FeedError = IndicatorError::InsufficientData {
            required: 20,
            available: 5,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Indicator error: Insufficient data: need 20 points, have 5"
        );
    }
}
