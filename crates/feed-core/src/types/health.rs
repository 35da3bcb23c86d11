//! Exchange health records and summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a health record measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Round-trip time of a successful call, in ms
    Latency,
    /// Probe outcome: 1 available, 0 unavailable
    Availability,
    /// Fraction of the request budget in use
    RateLimit,
    /// Failed or timed-out call; value is the elapsed ms
    Error,
}

/// One measurement appended to the monitor's ring buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub endpoint: String,
    pub kind: MetricKind,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl HealthRecord {
    pub fn new(endpoint: impl Into<String>, kind: MetricKind, value: f64) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind,
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Overall health classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Ok,
    Warning,
    Critical,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Condition derived from the record buffer at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "alert", rename_all = "snake_case")]
pub enum Alert {
    HighLatency { endpoint: String, latency_ms: f64 },
    HighErrorRate { error_rate: f64 },
    ConsecutiveFailures { count: u32 },
    RateLimitExceeded { usage: f64 },
    IndicatorDegraded { symbol: String, failures: u32 },
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::HighLatency { endpoint, latency_ms } => {
                write!(f, "high latency on {}: {:.0} ms", endpoint, latency_ms)
            }
            Alert::HighErrorRate { error_rate } => {
                write!(f, "error rate {:.1}%", error_rate * 100.0)
            }
            Alert::ConsecutiveFailures { count } => write!(f, "{} consecutive failures", count),
            Alert::RateLimitExceeded { usage } => {
                write!(f, "rate limit usage {:.0}%", usage * 100.0)
            }
            Alert::IndicatorDegraded { symbol, failures } => {
                write!(f, "indicators failing for {} ({} in a row)", symbol, failures)
            }
        }
    }
}

/// Aggregate view over the record buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HealthSummary {
    pub status: HealthStatus,
    /// Outcome of the last availability probe (true before the first probe)
    pub available: bool,
    pub avg_latency_ms: Option<f64>,
    pub min_latency_ms: Option<f64>,
    pub max_latency_ms: Option<f64>,
    /// Successful plus failed calls in the buffer
    pub total_requests: usize,
    pub error_rate: f64,
    /// Error rate over the most recent measured calls; the one the gate checks
    pub recent_error_rate: f64,
    pub consecutive_failures: u32,
    pub rate_limit_usage: Option<f64>,
    pub alerts: Vec<Alert>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_serialization() {
        let alert = Alert::ConsecutiveFailures { count: 3 };
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["alert"], "consecutive_failures");
        assert_eq!(json["count"], 3);
        assert_eq!(alert.to_string(), "3 consecutive failures");
    }

    #[test]
    fn test_record_kind_names() {
        let record = HealthRecord::new("get_ticker", MetricKind::RateLimit, 0.5);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "rate_limit");
    }
}
