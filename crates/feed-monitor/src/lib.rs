//! Exchange health monitoring and logging setup.

mod health;
mod logging;

pub use health::{HealthMonitor, HealthThresholds, MonitorSettings, RateLimitState, RateLimitStatus};
pub use logging::setup_logging;
