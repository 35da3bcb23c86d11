//! Update scheduler for the market-data pipeline.
//!
//! [`UpdateScheduler`] drives one update cycle per interval: fetch through the
//! health monitor, compute indicators, persist. [`MarketView`] is the read
//! side handed to consumers.

mod backoff;
mod error;
mod scheduler;
mod state;
#[cfg(test)]
mod testing;
mod view;

pub use backoff::{HaltPolicy, RetryPolicy};
pub use error::SchedulerError;
pub use scheduler::{CycleReport, SchedulerConfig, SymbolOutcome, UpdateScheduler};
pub use state::{SymbolPhase, UpdateState};
pub use view::MarketView;
