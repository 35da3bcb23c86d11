//! Scheduler errors.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// Needs a restart; the scheduler will not run further cycles.
    #[error("Scheduler halted after {failed_cycles} consecutive failed cycles")]
    Halted { failed_cycles: u32 },

    /// The health gate stayed closed for too long; needs a restart as well.
    #[error("Scheduler halted after the exchange stayed unhealthy for {unhealthy_secs}s")]
    Unhealthy { unhealthy_secs: u64 },
}
