//! Exchange collaborators.
//!
//! [`BybitClient`] talks to the public Bybit v5 market-data API;
//! [`CsvReplayExchange`] replays OHLCV files for offline runs.

mod bybit;
mod replay;

pub use bybit::{bybit_interval, server_time, BybitCategory, BybitClient, BybitConfig};
pub use replay::{load_csv_bars, CsvReplayExchange};
