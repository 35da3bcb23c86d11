//! Technical indicators and signal derivation.
//!
//! This crate provides the indicator battery computed for every market
//! snapshot:
//! - Moving averages (SMA, EMA)
//! - Momentum and volume (RSI, MACD, Stochastic, MFI, OBV)
//! - Volatility (ATR, Bollinger Bands, Standard Deviation)
//! - Trend (ADX, Ichimoku, Pivot Points)
//!
//! Every indicator returns a series aligned with its input, `NaN` during
//! warm-up. [`IndicatorEngine`] turns the most recent values into an
//! `IndicatorSet` with categorical signals.

pub mod engine;
pub mod momentum;
pub mod moving_average;
pub mod signals;
pub mod simd;
pub mod trend;
pub mod volatility;

pub use engine::{IndicatorEngine, CORE_WINDOW};
pub use momentum::{Macd, MacdOutput, Mfi, Obv, Rsi, Stochastic, StochasticOutput};
pub use moving_average::{Ema, Sma};
pub use trend::{Adx, AdxOutput, Ichimoku, IchimokuOutput, PivotOutput, PivotPoints};
pub use volatility::{Atr, BollingerBands, BollingerOutput};
