//! Trend indicators: ADX, Ichimoku and classic pivot points.

use feed_core::error::IndicatorError;
use feed_core::traits::OhlcvIndicator;
use feed_core::types::OhlcvColumns;
use serde::{Deserialize, Serialize};

use crate::moving_average::wilder_smooth;
use crate::simd;
use crate::volatility::true_range;

/// ADX output with the directional indicators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdxOutput {
    pub adx: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Average Directional Index.
#[derive(Debug, Clone)]
pub struct Adx {
    period: usize,
}

impl Adx {
    /// Create a new ADX indicator.
    pub fn new(period: usize) -> Self {
        assert!(period > 0, "Period must be greater than 0");
        Self { period }
    }

    /// Directional movement per bar. The smaller move is zeroed; ties keep both.
    fn directional_movement(high: &[f64], low: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let len = high.len().min(low.len());
        let mut plus_dm = vec![f64::NAN; len];
        let mut minus_dm = vec![f64::NAN; len];

        for i in 1..len {
            let up = high[i] - high[i - 1];
            let down = low[i - 1] - low[i];
            if !up.is_finite() || !down.is_finite() {
                continue;
            }
            let mut plus = up.max(0.0);
            let mut minus = down.max(0.0);
            if plus < minus {
                plus = 0.0;
            }
            if minus < plus {
                minus = 0.0;
            }
            plus_dm[i] = plus;
            minus_dm[i] = minus;
        }
        (plus_dm, minus_dm)
    }

    fn directional_index(dm: f64, tr: f64) -> f64 {
        if dm.is_nan() || tr.is_nan() {
            f64::NAN
        } else if tr == 0.0 {
            0.0
        } else {
            (100.0 * dm / tr).clamp(0.0, 100.0)
        }
    }
}

impl OhlcvIndicator for Adx {
    type Output = AdxOutput;

    fn calculate(&self, bars: &OhlcvColumns) -> Result<Vec<AdxOutput>, IndicatorError> {
        self.validate_columns(&[&bars.high, &bars.low, &bars.close])?;

        let tr = true_range(&bars.high, &bars.low, &bars.close);
        let (plus_dm, minus_dm) = Self::directional_movement(&bars.high, &bars.low);

        let tr_smooth = wilder_smooth(&tr, 1, self.period);
        let plus_smooth = wilder_smooth(&plus_dm, 1, self.period);
        let minus_smooth = wilder_smooth(&minus_dm, 1, self.period);

        let plus_di: Vec<f64> = plus_smooth
            .iter()
            .zip(&tr_smooth)
            .map(|(&dm, &tr)| Self::directional_index(dm, tr))
            .collect();
        let minus_di: Vec<f64> = minus_smooth
            .iter()
            .zip(&tr_smooth)
            .map(|(&dm, &tr)| Self::directional_index(dm, tr))
            .collect();

        let dx: Vec<f64> = plus_di
            .iter()
            .zip(&minus_di)
            .map(|(&p, &m)| {
                let sum = p + m;
                if sum.is_nan() {
                    f64::NAN
                } else if sum == 0.0 {
                    0.0
                } else {
                    100.0 * (p - m).abs() / sum
                }
            })
            .collect();

        // DX is first defined at `period`
        let adx = wilder_smooth(&dx, self.period, self.period);

        Ok((0..bars.len())
            .map(|i| AdxOutput {
                adx: if adx[i].is_nan() {
                    f64::NAN
                } else {
                    adx[i].clamp(0.0, 100.0)
                },
                plus_di: plus_di[i],
                minus_di: minus_di[i],
            })
            .collect())
    }

    fn period(&self) -> usize {
        self.period * 2
    }

    fn name(&self) -> &str {
        "ADX"
    }
}

/// Ichimoku Kinko Hyo lines at one bar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IchimokuOutput {
    pub tenkan: f64,
    pub kijun: f64,
    pub senkou_a: f64,
    pub senkou_b: f64,
    pub chikou: f64,
}

/// Ichimoku cloud.
///
/// Senkou spans are plotted `displacement` bars ahead, so the value at bar `i`
/// comes from bar `i - displacement`. Chikou at bar `i` is the close of bar
/// `i + displacement`, undefined for the most recent bars.
#[derive(Debug, Clone)]
pub struct Ichimoku {
    tenkan_period: usize,
    kijun_period: usize,
    senkou_b_period: usize,
    displacement: usize,
}

impl Ichimoku {
    /// Standard settings (9, 26, 52, 26).
    pub fn new() -> Self {
        Self::with_periods(9, 26, 52, 26)
    }

    pub fn with_periods(
        tenkan_period: usize,
        kijun_period: usize,
        senkou_b_period: usize,
        displacement: usize,
    ) -> Self {
        assert!(tenkan_period > 0 && kijun_period > 0 && senkou_b_period > 0);
        Self {
            tenkan_period,
            kijun_period,
            senkou_b_period,
            displacement,
        }
    }

    fn shift_forward(values: &[f64], by: usize) -> Vec<f64> {
        (0..values.len())
            .map(|i| if i >= by { values[i - by] } else { f64::NAN })
            .collect()
    }
}

impl Default for Ichimoku {
    fn default() -> Self {
        Self::new()
    }
}

impl OhlcvIndicator for Ichimoku {
    type Output = IchimokuOutput;

    fn calculate(&self, bars: &OhlcvColumns) -> Result<Vec<IchimokuOutput>, IndicatorError> {
        self.validate_columns(&[&bars.high, &bars.low, &bars.close])?;

        let tenkan = simd::rolling_midpoint(&bars.high, &bars.low, self.tenkan_period);
        let kijun = simd::rolling_midpoint(&bars.high, &bars.low, self.kijun_period);
        let span_a_base: Vec<f64> = tenkan
            .iter()
            .zip(&kijun)
            .map(|(t, k)| (t + k) / 2.0)
            .collect();
        let span_b_base = simd::rolling_midpoint(&bars.high, &bars.low, self.senkou_b_period);

        let senkou_a = Self::shift_forward(&span_a_base, self.displacement);
        let senkou_b = Self::shift_forward(&span_b_base, self.displacement);

        let len = bars.len();
        Ok((0..len)
            .map(|i| IchimokuOutput {
                tenkan: tenkan[i],
                kijun: kijun[i],
                senkou_a: senkou_a[i],
                senkou_b: senkou_b[i],
                chikou: bars
                    .close
                    .get(i + self.displacement)
                    .copied()
                    .unwrap_or(f64::NAN),
            })
            .collect())
    }

    fn period(&self) -> usize {
        self.kijun_period
    }

    fn name(&self) -> &str {
        "Ichimoku"
    }
}

/// Classic floor pivot levels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PivotOutput {
    pub pivot: f64,
    pub r1: f64,
    pub s1: f64,
    pub r2: f64,
    pub s2: f64,
}

/// Classic pivot points computed from each bar's high, low and close.
#[derive(Debug, Clone, Default)]
pub struct PivotPoints;

impl PivotPoints {
    pub fn new() -> Self {
        Self
    }

    pub fn from_hlc(high: f64, low: f64, close: f64) -> PivotOutput {
        let pivot = (high + low + close) / 3.0;
        let range = high - low;
        PivotOutput {
            pivot,
            r1: 2.0 * pivot - low,
            s1: 2.0 * pivot - high,
            r2: pivot + range,
            s2: pivot - range,
        }
    }
}

impl OhlcvIndicator for PivotPoints {
    type Output = PivotOutput;

    fn calculate(&self, bars: &OhlcvColumns) -> Result<Vec<PivotOutput>, IndicatorError> {
        self.validate_columns(&[&bars.high, &bars.low, &bars.close])?;

        Ok((0..bars.len())
            .map(|i| Self::from_hlc(bars.high[i], bars.low[i], bars.close[i]))
            .collect())
    }

    fn period(&self) -> usize {
        1
    }

    fn name(&self) -> &str {
        "Pivot Points"
    }
}
