//! SIMD kernels and rolling-window statistics.
//!
//! Kernels use the `wide` crate for portable SIMD. Rolling helpers return
//! series aligned with their input, `NaN` until the window is full or when
//! the window holds a non-finite value.

use wide::f64x4;

/// SIMD-optimized sum of a slice.
pub fn sum_simd(data: &[f64]) -> f64 {
    let chunks = data.len() / 4;
    let mut simd_sum = f64x4::splat(0.0);

    for i in 0..chunks {
        let idx = i * 4;
        let values = f64x4::new([data[idx], data[idx + 1], data[idx + 2], data[idx + 3]]);
        simd_sum += values;
    }

    let mut result = simd_sum.reduce_add();

    // Handle remaining elements
    for &value in &data[(chunks * 4)..] {
        result += value;
    }

    result
}

/// SIMD-optimized sum of squared deviations from `mean`.
pub fn sum_sq_dev_simd(data: &[f64], mean: f64) -> f64 {
    let chunks = data.len() / 4;
    let mean_vec = f64x4::splat(mean);
    let mut simd_sum = f64x4::splat(0.0);

    for i in 0..chunks {
        let idx = i * 4;
        let values = f64x4::new([data[idx], data[idx + 1], data[idx + 2], data[idx + 3]]);
        let diff = values - mean_vec;
        simd_sum += diff * diff;
    }

    let mut result = simd_sum.reduce_add();

    for &value in &data[(chunks * 4)..] {
        let diff = value - mean;
        result += diff * diff;
    }

    result
}

/// SIMD-optimized min/max finder.
///
/// Returns `None` for an empty slice or one containing a non-finite value.
pub fn minmax_simd(data: &[f64]) -> Option<(f64, f64)> {
    if data.is_empty() || data.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let chunks = data.len() / 4;
    let mut min_vec = f64x4::splat(f64::INFINITY);
    let mut max_vec = f64x4::splat(f64::NEG_INFINITY);

    for i in 0..chunks {
        let idx = i * 4;
        let values = f64x4::new([data[idx], data[idx + 1], data[idx + 2], data[idx + 3]]);
        min_vec = min_vec.min(values);
        max_vec = max_vec.max(values);
    }

    let min_arr = min_vec.to_array();
    let max_arr = max_vec.to_array();

    let mut min = min_arr[0].min(min_arr[1]).min(min_arr[2]).min(min_arr[3]);
    let mut max = max_arr[0].max(max_arr[1]).max(max_arr[2]).max(max_arr[3]);

    for &value in &data[(chunks * 4)..] {
        min = min.min(value);
        max = max.max(value);
    }

    Some((min, max))
}

fn window_is_finite(window: &[f64]) -> bool {
    window.iter().all(|v| v.is_finite())
}

/// Rolling sum over `period` points.
pub fn rolling_sum(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    for (i, window) in data.windows(period).enumerate() {
        if window_is_finite(window) {
            result[i + period - 1] = sum_simd(window);
        }
    }
    result
}

/// Rolling arithmetic mean over `period` points.
pub fn rolling_mean(data: &[f64], period: usize) -> Vec<f64> {
    let period_f64 = period as f64;
    rolling_sum(data, period)
        .into_iter()
        .map(|sum| sum / period_f64)
        .collect()
}

/// Rolling sample standard deviation (n - 1 denominator).
///
/// Two-pass per window, so a flat window yields exactly zero.
pub fn rolling_sample_std(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period < 2 || data.len() < period {
        return result;
    }

    let period_f64 = period as f64;
    for (i, window) in data.windows(period).enumerate() {
        if !window_is_finite(window) {
            continue;
        }
        let mean = sum_simd(window) / period_f64;
        let variance = (sum_sq_dev_simd(window, mean) / (period_f64 - 1.0)).max(0.0);
        result[i + period - 1] = variance.sqrt();
    }
    result
}

/// Rolling maximum and minimum over `period` points.
pub fn rolling_extrema(data: &[f64], period: usize) -> (Vec<f64>, Vec<f64>) {
    let mut highs = vec![f64::NAN; data.len()];
    let mut lows = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return (highs, lows);
    }

    for (i, window) in data.windows(period).enumerate() {
        if let Some((min, max)) = minmax_simd(window) {
            highs[i + period - 1] = max;
            lows[i + period - 1] = min;
        }
    }
    (highs, lows)
}

/// Rolling midpoint of highest high and lowest low.
pub fn rolling_midpoint(high: &[f64], low: &[f64], period: usize) -> Vec<f64> {
    let (highest, _) = rolling_extrema(high, period);
    let (_, lowest) = rolling_extrema(low, period);
    highest
        .iter()
        .zip(&lowest)
        .map(|(h, l)| (h + l) / 2.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sum_simd() {
        let data: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let result = sum_simd(&data);

        // Sum of 1 to 100 = 5050
        assert!((result - 5050.0).abs() < 1e-10);
    }

    #[test]
    fn test_sum_sq_dev_simd() {
        let data = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        // mean 5, squared deviations sum to 32
        assert!((sum_sq_dev_simd(&data, 5.0) - 32.0).abs() < 1e-10);
    }

    #[test]
    fn test_minmax_simd() {
        let data = vec![5.0, 2.0, 8.0, 1.0, 9.0, 3.0, 7.0, 4.0];
        let (min, max) = minmax_simd(&data).unwrap();

        assert!((min - 1.0).abs() < 1e-10);
        assert!((max - 9.0).abs() < 1e-10);
        assert!(minmax_simd(&[1.0, f64::NAN]).is_none());
    }

    #[test]
    fn test_rolling_mean_alignment() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = rolling_mean(&data, 3);

        assert_eq!(result.len(), 5);
        assert!(result[0].is_nan() && result[1].is_nan());
        assert!((result[2] - 2.0).abs() < 1e-10);
        assert!((result[4] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn test_rolling_sample_std() {
        let data = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let result = rolling_sample_std(&data, 8);

        // Sample variance 32 / 7
        assert!((result[7] - (32.0f64 / 7.0).sqrt()).abs() < 1e-10);
    }

    #[test]
    fn test_rolling_std_flat_is_zero() {
        let data = vec![100.0; 25];
        let result = rolling_sample_std(&data, 20);
        assert_eq!(result[24], 0.0);
    }

    #[test]
    fn test_rolling_skips_non_finite_windows() {
        let data = vec![1.0, f64::NAN, 3.0, 4.0, 5.0];
        let result = rolling_sum(&data, 2);
        assert!(result[1].is_nan());
        assert!(result[2].is_nan());
        assert!((result[3] - 7.0).abs() < 1e-10);
    }

    #[test]
    fn test_rolling_midpoint() {
        let high = vec![10.0, 12.0, 11.0];
        let low = vec![8.0, 9.0, 7.0];
        let mid = rolling_midpoint(&high, &low, 3);
        assert!((mid[2] - 9.5).abs() < 1e-10);
    }

    #[test]
    fn test_empty_data() {
        assert!(rolling_mean(&[], 5).is_empty());
        assert!(minmax_simd(&[]).is_none());
        assert_eq!(sum_simd(&[]), 0.0);
    }
}
