//! Benchmarks for indicator implementations.

use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use feed_core::traits::{Indicator, MultiOutputIndicator};
use feed_core::types::{Bar, SnapshotId};
use feed_indicators::{simd, BollingerBands, Ema, IndicatorEngine, Rsi, Sma};

fn generate_test_data(size: usize) -> Vec<f64> {
    (0..size)
        .map(|i| 100.0 + (i as f64 * 0.1).sin() * 10.0)
        .collect()
}

fn generate_bars(size: usize) -> Vec<Bar> {
    generate_test_data(size)
        .into_iter()
        .enumerate()
        .map(|(i, c)| Bar::new(i as i64 * 60_000, c, c + 0.5, c - 0.5, c, 1_000.0))
        .collect()
}

fn benchmark_moving_averages(c: &mut Criterion) {
    let mut group = c.benchmark_group("MovingAverage");

    for size in [1000, 10000, 100000].iter() {
        let data = generate_test_data(*size);

        group.bench_with_input(BenchmarkId::new("sma", size), &data, |b, data| {
            let sma = Sma::new(20);
            b.iter(|| sma.calculate(black_box(data)))
        });

        group.bench_with_input(BenchmarkId::new("ema", size), &data, |b, data| {
            let ema = Ema::new(20);
            b.iter(|| ema.calculate(black_box(data)))
        });
    }

    group.finish();
}

fn benchmark_rsi(c: &mut Criterion) {
    let mut group = c.benchmark_group("RSI");

    for size in [1000, 10000, 100000].iter() {
        let data = generate_test_data(*size);

        group.bench_with_input(BenchmarkId::new("wilder", size), &data, |b, data| {
            let rsi = Rsi::new(14);
            b.iter(|| rsi.calculate(black_box(data)))
        });
    }

    group.finish();
}

fn benchmark_rolling_std(c: &mut Criterion) {
    let mut group = c.benchmark_group("RollingStd");

    for size in [1000, 10000, 100000].iter() {
        let data = generate_test_data(*size);

        group.bench_with_input(BenchmarkId::new("simd", size), &data, |b, data| {
            b.iter(|| simd::rolling_sample_std(black_box(data), black_box(20)))
        });

        group.bench_with_input(BenchmarkId::new("bollinger", size), &data, |b, data| {
            let bands = BollingerBands::new();
            b.iter(|| bands.calculate(black_box(data)))
        });
    }

    group.finish();
}

fn benchmark_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("Engine");
    let engine = IndicatorEngine::new();

    // 100 bars is the size fetched per update cycle
    for size in [100, 1000].iter() {
        let bars = generate_bars(*size);

        group.bench_with_input(BenchmarkId::new("compute_bars", size), &bars, |b, bars| {
            b.iter(|| engine.compute_bars("BTCUSDT", SnapshotId::new(), Utc::now(), black_box(bars)))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_moving_averages,
    benchmark_rsi,
    benchmark_rolling_std,
    benchmark_engine
);
criterion_main!(benches);
