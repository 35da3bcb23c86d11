//! Analyze command: one-shot indicator computation over a CSV file.

use anyhow::{Context, Result};
use chrono::Utc;
use feed_core::types::{IndicatorSet, SnapshotId};
use feed_exchange::load_csv_bars;
use feed_indicators::IndicatorEngine;
use std::path::Path;
use tracing::info;

use crate::cli::{AnalyzeArgs, OutputFormat};

pub async fn run(args: AnalyzeArgs) -> Result<()> {
    if !args.data.exists() {
        anyhow::bail!(
            "Data file '{}' does not exist. Provide an OHLCV CSV file with --data",
            args.data.display()
        );
    }

    let set = analyze(&args.data, &args.symbol)?;

    match args.output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&set)?),
        OutputFormat::Text => println!("{}", set.summary()),
    }

    if let Some(save_path) = &args.save {
        std::fs::write(save_path, serde_json::to_string_pretty(&set)?)
            .with_context(|| format!("Failed to write {}", save_path.display()))?;
        info!("Indicators saved to {:?}", save_path);
    }

    Ok(())
}

fn analyze(path: &Path, symbol: &str) -> Result<IndicatorSet> {
    let bars = load_csv_bars(path)
        .with_context(|| format!("Failed to load bars from {}", path.display()))?;
    info!(symbol, bars = bars.len(), "Loaded data");

    let timestamp = bars.last().and_then(|b| b.datetime()).unwrap_or_else(Utc::now);
    IndicatorEngine::new()
        .compute_bars(symbol, SnapshotId::new(), timestamp, &bars)
        .context("Indicator computation failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_core::types::Signal;

    #[test]
    fn test_analyze_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("btc.csv");
        let mut csv = String::from("timestamp,open,high,low,close,volume\n");
        for i in 0..80i64 {
            let close = 100.0 + (i as f64 * 0.2).sin() * 4.0;
            csv.push_str(&format!(
                "{},{},{},{},{},{}\n",
                1_700_000_000 + i * 3600,
                close - 0.3,
                close + 1.0,
                close - 1.0,
                close,
                500 + i
            ));
        }
        std::fs::write(&path, csv).unwrap();

        let set = analyze(&path, "BTCUSDT").unwrap();
        assert_eq!(set.symbol, "BTCUSDT");
        assert_eq!(set.timestamp.timestamp(), 1_700_000_000 + 79 * 3600);
        assert_ne!(set.global_signal(), Signal::Indeterminate);
        assert!(set.summary().contains("BTCUSDT"));
    }

    #[test]
    fn test_analyze_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "date,open,high,low,close\nyesterday,a,b,c,d\n").unwrap();
        assert!(analyze(&path, "BTCUSDT").is_err());
    }
}
