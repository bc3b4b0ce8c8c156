use crate::candle_utils::{is_well_formed, normalize_candles, tail_candles};
use crate::models::Candle;
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// Supplier of candle history for a symbol.
///
/// Failures never surface as errors: an unreachable or broken source is
/// reported as "no data" and callers retry on their own schedule.
#[async_trait]
pub trait CandleSource: Send + Sync {
    /// Up to `limit` most recent candles, ascending and de-duplicated.
    async fn fetch_history(&self, symbol: &str, interval: &str, limit: usize) -> Vec<Candle>;

    async fn fetch_latest(&self, symbol: &str, interval: &str) -> Option<Candle> {
        self.fetch_history(symbol, interval, 1).await.pop()
    }
}

/// Reads `<dir>/<SYMBOL>_<interval>.json` (a JSON array of candles) on every
/// call, so an external process can keep refreshing the file.
pub struct SnapshotCandleSource {
    dir: PathBuf,
}

impl SnapshotCandleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn snapshot_path(&self, symbol: &str, interval: &str) -> PathBuf {
        let symbol = symbol.trim().to_ascii_uppercase();
        self.dir.join(format!("{}_{}.json", symbol, interval.trim()))
    }
}

/// Load a candle file, normalised and with malformed candles dropped.
pub fn load_candles_file(path: &Path) -> Result<Vec<Candle>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read candles from {}", path.display()))?;
    let candles: Vec<Candle> = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse candles in {}", path.display()))?;

    let total = candles.len();
    let candles: Vec<Candle> = candles.into_iter().filter(is_well_formed).collect();
    if candles.len() < total {
        warn!(
            "Dropped {} malformed candles from {}",
            total - candles.len(),
            path.display()
        );
    }
    Ok(normalize_candles(candles))
}

#[async_trait]
impl CandleSource for SnapshotCandleSource {
    async fn fetch_history(&self, symbol: &str, interval: &str, limit: usize) -> Vec<Candle> {
        let path = self.snapshot_path(symbol, interval);
        let loaded = tokio::task::spawn_blocking(move || load_candles_file(&path)).await;

        match loaded {
            Ok(Ok(candles)) => {
                debug!("Loaded {} candles for {} {}", candles.len(), symbol, interval);
                tail_candles(candles, limit)
            }
            Ok(Err(err)) => {
                warn!("Candle snapshot unavailable for {} {}: {:#}", symbol, interval, err);
                Vec::new()
            }
            Err(err) => {
                warn!("Candle snapshot task failed for {} {}: {}", symbol, interval, err);
                Vec::new()
            }
        }
    }
}
