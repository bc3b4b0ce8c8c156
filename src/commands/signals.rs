use crate::candle_source::load_candles_file;
use crate::models::Signal;
use crate::strategy::{create_detector, StrategyKind};
use anyhow::Result;
use log::{info, warn};
use std::path::Path;

pub fn detect(data_file: &Path, kind: StrategyKind) -> Result<Vec<Signal>> {
    let candles = load_candles_file(data_file)?;
    let detector = create_detector(kind);
    if candles.len() < detector.min_data_points() {
        warn!(
            "{} needs at least {} candles; {} has {}",
            kind,
            detector.min_data_points(),
            data_file.display(),
            candles.len()
        );
    }

    let signals = detector.detect(&candles);
    info!(
        "{} detected {} signals across {} candles",
        kind,
        signals.len(),
        candles.len()
    );
    Ok(signals)
}

pub fn run(data_file: &Path, kind: StrategyKind) -> Result<()> {
    let signals = detect(data_file, kind)?;
    println!("{}", serde_json::to_string_pretty(&signals)?);
    Ok(())
}
