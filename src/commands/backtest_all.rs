use crate::candle_source::load_candles_file;
use crate::commands::backtest::{backtester_for, log_summary};
use crate::config::BacktestSettings;
use anyhow::Result;
use std::path::Path;

pub fn run(settings: &BacktestSettings, data_file: &Path, symbol: Option<&str>) -> Result<()> {
    let candles = load_candles_file(data_file)?;
    let summaries = backtester_for(settings, symbol).run_all(&candles);

    for summary in &summaries {
        log_summary(summary);
    }
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}
