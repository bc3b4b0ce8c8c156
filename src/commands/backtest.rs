use crate::backtester::{resolve_exchange_rate, Backtester};
use crate::candle_source::load_candles_file;
use crate::config::BacktestSettings;
use crate::models::BacktestSummary;
use crate::strategy::StrategyKind;
use anyhow::Result;
use log::info;
use std::path::Path;

pub fn backtester_for(settings: &BacktestSettings, symbol: Option<&str>) -> Backtester {
    let rate = symbol
        .map(|s| resolve_exchange_rate(s, settings.exchange_rate))
        .unwrap_or(settings.exchange_rate);
    Backtester::new(settings.initial_capital, rate)
}

pub fn log_summary(summary: &BacktestSummary) {
    info!(
        "{}: {} trades ({} wins, {} losses, {} open), win rate {:.2}%, PnL {:.2}",
        summary.strategy,
        summary.total_trades,
        summary.wins,
        summary.losses,
        summary.open_trades,
        summary.win_rate,
        summary.total_pnl
    );
}

pub fn run(
    settings: &BacktestSettings,
    data_file: &Path,
    kind: StrategyKind,
    symbol: Option<&str>,
) -> Result<()> {
    let candles = load_candles_file(data_file)?;
    let backtester = backtester_for(settings, symbol);
    info!(
        "Backtesting {} over {} candles from {} (capital {:.2}, rate {})",
        kind,
        candles.len(),
        data_file.display(),
        backtester.initial_capital(),
        backtester.exchange_rate()
    );

    let summary = backtester.run(kind, &candles);
    log_summary(&summary);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
