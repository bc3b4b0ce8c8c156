use crate::candle_source::SnapshotCandleSource;
use crate::config::PaperTradingConfig;
use crate::paper_trader::PaperTradingService;
use crate::strategy::StrategyKind;
use crate::trade_store::TradeStore;
use anyhow::Result;
use log::info;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Run one paper trading session until Ctrl-C or `duration` elapses.
pub async fn run(
    config: PaperTradingConfig,
    data_dir: &Path,
    symbol: &str,
    kind: StrategyKind,
    capital: Option<f64>,
    duration: Option<Duration>,
) -> Result<()> {
    let capital = capital.unwrap_or(config.initial_capital);
    let store = TradeStore::new(config.trades_file.clone());
    let source = Arc::new(SnapshotCandleSource::new(data_dir));
    let service = PaperTradingService::new(config, source, store);

    service.start(symbol, kind, capital).await?;

    match duration {
        Some(limit) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Interrupted, shutting down"),
                _ = tokio::time::sleep(limit) => info!("Session duration reached"),
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
            info!("Interrupted, shutting down");
        }
    }

    service.shutdown().await?;
    let status = service.status().await;
    info!(
        "Final balance {:.2} after {} trades ({} failed iterations)",
        status.balance,
        status.trades.len(),
        status.failed_iterations
    );
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
