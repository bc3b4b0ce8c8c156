use clap::{Parser, Subcommand};
use log::info;
use signaliers::{
    commands::{backtest, backtest_all, paper_trade, signals},
    config::EngineSettings,
    strategy::StrategyKind,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "signaliers")]
#[command(about = "Candle pattern signals, backtests and paper trading")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect signals for one strategy over a candle file
    Signals {
        /// JSON array of candles
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: PathBuf,
        /// POPGUN, FVG, RBD, AURA or VOLUME_SURPRISE
        #[arg(short, long)]
        strategy: StrategyKind,
    },
    /// Backtest one strategy over a candle file
    Backtest {
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: PathBuf,
        #[arg(short, long)]
        strategy: StrategyKind,
        /// Symbol the candles belong to; selects the exchange rate
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Backtest every strategy over a candle file in parallel
    BacktestAll {
        #[arg(long = "data-file", value_name = "PATH")]
        data_file: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Paper trade one symbol against refreshed candle snapshots
    PaperTrade {
        /// Directory holding <SYMBOL>_<interval>.json snapshots
        #[arg(long = "data-dir", value_name = "DIR")]
        data_dir: PathBuf,
        #[arg(long)]
        symbol: String,
        #[arg(short, long)]
        strategy: StrategyKind,
        /// Starting capital (defaults to INITIAL_CAPITAL)
        #[arg(long)]
        capital: Option<f64>,
        /// Stop after this many seconds instead of waiting for Ctrl-C
        #[arg(long = "duration-secs")]
        duration_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = EngineSettings::from_env()?;
    info!("Starting signaliers. Simulated trading only; nothing here is financial advice.");

    match cli.command {
        Commands::Signals {
            data_file,
            strategy,
        } => {
            signals::run(&data_file, strategy)?;
        }
        Commands::Backtest {
            data_file,
            strategy,
            symbol,
        } => {
            backtest::run(&settings.backtest, &data_file, strategy, symbol.as_deref())?;
        }
        Commands::BacktestAll { data_file, symbol } => {
            backtest_all::run(&settings.backtest, &data_file, symbol.as_deref())?;
        }
        Commands::PaperTrade {
            data_dir,
            symbol,
            strategy,
            capital,
            duration_secs,
        } => {
            paper_trade::run(
                settings.paper,
                &data_dir,
                &symbol,
                strategy,
                capital,
                duration_secs.map(Duration::from_secs),
            )
            .await?;
        }
    }

    Ok(())
}
