use crate::backtester::resolve_exchange_rate;
use crate::candle_source::CandleSource;
use crate::candle_utils::normalize_symbol;
use crate::config::PaperTradingConfig;
use crate::models::*;
use crate::strategy::{create_detector, StrategyKind};
use crate::strategy_utils::is_fresh;
use crate::trade_store::TradeStore;
use anyhow::anyhow;
use chrono::{Duration, Utc};
use log::{error, info, warn};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PaperTradingError {
    #[error("Paper trading is already running {strategy} on {symbol}")]
    AlreadyRunning { symbol: String, strategy: String },
    #[error("Paper trading is not running")]
    NotRunning,
    #[error("Invalid paper trading request: {0}")]
    InvalidRequest(String),
    #[error("Trade store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

/// Session data guarded by one lock. Every event mutates it inside a single
/// synchronous critical section.
#[derive(Debug, Default)]
struct SessionState {
    running: bool,
    // Bumped on every start and stop so a lingering loop can tell it is stale.
    generation: u64,
    symbol: Option<String>,
    strategy: Option<StrategyKind>,
    initial_capital: f64,
    balance: f64,
    exchange_rate: f64,
    active_trade_id: Option<String>,
    trades: Vec<PaperTrade>,
    failed_iterations: u64,
    last_error: Option<String>,
}

impl SessionState {
    fn active_trade(&self) -> Option<&PaperTrade> {
        let id = self.active_trade_id.as_deref()?;
        self.trades.iter().find(|t| t.id == id)
    }

    fn snapshot(&self) -> PaperTradingStatus {
        PaperTradingStatus {
            is_active: self.running,
            active_symbol: self.symbol.clone(),
            active_strategy: self.strategy.map(|s| s.as_str().to_string()),
            initial_capital: self.initial_capital,
            balance: self.balance,
            active_trade: self.active_trade().cloned(),
            trades: self.trades.clone(),
            failed_iterations: self.failed_iterations,
            last_error: self.last_error.clone(),
        }
    }
}

/// Whether the last detected signal warrants opening a long at `price`.
pub fn entry_decision(
    kind: StrategyKind,
    signal: &Signal,
    latest: &Candle,
    price: f64,
    freshness: Duration,
) -> bool {
    let fresh = is_fresh(signal.timestamp, latest.timestamp, freshness);
    match kind {
        StrategyKind::PopGun => signal
            .levels
            .popgun()
            .map(|levels| fresh && price > levels.targets.long.entry)
            .unwrap_or(false),
        StrategyKind::Fvg => signal
            .levels
            .gap()
            .map(|gap| gap.fvg_bottom <= price && price <= gap.fvg_top)
            .unwrap_or(false),
        StrategyKind::Rbd | StrategyKind::Aura | StrategyKind::VolumeSurprise => signal
            .levels
            .stop_target()
            .map(|levels| {
                signal.direction == SignalDirection::Bullish
                    && fresh
                    && levels.sl < price
                    && price < levels.tp
            })
            .unwrap_or(false),
    }
}

/// One loop iteration against the session. Returns the history to persist
/// when a trade was opened or closed.
fn evaluate(
    state: &mut SessionState,
    config: &PaperTradingConfig,
    kind: StrategyKind,
    candles: &[Candle],
    signals: &[Signal],
) -> anyhow::Result<Option<Vec<PaperTrade>>> {
    let latest = candles
        .last()
        .ok_or_else(|| anyhow!("No candles to evaluate"))?;
    let price = latest.close;
    if !price.is_finite() || price <= 0.0 {
        return Err(anyhow!("Invalid latest price {} at {}", price, latest.timestamp));
    }

    let rate = state.exchange_rate;
    let mut changed = false;

    if let Some(id) = state.active_trade_id.clone() {
        let mut closed_pnl = None;
        match state.trades.iter_mut().find(|t| t.id == id) {
            Some(trade) => {
                let pnl = (price - trade.entry_price) * trade.quantity * rate;
                trade.current_price = price;
                trade.pnl = pnl;
                trade.pnl_percent = (price - trade.entry_price) / trade.entry_price * 100.0;

                let outcome = if price >= trade.entry_price * (1.0 + config.take_profit_ratio) {
                    Some(TradeStatus::Win)
                } else if price <= trade.entry_price * (1.0 - config.stop_loss_ratio) {
                    Some(TradeStatus::Loss)
                } else {
                    None
                };

                if let Some(status) = outcome {
                    trade.status = status;
                    trade.exit_price = Some(price);
                    trade.exit_date = Some(Utc::now());
                    trade.realized_value = Some(trade.invested + pnl);
                    info!(
                        "Closed {} {} trade at {:.4}: {} (PnL {:.2})",
                        trade.symbol, trade.strategy, price, status, pnl
                    );
                    closed_pnl = Some(pnl);
                }
            }
            None => {
                warn!("Active trade {} missing from history; clearing", id);
                state.active_trade_id = None;
            }
        }

        if let Some(pnl) = closed_pnl {
            state.balance += pnl;
            state.active_trade_id = None;
            changed = true;
        }
    }

    if state.active_trade_id.is_none() {
        let wants_entry = signals
            .last()
            .map(|signal| entry_decision(kind, signal, latest, price, config.signal_freshness))
            .unwrap_or(false);

        let invest = state.balance * config.position_fraction;
        if wants_entry && invest > 0.0 {
            let symbol = state.symbol.clone().unwrap_or_default();
            let trade = PaperTrade {
                id: Uuid::new_v4().to_string(),
                symbol,
                strategy: kind.as_str().to_string(),
                position: PositionSide::Long,
                status: TradeStatus::Open,
                entry_date: Utc::now(),
                entry_price: price,
                quantity: invest / rate / price,
                invested: invest,
                current_price: price,
                pnl: 0.0,
                pnl_percent: 0.0,
                exit_date: None,
                exit_price: None,
                realized_value: None,
            };
            info!(
                "Opened {} {} trade at {:.4} investing {:.2}",
                trade.symbol, trade.strategy, price, invest
            );
            state.active_trade_id = Some(trade.id.clone());
            state.trades.insert(0, trade);
            changed = true;
        }
    }

    Ok(changed.then(|| state.trades.clone()))
}

struct RunningLoop {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

#[derive(Clone)]
struct LoopContext {
    generation: u64,
    symbol: String,
    kind: StrategyKind,
    config: PaperTradingConfig,
    source: Arc<dyn CandleSource>,
    store: TradeStore,
    state: Arc<RwLock<SessionState>>,
}

/// Single-session paper trader polling a candle source.
pub struct PaperTradingService {
    config: PaperTradingConfig,
    source: Arc<dyn CandleSource>,
    store: TradeStore,
    state: Arc<RwLock<SessionState>>,
    task: Mutex<Option<RunningLoop>>,
}

impl PaperTradingService {
    /// Loads the persisted history. The session starts stopped; an open trade
    /// is only picked up again by a `start` with the same symbol and strategy.
    pub fn new(config: PaperTradingConfig, source: Arc<dyn CandleSource>, store: TradeStore) -> Self {
        let trades = store.load();
        let open = trades.iter().filter(|t| t.is_open()).count();
        if open > 0 {
            info!("{} open paper trades found; waiting for an explicit start", open);
        }

        let state = SessionState {
            initial_capital: config.initial_capital,
            balance: config.initial_capital,
            exchange_rate: config.exchange_rate,
            trades,
            ..SessionState::default()
        };

        Self {
            config,
            source,
            store,
            state: Arc::new(RwLock::new(state)),
            task: Mutex::new(None),
        }
    }

    pub async fn start(
        &self,
        symbol: &str,
        strategy: StrategyKind,
        capital: f64,
    ) -> Result<(), PaperTradingError> {
        let symbol = normalize_symbol(symbol)
            .ok_or_else(|| PaperTradingError::InvalidRequest("symbol is empty".to_string()))?;
        if !capital.is_finite() || capital <= 0.0 {
            return Err(PaperTradingError::InvalidRequest(format!(
                "capital must be positive (value: {})",
                capital
            )));
        }

        let mut task = self.task.lock().await;
        let generation = {
            let mut state = self.state.write().await;
            if state.running {
                return Err(PaperTradingError::AlreadyRunning {
                    symbol: state.symbol.clone().unwrap_or_default(),
                    strategy: state.strategy.map(|s| s.to_string()).unwrap_or_default(),
                });
            }

            state.running = true;
            state.generation += 1;
            state.symbol = Some(symbol.clone());
            state.strategy = Some(strategy);
            state.initial_capital = capital;
            state.balance = capital;
            state.exchange_rate = resolve_exchange_rate(&symbol, self.config.exchange_rate);
            state.failed_iterations = 0;
            state.last_error = None;
            state.active_trade_id = state
                .trades
                .iter()
                .find(|t| t.is_open() && t.symbol == symbol && t.strategy == strategy.as_str())
                .map(|t| t.id.clone());
            if let Some(id) = &state.active_trade_id {
                info!("Reattached open trade {} for {} {}", id, strategy, symbol);
            }
            state.generation
        };

        // A previous loop was already told to stop; let it wind down on its own.
        if let Some(previous) = task.take() {
            let _ = previous.cancel.send(true);
        }

        let (cancel, cancel_rx) = watch::channel(false);
        let context = LoopContext {
            generation,
            symbol: symbol.clone(),
            kind: strategy,
            config: self.config.clone(),
            source: Arc::clone(&self.source),
            store: self.store.clone(),
            state: Arc::clone(&self.state),
        };
        let handle = tokio::spawn(run_loop(context, cancel_rx));
        *task = Some(RunningLoop { cancel, handle });

        info!("Started {} paper trading on {} with capital {:.2}", strategy, symbol, capital);
        Ok(())
    }

    pub async fn stop(&self) -> Result<(), PaperTradingError> {
        let task = self.task.lock().await;
        {
            let mut state = self.state.write().await;
            if !state.running {
                return Err(PaperTradingError::NotRunning);
            }
            state.running = false;
            state.generation += 1;
        }
        if let Some(running) = task.as_ref() {
            let _ = running.cancel.send(true);
        }
        info!("Stopped paper trading");
        Ok(())
    }

    pub async fn status(&self) -> PaperTradingStatus {
        self.state.read().await.snapshot()
    }

    /// Stop if running, wait for the loop to exit and flush history to disk.
    pub async fn shutdown(&self) -> Result<(), PaperTradingError> {
        match self.stop().await {
            Ok(()) | Err(PaperTradingError::NotRunning) => {}
            Err(err) => return Err(err),
        }

        let running = self.task.lock().await.take();
        if let Some(running) = running {
            if let Err(err) = running.handle.await {
                warn!("Paper trading loop ended abnormally: {}", err);
            }
        }

        let trades = self.state.read().await.trades.clone();
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save_now(&trades))
            .await
            .map_err(|err| anyhow!("Trade store task failed: {}", err))??;
        Ok(())
    }
}

async fn run_loop(ctx: LoopContext, mut cancel: watch::Receiver<bool>) {
    info!("Paper trading loop started for {} ({})", ctx.symbol, ctx.kind);
    let detector = create_detector(ctx.kind);

    loop {
        if *cancel.borrow() {
            break;
        }

        let candles = tokio::select! {
            _ = cancel.changed() => break,
            candles = ctx.source.fetch_history(&ctx.symbol, &ctx.config.interval, ctx.config.history_limit) => candles,
        };

        let delay = if candles.is_empty() {
            ctx.config.empty_retry_delay
        } else {
            let signals = detector.detect(&candles);
            let to_persist = {
                let mut state = ctx.state.write().await;
                if !state.running || state.generation != ctx.generation {
                    break;
                }
                match evaluate(&mut state, &ctx.config, ctx.kind, &candles, &signals) {
                    Ok(changed) => changed.map(|trades| ctx.store.snapshot(trades)),
                    Err(err) => {
                        state.failed_iterations += 1;
                        state.last_error = Some(err.to_string());
                        error!("Paper trading iteration failed: {:#}", err);
                        None
                    }
                }
            };
            if let Some(snapshot) = to_persist {
                ctx.store.save(snapshot);
            }
            ctx.config.poll_interval
        };

        tokio::select! {
            _ = cancel.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    info!("Paper trading loop for {} exited", ctx.symbol);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candle(minute: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 9, 2, 14, 0, 0).unwrap() + Duration::minutes(minute),
            open,
            high,
            low,
            close,
            volume: 1_500.0,
        }
    }

    fn stop_target_signal(minute: i64, direction: SignalDirection, sl: f64, tp: f64) -> Signal {
        Signal {
            name: "SMC Buy".to_string(),
            timestamp: candle(minute, 0.0, 0.0, 0.0, 0.0).timestamp,
            direction,
            price: 100.0,
            levels: SignalLevels::StopTarget(StopTargetLevels::new(sl, tp, "")),
        }
    }

    fn session(balance: f64) -> SessionState {
        SessionState {
            running: true,
            symbol: Some("BTC".to_string()),
            strategy: Some(StrategyKind::Rbd),
            initial_capital: balance,
            balance,
            exchange_rate: 16_000.0,
            ..SessionState::default()
        }
    }

    #[test]
    fn stop_target_entry_needs_fresh_bullish_signal_inside_levels() {
        let latest = candle(90, 100.0, 101.0, 99.0, 100.0);
        let hour = Duration::hours(1);

        let fresh = stop_target_signal(60, SignalDirection::Bullish, 95.0, 110.0);
        assert!(entry_decision(StrategyKind::Rbd, &fresh, &latest, 100.0, hour));
        assert!(!entry_decision(StrategyKind::Rbd, &fresh, &latest, 111.0, hour));

        let stale = stop_target_signal(30, SignalDirection::Bullish, 95.0, 110.0);
        assert!(!entry_decision(StrategyKind::Rbd, &stale, &latest, 100.0, hour));

        let bearish = stop_target_signal(60, SignalDirection::Bearish, 105.0, 90.0);
        assert!(!entry_decision(StrategyKind::Aura, &bearish, &latest, 100.0, hour));
    }

    #[test]
    fn gap_entry_requires_price_inside_gap() {
        let latest = candle(0, 100.0, 106.0, 99.0, 104.0);
        let signal = Signal {
            name: "Bullish FVG".to_string(),
            timestamp: latest.timestamp,
            direction: SignalDirection::Bullish,
            price: 104.0,
            levels: SignalLevels::FairValueGap(GapLevels {
                fvg_top: 105.0,
                fvg_bottom: 100.0,
                mid_price: 102.5,
            }),
        };
        let hour = Duration::hours(1);

        assert!(entry_decision(StrategyKind::Fvg, &signal, &latest, 104.0, hour));
        assert!(entry_decision(StrategyKind::Fvg, &signal, &latest, 100.0, hour));
        assert!(!entry_decision(StrategyKind::Fvg, &signal, &latest, 99.0, hour));
        assert!(!entry_decision(StrategyKind::Fvg, &signal, &latest, 106.0, hour));
    }

    #[test]
    fn opens_then_closes_with_take_profit() {
        let config = PaperTradingConfig::default();
        let mut state = session(10_000_000.0);
        let entry_window = vec![candle(0, 99.0, 101.0, 98.0, 100.0)];
        let signals = vec![stop_target_signal(0, SignalDirection::Bullish, 95.0, 110.0)];

        let saved = evaluate(&mut state, &config, StrategyKind::Rbd, &entry_window, &signals)
            .unwrap()
            .expect("entry persisted");
        assert_eq!(saved.len(), 1);
        let opened = state.active_trade().unwrap().clone();
        assert_eq!(opened.invested, 1_000_000.0);
        assert!((opened.quantity - 1_000_000.0 / 16_000.0 / 100.0).abs() < 1e-12);

        // Price drifts but stays inside the band: mark-to-market only.
        let drift = vec![candle(1, 100.0, 101.5, 99.5, 101.0)];
        assert!(evaluate(&mut state, &config, StrategyKind::Rbd, &drift, &[])
            .unwrap()
            .is_none());
        assert_eq!(state.active_trade().unwrap().current_price, 101.0);

        let exit = vec![candle(2, 101.0, 103.0, 100.5, 102.5)];
        let saved = evaluate(&mut state, &config, StrategyKind::Rbd, &exit, &[])
            .unwrap()
            .expect("exit persisted");
        let closed = &saved[0];
        assert_eq!(closed.status, TradeStatus::Win);
        assert_eq!(closed.exit_price, Some(102.5));
        assert!(state.active_trade_id.is_none());
        let expected_pnl = (102.5 - 100.0) * opened.quantity * 16_000.0;
        assert!((closed.pnl - expected_pnl).abs() < 1e-6);
        assert!((state.balance - (10_000_000.0 + expected_pnl)).abs() < 1e-6);
    }

    #[test]
    fn stop_loss_closes_as_loss() {
        let config = PaperTradingConfig::default();
        let mut state = session(1_000_000.0);
        let signals = vec![stop_target_signal(0, SignalDirection::Bullish, 95.0, 110.0)];
        evaluate(&mut state, &config, StrategyKind::Rbd, &[candle(0, 99.0, 101.0, 98.0, 100.0)], &signals)
            .unwrap();

        let saved = evaluate(&mut state, &config, StrategyKind::Rbd, &[candle(1, 99.0, 99.5, 98.5, 98.9)], &[])
            .unwrap()
            .expect("exit persisted");

        assert_eq!(saved[0].status, TradeStatus::Loss);
        assert!(state.balance < 1_000_000.0);
    }

    #[test]
    fn invalid_price_is_an_error() {
        let config = PaperTradingConfig::default();
        let mut state = session(1_000_000.0);
        let window = vec![candle(0, 100.0, 101.0, 99.0, f64::NAN)];
        assert!(evaluate(&mut state, &config, StrategyKind::Rbd, &window, &[]).is_err());
        assert!(state.trades.is_empty());
    }
}
