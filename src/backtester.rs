use crate::candle_utils::index_by_timestamp;
use crate::models::*;
use crate::performance::{converted_valuation, directional_valuation, summarize, TradeValuation};
use crate::strategy::{create_detector, StrategyKind};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rayon::prelude::*;
use std::time::Instant;

const FVG_REWARD_MULTIPLIER: f64 = 1.5;

/// Symbols listed on the Indonesia Stock Exchange are quoted in the home
/// currency.
pub fn resolve_exchange_rate(symbol: &str, default_rate: f64) -> f64 {
    if symbol.trim().to_ascii_uppercase().ends_with(".JK") {
        1.0
    } else {
        default_rate
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Valuation {
    Converted,
    Directional,
}

/// An entered position walking forward through the candles.
#[derive(Debug, Clone)]
struct Position {
    entry_date: DateTime<Utc>,
    entry_price: f64,
    side: PositionSide,
    sl: f64,
    tp: f64,
    exit: Option<(DateTime<Utc>, f64, TradeStatus)>,
}

impl Position {
    fn new(entry_date: DateTime<Utc>, entry_price: f64, side: PositionSide, sl: f64, tp: f64) -> Self {
        Self {
            entry_date,
            entry_price,
            side,
            sl,
            tp,
            exit: None,
        }
    }

    fn is_closed(&self) -> bool {
        self.exit.is_some()
    }

    fn close(&mut self, candle: &Candle, price: f64, status: TradeStatus) {
        self.exit = Some((candle.timestamp, price, status));
    }

    /// Stop-loss is checked before take-profit on the same candle.
    fn check_exit(&mut self, candle: &Candle) -> bool {
        let (stopped, target_hit) = match self.side {
            PositionSide::Long => (candle.low <= self.sl, candle.high >= self.tp),
            PositionSide::Short => (candle.high >= self.sl, candle.low <= self.tp),
        };
        if stopped {
            self.close(candle, self.sl, TradeStatus::Loss);
        } else if target_hit {
            self.close(candle, self.tp, TradeStatus::Win);
        }
        self.is_closed()
    }
}

pub struct Backtester {
    initial_capital: f64,
    exchange_rate: f64,
}

impl Backtester {
    pub fn new(initial_capital: f64, exchange_rate: f64) -> Self {
        Self {
            initial_capital,
            exchange_rate,
        }
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn exchange_rate(&self) -> f64 {
        self.exchange_rate
    }

    /// Detect signals for `kind` over `candles` and replay them.
    pub fn run(&self, kind: StrategyKind, candles: &[Candle]) -> BacktestSummary {
        let detector = create_detector(kind);
        let signals = detector.detect(candles);
        debug!("{} produced {} signals over {} candles", kind, signals.len(), candles.len());
        self.run_signals(kind, candles, &signals)
    }

    /// Replay already detected signals. Each signal is simulated independently
    /// from the candle after it; signals not found in `candles`, or sitting on
    /// the last candle, are skipped.
    pub fn run_signals(&self, kind: StrategyKind, candles: &[Candle], signals: &[Signal]) -> BacktestSummary {
        let index = index_by_timestamp(candles);
        let mut trades = Vec::new();

        for signal in signals {
            let Some(&idx) = index.get(&signal.timestamp) else {
                continue;
            };
            if idx + 1 >= candles.len() {
                continue;
            }

            let replayed = match &signal.levels {
                SignalLevels::PopGun(levels) => self.replay_popgun(levels, &candles[idx + 1..]),
                SignalLevels::FairValueGap(levels) => {
                    self.replay_gap(signal, levels, &candles[idx + 1..])
                }
                SignalLevels::StopTarget(levels) => {
                    self.replay_stop_target(signal, levels, &candles[idx + 1..])
                }
            };

            if let Some((position, valuation)) = replayed {
                trades.push(self.finish(position, valuation, candles));
            }
        }

        summarize(kind.as_str(), trades)
    }

    /// Backtest every registered strategy over the same candles in parallel.
    pub fn run_all(&self, candles: &[Candle]) -> Vec<BacktestSummary> {
        let started = Instant::now();
        let summaries: Vec<BacktestSummary> = StrategyKind::ALL
            .par_iter()
            .map(|&kind| self.run(kind, candles))
            .collect();

        info!(
            "Backtested {} strategies over {} candles in {:.2?}",
            summaries.len(),
            candles.len(),
            started.elapsed()
        );
        summaries
    }

    fn replay_popgun(&self, levels: &PopGunLevels, forward: &[Candle]) -> Option<(Position, Valuation)> {
        let setup = &levels.targets.long;
        let mut position: Option<Position> = None;

        for candle in forward {
            if position.is_none() {
                if candle.high < setup.entry {
                    continue;
                }
                let mut entered = Position::new(
                    candle.timestamp,
                    setup.entry,
                    PositionSide::Long,
                    setup.sl,
                    setup.tp1,
                );
                // Gap open through the first target fills and exits at the open.
                if candle.open > setup.tp1 {
                    entered.close(candle, candle.open, TradeStatus::Win);
                    return Some((entered, Valuation::Converted));
                }
                position = Some(entered);
            }

            if let Some(open) = position.as_mut() {
                if open.check_exit(candle) {
                    break;
                }
            }
        }

        position.map(|p| (p, Valuation::Converted))
    }

    fn replay_gap(&self, signal: &Signal, levels: &GapLevels, forward: &[Candle]) -> Option<(Position, Valuation)> {
        let entry = levels.fvg_top;
        let stop = levels.fvg_bottom;
        let risk = entry - stop;
        if !risk.is_finite() || risk <= 0.0 {
            return None;
        }
        let target = entry + FVG_REWARD_MULTIPLIER * risk;

        let mut position: Option<Position> = None;
        for candle in forward.iter().filter(|c| c.timestamp > signal.timestamp) {
            if position.is_none() {
                if candle.low > entry {
                    continue;
                }
                position = Some(Position::new(
                    candle.timestamp,
                    entry,
                    PositionSide::Long,
                    stop,
                    target,
                ));
            }

            if let Some(open) = position.as_mut() {
                if open.check_exit(candle) {
                    break;
                }
            }
        }

        position.map(|p| (p, Valuation::Converted))
    }

    fn replay_stop_target(
        &self,
        signal: &Signal,
        levels: &StopTargetLevels,
        forward: &[Candle],
    ) -> Option<(Position, Valuation)> {
        let usable = |level: f64| level.is_finite() && level != 0.0;
        if !usable(levels.sl) || !usable(levels.tp) {
            debug!("Skipping {} at {}: missing stop/target", signal.name, signal.timestamp);
            return None;
        }

        let mut position = Position::new(
            signal.timestamp,
            signal.price,
            PositionSide::from_direction(signal.direction),
            levels.sl,
            levels.tp,
        );
        let entry_date = position.entry_date;
        for candle in forward.iter().filter(|c| c.timestamp > entry_date) {
            if position.check_exit(candle) {
                break;
            }
        }

        Some((position, Valuation::Directional))
    }

    /// Value the position; unresolved ones are marked at the last close and
    /// keep the Open status.
    fn finish(&self, position: Position, valuation: Valuation, candles: &[Candle]) -> Trade {
        let (exit_date, exit_price, status) = match position.exit {
            Some(exit) => exit,
            None => {
                let last = &candles[candles.len() - 1];
                (last.timestamp, last.close, TradeStatus::Open)
            }
        };

        let TradeValuation {
            pnl,
            pnl_percent,
            realized_value,
        } = match valuation {
            Valuation::Converted => converted_valuation(
                self.initial_capital,
                self.exchange_rate,
                position.entry_price,
                exit_price,
            ),
            Valuation::Directional => directional_valuation(
                self.initial_capital,
                self.exchange_rate,
                position.side,
                position.entry_price,
                exit_price,
            ),
        };

        Trade {
            entry_date: position.entry_date,
            exit_date: Some(exit_date),
            entry_price: position.entry_price,
            exit_price: Some(exit_price),
            position: position.side,
            status,
            pnl,
            pnl_percent,
            invested: self.initial_capital,
            realized_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const CAPITAL: f64 = 10_000_000.0;
    const RATE: f64 = 16_000.0;

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap() + Duration::days(i),
            open,
            high,
            low,
            close,
            volume: 1_000.0,
        }
    }

    fn popgun_setup() -> Vec<Candle> {
        vec![
            bar(0, 70.0, 99.0, 55.0, 80.0),
            bar(1, 75.0, 90.0, 60.0, 80.0),
            bar(2, 80.0, 100.0, 50.0, 95.0),
        ]
    }

    fn stop_target(timestamp: DateTime<Utc>, direction: SignalDirection, price: f64, sl: f64, tp: f64) -> Signal {
        Signal {
            name: "test".to_string(),
            timestamp,
            direction,
            price,
            levels: SignalLevels::StopTarget(StopTargetLevels::new(sl, tp, "")),
        }
    }

    #[test]
    fn popgun_long_hits_first_target() {
        let mut candles = popgun_setup();
        candles.push(bar(3, 96.0, 101.0, 94.0, 100.0));
        candles.push(bar(4, 121.0, 155.0, 120.0, 150.0));

        let summary = Backtester::new(CAPITAL, RATE).run(StrategyKind::PopGun, &candles);

        assert_eq!(summary.strategy, "POPGUN");
        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.win_rate, 100.0);
        let trade = &summary.trades[0];
        assert_eq!(trade.entry_price, 100.0);
        assert_eq!(trade.entry_date, candles[3].timestamp);
        assert_eq!(trade.exit_price, Some(150.0));
        assert_eq!(trade.exit_date, Some(candles[4].timestamp));
        assert_eq!(trade.pnl_percent, 50.0);
        let expected = CAPITAL / RATE / 100.0 * 150.0 * RATE - CAPITAL;
        assert_eq!(summary.total_pnl, expected);
    }

    #[test]
    fn popgun_gap_above_target_exits_at_open() {
        let mut candles = popgun_setup();
        candles.push(bar(3, 160.0, 170.0, 158.0, 165.0));

        let summary = Backtester::new(CAPITAL, RATE).run(StrategyKind::PopGun, &candles);

        let trade = &summary.trades[0];
        assert_eq!(trade.status, TradeStatus::Win);
        assert_eq!(trade.entry_price, 100.0);
        assert_eq!(trade.exit_price, Some(160.0));
    }

    #[test]
    fn popgun_stop_wins_ties_on_the_same_candle() {
        let mut candles = popgun_setup();
        candles.push(bar(3, 99.0, 151.0, 49.0, 120.0));

        let summary = Backtester::new(CAPITAL, RATE).run(StrategyKind::PopGun, &candles);

        assert_eq!(summary.losses, 1);
        assert_eq!(summary.trades[0].exit_price, Some(50.0));
    }

    #[test]
    fn popgun_without_trigger_has_no_trade() {
        let mut candles = popgun_setup();
        candles.push(bar(3, 95.0, 99.0, 90.0, 96.0));

        let summary = Backtester::new(CAPITAL, RATE).run(StrategyKind::PopGun, &candles);

        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.win_rate, 0.0);
    }

    #[test]
    fn gap_fill_then_target() {
        let candles = vec![
            bar(0, 96.0, 100.0, 95.0, 99.0),
            bar(1, 99.0, 108.0, 98.0, 107.0),
            bar(2, 107.0, 110.0, 105.0, 109.0),
            bar(3, 108.0, 109.0, 104.0, 106.0),
            bar(4, 106.0, 113.0, 105.5, 112.0),
        ];

        let summary = Backtester::new(CAPITAL, RATE).run(StrategyKind::Fvg, &candles);

        assert_eq!(summary.total_trades, 1);
        let trade = &summary.trades[0];
        assert_eq!(trade.entry_price, 105.0);
        assert_eq!(trade.entry_date, candles[3].timestamp);
        assert_eq!(trade.status, TradeStatus::Win);
        assert_eq!(trade.exit_price, Some(112.5));
    }

    #[test]
    fn gap_fill_and_stop_on_same_candle_is_a_loss() {
        let candles = vec![
            bar(0, 96.0, 100.0, 95.0, 99.0),
            bar(1, 99.0, 108.0, 98.0, 107.0),
            bar(2, 107.0, 110.0, 105.0, 109.0),
            bar(3, 108.0, 120.0, 99.0, 101.0),
        ];

        let summary = Backtester::new(CAPITAL, RATE).run(StrategyKind::Fvg, &candles);

        assert_eq!(summary.losses, 1);
        assert_eq!(summary.trades[0].exit_price, Some(100.0));
    }

    #[test]
    fn unresolved_trade_is_marked_at_last_close() {
        let candles = vec![
            bar(0, 100.0, 101.0, 99.0, 100.0),
            bar(1, 100.0, 104.0, 98.0, 103.0),
            bar(2, 103.0, 105.0, 101.0, 104.0),
        ];
        let signals = vec![stop_target(candles[0].timestamp, SignalDirection::Bullish, 100.0, 90.0, 120.0)];

        let summary = Backtester::new(1_600_000.0, RATE).run_signals(StrategyKind::Rbd, &candles, &signals);

        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.open_trades, 1);
        assert_eq!(summary.win_rate, 0.0);
        let trade = &summary.trades[0];
        assert_eq!(trade.status, TradeStatus::Open);
        assert_eq!(trade.exit_price, Some(104.0));
        assert_eq!(trade.exit_date, Some(candles[2].timestamp));
        assert!((trade.pnl - 64_000.0).abs() < 1e-6);
    }

    #[test]
    fn short_retest_mirrors_comparisons() {
        let candles = vec![
            bar(0, 100.0, 101.0, 99.0, 100.0),
            bar(1, 100.0, 100.5, 96.0, 97.0),
            bar(2, 97.0, 98.0, 89.0, 90.0),
        ];
        let signals = vec![stop_target(candles[0].timestamp, SignalDirection::Bearish, 100.0, 102.0, 90.0)];

        let summary = Backtester::new(1_600_000.0, RATE).run_signals(StrategyKind::Rbd, &candles, &signals);

        let trade = &summary.trades[0];
        assert_eq!(trade.position, PositionSide::Short);
        assert_eq!(trade.status, TradeStatus::Win);
        assert_eq!(trade.exit_price, Some(90.0));
        assert!(trade.pnl > 0.0);
        assert_eq!(trade.realized_value, 1_600_000.0 + trade.pnl);
    }

    #[test]
    fn skips_signals_on_last_candle_unknown_time_or_missing_levels() {
        let candles = vec![bar(0, 100.0, 101.0, 99.0, 100.0), bar(1, 100.0, 101.0, 99.0, 100.0)];
        let signals = vec![
            stop_target(candles[1].timestamp, SignalDirection::Bullish, 100.0, 90.0, 110.0),
            stop_target(candles[0].timestamp + Duration::hours(1), SignalDirection::Bullish, 100.0, 90.0, 110.0),
            stop_target(candles[0].timestamp, SignalDirection::Bullish, 100.0, f64::NAN, 110.0),
            stop_target(candles[0].timestamp, SignalDirection::Bullish, 100.0, 0.0, 110.0),
            stop_target(candles[0].timestamp, SignalDirection::Bearish, 100.0, 105.0, 0.0),
        ];

        let summary = Backtester::new(CAPITAL, RATE).run_signals(StrategyKind::Rbd, &candles, &signals);

        assert_eq!(summary.total_trades, 0);
    }

    #[test]
    fn run_all_covers_every_strategy() {
        let mut candles = popgun_setup();
        candles.push(bar(3, 96.0, 101.0, 94.0, 100.0));
        candles.push(bar(4, 121.0, 155.0, 120.0, 150.0));

        let summaries = Backtester::new(CAPITAL, RATE).run_all(&candles);

        let names: Vec<&str> = summaries.iter().map(|s| s.strategy.as_str()).collect();
        assert_eq!(names, vec!["POPGUN", "FVG", "RBD", "AURA", "VOLUME_SURPRISE"]);
        assert_eq!(summaries[0].wins, 1);
        assert!(summaries[2..].iter().all(|s| s.total_trades == 0));
    }

    #[test]
    fn idx_symbols_use_home_currency() {
        assert_eq!(resolve_exchange_rate("BBCA.JK", 16_000.0), 1.0);
        assert_eq!(resolve_exchange_rate("bbri.jk", 16_000.0), 1.0);
        assert_eq!(resolve_exchange_rate("BTC-USD", 16_000.0), 16_000.0);
    }
}
