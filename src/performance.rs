use crate::models::*;

/// Money outcome of one closed (or force-closed) trade, in home currency.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeValuation {
    pub pnl: f64,
    pub pnl_percent: f64,
    pub realized_value: f64,
}

/// Values a long position by converting the home-currency stake into quote
/// currency, buying units at `entry`, selling at `exit` and converting back.
///
/// Each conversion step is applied separately; folding them into a single
/// ratio changes the rounding of the result.
pub fn converted_valuation(invested: f64, exchange_rate: f64, entry: f64, exit: f64) -> TradeValuation {
    let quote_capital = invested / exchange_rate;
    let units = quote_capital / entry;
    let final_quote = units * exit;
    let final_home = final_quote * exchange_rate;

    TradeValuation {
        pnl: final_home - invested,
        pnl_percent: (exit - entry) / entry * 100.0,
        realized_value: final_home,
    }
}

/// Values a long or short position from its side-aware percentage move.
pub fn directional_valuation(
    invested: f64,
    exchange_rate: f64,
    side: PositionSide,
    entry: f64,
    exit: f64,
) -> TradeValuation {
    let move_pct = match side {
        PositionSide::Long => (exit - entry) / entry,
        PositionSide::Short => (entry - exit) / entry,
    };
    let quote_capital = invested / exchange_rate;
    let pnl = quote_capital * move_pct * exchange_rate;

    TradeValuation {
        pnl,
        pnl_percent: move_pct * 100.0,
        realized_value: invested + pnl,
    }
}

pub fn summarize(strategy: &str, trades: Vec<Trade>) -> BacktestSummary {
    let total_trades = trades.len();
    let wins = trades.iter().filter(|t| t.status == TradeStatus::Win).count();
    let losses = trades.iter().filter(|t| t.status == TradeStatus::Loss).count();
    let open_trades = total_trades - wins - losses;
    let total_pnl = trades.iter().map(|t| t.pnl).sum();
    let win_rate = if total_trades > 0 {
        wins as f64 / total_trades as f64 * 100.0
    } else {
        0.0
    };

    BacktestSummary {
        strategy: strategy.to_string(),
        total_trades,
        wins,
        losses,
        open_trades,
        win_rate,
        total_pnl,
        trades,
    }
}
