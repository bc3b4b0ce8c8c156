pub mod backtester;
pub mod candle_source;
pub mod candle_utils;
pub mod config;
pub mod indicators;
pub mod models;
pub mod paper_trader;
pub mod performance;
pub mod strategy;
pub mod strategy_utils;
pub mod trade_store;

pub mod commands {
    pub mod backtest;
    pub mod backtest_all;
    pub mod paper_trade;
    pub mod signals;
}
