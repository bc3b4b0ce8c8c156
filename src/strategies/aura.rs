use crate::indicators::{calculate_atr, calculate_cci, calculate_dmi, calculate_mfi, calculate_rsi};
use crate::models::*;
use crate::strategy_utils::stop_target_signal;

const ALPHA_PERIOD: usize = 14;
const MAGIC_PERIOD: usize = 20;
const ADX_PERIOD: usize = 14;
const RSI_PERIOD: usize = 14;
const ALPHA_WARMUP: usize = 20;
const SCORE_THRESHOLD: f64 = 0.03;
const ADX_SATURATION: f64 = 25.0;
const REENTRY_BUFFER: f64 = 0.005;
const REWARD_MULTIPLIER: f64 = 1.5;

/// Triple consensus of an MFI trailing line, the sign of CCI and a momentum
/// score weighted by trend strength.
pub struct AuraDetector;

impl AuraDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AuraDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Trend {
    Up,
    Down,
}

#[derive(Clone, Copy, Debug)]
struct AlphaLine {
    level: f64,
    trend: Trend,
}

impl AlphaLine {
    /// Advance the trailing line by one candle.
    fn next(previous: Option<AlphaLine>, raw_stop: f64, zone: Trend, warming_up: bool) -> AlphaLine {
        let level = match previous {
            Some(prev) if !warming_up && prev.trend == zone => match zone {
                Trend::Up => raw_stop.max(prev.level),
                Trend::Down => raw_stop.min(prev.level),
            },
            _ => raw_stop,
        };
        AlphaLine { level, trend: zone }
    }
}

struct Indicators {
    mfi: Vec<f64>,
    atr: Vec<f64>,
    cci: Vec<f64>,
    adx: Vec<f64>,
    rsi: Vec<f64>,
}

impl Indicators {
    fn compute(candles: &[Candle]) -> Self {
        Self {
            mfi: calculate_mfi(candles, ALPHA_PERIOD),
            atr: calculate_atr(candles, ALPHA_PERIOD),
            cci: calculate_cci(candles, MAGIC_PERIOD),
            adx: calculate_dmi(candles, ADX_PERIOD).adx,
            rsi: calculate_rsi(candles, RSI_PERIOD),
        }
    }

    fn score(&self, i: usize) -> f64 {
        let norm_rsi = (self.rsi[i] - 50.0) / 50.0;
        let norm_mfi = (self.mfi[i] - 50.0) / 50.0;
        let strength = (self.adx[i] / ADX_SATURATION).min(1.0);
        (norm_rsi + norm_mfi) * strength
    }
}

/// What the signal rules see for one candle.
#[derive(Clone, Copy, Debug)]
struct Reading {
    alpha: AlphaLine,
    cci: f64,
    score: f64,
}

/// Primary signal or line re-entry for one candle, ignoring history.
fn classify(candle: &Candle, reading: &Reading) -> Option<(SignalDirection, bool)> {
    let Reading { alpha, cci, score } = *reading;
    let magic_bull = cci > 0.0;
    let magic_bear = cci < 0.0;

    let is_buy = alpha.trend == Trend::Up && magic_bull && score > SCORE_THRESHOLD;
    let is_sell = alpha.trend == Trend::Down && magic_bear && score < -SCORE_THRESHOLD;

    let reentry_buy = alpha.trend == Trend::Up
        && magic_bull
        && candle.low <= alpha.level * (1.0 + REENTRY_BUFFER)
        && candle.close > alpha.level;
    let reentry_sell = alpha.trend == Trend::Down
        && magic_bear
        && candle.high >= alpha.level * (1.0 - REENTRY_BUFFER)
        && candle.close < alpha.level;

    if is_buy {
        Some((SignalDirection::Bullish, false))
    } else if is_sell {
        Some((SignalDirection::Bearish, false))
    } else if reentry_buy {
        Some((SignalDirection::Bullish, true))
    } else if reentry_sell {
        Some((SignalDirection::Bearish, true))
    } else {
        None
    }
}

/// Walk the readings in candle order. A primary signal repeating the last
/// major direction is dropped; re-entries never move the major direction.
fn scan<'a>(steps: impl IntoIterator<Item = (&'a Candle, Reading)>) -> Vec<Signal> {
    let mut last_major: Option<SignalDirection> = None;
    let mut signals = Vec::new();

    for (candle, reading) in steps {
        let Some((direction, is_reentry)) = classify(candle, &reading) else {
            continue;
        };
        if !is_reentry && last_major == Some(direction) {
            continue;
        }

        let line = reading.alpha.level;
        let (base_name, tp) = match direction {
            SignalDirection::Bullish => (
                "Aura V14 Buy",
                candle.close + (candle.close - line) * REWARD_MULTIPLIER,
            ),
            _ => (
                "Aura V14 Sell",
                candle.close - (line - candle.close) * REWARD_MULTIPLIER,
            ),
        };
        let name = if is_reentry {
            format!("{} (Re-entry)", base_name)
        } else {
            base_name.to_string()
        };

        signals.push(stop_target_signal(
            name,
            candle,
            direction,
            StopTargetLevels::new(
                line,
                tp,
                format!("Alpha+Magic+Lorentz (Score: {:.2})", reading.score),
            )
            .with_score(reading.score),
        ));

        if !is_reentry {
            last_major = Some(direction);
        }
    }

    signals
}

impl super::Detector for AuraDetector {
    fn kind(&self) -> super::StrategyKind {
        super::StrategyKind::Aura
    }

    fn detect(&self, candles: &[Candle]) -> Vec<Signal> {
        if candles.len() < self.min_data_points() {
            return Vec::new();
        }

        let ind = Indicators::compute(candles);
        let mut line: Option<AlphaLine> = None;
        let steps = candles.iter().enumerate().skip(1).map(|(i, candle)| {
            let (raw_stop, zone) = if ind.mfi[i] >= 50.0 {
                (candle.low - ind.atr[i], Trend::Up)
            } else {
                (candle.high + ind.atr[i], Trend::Down)
            };
            let alpha = AlphaLine::next(line, raw_stop, zone, i < ALPHA_WARMUP);
            line = Some(alpha);
            let reading = Reading {
                alpha,
                cci: ind.cci[i],
                score: ind.score(i),
            };
            (candle, reading)
        });

        scan(steps)
    }

    fn min_data_points(&self) -> usize {
        50
    }
}
