use crate::indicators::calculate_atr;
use crate::models::*;
use crate::strategy_utils::stop_target_signal;

const STRUCTURE_LOOKBACK: usize = 20;
const ATR_PERIOD: usize = 14;
const STOP_ATR_MULTIPLIER: f64 = 1.0;
const TARGET_ATR_MULTIPLIER: f64 = 3.0;
const RETEST_REASON: &str = "MSS + FVG Retest";

/// Market structure shift followed by a retest of the latest unconsumed fair
/// value gap in the direction of the structure. Registered as `RBD`.
pub struct StructureRetestDetector;

impl StructureRetestDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StructureRetestDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct StructureState {
    bullish: bool,
    bearish: bool,
    bull_gap_top: Option<f64>,
    bear_gap_bottom: Option<f64>,
}

impl StructureState {
    fn update_structure(&mut self, close: f64, highest_high: f64, lowest_low: f64) {
        if close > highest_high {
            self.bullish = true;
            self.bearish = false;
        }
        if close < lowest_low {
            self.bearish = true;
            self.bullish = false;
        }
    }

    fn update_gaps(&mut self, current: &Candle, previous: &Candle, two_back: &Candle) {
        if current.low > two_back.high && previous.close > two_back.high {
            self.bull_gap_top = Some(two_back.high);
        }
        if current.high < two_back.low && previous.close < two_back.low {
            self.bear_gap_bottom = Some(two_back.low);
        }
    }
}

impl super::Detector for StructureRetestDetector {
    fn kind(&self) -> super::StrategyKind {
        super::StrategyKind::Rbd
    }

    fn detect(&self, candles: &[Candle]) -> Vec<Signal> {
        if candles.len() < self.min_data_points() {
            return Vec::new();
        }

        let atr_values = calculate_atr(candles, ATR_PERIOD);
        let mut state = StructureState::default();
        let mut signals = Vec::new();

        for i in STRUCTURE_LOOKBACK..candles.len() {
            let current = &candles[i];
            let window = &candles[i - STRUCTURE_LOOKBACK..i];
            let highest_high = window.iter().map(|c| c.high).fold(f64::MIN, f64::max);
            let lowest_low = window.iter().map(|c| c.low).fold(f64::MAX, f64::min);

            state.update_structure(current.close, highest_high, lowest_low);
            state.update_gaps(current, &candles[i - 1], &candles[i - 2]);

            let atr = atr_values[i];
            if atr == 0.0 {
                continue;
            }

            if state.bullish {
                if let Some(top) = state.bull_gap_top {
                    if current.low <= top && current.close > top {
                        signals.push(stop_target_signal(
                            "SMC Buy",
                            current,
                            SignalDirection::Bullish,
                            StopTargetLevels::new(
                                current.low - atr * STOP_ATR_MULTIPLIER,
                                current.close + atr * TARGET_ATR_MULTIPLIER,
                                RETEST_REASON,
                            )
                            .with_pivot_type("DBR"),
                        ));
                        state.bull_gap_top = None;
                    }
                }
            }

            if state.bearish {
                if let Some(bottom) = state.bear_gap_bottom {
                    if current.high >= bottom && current.close < bottom {
                        signals.push(stop_target_signal(
                            "SMC Sell",
                            current,
                            SignalDirection::Bearish,
                            StopTargetLevels::new(
                                current.high + atr * STOP_ATR_MULTIPLIER,
                                current.close - atr * TARGET_ATR_MULTIPLIER,
                                RETEST_REASON,
                            )
                            .with_pivot_type("RBD"),
                        ));
                        state.bear_gap_bottom = None;
                    }
                }
            }
        }

        signals
    }

    fn min_data_points(&self) -> usize {
        STRUCTURE_LOOKBACK + 5
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::strategy::Detector;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap() + Duration::hours(i),
            open,
            high,
            low,
            close,
            volume: 2_000.0,
        }
    }

    /// Flat base, breakout that leaves a bullish gap, then a retest of the gap.
    pub(crate) fn bullish_retest_series() -> Vec<Candle> {
        let mut candles: Vec<Candle> = (0..22).map(|i| bar(i, 100.0, 101.0, 99.0, 100.0)).collect();
        candles.push(bar(22, 100.0, 104.0, 100.0, 103.5));
        candles.push(bar(23, 103.5, 106.0, 103.0, 105.5));
        candles.push(bar(24, 105.5, 106.0, 100.5, 102.0));
        candles.push(bar(25, 102.0, 103.0, 100.8, 102.5));
        candles
    }

    #[test]
    fn emits_bullish_retest_once() {
        let candles = bullish_retest_series();
        let signals = StructureRetestDetector::new().detect(&candles);

        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.direction, SignalDirection::Bullish);
        assert_eq!(signal.timestamp, candles[24].timestamp);
        assert_eq!(signal.price, 102.0);

        let levels = signal.levels.stop_target().expect("stop/target levels");
        let atr = calculate_atr(&candles, ATR_PERIOD)[24];
        assert!(atr > 0.0);
        assert!((levels.sl - (100.5 - atr)).abs() < 1e-9);
        assert!((levels.tp - (102.0 + 3.0 * atr)).abs() < 1e-9);
        assert_eq!(levels.reason, RETEST_REASON);
        assert_eq!(levels.pivot_type.as_deref(), Some("DBR"));
        assert_eq!(levels.score, None);
    }

    #[test]
    fn emits_bearish_retest_mirror() {
        let mut candles: Vec<Candle> = (0..22).map(|i| bar(i, 100.0, 101.0, 99.0, 100.0)).collect();
        candles.push(bar(22, 100.0, 100.0, 96.0, 96.5));
        candles.push(bar(23, 96.5, 97.0, 94.0, 94.5));
        candles.push(bar(24, 94.5, 99.5, 94.0, 98.0));
        candles.push(bar(25, 98.0, 99.2, 97.0, 97.5));

        let signals = StructureRetestDetector::new().detect(&candles);

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, SignalDirection::Bearish);
        assert_eq!(signals[0].timestamp, candles[24].timestamp);
        let levels = signals[0].levels.stop_target().expect("stop/target levels");
        assert!(levels.sl > 99.5);
        assert!(levels.tp < 98.0);
        assert_eq!(levels.pivot_type.as_deref(), Some("RBD"));
    }

    #[test]
    fn needs_enough_history() {
        let candles = bullish_retest_series();
        assert!(StructureRetestDetector::new()
            .detect(&candles[..24])
            .is_empty());
    }

    #[test]
    fn detection_is_idempotent() {
        let candles = bullish_retest_series();
        let detector = StructureRetestDetector::new();
        assert_eq!(detector.detect(&candles), detector.detect(&candles));
    }
}
