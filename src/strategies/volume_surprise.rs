use crate::models::*;
use crate::strategy_utils::{round2, stop_target_signal};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::Serialize;
use std::collections::HashMap;

const LOOKBACK_PERIODS: usize = 20;
const MIN_SLOT_HISTORY: usize = 3;
const SURPRISE_THRESHOLD: f64 = 1.5;
const MIN_VOLUME: f64 = 1000.0;

/// Per-candle expected volume derived from same time-of-week history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeAnalysis {
    pub timestamp: DateTime<Utc>,
    pub volume: f64,
    pub expected_volume: f64,
    pub is_bullish: bool,
}

type SlotKey = (u32, u32, u32);

fn slot_key(timestamp: &DateTime<Utc>) -> SlotKey {
    (
        timestamp.weekday().num_days_from_monday(),
        timestamp.hour(),
        timestamp.minute(),
    )
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Expected volume for every candle. A slot with at least three prior
/// observations uses the mean of its last `lookback` volumes; otherwise the
/// previous `lookback` candles are averaged, and the first candles fall back
/// to their own volume.
pub fn analyze_volume_surprise(candles: &[Candle], lookback: usize) -> Vec<VolumeAnalysis> {
    let mut history: HashMap<SlotKey, Vec<f64>> = HashMap::new();
    let mut results = Vec::with_capacity(candles.len());

    for (i, candle) in candles.iter().enumerate() {
        let slot = history.entry(slot_key(&candle.timestamp)).or_default();

        let expected_volume = if slot.len() >= MIN_SLOT_HISTORY {
            let start = slot.len().saturating_sub(lookback);
            mean(&slot[start..])
        } else if lookback > 0 && i >= lookback {
            let previous: Vec<f64> = candles[i - lookback..i].iter().map(|c| c.volume).collect();
            mean(&previous)
        } else {
            candle.volume
        };

        results.push(VolumeAnalysis {
            timestamp: candle.timestamp,
            volume: candle.volume,
            expected_volume,
            is_bullish: candle.is_bullish(),
        });

        slot.push(candle.volume);
    }

    results
}

pub struct VolumeSurpriseDetector {
    lookback: usize,
}

impl VolumeSurpriseDetector {
    pub fn new() -> Self {
        Self {
            lookback: LOOKBACK_PERIODS,
        }
    }
}

impl Default for VolumeSurpriseDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Detector for VolumeSurpriseDetector {
    fn kind(&self) -> super::StrategyKind {
        super::StrategyKind::VolumeSurprise
    }

    fn detect(&self, candles: &[Candle]) -> Vec<Signal> {
        if candles.len() < self.min_data_points() {
            return Vec::new();
        }

        analyze_volume_surprise(candles, self.lookback)
            .iter()
            .zip(candles)
            .filter(|(res, _)| {
                res.expected_volume > 0.0
                    && res.volume > res.expected_volume * SURPRISE_THRESHOLD
                    && res.volume > MIN_VOLUME
            })
            .map(|(res, candle)| {
                let ratio = res.volume / res.expected_volume;
                let range = candle.range();
                let (name, direction, label, sl, tp) = if res.is_bullish {
                    (
                        "Volume Surprise Buy",
                        SignalDirection::Bullish,
                        "Bullish",
                        candle.low - range * 0.5,
                        candle.close + range * 2.0,
                    )
                } else {
                    (
                        "Volume Surprise Sell",
                        SignalDirection::Bearish,
                        "Bearish",
                        candle.high + range * 0.5,
                        candle.close - range * 2.0,
                    )
                };
                let reason = format!(
                    "{} Volume Surprise (Vol: {:.0}, Exp: {:.0}, x{:.1})",
                    label, res.volume, res.expected_volume, ratio
                );
                stop_target_signal(
                    name,
                    candle,
                    direction,
                    StopTargetLevels::new(sl, tp, reason).with_volume_ratio(round2(ratio)),
                )
            })
            .collect()
    }

    fn min_data_points(&self) -> usize {
        50
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Detector;
    use chrono::{Duration, TimeZone};

    fn minute_candles(n: usize, volume: f64) -> Vec<Candle> {
        let base = Utc.with_ymd_and_hms(2024, 5, 6, 9, 0, 0).unwrap();
        (0..n)
            .map(|i| Candle {
                timestamp: base + Duration::minutes(i as i64),
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 99.5,
                volume,
            })
            .collect()
    }

    #[test]
    fn spike_on_bullish_candle_is_a_buy() {
        let mut candles = minute_candles(60, 2_000.0);
        let last = candles.last_mut().unwrap();
        last.close = 101.0;
        last.volume = 10_000.0;

        let signals = VolumeSurpriseDetector::new().detect(&candles);

        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.name, "Volume Surprise Buy");
        assert_eq!(signal.direction, SignalDirection::Bullish);
        let levels = signal.levels.stop_target().expect("stop/target levels");
        assert_eq!(levels.sl, 98.0);
        assert_eq!(levels.tp, 105.0);
        assert_eq!(levels.volume_ratio, Some(5.0));
        assert_eq!(levels.score, None);

        let json = serde_json::to_value(signal).unwrap();
        assert_eq!(json["metadata"]["volume_ratio"], 5.0);
        assert!(json["metadata"].get("pivot_type").is_none());
        assert_eq!(
            levels.reason,
            "Bullish Volume Surprise (Vol: 10000, Exp: 2000, x5.0)"
        );
    }

    #[test]
    fn spike_on_bearish_candle_is_a_sell() {
        let mut candles = minute_candles(60, 2_000.0);
        candles[55].volume = 4_000.0;

        let signals = VolumeSurpriseDetector::new().detect(&candles);

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, SignalDirection::Bearish);
        assert_eq!(signals[0].timestamp, candles[55].timestamp);
        let levels = signals[0].levels.stop_target().expect("stop/target levels");
        assert_eq!(levels.sl, 102.0);
        assert_eq!(levels.tp, 95.5);
    }

    #[test]
    fn thin_volume_is_ignored() {
        let mut candles = minute_candles(60, 200.0);
        candles[40].volume = 900.0;
        assert!(VolumeSurpriseDetector::new().detect(&candles).is_empty());
    }

    #[test]
    fn slot_history_takes_over_after_three_observations() {
        let base = Utc.with_ymd_and_hms(2024, 5, 6, 9, 30, 0).unwrap();
        let candles: Vec<Candle> = (0..4)
            .map(|week| Candle {
                timestamp: base + Duration::weeks(week),
                open: 10.0,
                high: 11.0,
                low: 9.0,
                close: 10.5,
                volume: 100.0 * (week + 1) as f64,
            })
            .collect();

        let analysis = analyze_volume_surprise(&candles, LOOKBACK_PERIODS);

        assert_eq!(analysis[0].expected_volume, 100.0);
        assert_eq!(analysis[2].expected_volume, 300.0);
        assert_eq!(analysis[3].expected_volume, 200.0);
        assert!(analysis[3].is_bullish);
    }
}
