use crate::models::*;

/// Bullish fair value gap: the third candle's low sits above the first
/// candle's high and the middle candle closed up.
pub struct FairValueGapDetector;

impl FairValueGapDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FairValueGapDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl super::Detector for FairValueGapDetector {
    fn kind(&self) -> super::StrategyKind {
        super::StrategyKind::Fvg
    }

    fn detect(&self, candles: &[Candle]) -> Vec<Signal> {
        if candles.len() < self.min_data_points() {
            return Vec::new();
        }

        candles
            .windows(3)
            .filter(|window| window[1].is_bullish() && window[2].low > window[0].high)
            .map(|window| {
                let (first, third) = (&window[0], &window[2]);
                let fvg_top = third.low;
                let fvg_bottom = first.high;
                Signal {
                    name: "Bullish FVG".to_string(),
                    timestamp: third.timestamp,
                    direction: SignalDirection::Bullish,
                    price: third.close,
                    levels: SignalLevels::FairValueGap(GapLevels {
                        fvg_top,
                        fvg_bottom,
                        mid_price: (fvg_top + fvg_bottom) / 2.0,
                    }),
                }
            })
            .collect()
    }

    fn min_data_points(&self) -> usize {
        3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Detector;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(i: i64, open: f64, high: f64, low: f64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap() + Duration::hours(i),
            open,
            high,
            low,
            close,
            volume: 5_000.0,
        }
    }

    #[test]
    fn detects_gap_with_bullish_middle() {
        let candles = vec![
            bar(0, 96.0, 100.0, 95.0, 99.0),
            bar(1, 99.0, 108.0, 98.0, 107.0),
            bar(2, 107.0, 110.0, 105.0, 109.0),
        ];

        let signals = FairValueGapDetector::new().detect(&candles);

        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].direction, SignalDirection::Bullish);
        assert_eq!(signals[0].timestamp, candles[2].timestamp);
        let gap = signals[0].levels.gap().expect("gap levels");
        assert_eq!(gap.fvg_top, 105.0);
        assert_eq!(gap.fvg_bottom, 100.0);
        assert_eq!(gap.mid_price, 102.5);
    }

    #[test]
    fn bearish_middle_candle_is_not_a_gap() {
        let candles = vec![
            bar(0, 96.0, 100.0, 95.0, 99.0),
            bar(1, 107.0, 108.0, 98.0, 101.0),
            bar(2, 107.0, 110.0, 105.0, 109.0),
        ];
        assert!(FairValueGapDetector::new().detect(&candles).is_empty());
    }

    #[test]
    fn overlapping_candles_are_not_a_gap() {
        let candles = vec![
            bar(0, 96.0, 100.0, 95.0, 99.0),
            bar(1, 99.0, 108.0, 98.0, 107.0),
            bar(2, 107.0, 110.0, 100.0, 109.0),
        ];
        assert!(FairValueGapDetector::new().detect(&candles).is_empty());
    }

    #[test]
    fn serializes_with_gap_metadata() {
        let candles = vec![
            bar(0, 96.0, 100.0, 95.0, 99.0),
            bar(1, 99.0, 108.0, 98.0, 107.0),
            bar(2, 107.0, 110.0, 105.0, 109.0),
        ];
        let signals = FairValueGapDetector::new().detect(&candles);
        let json = serde_json::to_value(&signals[0]).unwrap();
        assert_eq!(json["type"], "BULLISH");
        assert_eq!(json["metadata"]["fvg_top"], 105.0);
        assert_eq!(json["metadata"]["mid_price"], 102.5);
    }
}
