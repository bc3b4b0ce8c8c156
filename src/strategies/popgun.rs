use crate::models::*;

/// Inside bar followed by a wider breakout bar.
pub struct PopGunDetector {
    label: String,
}

impl PopGunDetector {
    pub fn new() -> Self {
        Self {
            label: "PopGun".to_string(),
        }
    }
}

impl Default for PopGunDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn ladder(entry: f64, step: f64, sl: f64) -> TargetLadder {
    TargetLadder {
        entry,
        tp1: entry + step,
        tp2: entry + 2.0 * step,
        tp3: entry + 3.0 * step,
        sl,
    }
}

impl super::Detector for PopGunDetector {
    fn kind(&self) -> super::StrategyKind {
        super::StrategyKind::PopGun
    }

    fn detect(&self, candles: &[Candle]) -> Vec<Signal> {
        if candles.len() < self.min_data_points() {
            return Vec::new();
        }

        let mut signals = Vec::new();
        for i in 2..candles.len() {
            let mother = &candles[i - 2];
            let inside = &candles[i - 1];
            let popgun = &candles[i];

            let is_inside = inside.high <= mother.high && inside.low >= mother.low;
            if !is_inside {
                continue;
            }

            let is_larger = popgun.range() > inside.range();
            let broke_out = popgun.high > inside.high || popgun.low < inside.low;
            if !(is_larger && broke_out) {
                continue;
            }

            let height = popgun.range();
            signals.push(Signal {
                name: self.label.clone(),
                timestamp: popgun.timestamp,
                // Direction stays open until price leaves the breakout bar.
                direction: SignalDirection::Neutral,
                price: popgun.close,
                levels: SignalLevels::PopGun(PopGunLevels {
                    mother_index: i - 2,
                    inside_index: i - 1,
                    popgun_index: i,
                    targets: PopGunTargets {
                        long: ladder(popgun.high, height, popgun.low),
                        short: ladder(popgun.low, -height, popgun.high),
                    },
                }),
            });
        }

        signals
    }

    fn min_data_points(&self) -> usize {
        3
    }
}
