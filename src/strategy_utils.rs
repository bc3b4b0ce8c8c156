use crate::models::{Candle, Signal, SignalDirection, SignalLevels, StopTargetLevels};
use chrono::{DateTime, Duration, Utc};

/// Create a signal at `candle` carrying a stop-loss / take-profit pair
pub fn stop_target_signal(
    name: impl Into<String>,
    candle: &Candle,
    direction: SignalDirection,
    levels: StopTargetLevels,
) -> Signal {
    Signal {
        name: name.into(),
        timestamp: candle.timestamp,
        direction,
        price: candle.close,
        levels: SignalLevels::StopTarget(levels),
    }
}

/// Check whether a signal is recent enough relative to the latest candle
pub fn is_fresh(signal_time: DateTime<Utc>, latest_time: DateTime<Utc>, window: Duration) -> bool {
    latest_time - signal_time < window
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
