use crate::models::Candle;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Sorts candles by timestamp and drops duplicate timestamps, keeping the last
/// occurrence of each.
pub fn normalize_candles(candles: Vec<Candle>) -> Vec<Candle> {
    let mut latest_by_timestamp: HashMap<DateTime<Utc>, Candle> =
        HashMap::with_capacity(candles.len());
    for candle in candles {
        latest_by_timestamp.insert(candle.timestamp, candle);
    }

    let mut normalized: Vec<Candle> = latest_by_timestamp.into_values().collect();
    normalized.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    normalized
}

/// Keeps only the most recent `limit` candles of an already ordered series.
pub fn tail_candles(mut candles: Vec<Candle>, limit: usize) -> Vec<Candle> {
    if candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    candles
}

/// Maps every candle timestamp to its position in the series.
pub fn index_by_timestamp(candles: &[Candle]) -> HashMap<DateTime<Utc>, usize> {
    candles
        .iter()
        .enumerate()
        .map(|(index, candle)| (candle.timestamp, index))
        .collect()
}

/// Checks the OHLC envelope and that every field is finite.
pub fn is_well_formed(candle: &Candle) -> bool {
    let values = [
        candle.open,
        candle.high,
        candle.low,
        candle.close,
        candle.volume,
    ];
    if values.iter().any(|value| !value.is_finite()) {
        return false;
    }
    candle.high >= candle.open.max(candle.close).max(candle.low)
        && candle.low <= candle.open.min(candle.close).min(candle.high)
}

/// Normalizes a symbol string by trimming whitespace and uppercasing.
pub fn normalize_symbol(value: &str) -> Option<String> {
    let normalized = value.trim().to_uppercase();
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}
