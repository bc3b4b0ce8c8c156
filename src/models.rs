use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalDirection {
    Bullish,
    Bearish,
    Neutral,
}

impl SignalDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalDirection::Bullish => "BULLISH",
            SignalDirection::Bearish => "BEARISH",
            SignalDirection::Neutral => "NEUTRAL",
        }
    }
}

/// One rung set of a PopGun breakout: entry at the breakout extreme, three
/// take-profits at 1x/2x/3x the breakout range and a stop at the other extreme.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetLadder {
    pub entry: f64,
    pub tp1: f64,
    pub tp2: f64,
    pub tp3: f64,
    pub sl: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopGunTargets {
    pub long: TargetLadder,
    pub short: TargetLadder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopGunLevels {
    #[serde(rename = "mother_idx")]
    pub mother_index: usize,
    #[serde(rename = "inside_idx")]
    pub inside_index: usize,
    #[serde(rename = "popgun_idx")]
    pub popgun_index: usize,
    pub targets: PopGunTargets,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GapLevels {
    pub fvg_top: f64,
    pub fvg_bottom: f64,
    pub mid_price: f64,
}

/// Stop/target levels shared by the structure retest, Aura and Volume
/// Surprise detectors. Only the detector that owns an optional field sets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopTargetLevels {
    pub sl: f64,
    pub tp: f64,
    pub reason: String,
    /// Structure retest: "DBR" for buys, "RBD" for sells.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot_type: Option<String>,
    /// Aura composite score.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Volume Surprise volume over expected volume, two decimals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_ratio: Option<f64>,
}

impl StopTargetLevels {
    pub fn new(sl: f64, tp: f64, reason: impl Into<String>) -> Self {
        Self {
            sl,
            tp,
            reason: reason.into(),
            pivot_type: None,
            score: None,
            volume_ratio: None,
        }
    }

    pub fn with_pivot_type(mut self, pivot_type: &str) -> Self {
        self.pivot_type = Some(pivot_type.to_string());
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_volume_ratio(mut self, ratio: f64) -> Self {
        self.volume_ratio = Some(ratio);
        self
    }
}

/// Strategy-specific levels attached to a signal. The shape is fixed by the
/// detector that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalLevels {
    PopGun(PopGunLevels),
    FairValueGap(GapLevels),
    StopTarget(StopTargetLevels),
}

impl SignalLevels {
    pub fn popgun(&self) -> Option<&PopGunLevels> {
        match self {
            SignalLevels::PopGun(levels) => Some(levels),
            _ => None,
        }
    }

    pub fn gap(&self) -> Option<&GapLevels> {
        match self {
            SignalLevels::FairValueGap(levels) => Some(levels),
            _ => None,
        }
    }

    pub fn stop_target(&self) -> Option<&StopTargetLevels> {
        match self {
            SignalLevels::StopTarget(levels) => Some(levels),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub direction: SignalDirection,
    pub price: f64,
    #[serde(rename = "metadata")]
    pub levels: SignalLevels,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn from_direction(direction: SignalDirection) -> Self {
        match direction {
            SignalDirection::Bearish => PositionSide::Short,
            SignalDirection::Bullish | SignalDirection::Neutral => PositionSide::Long,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeStatus {
    Open,
    Win,
    Loss,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Open => "OPEN",
            TradeStatus::Win => "WIN",
            TradeStatus::Loss => "LOSS",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_date: DateTime<Utc>,
    pub exit_date: Option<DateTime<Utc>>,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub position: PositionSide,
    pub status: TradeStatus,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub invested: f64,
    pub realized_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestSummary {
    pub strategy: String,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Trades still unresolved when the data ran out (force-closed at the last close).
    pub open_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub trades: Vec<Trade>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperTrade {
    pub id: String,
    pub symbol: String,
    pub strategy: String,
    #[serde(default = "default_paper_side")]
    pub position: PositionSide,
    pub status: TradeStatus,
    pub entry_date: DateTime<Utc>,
    pub entry_price: f64,
    pub quantity: f64,
    #[serde(alias = "initial_capital")]
    pub invested: f64,
    pub current_price: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    #[serde(default)]
    pub exit_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub realized_value: Option<f64>,
}

fn default_paper_side() -> PositionSide {
    PositionSide::Long
}

impl PaperTrade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperTradingStatus {
    pub is_active: bool,
    pub active_symbol: Option<String>,
    pub active_strategy: Option<String>,
    pub initial_capital: f64,
    pub balance: f64,
    pub active_trade: Option<PaperTrade>,
    pub trades: Vec<PaperTrade>,
    pub failed_iterations: u64,
    pub last_error: Option<String>,
}
