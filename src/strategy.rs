use crate::models::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A pattern scanner over an ordered candle series.
///
/// Implementations are pure: a call re-scans from scratch, looks only at
/// candles up to the one being evaluated, and emits signals in candle order.
pub trait Detector {
    fn kind(&self) -> StrategyKind;
    fn detect(&self, candles: &[Candle]) -> Vec<Signal>;
    /// Shortest series that can produce a signal; shorter input yields nothing.
    fn min_data_points(&self) -> usize;
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyKind {
    #[serde(rename = "POPGUN")]
    PopGun,
    Fvg,
    Rbd,
    Aura,
    VolumeSurprise,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::PopGun,
        StrategyKind::Fvg,
        StrategyKind::Rbd,
        StrategyKind::Aura,
        StrategyKind::VolumeSurprise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::PopGun => "POPGUN",
            StrategyKind::Fvg => "FVG",
            StrategyKind::Rbd => "RBD",
            StrategyKind::Aura => "AURA",
            StrategyKind::VolumeSurprise => "VOLUME_SURPRISE",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown strategy '{0}'")]
pub struct StrategyParseError(pub String);

impl FromStr for StrategyKind {
    type Err = StrategyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "POPGUN" | "POP_GUN" => Ok(StrategyKind::PopGun),
            "FVG" | "FAIR_VALUE_GAP" => Ok(StrategyKind::Fvg),
            "RBD" | "SMC" | "STRUCTURE_RETEST" => Ok(StrategyKind::Rbd),
            "AURA" => Ok(StrategyKind::Aura),
            "VOLUME_SURPRISE" | "VOLUMESURPRISE" => Ok(StrategyKind::VolumeSurprise),
            _ => Err(StrategyParseError(s.trim().to_string())),
        }
    }
}

#[path = "strategies/popgun.rs"]
pub mod popgun;

pub use popgun::PopGunDetector;

#[path = "strategies/fvg.rs"]
pub mod fvg;

pub use fvg::FairValueGapDetector;

#[path = "strategies/structure_retest.rs"]
pub mod structure_retest;

pub use structure_retest::StructureRetestDetector;

#[path = "strategies/aura.rs"]
pub mod aura;

pub use aura::AuraDetector;

#[path = "strategies/volume_surprise.rs"]
pub mod volume_surprise;

pub use volume_surprise::VolumeSurpriseDetector;

pub fn create_detector(kind: StrategyKind) -> Box<dyn Detector + Send + Sync> {
    match kind {
        StrategyKind::PopGun => Box::new(PopGunDetector::new()),
        StrategyKind::Fvg => Box::new(FairValueGapDetector::new()),
        StrategyKind::Rbd => Box::new(StructureRetestDetector::new()),
        StrategyKind::Aura => Box::new(AuraDetector::new()),
        StrategyKind::VolumeSurprise => Box::new(VolumeSurpriseDetector::new()),
    }
}
