//! Explainable confidence scoring.
//!
//! Each rule set turns an evidence record into a [`ConfidenceResult`]: an
//! additive score, the level derived from it and one reason per rule that
//! fired. Rules are independent of each other, so the result does not depend
//! on the order in which evidence was gathered, and adding evidence can only
//! raise the score.
//!
//! Three rule sets share this shape:
//!
//! - [`HostModel`] for generic hosts found by the sweep,
//! - [`DeviceModel`] for camera / NVR candidates,
//! - [`BleModel`] for short-range radio peripherals.
//!
//! ```rust
//! use fleetscout::confidence::{ConfidenceLevel, ConfidenceModel, DeviceModel};
//! use fleetscout::evidence::EvidenceBundle;
//!
//! let mut evidence = EvidenceBundle::with_ports([80, 554, 3702]);
//! evidence.onvif_discovered = true;
//!
//! let result = DeviceModel.score(&evidence);
//! assert_eq!(result.level, ConfidenceLevel::High);
//! ```
mod ble;
mod device;
mod host;

pub use ble::{classify_beacon, company_name, BeaconKind, BleModel};
pub use device::DeviceModel;
pub use host::HostModel;

use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// Scores at or above this are [`ConfidenceLevel::Medium`].
pub const MEDIUM_THRESHOLD: u32 = 30;
/// Scores at or above this are [`ConfidenceLevel::High`].
pub const HIGH_THRESHOLD: u32 = 70;

/// Coarse trust verdict shown to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// Maps a score onto a level using [`MEDIUM_THRESHOLD`] and [`HIGH_THRESHOLD`].
    pub const fn from_score(score: u32) -> Self {
        if score >= HIGH_THRESHOLD {
            Self::High
        } else if score >= MEDIUM_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// Level, score and the audit trail that produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceResult {
    pub level: ConfidenceLevel,
    pub score: u32,
    pub reasons: Vec<String>,
}

impl ConfidenceResult {
    /// Result for an entity with no usable evidence.
    pub const fn empty() -> Self {
        Self {
            level: ConfidenceLevel::Low,
            score: 0,
            reasons: Vec::new(),
        }
    }
}

impl Default for ConfidenceResult {
    fn default() -> Self {
        Self::empty()
    }
}

/// A rule set mapping one kind of evidence to a [`ConfidenceResult`].
///
/// Implementations must be pure: the same evidence always yields the same
/// result.
pub trait ConfidenceModel {
    /// Evidence record this model understands.
    type Evidence;

    /// Scores `evidence`. Total: empty evidence yields [`ConfidenceResult::empty`].
    fn score(&self, evidence: &Self::Evidence) -> ConfidenceResult;
}

/// Accumulator shared by the rule sets.
#[derive(Debug, Default)]
pub(crate) struct Scorecard {
    score: u32,
    reasons: Vec<String>,
}

impl Scorecard {
    pub(crate) fn add(&mut self, points: u32, reason: impl Into<String>) {
        if points == 0 {
            return;
        }
        self.score = self.score.saturating_add(points);
        self.reasons.push(reason.into());
    }

    pub(crate) fn add_if(&mut self, fired: bool, points: u32, reason: &str) {
        if fired {
            self.add(points, reason);
        }
    }

    pub(crate) fn finish(self) -> ConfidenceResult {
        ConfidenceResult {
            level: ConfidenceLevel::from_score(self.score),
            score: self.score,
            reasons: self.reasons,
        }
    }
}

/// Case-insensitive "does `haystack` mention any of `words`".
pub(crate) fn mentions_any(haystack: &str, words: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    words.iter().any(|w| lower.contains(w))
}
