//! SocialSeed Risk - scores candidate actions into green, yellow or red.
//!
//! Classification is a pure function of the action and an explicit
//! [`ClassificationContext`]; nothing here reads a clock or a random source.
//! The only outbound capability is the [`AuthenticitySignal`], which the
//! caller resolves before classification.

#![deny(unsafe_code)]

pub mod classifier;
pub mod heuristic;
pub mod signal;

pub use classifier::{RiskClassifier, WeightedRiskClassifier, INSUFFICIENT_SIGNAL};
pub use heuristic::{
    AuthenticityLevel, AuthenticityReport, HeuristicAuthenticityAnalyzer, InMemoryProfiles,
    ProfileSignal, ProfileSnapshot, ProfileSource,
};
pub use signal::{AuthenticitySignal, FixedAuthenticitySignal, SignalError};

use chrono::{DateTime, Utc};
use seed_types::{Phase, RiskBand};
use serde::{Deserialize, Serialize};

/// Relative weights of the three risk signals. The score is normalised by
/// their sum, so only ratios matter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskWeights {
    pub authenticity: f64,
    pub velocity: f64,
    pub health: f64,
}

impl RiskWeights {
    pub fn sum(&self) -> f64 {
        self.authenticity + self.velocity + self.health
    }

    /// All weights finite and non-negative with a positive sum.
    pub fn is_valid(&self) -> bool {
        [self.authenticity, self.velocity, self.health]
            .iter()
            .all(|w| w.is_finite() && *w >= 0.0)
            && self.sum() > 0.0
    }
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            authenticity: 0.5,
            velocity: 0.3,
            health: 0.2,
        }
    }
}

/// Score cut-offs for one phase: `score < yellow` is green, `score >= red`
/// is red, everything between is yellow.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BandThresholds {
    pub yellow: f64,
    pub red: f64,
}

impl BandThresholds {
    pub fn new(yellow: f64, red: f64) -> Self {
        Self { yellow, red }
    }

    /// Default thresholds; younger phases are stricter.
    pub fn for_phase(phase: Phase) -> Self {
        match phase {
            Phase::Phase1 => Self::new(0.30, 0.60),
            Phase::Phase2 => Self::new(0.40, 0.70),
            Phase::Phase3 => Self::new(0.50, 0.80),
        }
    }

    pub fn band(&self, score: f64) -> RiskBand {
        if score >= self.red {
            RiskBand::Red
        } else if score >= self.yellow {
            RiskBand::Yellow
        } else {
            RiskBand::Green
        }
    }

    pub fn is_valid(&self) -> bool {
        (0.0..=1.0).contains(&self.yellow)
            && (0.0..=1.0).contains(&self.red)
            && self.yellow < self.red
    }
}

/// Everything the classifier may look at besides the action itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationContext {
    pub phase: Phase,
    pub health_score: f64,
    /// Admitted actions of the same type in the trailing hour.
    pub recent_same_type: usize,
    pub hourly_ceiling: u32,
    pub thresholds: BandThresholds,
    /// Bot likelihood of the target; `None` when the signal failed.
    pub bot_likelihood: Option<f64>,
    /// Timestamp stamped on the assessment.
    pub at: DateTime<Utc>,
}
