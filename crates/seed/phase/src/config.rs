//! Phase policy configuration.
//!
//! Every numeric threshold the growth core uses per phase lives here:
//! platform allowlists, rate ceilings, band thresholds, the yellow-band
//! auto-approve list and the criteria for leaving a phase.

use crate::error::PhaseError;
use chrono::Duration;
use seed_risk::BandThresholds;
use seed_types::{ActionType, Phase, Platform};
use serde::{Deserialize, Serialize};

/// Upper bound for per-phase pacing: one day.
pub const MAX_MIN_INTERVAL_SECS: u64 = 86_400;

/// Hourly and daily ceiling for one action type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateCeiling {
    pub per_hour: u32,
    pub per_day: u32,
}

impl RateCeiling {
    pub const fn new(per_hour: u32, per_day: u32) -> Self {
        Self { per_hour, per_day }
    }
}

/// Ceilings for every action type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCeilings {
    pub follow: RateCeiling,
    pub like: RateCeiling,
    pub comment: RateCeiling,
    pub unfollow: RateCeiling,
}

impl ActionCeilings {
    pub fn get(&self, action_type: ActionType) -> RateCeiling {
        match action_type {
            ActionType::Follow => self.follow,
            ActionType::Like => self.like,
            ActionType::Comment => self.comment,
            ActionType::Unfollow => self.unfollow,
        }
    }
}

/// What an account must show before it leaves a phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressionCriteria {
    /// Minimum days spent in the current phase.
    pub min_days_in_phase: i64,
    /// Minimum share of successful executions over the success window.
    pub success_threshold: f64,
    /// Executions required before the success rate counts.
    pub min_executed_actions: usize,
    pub success_window_days: i64,
    /// No red-band assessment may fall inside this trailing window.
    pub red_flag_window_days: i64,
}

impl ProgressionCriteria {
    fn validate(&self, phase: Phase) -> Result<(), PhaseError> {
        if self.min_days_in_phase < 0
            || self.success_window_days <= 0
            || self.red_flag_window_days <= 0
        {
            return Err(PhaseError::InvalidConfig(format!(
                "{phase}: progression windows must be positive"
            )));
        }
        if !(0.0..=1.0).contains(&self.success_threshold) {
            return Err(PhaseError::InvalidConfig(format!(
                "{phase}: success threshold {} outside [0, 1]",
                self.success_threshold
            )));
        }
        Ok(())
    }
}

/// Constraints in force while an account sits in one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasePolicy {
    pub allowed_platforms: Vec<Platform>,
    pub ceilings: ActionCeilings,
    pub thresholds: BandThresholds,
    /// Action types whose yellow-band assessments are auto-approved instead
    /// of queued for review.
    #[serde(default)]
    pub yellow_auto_approve: Vec<ActionType>,
    /// Criteria for promotion out of this phase; `None` for the last phase.
    #[serde(default)]
    pub promotion: Option<ProgressionCriteria>,
    /// Minimum spacing between two admitted actions of one account.
    #[serde(default)]
    pub min_interval_secs: u64,
}

impl PhasePolicy {
    pub fn allows_platform(&self, platform: Platform) -> bool {
        self.allowed_platforms.contains(&platform)
    }

    pub fn ceiling(&self, action_type: ActionType) -> RateCeiling {
        self.ceilings.get(action_type)
    }

    pub fn auto_approves_yellow(&self, action_type: ActionType) -> bool {
        self.yellow_auto_approve.contains(&action_type)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::seconds(self.min_interval_secs.min(MAX_MIN_INTERVAL_SECS) as i64)
    }
}

/// Policy per phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTable {
    pub phase_1: PhasePolicy,
    pub phase_2: PhasePolicy,
    pub phase_3: PhasePolicy,
}

impl PhaseTable {
    pub fn get(&self, phase: Phase) -> &PhasePolicy {
        match phase {
            Phase::Phase1 => &self.phase_1,
            Phase::Phase2 => &self.phase_2,
            Phase::Phase3 => &self.phase_3,
        }
    }

    /// Lowest phase whose allowlist contains `platform`.
    pub fn lowest_phase_for(&self, platform: Platform) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|phase| self.get(*phase).allows_platform(platform))
    }

    pub fn validate(&self) -> Result<(), PhaseError> {
        for phase in Phase::ALL {
            let policy = self.get(phase);
            if !policy.thresholds.is_valid() {
                return Err(PhaseError::InvalidConfig(format!(
                    "{phase}: band thresholds must satisfy 0 <= yellow < red <= 1"
                )));
            }
            if policy.min_interval_secs > MAX_MIN_INTERVAL_SECS {
                return Err(PhaseError::InvalidConfig(format!(
                    "{phase}: min_interval_secs {} exceeds {MAX_MIN_INTERVAL_SECS}",
                    policy.min_interval_secs
                )));
            }
            for action_type in ActionType::ALL {
                let ceiling = policy.ceiling(action_type);
                if ceiling.per_hour > ceiling.per_day {
                    return Err(PhaseError::InvalidConfig(format!(
                        "{phase}: {action_type} hourly ceiling exceeds daily ceiling"
                    )));
                }
            }
            match (phase.next(), &policy.promotion) {
                (Some(_), Some(criteria)) => criteria.validate(phase)?,
                (Some(_), None) => {}
                (None, Some(_)) => {
                    return Err(PhaseError::InvalidConfig(format!(
                        "{phase}: last phase cannot carry promotion criteria"
                    )))
                }
                (None, None) => {}
            }
            if let Some(next) = phase.next() {
                let unlocked = &self.get(next).allowed_platforms;
                if let Some(platform) = policy
                    .allowed_platforms
                    .iter()
                    .find(|platform| !unlocked.contains(platform))
                {
                    return Err(PhaseError::InvalidConfig(format!(
                        "{next} must keep {platform} unlocked by {phase}"
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for PhaseTable {
    fn default() -> Self {
        Self {
            phase_1: PhasePolicy {
                allowed_platforms: vec![Platform::Tiktok],
                ceilings: ActionCeilings {
                    follow: RateCeiling::new(5, 40),
                    like: RateCeiling::new(10, 80),
                    comment: RateCeiling::new(0, 0),
                    unfollow: RateCeiling::new(3, 20),
                },
                thresholds: BandThresholds::for_phase(Phase::Phase1),
                yellow_auto_approve: Vec::new(),
                min_interval_secs: 120,
                promotion: Some(ProgressionCriteria {
                    min_days_in_phase: 30,
                    success_threshold: 0.80,
                    min_executed_actions: 10,
                    success_window_days: 30,
                    red_flag_window_days: 7,
                }),
            },
            phase_2: PhasePolicy {
                allowed_platforms: vec![Platform::Tiktok, Platform::Instagram],
                ceilings: ActionCeilings {
                    follow: RateCeiling::new(15, 120),
                    like: RateCeiling::new(25, 200),
                    comment: RateCeiling::new(5, 40),
                    unfollow: RateCeiling::new(10, 80),
                },
                thresholds: BandThresholds::for_phase(Phase::Phase2),
                yellow_auto_approve: Vec::new(),
                min_interval_secs: 60,
                promotion: Some(ProgressionCriteria {
                    min_days_in_phase: 30,
                    success_threshold: 0.85,
                    min_executed_actions: 10,
                    success_window_days: 30,
                    red_flag_window_days: 7,
                }),
            },
            phase_3: PhasePolicy {
                allowed_platforms: Platform::ALL.to_vec(),
                ceilings: ActionCeilings {
                    follow: RateCeiling::new(25, 200),
                    like: RateCeiling::new(40, 320),
                    comment: RateCeiling::new(10, 80),
                    unfollow: RateCeiling::new(20, 160),
                },
                thresholds: BandThresholds::for_phase(Phase::Phase3),
                yellow_auto_approve: Vec::new(),
                min_interval_secs: 30,
                promotion: None,
            },
        }
    }
}

/// Health score tracking and demotion triggers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// EWMA smoothing factor.
    pub alpha: f64,
    /// Health below this demotes the account to its platform's lowest phase.
    pub demotion_threshold: f64,
    /// More consecutive execution failures than this demote the account.
    pub max_consecutive_errors: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            alpha: 0.2,
            demotion_threshold: 0.3,
            max_consecutive_errors: 5,
        }
    }
}

/// Initial phase from the age of the social account at link time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    pub phase_2_after_days: i64,
    pub phase_3_after_days: i64,
}

impl BootstrapConfig {
    pub fn phase_for_age(&self, age_days: i64) -> Phase {
        if age_days < self.phase_2_after_days {
            Phase::Phase1
        } else if age_days < self.phase_3_after_days {
            Phase::Phase2
        } else {
            Phase::Phase3
        }
    }
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            phase_2_after_days: 30,
            phase_3_after_days: 60,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub phases: PhaseTable,
    pub health: HealthConfig,
    pub bootstrap: BootstrapConfig,
}

impl PhaseConfig {
    pub fn validate(&self) -> Result<(), PhaseError> {
        self.phases.validate()?;
        if !(self.health.alpha > 0.0 && self.health.alpha <= 1.0) {
            return Err(PhaseError::InvalidConfig(format!(
                "health alpha {} outside (0, 1]",
                self.health.alpha
            )));
        }
        if !(0.0..=1.0).contains(&self.health.demotion_threshold) {
            return Err(PhaseError::InvalidConfig(format!(
                "demotion threshold {} outside [0, 1]",
                self.health.demotion_threshold
            )));
        }
        if self.bootstrap.phase_2_after_days > self.bootstrap.phase_3_after_days {
            return Err(PhaseError::InvalidConfig(
                "bootstrap phase_2 age must not exceed phase_3 age".to_string(),
            ));
        }
        Ok(())
    }
}
