use seed_types::{ApprovalDecision, DecisionStatus, ExecutionResult};
use serde::{Deserialize, Serialize};

/// Contribution of one event to the account health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthSignal {
    Positive,
    Negative,
    Neutral,
}

impl HealthSignal {
    pub fn from_decision(decision: &ApprovalDecision) -> Self {
        match decision.decision {
            DecisionStatus::AutoApproved => HealthSignal::Positive,
            DecisionStatus::Rejected | DecisionStatus::Expired => HealthSignal::Negative,
            DecisionStatus::PendingReview if decision.health_flag => HealthSignal::Negative,
            DecisionStatus::PendingReview | DecisionStatus::Approved => HealthSignal::Neutral,
        }
    }

    pub fn from_execution(result: &ExecutionResult) -> Self {
        if result.success {
            HealthSignal::Positive
        } else {
            HealthSignal::Negative
        }
    }

    fn sample(&self) -> Option<f64> {
        match self {
            HealthSignal::Positive => Some(1.0),
            HealthSignal::Negative => Some(0.0),
            HealthSignal::Neutral => None,
        }
    }
}

/// `h <- (1 - alpha) * h + alpha * x`, clamped to [0, 1]. Neutral signals
/// leave the score untouched.
pub fn ewma(current: f64, alpha: f64, signal: HealthSignal) -> f64 {
    match signal.sample() {
        Some(x) => ((1.0 - alpha) * current + alpha * x).clamp(0.0, 1.0),
        None => current.clamp(0.0, 1.0),
    }
}
