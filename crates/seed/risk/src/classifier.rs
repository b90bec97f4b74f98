use crate::{ClassificationContext, RiskWeights};
use seed_types::{Action, RiskAssessment, RiskBand, RiskComponents};
use tracing::{debug, warn};

/// Reasoning attached to fail-closed assessments.
pub const INSUFFICIENT_SIGNAL: &str = "insufficient signal";

/// Narrow classification interface. Implementations must be deterministic
/// for a given action and context.
pub trait RiskClassifier: Send + Sync {
    fn classify(&self, action: &Action, context: &ClassificationContext) -> RiskAssessment;
}

/// Weighted sum of bot likelihood, velocity pressure and inverse health.
#[derive(Clone, Debug, Default)]
pub struct WeightedRiskClassifier {
    weights: RiskWeights,
}

impl WeightedRiskClassifier {
    pub fn new(weights: RiskWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> RiskWeights {
        self.weights
    }

    fn fail_closed(
        action: &Action,
        context: &ClassificationContext,
        components: RiskComponents,
        detail: &str,
    ) -> RiskAssessment {
        warn!(
            action_id = %action.action_id,
            account_id = %action.account_id,
            detail,
            "classification failed closed"
        );
        RiskAssessment {
            action_id: action.action_id.clone(),
            risk_band: RiskBand::Red,
            score: 1.0,
            reasoning: format!("{INSUFFICIENT_SIGNAL}: {detail}"),
            components,
            produced_at: context.at,
        }
    }
}

fn velocity(recent: usize, ceiling: u32) -> f64 {
    if ceiling == 0 {
        return 1.0;
    }
    (recent as f64 / f64::from(ceiling)).min(1.0)
}

fn in_unit_range(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

impl RiskClassifier for WeightedRiskClassifier {
    fn classify(&self, action: &Action, context: &ClassificationContext) -> RiskAssessment {
        let velocity = velocity(context.recent_same_type, context.hourly_ceiling);
        let health_inverse = 1.0 - context.health_score;
        let components = RiskComponents {
            authenticity: context.bot_likelihood,
            velocity,
            health_inverse,
        };

        let bot_likelihood = match context.bot_likelihood {
            Some(value) if in_unit_range(value) => value,
            Some(value) => {
                return Self::fail_closed(
                    action,
                    context,
                    components,
                    &format!("bot likelihood {value} out of range"),
                )
            }
            None => {
                return Self::fail_closed(
                    action,
                    context,
                    components,
                    "authenticity signal unavailable",
                )
            }
        };
        if !in_unit_range(context.health_score) {
            return Self::fail_closed(
                action,
                context,
                components,
                &format!("health score {} out of range", context.health_score),
            );
        }
        if !self.weights.is_valid() {
            return Self::fail_closed(action, context, components, "invalid risk weights");
        }

        let weights = self.weights;
        let raw = weights.authenticity * bot_likelihood
            + weights.velocity * velocity
            + weights.health * health_inverse;
        let score = (raw / weights.sum()).clamp(0.0, 1.0);
        let risk_band = context.thresholds.band(score);

        debug!(
            action_id = %action.action_id,
            score,
            band = %risk_band,
            "action classified"
        );

        RiskAssessment {
            action_id: action.action_id.clone(),
            risk_band,
            score,
            reasoning: format!(
                "score {score:.3} in {} (bot likelihood {bot_likelihood:.2}, velocity {velocity:.2} at {}/{} per hour, health {:.2})",
                context.phase, context.recent_same_type, context.hourly_ceiling, context.health_score
            ),
            components,
            produced_at: context.at,
        }
    }
}
