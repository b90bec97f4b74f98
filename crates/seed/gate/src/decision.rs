use chrono::{DateTime, Duration, Utc};
use seed_ledger::WindowCounts;
use seed_phase::PhasePolicy;
use seed_types::{Action, ApprovalDecision, Phase, RiskAssessment, RiskBand};

pub const PLATFORM_LOCKED: &str = "platform not unlocked";
pub const RATE_EXCEEDED: &str = "rate ceiling exceeded";
pub const PACING_TOO_SOON: &str = "minimum interval not elapsed";

/// Inputs to one gate decision, all gathered under the account lock.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInput<'a> {
    pub action: &'a Action,
    pub phase: Phase,
    pub policy: &'a PhasePolicy,
    /// Admitted actions of the same type already in the rate windows.
    pub counts: WindowCounts,
    /// Creation time of the account's newest admitted action, if recent.
    pub last_admitted_at: Option<DateTime<Utc>>,
    pub assessment: &'a RiskAssessment,
    pub now: DateTime<Utc>,
    pub review_ttl: Duration,
}

/// Turn an assessment into a decision. Platform, rate and pacing checks come
/// before the risk band.
pub fn decide(input: &DecisionInput<'_>) -> ApprovalDecision {
    let action = input.action;
    let action_id = action.action_id.clone();

    if !input.policy.allows_platform(action.platform) {
        return ApprovalDecision::rejected(
            action_id,
            format!("{PLATFORM_LOCKED}: {} in {}", action.platform, input.phase),
            input.now,
        );
    }

    let ceiling = input.policy.ceiling(action.action_type);
    if input.counts.hourly >= ceiling.per_hour as usize {
        return ApprovalDecision::rejected(
            action_id,
            format!(
                "{RATE_EXCEEDED}: {}/{} {} in the trailing hour",
                input.counts.hourly, ceiling.per_hour, action.action_type
            ),
            input.now,
        );
    }
    if input.counts.daily >= ceiling.per_day as usize {
        return ApprovalDecision::rejected(
            action_id,
            format!(
                "{RATE_EXCEEDED}: {}/{} {} in the trailing 24 hours",
                input.counts.daily, ceiling.per_day, action.action_type
            ),
            input.now,
        );
    }

    let min_interval = input.policy.min_interval();
    if let Some(last) = input.last_admitted_at {
        let elapsed = input.now - last;
        if elapsed < min_interval {
            return ApprovalDecision::rejected(
                action_id,
                format!(
                    "{PACING_TOO_SOON}: {}s since last action, {} requires {}s",
                    elapsed.num_seconds(),
                    input.phase,
                    min_interval.num_seconds()
                ),
                input.now,
            );
        }
    }

    let assessment = input.assessment;
    match assessment.risk_band {
        RiskBand::Green => ApprovalDecision::auto_approved(
            action_id,
            format!("green band: {}", assessment.reasoning),
            input.now,
        ),
        RiskBand::Yellow if input.policy.auto_approves_yellow(action.action_type) => {
            ApprovalDecision::auto_approved(
                action_id,
                format!(
                    "yellow band auto-approved for {} in {}: {}",
                    action.action_type, input.phase, assessment.reasoning
                ),
                input.now,
            )
        }
        RiskBand::Yellow => ApprovalDecision::pending_review(
            action_id,
            format!("yellow band: {}", assessment.reasoning),
            input.now,
            input.review_ttl,
        ),
        RiskBand::Red => {
            let mut decision = ApprovalDecision::pending_review(
                action_id,
                format!("red band: {}", assessment.reasoning),
                input.now,
                input.review_ttl,
            );
            decision.health_flag = true;
            decision
        }
    }
}
