//! SocialSeed Types - the shared vocabulary of the growth core.
//!
//! Accounts move through three ordered phases. Every candidate action is
//! classified into a risk band, turned into an approval decision and kept in
//! the action ledger together with its execution outcome.

#![deny(unsafe_code)]

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{PoisonError, RwLock};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub String);
impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("acct-{}", uuid::Uuid::new_v4()))
    }
}
impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub String);
impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("action-{}", uuid::Uuid::new_v4()))
    }
}
impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Social network an account lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Tiktok,
    Instagram,
    Twitter,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Tiktok, Platform::Instagram, Platform::Twitter];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Twitter => "twitter",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "tiktok" => Some(Platform::Tiktok),
            "instagram" => Some(Platform::Instagram),
            "twitter" => Some(Platform::Twitter),
            _ => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered growth tier. `Phase1 < Phase2 < Phase3`.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Phase {
    #[default]
    #[serde(rename = "phase_1")]
    Phase1,
    #[serde(rename = "phase_2")]
    Phase2,
    #[serde(rename = "phase_3")]
    Phase3,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Phase1, Phase::Phase2, Phase::Phase3];

    /// The phase a promotion would lead to, if any.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Phase1 => Some(Phase::Phase2),
            Phase::Phase2 => Some(Phase::Phase3),
            Phase::Phase3 => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Phase1 => "phase_1",
            Phase::Phase2 => "phase_2",
            Phase::Phase3 => "phase_3",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "phase_1" => Some(Phase::Phase1),
            "phase_2" => Some(Phase::Phase2),
            "phase_3" => Some(Phase::Phase3),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Follow,
    Like,
    Comment,
    Unfollow,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::Follow,
        ActionType::Like,
        ActionType::Comment,
        ActionType::Unfollow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Follow => "follow",
            ActionType::Like => "like",
            ActionType::Comment => "comment",
            ActionType::Unfollow => "unfollow",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "follow" => Some(ActionType::Follow),
            "like" => Some(ActionType::Like),
            "comment" => Some(ActionType::Comment),
            "unfollow" => Some(ActionType::Unfollow),
            _ => None,
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One connected social-media identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub platform: Platform,
    pub username: String,
    pub phase: Phase,
    pub health_score: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// A freshly linked account: phase 1, full health.
    pub fn new(platform: Platform, username: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            account_id: AccountId::generate(),
            platform,
            username: username.into(),
            phase: Phase::Phase1,
            health_score: 1.0,
            is_active: true,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_id(mut self, account_id: AccountId) -> Self {
        self.account_id = account_id;
        self
    }
}

/// A candidate or executed social-media operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_id: ActionId,
    pub account_id: AccountId,
    pub platform: Platform,
    pub action_type: ActionType,
    pub target_identifier: String,
    pub created_at: DateTime<Utc>,
}

impl Action {
    pub fn new(
        account: &Account,
        action_type: ActionType,
        target_identifier: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            action_id: ActionId::generate(),
            account_id: account.account_id.clone(),
            platform: account.platform,
            action_type,
            target_identifier: target_identifier.into(),
            created_at,
        }
    }
}

/// Traffic-light classification of an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Green,
    Yellow,
    Red,
}

impl RiskBand {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBand::Green => "green",
            RiskBand::Yellow => "yellow",
            RiskBand::Red => "red",
        }
    }
}

impl fmt::Display for RiskBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual signals that were combined into a risk score.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskComponents {
    /// Bot likelihood of the target, `None` when the signal was unavailable.
    pub authenticity: Option<f64>,
    pub velocity: f64,
    pub health_inverse: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub action_id: ActionId,
    pub risk_band: RiskBand,
    pub score: f64,
    pub reasoning: String,
    pub components: RiskComponents,
    pub produced_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    AutoApproved,
    PendingReview,
    Approved,
    Rejected,
    Expired,
}

impl DecisionStatus {
    /// Whether the action may be handed to an executor.
    pub fn allows_execution(&self) -> bool {
        matches!(self, DecisionStatus::AutoApproved | DecisionStatus::Approved)
    }

    /// Whether the action consumes rate-ceiling quota.
    pub fn is_admitted(&self) -> bool {
        matches!(
            self,
            DecisionStatus::AutoApproved | DecisionStatus::PendingReview | DecisionStatus::Approved
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DecisionStatus::PendingReview)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionStatus::AutoApproved => "auto_approved",
            DecisionStatus::PendingReview => "pending_review",
            DecisionStatus::Approved => "approved",
            DecisionStatus::Rejected => "rejected",
            DecisionStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto_approved" => Some(DecisionStatus::AutoApproved),
            "pending_review" => Some(DecisionStatus::PendingReview),
            "approved" => Some(DecisionStatus::Approved),
            "rejected" => Some(DecisionStatus::Rejected),
            "expired" => Some(DecisionStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the approval gate for one action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub action_id: ActionId,
    pub decision: DecisionStatus,
    pub reason: String,
    pub decided_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Set for red-band actions; the account health is charged regardless
    /// of the eventual human outcome.
    #[serde(default)]
    pub health_flag: bool,
}

impl ApprovalDecision {
    pub fn auto_approved(action_id: ActionId, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            action_id,
            decision: DecisionStatus::AutoApproved,
            reason: reason.into(),
            decided_at: at,
            reviewer: None,
            expires_at: None,
            notes: None,
            health_flag: false,
        }
    }

    pub fn rejected(action_id: ActionId, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            action_id,
            decision: DecisionStatus::Rejected,
            reason: reason.into(),
            decided_at: at,
            reviewer: None,
            expires_at: None,
            notes: None,
            health_flag: false,
        }
    }

    pub fn pending_review(
        action_id: ActionId,
        reason: impl Into<String>,
        at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            action_id,
            decision: DecisionStatus::PendingReview,
            reason: reason.into(),
            decided_at: at,
            reviewer: None,
            expires_at: Some(at + ttl),
            notes: None,
            health_flag: false,
        }
    }

    /// True when a pending decision has passed its review window.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.decision == DecisionStatus::PendingReview
            && self.expires_at.is_some_and(|expires| now >= expires)
    }
}

/// Human reviewer verdict on a pending decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Bootstrap,
    Promotion,
    Demotion,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Bootstrap => "bootstrap",
            TransitionKind::Promotion => "promotion",
            TransitionKind::Demotion => "demotion",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bootstrap" => Some(TransitionKind::Bootstrap),
            "promotion" => Some(TransitionKind::Promotion),
            "demotion" => Some(TransitionKind::Demotion),
            _ => None,
        }
    }
}

/// Append-only audit row for a phase change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub account_id: AccountId,
    pub from_phase: Phase,
    pub to_phase: Phase,
    pub kind: TransitionKind,
    pub reason: String,
    pub changed_at: DateTime<Utc>,
}

/// Result reported back by a platform executor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn succeeded(at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            error: None,
            completed_at: at,
        }
    }

    pub fn failed(error: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            completed_at: at,
        }
    }
}

/// One row of the action ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Per-account sequence, starting at 1. Appends are compare-and-swap on it.
    pub sequence: u64,
    pub action: Action,
    pub assessment: RiskAssessment,
    pub decision: ApprovalDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<ExecutionResult>,
    pub recorded_at: DateTime<Utc>,
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by simulations and tests.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}
