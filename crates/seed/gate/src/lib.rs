//! SocialSeed Gate - the gatekeeper between a proposed action and its
//! execution.
//!
//! For each candidate action the gate takes the account lock, reads the
//! rate windows, classifies, decides and appends exactly one ledger entry
//! before releasing the lock. Two evaluations for the same account can
//! therefore never both claim the last slot under a ceiling. Across
//! processes the append is additionally a compare-and-swap on the ledger
//! sequence, retried with backoff on conflict.

#![deny(unsafe_code)]

mod decision;

pub use decision::{decide, DecisionInput, PACING_TOO_SOON, PLATFORM_LOCKED, RATE_EXCEEDED};

use chrono::Duration;
use seed_ledger::{AccountLocks, ActionLedger, LedgerError};
use seed_phase::{PhaseController, PhaseError};
use seed_risk::{ClassificationContext, RiskClassifier};
use seed_types::{
    AccountId, Action, ActionId, ActionType, ApprovalDecision, DecisionStatus, LedgerEntry,
    ReviewOutcome,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Reason stamped on decisions that outlived their review window.
pub const REVIEW_EXPIRED: &str = "review window elapsed";

/// Gate tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    /// How long a pending decision waits for a reviewer.
    pub review_ttl_hours: i64,
    /// Retries after a ledger sequence conflict.
    pub max_retries: u32,
    /// First backoff delay; doubles per retry.
    pub retry_base_ms: u64,
}

impl GateConfig {
    pub fn review_ttl(&self) -> Duration {
        Duration::hours(self.review_ttl_hours)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            review_ttl_hours: 24,
            max_retries: 5,
            retry_base_ms: 10,
        }
    }
}

/// A candidate action submitted for approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub account_id: AccountId,
    pub action_type: ActionType,
    pub target_identifier: String,
}

/// The approval gate
pub struct ApprovalGate {
    classifier: Arc<dyn RiskClassifier>,
    phases: Arc<PhaseController>,
    ledger: Arc<ActionLedger>,
    locks: Arc<AccountLocks>,
    config: GateConfig,
}

impl ApprovalGate {
    pub fn new(
        classifier: Arc<dyn RiskClassifier>,
        phases: Arc<PhaseController>,
        ledger: Arc<ActionLedger>,
        locks: Arc<AccountLocks>,
        config: GateConfig,
    ) -> Self {
        Self {
            classifier,
            phases,
            ledger,
            locks,
            config,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Classify, decide and record one candidate action.
    ///
    /// `bot_likelihood` is the already-resolved authenticity signal for the
    /// target; `None` makes the classifier fail closed. The returned entry is
    /// durable. Storage failures abort without a decision.
    pub async fn evaluate(
        &self,
        request: ActionRequest,
        bot_likelihood: Option<f64>,
    ) -> Result<LedgerEntry, GateError> {
        let account = self.phases.account(&request.account_id).await?;
        if !account.is_active {
            return Err(GateError::AccountInactive(request.account_id.0));
        }
        let action = Action::new(
            &account,
            request.action_type,
            request.target_identifier,
            self.ledger.now(),
        );

        let mut attempt = 0;
        loop {
            let guard = self.locks.acquire(&action.account_id).await;
            match self.record_locked(&action, bot_likelihood).await {
                Ok(entry) => {
                    drop(guard);
                    info!(
                        account_id = %entry.action.account_id,
                        action_id = %entry.action.action_id,
                        action_type = %entry.action.action_type,
                        band = %entry.assessment.risk_band,
                        score = entry.assessment.score,
                        decision = %entry.decision.decision,
                        reason = %entry.decision.reason,
                        "action evaluated"
                    );
                    return Ok(entry);
                }
                Err(GateError::Ledger(LedgerError::Conflict(detail))) => {
                    drop(guard);
                    if attempt >= self.config.max_retries {
                        warn!(
                            account_id = %action.account_id,
                            attempts = attempt + 1,
                            %detail,
                            "ledger conflict retries exhausted"
                        );
                        return Err(GateError::ConcurrencyConflict {
                            account_id: action.account_id.0.clone(),
                            attempts: attempt + 1,
                        });
                    }
                    let delay = self.config.retry_base_ms.saturating_mul(1u64 << attempt.min(16));
                    warn!(
                        account_id = %action.account_id,
                        attempt = attempt + 1,
                        delay_ms = delay,
                        %detail,
                        "ledger sequence moved, retrying"
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn record_locked(
        &self,
        action: &Action,
        bot_likelihood: Option<f64>,
    ) -> Result<LedgerEntry, GateError> {
        let account = self.phases.account(&action.account_id).await?;
        let policy = self.phases.policy(account.phase);
        let head = self.ledger.head(&action.account_id).await?;
        let counts = self
            .ledger
            .window_counts(&action.account_id, action.action_type)
            .await?;
        let min_interval = policy.min_interval();
        let last_admitted_at = if min_interval > Duration::zero() {
            self.ledger
                .last_admitted_at(&action.account_id, min_interval)
                .await?
        } else {
            None
        };
        let now = self.ledger.now();
        let ceiling = policy.ceiling(action.action_type);
        debug!(
            account_id = %action.account_id,
            head,
            hourly = counts.hourly,
            daily = counts.daily,
            per_hour = ceiling.per_hour,
            per_day = ceiling.per_day,
            "rate windows read"
        );

        let context = ClassificationContext {
            phase: account.phase,
            health_score: account.health_score,
            recent_same_type: counts.hourly,
            hourly_ceiling: ceiling.per_hour,
            thresholds: policy.thresholds,
            bot_likelihood,
            at: now,
        };
        let assessment = self.classifier.classify(action, &context);
        let decision = decide(&DecisionInput {
            action,
            phase: account.phase,
            policy,
            counts,
            last_admitted_at,
            assessment: &assessment,
            now,
            review_ttl: self.config.review_ttl(),
        });

        Ok(self
            .ledger
            .record(action.clone(), assessment, decision, head + 1)
            .await?)
    }

    /// Apply a reviewer verdict to a pending decision. An overdue decision
    /// is expired instead and returned as such.
    pub async fn review(
        &self,
        action_id: &ActionId,
        reviewer: &str,
        outcome: ReviewOutcome,
        notes: Option<String>,
    ) -> Result<ApprovalDecision, GateError> {
        let (status, reason) = match outcome {
            ReviewOutcome::Approved => (DecisionStatus::Approved, format!("approved by {reviewer}")),
            ReviewOutcome::Rejected => (DecisionStatus::Rejected, format!("rejected by {reviewer}")),
        };
        let decision = self
            .resolve_pending(action_id, status, reason, Some(reviewer.to_string()), notes)
            .await?;
        info!(
            action_id = %action_id,
            reviewer,
            decision = %decision.decision,
            "pending action reviewed"
        );
        Ok(decision)
    }

    /// Withdraw a pending action before a reviewer acts. Recorded as rejected.
    pub async fn cancel(
        &self,
        action_id: &ActionId,
        reason: &str,
    ) -> Result<ApprovalDecision, GateError> {
        let decision = self
            .resolve_pending(
                action_id,
                DecisionStatus::Rejected,
                format!("cancelled before review: {reason}"),
                None,
                None,
            )
            .await?;
        info!(action_id = %action_id, decision = %decision.decision, "pending action cancelled");
        Ok(decision)
    }

    /// Expire every pending decision whose review window has closed.
    pub async fn expire_due(&self) -> Result<Vec<LedgerEntry>, GateError> {
        let due = self.ledger.due_for_expiry(self.ledger.now()).await?;
        let mut expired = Vec::with_capacity(due.len());

        for entry in due {
            let _guard = self.locks.acquire(&entry.action.account_id).await;
            match self.expire_locked(&entry).await {
                Ok(updated) => expired.push(updated),
                Err(GateError::Ledger(LedgerError::InvalidStateTransition(detail))) => {
                    debug!(action_id = %entry.action.action_id, %detail, "already resolved");
                }
                Err(err) => return Err(err),
            }
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "pending decisions expired");
        }
        Ok(expired)
    }

    /// Pending queue, oldest first. Overdue entries found on the way are
    /// expired and left out.
    pub async fn pending(
        &self,
        account_id: Option<&AccountId>,
    ) -> Result<Vec<LedgerEntry>, GateError> {
        let now = self.ledger.now();
        let mut live = Vec::new();
        for entry in self.ledger.pending(account_id).await? {
            if entry.decision.is_overdue(now) {
                let _guard = self.locks.acquire(&entry.action.account_id).await;
                match self.expire_locked(&entry).await {
                    Ok(_) | Err(GateError::Ledger(LedgerError::InvalidStateTransition(_))) => {}
                    Err(err) => return Err(err),
                }
            } else {
                live.push(entry);
            }
        }
        Ok(live)
    }

    /// Look up an entry, expiring it first if its review window closed.
    pub async fn get(&self, action_id: &ActionId) -> Result<LedgerEntry, GateError> {
        let entry = self.load(action_id).await?;
        if !entry.decision.is_overdue(self.ledger.now()) {
            return Ok(entry);
        }
        let _guard = self.locks.acquire(&entry.action.account_id).await;
        let entry = self.load(action_id).await?;
        if entry.decision.is_overdue(self.ledger.now()) {
            return self.expire_locked(&entry).await;
        }
        Ok(entry)
    }

    async fn load(&self, action_id: &ActionId) -> Result<LedgerEntry, GateError> {
        self.ledger
            .get(action_id)
            .await?
            .ok_or_else(|| GateError::ActionNotFound(action_id.0.clone()))
    }

    async fn resolve_pending(
        &self,
        action_id: &ActionId,
        status: DecisionStatus,
        reason: String,
        reviewer: Option<String>,
        notes: Option<String>,
    ) -> Result<ApprovalDecision, GateError> {
        let account_id = self.load(action_id).await?.action.account_id;
        let _guard = self.locks.acquire(&account_id).await;
        let entry = self.load(action_id).await?;
        let now = self.ledger.now();

        if entry.decision.is_overdue(now) {
            return Ok(self.expire_locked(&entry).await?.decision);
        }
        if entry.decision.decision != DecisionStatus::PendingReview {
            return Err(GateError::AlreadyDecided {
                action_id: action_id.0.clone(),
                status: entry.decision.decision,
            });
        }

        let decision = ApprovalDecision {
            action_id: action_id.clone(),
            decision: status,
            reason,
            decided_at: now,
            reviewer,
            expires_at: None,
            notes,
            health_flag: entry.decision.health_flag,
        };
        self.ledger
            .transition(action_id, DecisionStatus::PendingReview, decision.clone())
            .await?;
        Ok(decision)
    }

    async fn expire_locked(&self, entry: &LedgerEntry) -> Result<LedgerEntry, GateError> {
        let decision = ApprovalDecision {
            action_id: entry.action.action_id.clone(),
            decision: DecisionStatus::Expired,
            reason: REVIEW_EXPIRED.to_string(),
            decided_at: self.ledger.now(),
            reviewer: None,
            expires_at: None,
            notes: None,
            health_flag: entry.decision.health_flag,
        };
        self.ledger
            .transition(
                &entry.action.action_id,
                DecisionStatus::PendingReview,
                decision.clone(),
            )
            .await?;
        debug!(action_id = %entry.action.action_id, "pending decision expired");
        Ok(LedgerEntry {
            decision,
            ..entry.clone()
        })
    }
}

/// Gate errors. Rate excess and expiry are decisions, never errors.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account inactive: {0}")]
    AccountInactive(String),

    #[error("Action not found: {0}")]
    ActionNotFound(String),

    #[error("Action {action_id} already decided: {status}")]
    AlreadyDecided {
        action_id: String,
        status: DecisionStatus,
    },

    #[error("Concurrent writes on account {account_id} after {attempts} attempts")]
    ConcurrencyConflict { account_id: String, attempts: u32 },

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Phase error: {0}")]
    Phase(PhaseError),
}

impl From<PhaseError> for GateError {
    fn from(value: PhaseError) -> Self {
        match value {
            PhaseError::AccountNotFound(id) => GateError::AccountNotFound(id),
            PhaseError::Ledger(err) => GateError::Ledger(err),
            other => GateError::Phase(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use seed_phase::{PhaseConfig, RegisterAccount};
    use seed_risk::WeightedRiskClassifier;
    use seed_storage::memory::InMemorySeedStorage;
    use seed_storage::{
        AccountStore, LedgerStore, PhaseStore, QueryWindow, SeedStorage, StorageError,
        StorageResult,
    };
    use seed_types::{
        Account, Clock, ExecutionResult, ManualClock, Phase, PhaseRecord, Platform, RiskBand,
    };

    struct Harness {
        gate: Arc<ApprovalGate>,
        phases: Arc<PhaseController>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(storage: Arc<dyn SeedStorage>) -> Harness {
        harness_configured(storage, PhaseConfig::default())
    }

    fn harness_configured(storage: Arc<dyn SeedStorage>, config: PhaseConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = Arc::new(ActionLedger::new(storage, clock.clone()));
        let locks = Arc::new(AccountLocks::new());
        let phases = Arc::new(PhaseController::new(
            config,
            ledger.clone(),
            locks.clone(),
        ));
        let gate = Arc::new(ApprovalGate::new(
            Arc::new(WeightedRiskClassifier::default()),
            phases.clone(),
            ledger,
            locks,
            GateConfig::default(),
        ));
        Harness {
            gate,
            phases,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(InMemorySeedStorage::new()))
    }

    /// Harness whose phase_1 has no pacing, so only the rate ceilings bind.
    fn unpaced_harness() -> Harness {
        let mut config = PhaseConfig::default();
        config.phases.phase_1.min_interval_secs = 0;
        harness_configured(Arc::new(InMemorySeedStorage::new()), config)
    }

    async fn tiktok_account(h: &Harness) -> Account {
        register(h, Platform::Tiktok, None).await
    }

    async fn register(h: &Harness, platform: Platform, age_days: Option<i64>) -> Account {
        let now = h.clock.now();
        h.phases
            .register_account(RegisterAccount {
                platform,
                username: "grower".to_string(),
                platform_created_at: age_days.map(|days| now - Duration::days(days)),
            })
            .await
            .unwrap()
    }

    fn like(account: &Account, target: &str) -> ActionRequest {
        ActionRequest {
            account_id: account.account_id.clone(),
            action_type: ActionType::Like,
            target_identifier: target.to_string(),
        }
    }

    fn follow(account: &Account, target: &str) -> ActionRequest {
        ActionRequest {
            account_id: account.account_id.clone(),
            action_type: ActionType::Follow,
            target_identifier: target.to_string(),
        }
    }

    #[tokio::test]
    async fn green_action_is_auto_approved_and_recorded() {
        let h = harness();
        let account = tiktok_account(&h).await;
        let entry = h
            .gate
            .evaluate(follow(&account, "@human"), Some(0.0))
            .await
            .unwrap();
        assert_eq!(entry.assessment.risk_band, RiskBand::Green);
        assert_eq!(entry.decision.decision, DecisionStatus::AutoApproved);
        assert_eq!(entry.sequence, 1);
    }

    #[tokio::test]
    async fn missing_signal_is_queued_for_a_day() {
        let h = harness();
        let account = tiktok_account(&h).await;
        let entry = h
            .gate
            .evaluate(follow(&account, "@unknown"), None)
            .await
            .unwrap();
        assert_eq!(entry.assessment.risk_band, RiskBand::Red);
        assert_eq!(entry.decision.decision, DecisionStatus::PendingReview);
        assert_eq!(
            entry.decision.expires_at,
            Some(entry.decision.decided_at + Duration::hours(24))
        );
    }

    #[tokio::test]
    async fn review_approves_once() {
        let h = harness();
        let account = tiktok_account(&h).await;
        let entry = h.gate.evaluate(follow(&account, "@x"), None).await.unwrap();
        let id = entry.action.action_id;

        let approved = h
            .gate
            .review(&id, "reviewer-1", ReviewOutcome::Approved, Some("looks fine".into()))
            .await
            .unwrap();
        assert_eq!(approved.decision, DecisionStatus::Approved);
        assert_eq!(approved.reviewer.as_deref(), Some("reviewer-1"));
        assert!(approved.expires_at.is_none());
        assert!(approved.health_flag);

        let again = h
            .gate
            .review(&id, "reviewer-2", ReviewOutcome::Rejected, None)
            .await;
        assert!(matches!(
            again,
            Err(GateError::AlreadyDecided {
                status: DecisionStatus::Approved,
                ..
            })
        ));
        assert!(matches!(
            h.gate.cancel(&id, "too late").await,
            Err(GateError::AlreadyDecided { .. })
        ));
    }

    #[tokio::test]
    async fn late_review_expires_instead() {
        let h = harness();
        let account = tiktok_account(&h).await;
        let entry = h.gate.evaluate(follow(&account, "@x"), None).await.unwrap();
        h.clock.advance(Duration::hours(25));

        let decision = h
            .gate
            .review(&entry.action.action_id, "reviewer-1", ReviewOutcome::Approved, None)
            .await
            .unwrap();
        assert_eq!(decision.decision, DecisionStatus::Expired);
        assert!(!decision.decision.allows_execution());
    }

    #[tokio::test]
    async fn sweep_and_pending_queue() {
        let h = harness();
        let account = tiktok_account(&h).await;
        h.gate.evaluate(follow(&account, "@a"), None).await.unwrap();
        h.clock.advance(Duration::hours(12));
        h.gate.evaluate(follow(&account, "@b"), None).await.unwrap();
        assert_eq!(h.gate.pending(None).await.unwrap().len(), 2);

        h.clock.advance(Duration::hours(13));
        let expired = h.gate.expire_due().await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].decision.decision, DecisionStatus::Expired);
        assert_eq!(expired[0].action.target_identifier, "@a");

        let pending = h.gate.pending(Some(&account.account_id)).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(h.gate.expire_due().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_rejects_pending() {
        let h = harness();
        let account = tiktok_account(&h).await;
        let entry = h.gate.evaluate(follow(&account, "@x"), None).await.unwrap();
        let decision = h
            .gate
            .cancel(&entry.action.action_id, "operator changed plan")
            .await
            .unwrap();
        assert_eq!(decision.decision, DecisionStatus::Rejected);
        assert!(decision.reason.starts_with("cancelled before review"));
        let stored = h.gate.get(&entry.action.action_id).await.unwrap();
        assert_eq!(stored.decision, decision);
    }

    #[tokio::test]
    async fn expired_and_rejected_actions_free_quota() {
        let h = harness();
        let account = tiktok_account(&h).await;
        for i in 0..5 {
            h.gate
                .evaluate(follow(&account, &format!("@p{i}")), None)
                .await
                .unwrap();
            h.clock.advance(Duration::minutes(3));
        }
        let blocked = h.gate.evaluate(follow(&account, "@full"), Some(0.0)).await.unwrap();
        assert!(blocked.decision.reason.starts_with(RATE_EXCEEDED));

        for entry in h.gate.pending(None).await.unwrap() {
            h.gate.cancel(&entry.action.action_id, "drop").await.unwrap();
        }
        let admitted = h.gate.evaluate(follow(&account, "@next"), Some(0.0)).await.unwrap();
        assert_eq!(admitted.decision.decision, DecisionStatus::AutoApproved);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_never_overshoot_ceiling() {
        let h = unpaced_harness();
        let account = tiktok_account(&h).await;

        let mut handles = Vec::new();
        for i in 0..12 {
            let gate = h.gate.clone();
            let request = follow(&account, &format!("@t{i}"));
            handles.push(tokio::spawn(async move {
                gate.evaluate(request, Some(0.0)).await
            }));
        }

        let mut admitted = 0;
        let mut rejected = 0;
        for handle in handles {
            let entry = handle.await.unwrap().unwrap();
            match entry.decision.decision {
                DecisionStatus::AutoApproved => admitted += 1,
                DecisionStatus::Rejected => {
                    assert!(entry.decision.reason.starts_with(RATE_EXCEEDED));
                    rejected += 1;
                }
                other => panic!("unexpected decision {other}"),
            }
        }
        assert_eq!(admitted, 5);
        assert_eq!(rejected, 7);
    }

    #[tokio::test]
    async fn actions_inside_the_phase_interval_are_rejected() {
        let h = harness();
        let account = tiktok_account(&h).await;
        let first = h.gate.evaluate(like(&account, "@a"), Some(0.0)).await.unwrap();
        assert_eq!(first.decision.decision, DecisionStatus::AutoApproved);

        h.clock.advance(Duration::seconds(90));
        let early = h.gate.evaluate(follow(&account, "@b"), Some(0.0)).await.unwrap();
        assert_eq!(early.decision.decision, DecisionStatus::Rejected);
        assert!(early.decision.reason.starts_with(PACING_TOO_SOON));

        // the rejection does not restart the interval
        h.clock.advance(Duration::seconds(30));
        let paced = h.gate.evaluate(follow(&account, "@c"), Some(0.0)).await.unwrap();
        assert_eq!(paced.decision.decision, DecisionStatus::AutoApproved);
    }

    #[tokio::test]
    async fn demoted_account_keeps_its_platform() {
        let h = harness();
        let account = register(&h, Platform::Instagram, Some(90)).await;
        assert_eq!(account.phase, Phase::Phase3);

        let record = h
            .phases
            .demote(&account.account_id, "reviewer-1", "policy breach")
            .await
            .unwrap();
        assert_eq!(record.to_phase, Phase::Phase2);
        let demoted = h.phases.account(&account.account_id).await.unwrap();
        assert!(h.phases.policy(demoted.phase).allows_platform(demoted.platform));

        let entry = h.gate.evaluate(like(&account, "@x"), Some(0.0)).await.unwrap();
        assert_eq!(entry.decision.decision, DecisionStatus::AutoApproved);

        assert!(matches!(
            h.phases
                .demote(&account.account_id, "reviewer-1", "again")
                .await,
            Err(PhaseError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn unknown_and_inactive_accounts_error() {
        let h = harness();
        let ghost = ActionRequest {
            account_id: AccountId::new("acct-missing"),
            action_type: ActionType::Like,
            target_identifier: "@x".to_string(),
        };
        assert!(matches!(
            h.gate.evaluate(ghost, Some(0.0)).await,
            Err(GateError::AccountNotFound(_))
        ));

        let account = tiktok_account(&h).await;
        h.phases.deactivate(&account.account_id).await.unwrap();
        assert!(matches!(
            h.gate.evaluate(follow(&account, "@x"), Some(0.0)).await,
            Err(GateError::AccountInactive(_))
        ));
    }

    /// Storage whose ledger appends fail in a configurable way.
    struct FaultyStorage {
        inner: InMemorySeedStorage,
        fault: fn() -> StorageError,
    }

    #[async_trait]
    impl AccountStore for FaultyStorage {
        async fn insert_account(&self, account: Account) -> StorageResult<()> {
            self.inner.insert_account(account).await
        }
        async fn get_account(&self, account_id: &AccountId) -> StorageResult<Option<Account>> {
            self.inner.get_account(account_id).await
        }
        async fn list_accounts(&self, window: QueryWindow) -> StorageResult<Vec<Account>> {
            self.inner.list_accounts(window).await
        }
        async fn update_health(
            &self,
            account_id: &AccountId,
            health_score: f64,
            updated_at: DateTime<Utc>,
        ) -> StorageResult<()> {
            self.inner
                .update_health(account_id, health_score, updated_at)
                .await
        }
        async fn set_active(
            &self,
            account_id: &AccountId,
            is_active: bool,
            updated_at: DateTime<Utc>,
        ) -> StorageResult<()> {
            self.inner.set_active(account_id, is_active, updated_at).await
        }
    }

    #[async_trait]
    impl PhaseStore for FaultyStorage {
        async fn transition_phase(&self, record: PhaseRecord) -> StorageResult<()> {
            self.inner.transition_phase(record).await
        }
        async fn list_phase_records(
            &self,
            account_id: &AccountId,
        ) -> StorageResult<Vec<PhaseRecord>> {
            self.inner.list_phase_records(account_id).await
        }
    }

    #[async_trait]
    impl LedgerStore for FaultyStorage {
        async fn ledger_head(&self, account_id: &AccountId) -> StorageResult<u64> {
            self.inner.ledger_head(account_id).await
        }
        async fn append_entry(&self, _entry: LedgerEntry) -> StorageResult<()> {
            Err((self.fault)())
        }
        async fn get_entry(&self, action_id: &ActionId) -> StorageResult<Option<LedgerEntry>> {
            self.inner.get_entry(action_id).await
        }
        async fn list_entries_since(
            &self,
            account_id: &AccountId,
            since: DateTime<Utc>,
        ) -> StorageResult<Vec<LedgerEntry>> {
            self.inner.list_entries_since(account_id, since).await
        }
        async fn list_pending(
            &self,
            account_id: Option<&AccountId>,
        ) -> StorageResult<Vec<LedgerEntry>> {
            self.inner.list_pending(account_id).await
        }
        async fn transition_decision(
            &self,
            action_id: &ActionId,
            expected: DecisionStatus,
            decision: ApprovalDecision,
        ) -> StorageResult<()> {
            self.inner
                .transition_decision(action_id, expected, decision)
                .await
        }
        async fn list_recent_executions(
            &self,
            account_id: &AccountId,
            limit: usize,
        ) -> StorageResult<Vec<ExecutionResult>> {
            self.inner.list_recent_executions(account_id, limit).await
        }
        async fn record_execution(
            &self,
            action_id: &ActionId,
            result: ExecutionResult,
        ) -> StorageResult<()> {
            self.inner.record_execution(action_id, result).await
        }
    }

    #[tokio::test]
    async fn persistence_failure_returns_no_decision() {
        let h = harness_with(Arc::new(FaultyStorage {
            inner: InMemorySeedStorage::new(),
            fault: || StorageError::Backend("disk full".to_string()),
        }));
        let account = tiktok_account(&h).await;
        let result = h.gate.evaluate(follow(&account, "@x"), Some(0.0)).await;
        assert!(matches!(result, Err(GateError::Ledger(LedgerError::Backend(_)))));
    }

    #[tokio::test]
    async fn persistent_conflicts_exhaust_retries() {
        let h = harness_with(Arc::new(FaultyStorage {
            inner: InMemorySeedStorage::new(),
            fault: || StorageError::Conflict("sequence moved".to_string()),
        }));
        let account = tiktok_account(&h).await;
        let result = h.gate.evaluate(follow(&account, "@x"), Some(0.0)).await;
        assert!(matches!(
            result,
            Err(GateError::ConcurrencyConflict { attempts: 6, .. })
        ));
    }
}
