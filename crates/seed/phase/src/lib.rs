//! SocialSeed Phase - owns the account phase state machine.
//!
//! Accounts start in the phase their age earns them, move forward when the
//! ledger shows sustained success without red flags, and drop back to the
//! lowest phase that still unlocks their platform when their health
//! collapses or executions keep failing.
//! Every transition is serialized per account and written as a
//! compare-and-swap on the current phase, so re-running an evaluation on
//! unchanged ledger state appends nothing.

#![deny(unsafe_code)]

pub mod config;
mod error;
pub mod health;

pub use config::{
    ActionCeilings, BootstrapConfig, HealthConfig, PhaseConfig, PhasePolicy, PhaseTable,
    ProgressionCriteria, RateCeiling, MAX_MIN_INTERVAL_SECS,
};
pub use error::{PhaseError, PhaseResult};
pub use health::{ewma, HealthSignal};

use chrono::{DateTime, Duration, Utc};
use seed_ledger::{AccountLocks, ActionLedger};
use seed_storage::{AccountStore, PhaseStore, QueryWindow};
use seed_types::{Account, AccountId, Phase, PhaseRecord, Platform, TransitionKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Reason recorded on automatic promotions.
pub const PROMOTION_REASON: &str = "automatic: criteria met";

/// Linking request for a new account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterAccount {
    pub platform: Platform,
    pub username: String,
    /// When the account was created on the platform, if known.
    #[serde(default)]
    pub platform_created_at: Option<DateTime<Utc>>,
}

/// Result of one phase evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PhaseOutcome {
    Unchanged { phase: Phase, reason: String },
    Promoted(PhaseRecord),
    Demoted(PhaseRecord),
}

impl PhaseOutcome {
    pub fn record(&self) -> Option<&PhaseRecord> {
        match self {
            PhaseOutcome::Unchanged { .. } => None,
            PhaseOutcome::Promoted(record) | PhaseOutcome::Demoted(record) => Some(record),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthUpdate {
    pub previous: f64,
    pub current: f64,
}

pub struct PhaseController {
    config: PhaseConfig,
    ledger: Arc<ActionLedger>,
    locks: Arc<AccountLocks>,
}

impl PhaseController {
    pub fn new(config: PhaseConfig, ledger: Arc<ActionLedger>, locks: Arc<AccountLocks>) -> Self {
        Self {
            config,
            ledger,
            locks,
        }
    }

    pub fn config(&self) -> &PhaseConfig {
        &self.config
    }

    pub fn policy(&self, phase: Phase) -> &PhasePolicy {
        self.config.phases.get(phase)
    }

    pub async fn account(&self, account_id: &AccountId) -> PhaseResult<Account> {
        self.ledger
            .storage()
            .get_account(account_id)
            .await?
            .ok_or_else(|| PhaseError::AccountNotFound(account_id.0.clone()))
    }

    /// Link a new account. The starting phase follows the platform account's
    /// age, raised to the lowest phase that unlocks its platform; anything
    /// above phase 1 is written as a bootstrap record.
    pub async fn register_account(&self, request: RegisterAccount) -> PhaseResult<Account> {
        let now = self.ledger.now();
        let unlock_phase = self
            .config
            .phases
            .lowest_phase_for(request.platform)
            .ok_or_else(|| PhaseError::PlatformNotSupported(request.platform.to_string()))?;
        let age_days = request
            .platform_created_at
            .map(|created| (now - created).num_days().max(0))
            .unwrap_or(0);
        let phase = self
            .config
            .bootstrap
            .phase_for_age(age_days)
            .max(unlock_phase);

        let account = Account::new(request.platform, request.username, now);
        let storage = self.ledger.storage();
        storage.insert_account(account.clone()).await?;

        if phase != Phase::Phase1 {
            let _guard = self.locks.acquire(&account.account_id).await;
            storage
                .transition_phase(PhaseRecord {
                    account_id: account.account_id.clone(),
                    from_phase: Phase::Phase1,
                    to_phase: phase,
                    kind: TransitionKind::Bootstrap,
                    reason: format!(
                        "bootstrap: account age {age_days} days on {}",
                        request.platform
                    ),
                    changed_at: now,
                })
                .await?;
        }

        info!(
            account_id = %account.account_id,
            platform = %request.platform,
            phase = %phase,
            age_days,
            "account registered"
        );
        self.account(&account.account_id).await
    }

    /// Check demotion and promotion criteria for one account and apply at
    /// most one transition.
    pub async fn evaluate(&self, account_id: &AccountId) -> PhaseResult<PhaseOutcome> {
        let _guard = self.locks.acquire(account_id).await;
        let account = self.account(account_id).await?;

        if !account.is_active {
            return Ok(PhaseOutcome::Unchanged {
                phase: account.phase,
                reason: "account inactive".to_string(),
            });
        }

        if let Some(reason) = self.demotion_trigger(&account).await? {
            let floor = self.demotion_floor(&account)?;
            if floor >= account.phase {
                debug!(account_id = %account_id, phase = %account.phase, %reason, "demotion trigger at platform floor");
                return Ok(PhaseOutcome::Unchanged {
                    phase: account.phase,
                    reason,
                });
            }
            let record = self
                .transition(&account, floor, TransitionKind::Demotion, reason)
                .await?;
            return Ok(PhaseOutcome::Demoted(record));
        }

        let Some(next) = account.phase.next() else {
            return Ok(PhaseOutcome::Unchanged {
                phase: account.phase,
                reason: "already in final phase".to_string(),
            });
        };
        let Some(criteria) = self.policy(account.phase).promotion else {
            return Ok(PhaseOutcome::Unchanged {
                phase: account.phase,
                reason: "promotion disabled".to_string(),
            });
        };

        if let Some(reason) = self.promotion_blocker(&account, &criteria).await? {
            debug!(account_id = %account_id, phase = %account.phase, %reason, "not eligible for promotion");
            return Ok(PhaseOutcome::Unchanged {
                phase: account.phase,
                reason,
            });
        }

        let record = self
            .transition(
                &account,
                next,
                TransitionKind::Promotion,
                PROMOTION_REASON.to_string(),
            )
            .await?;
        Ok(PhaseOutcome::Promoted(record))
    }

    /// Evaluate every active account. Failures are logged and skipped.
    pub async fn evaluate_all(&self) -> PhaseResult<Vec<(AccountId, PhaseOutcome)>> {
        let accounts = self
            .ledger
            .storage()
            .list_accounts(QueryWindow::default())
            .await?;

        let mut outcomes = Vec::new();
        for account in accounts.into_iter().filter(|account| account.is_active) {
            match self.evaluate(&account.account_id).await {
                Ok(outcome) => outcomes.push((account.account_id, outcome)),
                Err(err) => {
                    warn!(account_id = %account.account_id, error = %err, "phase evaluation failed")
                }
            }
        }
        Ok(outcomes)
    }

    /// Reviewer-initiated demotion to the lowest phase that unlocks the
    /// account's platform.
    pub async fn demote(
        &self,
        account_id: &AccountId,
        reviewer: &str,
        reason: &str,
    ) -> PhaseResult<PhaseRecord> {
        let _guard = self.locks.acquire(account_id).await;
        let account = self.account(account_id).await?;
        let floor = self.demotion_floor(&account)?;
        if floor >= account.phase {
            return Err(PhaseError::InvalidTransition(format!(
                "account {account_id} is already in {}, the lowest phase for {}",
                account.phase, account.platform
            )));
        }
        self.transition(
            &account,
            floor,
            TransitionKind::Demotion,
            format!("manual demotion by {reviewer}: {reason}"),
        )
        .await
    }

    /// Fold one outcome into the account health score.
    pub async fn record_outcome(
        &self,
        account_id: &AccountId,
        signal: HealthSignal,
    ) -> PhaseResult<HealthUpdate> {
        let _guard = self.locks.acquire(account_id).await;
        let account = self.account(account_id).await?;
        let previous = account.health_score;
        let current = ewma(previous, self.config.health.alpha, signal);

        if current != previous {
            self.ledger
                .storage()
                .update_health(account_id, current, self.ledger.now())
                .await?;
            debug!(account_id = %account_id, previous, current, ?signal, "health updated");
        }
        Ok(HealthUpdate { previous, current })
    }

    /// Whether `health` alone would trigger a demotion.
    pub fn below_demotion_threshold(&self, health: f64) -> bool {
        health < self.config.health.demotion_threshold
    }

    pub async fn deactivate(&self, account_id: &AccountId) -> PhaseResult<()> {
        let _guard = self.locks.acquire(account_id).await;
        self.account(account_id).await?;
        self.ledger
            .storage()
            .set_active(account_id, false, self.ledger.now())
            .await?;
        info!(account_id = %account_id, "account deactivated");
        Ok(())
    }

    pub async fn history(&self, account_id: &AccountId) -> PhaseResult<Vec<PhaseRecord>> {
        Ok(self.ledger.storage().list_phase_records(account_id).await?)
    }

    fn demotion_floor(&self, account: &Account) -> PhaseResult<Phase> {
        self.config
            .phases
            .lowest_phase_for(account.platform)
            .ok_or_else(|| PhaseError::PlatformNotSupported(account.platform.to_string()))
    }

    async fn demotion_trigger(&self, account: &Account) -> PhaseResult<Option<String>> {
        let health = &self.config.health;
        if account.health_score < health.demotion_threshold {
            return Ok(Some(format!(
                "health_score {:.2} below demotion threshold {:.2}",
                account.health_score, health.demotion_threshold
            )));
        }

        let errors = self
            .ledger
            .consecutive_errors(
                &account.account_id,
                health.max_consecutive_errors as usize + 1,
            )
            .await?;
        if errors > health.max_consecutive_errors {
            return Ok(Some(format!(
                "{errors} consecutive execution errors exceed maximum {}",
                health.max_consecutive_errors
            )));
        }
        Ok(None)
    }

    async fn promotion_blocker(
        &self,
        account: &Account,
        criteria: &ProgressionCriteria,
    ) -> PhaseResult<Option<String>> {
        let entered = self.phase_entered_at(account).await?;
        let days_in_phase = (self.ledger.now() - entered).num_days();
        if days_in_phase < criteria.min_days_in_phase {
            return Ok(Some(format!(
                "{days_in_phase} of {} days in {}",
                criteria.min_days_in_phase, account.phase
            )));
        }

        let summary = self
            .ledger
            .execution_summary(
                &account.account_id,
                Duration::days(criteria.success_window_days),
            )
            .await?;
        if summary.executed < criteria.min_executed_actions {
            return Ok(Some(format!(
                "{} of {} executed actions",
                summary.executed, criteria.min_executed_actions
            )));
        }
        let rate = summary.rate();
        if rate < criteria.success_threshold {
            return Ok(Some(format!(
                "success rate {rate:.2} below {:.2}",
                criteria.success_threshold
            )));
        }

        let red_flags = self
            .ledger
            .recent_red_flags(
                &account.account_id,
                Duration::days(criteria.red_flag_window_days),
            )
            .await?;
        if red_flags > 0 {
            return Ok(Some(format!(
                "{red_flags} red-band assessments in the last {} days",
                criteria.red_flag_window_days
            )));
        }
        Ok(None)
    }

    async fn phase_entered_at(&self, account: &Account) -> PhaseResult<DateTime<Utc>> {
        let history = self.history(&account.account_id).await?;
        Ok(history
            .last()
            .map(|record| record.changed_at)
            .unwrap_or(account.created_at))
    }

    async fn transition(
        &self,
        account: &Account,
        to_phase: Phase,
        kind: TransitionKind,
        reason: String,
    ) -> PhaseResult<PhaseRecord> {
        let record = PhaseRecord {
            account_id: account.account_id.clone(),
            from_phase: account.phase,
            to_phase,
            kind,
            reason,
            changed_at: self.ledger.now(),
        };
        self.ledger
            .storage()
            .transition_phase(record.clone())
            .await?;

        info!(
            account_id = %record.account_id,
            from = %record.from_phase,
            to = %record.to_phase,
            kind = kind.as_str(),
            reason = %record.reason,
            "phase changed"
        );
        Ok(record)
    }
}
