//! SocialSeed Service - the growth core behind one facade.
//!
//! Wires the ledger, phase controller and approval gate over a shared
//! storage backend and exposes the inbound operations: account linking,
//! action submission, human review, cancellation, dispatch to an executor,
//! execution reports, expiry sweeps and phase evaluation. Health updates
//! follow every decision and execution outcome.

#![deny(unsafe_code)]

pub mod config;
mod error;
pub mod executor;
pub mod telemetry;

pub use config::{LoggingConfig, SeedConfig, StorageConfig};
pub use error::{ServiceError, ServiceResult};
pub use executor::{ActionExecutor, SimulatedExecutor};

use dashmap::DashMap;
use seed_gate::{ActionRequest, ApprovalGate};
use seed_ledger::{AccountLocks, ActionLedger, LedgerStatistics};
use seed_phase::{HealthSignal, PhaseController, PhaseOutcome, RegisterAccount};
use seed_risk::{AuthenticitySignal, WeightedRiskClassifier};
use seed_storage::memory::InMemorySeedStorage;
use seed_storage::SeedStorage;
use seed_types::{
    Account, AccountId, ActionId, ActionType, ApprovalDecision, Clock, DecisionStatus,
    ExecutionResult, LedgerEntry, PhaseRecord, ReviewOutcome,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Open the configured storage backend.
pub async fn open_storage(config: &StorageConfig) -> ServiceResult<Arc<dyn SeedStorage>> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(InMemorySeedStorage::new())),
        #[cfg(feature = "postgres")]
        StorageConfig::Postgres {
            url,
            max_connections,
            connect_timeout_secs,
        } => {
            let storage = seed_storage::postgres::PostgresSeedStorage::connect_with_options(
                url,
                *max_connections,
                *connect_timeout_secs,
            )
            .await?;
            Ok(Arc::new(storage))
        }
        #[cfg(not(feature = "postgres"))]
        StorageConfig::Postgres { .. } => Err(ServiceError::Config(
            "postgres storage requires the `postgres` feature".to_string(),
        )),
    }
}

/// The growth service
pub struct GrowthService {
    ledger: Arc<ActionLedger>,
    phases: Arc<PhaseController>,
    gate: Arc<ApprovalGate>,
    signal: Arc<dyn AuthenticitySignal>,
    executor: Arc<dyn ActionExecutor>,
    in_flight: DashMap<ActionId, ()>,
}

impl GrowthService {
    pub fn new(
        config: &SeedConfig,
        storage: Arc<dyn SeedStorage>,
        clock: Arc<dyn Clock>,
        signal: Arc<dyn AuthenticitySignal>,
        executor: Arc<dyn ActionExecutor>,
    ) -> ServiceResult<Self> {
        config.validate()?;

        let ledger = Arc::new(ActionLedger::new(storage, clock));
        let locks = Arc::new(AccountLocks::new());
        let phases = Arc::new(PhaseController::new(
            config.phase_config(),
            ledger.clone(),
            locks.clone(),
        ));
        let gate = Arc::new(ApprovalGate::new(
            Arc::new(WeightedRiskClassifier::new(config.risk)),
            phases.clone(),
            ledger.clone(),
            locks,
            config.gate,
        ));

        Ok(Self {
            ledger,
            phases,
            gate,
            signal,
            executor,
            in_flight: DashMap::new(),
        })
    }

    pub fn ledger(&self) -> &Arc<ActionLedger> {
        &self.ledger
    }

    pub fn phases(&self) -> &Arc<PhaseController> {
        &self.phases
    }

    pub fn gate(&self) -> &Arc<ApprovalGate> {
        &self.gate
    }

    pub async fn register_account(&self, request: RegisterAccount) -> ServiceResult<Account> {
        Ok(self.phases.register_account(request).await?)
    }

    pub async fn account(&self, account_id: &AccountId) -> ServiceResult<Account> {
        Ok(self.phases.account(account_id).await?)
    }

    /// Submit a candidate action and return its decision.
    pub async fn submit_action(
        &self,
        account_id: &AccountId,
        action_type: ActionType,
        target_identifier: &str,
    ) -> ServiceResult<ApprovalDecision> {
        let entry = self
            .submit(ActionRequest {
                account_id: account_id.clone(),
                action_type,
                target_identifier: target_identifier.to_string(),
            })
            .await?;
        Ok(entry.decision)
    }

    /// Submit a candidate action and return the full ledger entry.
    pub async fn submit(&self, request: ActionRequest) -> ServiceResult<LedgerEntry> {
        let account = self.phases.account(&request.account_id).await?;
        let bot_likelihood = match self
            .signal
            .bot_likelihood(&request.target_identifier, account.platform)
            .await
        {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(
                    account_id = %request.account_id,
                    target = %request.target_identifier,
                    error = %err,
                    "authenticity signal failed"
                );
                None
            }
        };

        let entry = self.gate.evaluate(request, bot_likelihood).await?;
        self.apply_health(
            &entry.action.account_id,
            HealthSignal::from_decision(&entry.decision),
        )
        .await;
        Ok(entry)
    }

    /// Apply a human verdict to a pending action.
    pub async fn review_pending(
        &self,
        action_id: &ActionId,
        reviewer: &str,
        outcome: ReviewOutcome,
        notes: Option<String>,
    ) -> ServiceResult<ApprovalDecision> {
        let decision = self.gate.review(action_id, reviewer, outcome, notes).await?;
        self.apply_decision_health(action_id, &decision).await;
        Ok(decision)
    }

    /// Withdraw a pending action. Recorded as rejected.
    pub async fn cancel_pending(
        &self,
        action_id: &ActionId,
        reason: &str,
    ) -> ServiceResult<ApprovalDecision> {
        let decision = self.gate.cancel(action_id, reason).await?;
        self.apply_decision_health(action_id, &decision).await;
        Ok(decision)
    }

    /// Pending queue, oldest first, after expiring anything overdue.
    pub async fn pending(&self, account_id: Option<&AccountId>) -> ServiceResult<Vec<LedgerEntry>> {
        self.sweep_expired().await?;
        Ok(self.gate.pending(account_id).await?)
    }

    /// Hand an approved action to the executor and record the outcome.
    pub async fn dispatch(&self, action_id: &ActionId) -> ServiceResult<LedgerEntry> {
        if self.in_flight.insert(action_id.clone(), ()).is_some() {
            return Err(ServiceError::AlreadyDispatched(action_id.0.clone()));
        }
        let result = self.dispatch_inner(action_id).await;
        self.in_flight.remove(action_id);
        result
    }

    async fn dispatch_inner(&self, action_id: &ActionId) -> ServiceResult<LedgerEntry> {
        let was_pending = self
            .ledger
            .get(action_id)
            .await?
            .is_some_and(|entry| entry.decision.decision == DecisionStatus::PendingReview);
        let entry = self.gate.get(action_id).await?;
        if was_pending && entry.decision.decision == DecisionStatus::Expired {
            self.apply_health(&entry.action.account_id, HealthSignal::Negative)
                .await;
        }
        if !entry.decision.decision.allows_execution() {
            return Err(ServiceError::NotExecutable {
                action_id: action_id.0.clone(),
                status: entry.decision.decision,
            });
        }
        if entry.execution.is_some() {
            return Err(ServiceError::AlreadyDispatched(action_id.0.clone()));
        }

        debug!(action_id = %action_id, target = %entry.action.target_identifier, "dispatching action");
        let result = self.executor.execute(&entry.action).await;
        self.report_execution(action_id, result).await
    }

    /// Record an execution outcome reported by an external executor.
    pub async fn report_execution(
        &self,
        action_id: &ActionId,
        result: ExecutionResult,
    ) -> ServiceResult<LedgerEntry> {
        let success = result.success;
        let signal = HealthSignal::from_execution(&result);
        let entry = self.ledger.record_execution(action_id, result).await?;
        info!(
            account_id = %entry.action.account_id,
            action_id = %action_id,
            success,
            "execution recorded"
        );

        let account_id = &entry.action.account_id;
        self.apply_health(account_id, signal).await;
        if !success {
            if let Err(err) = self.phases.evaluate(account_id).await {
                warn!(account_id = %account_id, error = %err, "phase evaluation failed");
            }
        }
        Ok(entry)
    }

    /// Expire overdue pending actions and charge account health for each.
    pub async fn sweep_expired(&self) -> ServiceResult<Vec<LedgerEntry>> {
        let expired = self.gate.expire_due().await?;
        for entry in &expired {
            self.apply_health(&entry.action.account_id, HealthSignal::Negative)
                .await;
        }
        Ok(expired)
    }

    /// Run promotion and demotion checks over every active account.
    pub async fn evaluate_phases(&self) -> ServiceResult<Vec<(AccountId, PhaseOutcome)>> {
        Ok(self.phases.evaluate_all().await?)
    }

    pub async fn demote_account(
        &self,
        account_id: &AccountId,
        reviewer: &str,
        reason: &str,
    ) -> ServiceResult<PhaseRecord> {
        Ok(self.phases.demote(account_id, reviewer, reason).await?)
    }

    pub async fn deactivate_account(&self, account_id: &AccountId) -> ServiceResult<()> {
        Ok(self.phases.deactivate(account_id).await?)
    }

    pub async fn phase_history(&self, account_id: &AccountId) -> ServiceResult<Vec<PhaseRecord>> {
        Ok(self.phases.history(account_id).await?)
    }

    pub async fn statistics(&self, account_id: &AccountId) -> ServiceResult<LedgerStatistics> {
        Ok(self.ledger.statistics(account_id).await?)
    }

    async fn apply_decision_health(&self, action_id: &ActionId, decision: &ApprovalDecision) {
        match self.ledger.get(action_id).await {
            Ok(Some(entry)) => {
                self.apply_health(&entry.action.account_id, HealthSignal::from_decision(decision))
                    .await
            }
            Ok(None) => {}
            Err(err) => warn!(action_id = %action_id, error = %err, "ledger lookup failed"),
        }
    }

    /// Fold an outcome into the health score and demote when it falls
    /// below the threshold. The decision stands even if this fails.
    async fn apply_health(&self, account_id: &AccountId, signal: HealthSignal) {
        if signal == HealthSignal::Neutral {
            return;
        }
        let update = match self.phases.record_outcome(account_id, signal).await {
            Ok(update) => update,
            Err(err) => {
                warn!(account_id = %account_id, error = %err, "health update failed");
                return;
            }
        };
        if self.phases.below_demotion_threshold(update.current) {
            match self.phases.evaluate(account_id).await {
                Ok(PhaseOutcome::Demoted(record)) => {
                    info!(account_id = %account_id, reason = %record.reason, "account demoted")
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(account_id = %account_id, error = %err, "phase evaluation failed")
                }
            }
        }
    }
}
