//! SocialSeed Ledger - append-only accountability view over storage.
//!
//! Every gate evaluation lands here as one entry holding the action, its risk
//! assessment and its approval decision. Execution outcomes are attached
//! later. Window queries over the ledger drive rate ceilings, health and
//! phase eligibility.

#![deny(unsafe_code)]

mod locks;

pub use locks::AccountLocks;

use chrono::{DateTime, Duration, Utc};
use seed_storage::memory::InMemorySeedStorage;
use seed_storage::{LedgerStore, SeedStorage, StorageError};
use seed_types::{
    AccountId, Action, ActionId, ActionType, ApprovalDecision, Clock, DecisionStatus,
    ExecutionResult, LedgerEntry, RiskAssessment, RiskBand, SystemClock,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// The action ledger facade.
///
/// Wraps a `SeedStorage` backend so the gate, the phase controller and the
/// service all read and write the same durable rows.
pub struct ActionLedger {
    storage: Arc<dyn SeedStorage>,
    clock: Arc<dyn Clock>,
}

impl ActionLedger {
    pub fn new(storage: Arc<dyn SeedStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Ledger over fresh in-memory storage and the system clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemorySeedStorage::new()), Arc::new(SystemClock))
    }

    pub fn storage(&self) -> Arc<dyn SeedStorage> {
        Arc::clone(&self.storage)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current per-account sequence head.
    pub async fn head(&self, account_id: &AccountId) -> Result<u64, LedgerError> {
        Ok(self.storage.ledger_head(account_id).await?)
    }

    /// Record an evaluated action at `sequence` (head + 1). Returns only once
    /// the row is durable; a moved head surfaces as `LedgerError::Conflict`.
    pub async fn record(
        &self,
        action: Action,
        assessment: RiskAssessment,
        decision: ApprovalDecision,
        sequence: u64,
    ) -> Result<LedgerEntry, LedgerError> {
        let entry = LedgerEntry {
            sequence,
            action,
            assessment,
            decision,
            execution: None,
            recorded_at: self.clock.now(),
        };
        self.storage.append_entry(entry.clone()).await?;
        debug!(
            account_id = %entry.action.account_id,
            action_id = %entry.action.action_id,
            sequence,
            decision = %entry.decision.decision,
            "ledger entry recorded"
        );
        Ok(entry)
    }

    pub async fn get(&self, action_id: &ActionId) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.storage.get_entry(action_id).await?)
    }

    /// Entries whose action falls in the trailing window, newest-first.
    pub async fn entries_in_window(
        &self,
        account_id: &AccountId,
        window: Duration,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let since = self.clock.now() - window;
        Ok(self.storage.list_entries_since(account_id, since).await?)
    }

    /// Admitted actions (auto-approved, pending or approved) in the window.
    pub async fn count_in_window(
        &self,
        account_id: &AccountId,
        window: Duration,
    ) -> Result<usize, LedgerError> {
        let entries = self.entries_in_window(account_id, window).await?;
        Ok(entries
            .iter()
            .filter(|entry| entry.decision.decision.is_admitted())
            .count())
    }

    /// Admitted actions of one type in the window.
    pub async fn count_type_in_window(
        &self,
        account_id: &AccountId,
        action_type: ActionType,
        window: Duration,
    ) -> Result<usize, LedgerError> {
        let entries = self.entries_in_window(account_id, window).await?;
        Ok(entries
            .iter()
            .filter(|entry| entry.action.action_type == action_type)
            .filter(|entry| entry.decision.decision.is_admitted())
            .count())
    }

    /// Trailing-hour and trailing-day admitted counts for one action type.
    pub async fn window_counts(
        &self,
        account_id: &AccountId,
        action_type: ActionType,
    ) -> Result<WindowCounts, LedgerError> {
        let now = self.clock.now();
        let entries = self
            .storage
            .list_entries_since(account_id, now - Duration::hours(24))
            .await?;
        let hour_start = now - Duration::hours(1);

        let mut counts = WindowCounts::default();
        for entry in entries
            .iter()
            .filter(|entry| entry.action.action_type == action_type)
            .filter(|entry| entry.decision.decision.is_admitted())
        {
            counts.daily += 1;
            if entry.action.created_at > hour_start {
                counts.hourly += 1;
            }
        }
        Ok(counts)
    }

    /// Creation time of the newest admitted action of any type inside the
    /// trailing window.
    pub async fn last_admitted_at(
        &self,
        account_id: &AccountId,
        window: Duration,
    ) -> Result<Option<DateTime<Utc>>, LedgerError> {
        let entries = self.entries_in_window(account_id, window).await?;
        Ok(entries
            .iter()
            .filter(|entry| entry.decision.decision.is_admitted())
            .map(|entry| entry.action.created_at)
            .max())
    }

    /// Executed/succeeded tallies for actions in the window.
    pub async fn execution_summary(
        &self,
        account_id: &AccountId,
        window: Duration,
    ) -> Result<ExecutionSummary, LedgerError> {
        let entries = self.entries_in_window(account_id, window).await?;
        let mut summary = ExecutionSummary::default();
        for execution in entries.iter().filter_map(|entry| entry.execution.as_ref()) {
            summary.executed += 1;
            if execution.success {
                summary.succeeded += 1;
            }
        }
        Ok(summary)
    }

    /// Share of executed actions in the window that succeeded. Zero when
    /// nothing was executed.
    pub async fn success_rate(
        &self,
        account_id: &AccountId,
        window: Duration,
    ) -> Result<f64, LedgerError> {
        Ok(self.execution_summary(account_id, window).await?.rate())
    }

    /// Red-band assessments in the window, whatever their decision.
    pub async fn recent_red_flags(
        &self,
        account_id: &AccountId,
        window: Duration,
    ) -> Result<usize, LedgerError> {
        let entries = self.entries_in_window(account_id, window).await?;
        Ok(entries
            .iter()
            .filter(|entry| entry.assessment.risk_band == RiskBand::Red)
            .count())
    }

    /// Failed executions since the most recent successful one, counting at
    /// most `limit` of the latest outcomes.
    pub async fn consecutive_errors(
        &self,
        account_id: &AccountId,
        limit: usize,
    ) -> Result<u32, LedgerError> {
        let executions = self
            .storage
            .list_recent_executions(account_id, limit)
            .await?;

        Ok(executions
            .iter()
            .take_while(|execution| !execution.success)
            .count() as u32)
    }

    /// Pending-review queue, oldest first.
    pub async fn pending(
        &self,
        account_id: Option<&AccountId>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.storage.list_pending(account_id).await?)
    }

    /// Pending entries whose review window has closed at `now`.
    pub async fn due_for_expiry(&self, now: DateTime<Utc>) -> Result<Vec<LedgerEntry>, LedgerError> {
        let pending = self.storage.list_pending(None).await?;
        Ok(pending
            .into_iter()
            .filter(|entry| entry.decision.is_overdue(now))
            .collect())
    }

    /// Compare-and-swap the decision of an entry.
    pub async fn transition(
        &self,
        action_id: &ActionId,
        expected: DecisionStatus,
        decision: ApprovalDecision,
    ) -> Result<(), LedgerError> {
        self.storage
            .transition_decision(action_id, expected, decision)
            .await
            .map_err(LedgerError::from)
    }

    /// Attach an execution outcome and return the updated entry.
    pub async fn record_execution(
        &self,
        action_id: &ActionId,
        result: ExecutionResult,
    ) -> Result<LedgerEntry, LedgerError> {
        self.storage.record_execution(action_id, result).await?;
        self.storage
            .get_entry(action_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(action_id.0.clone()))
    }

    /// Lifetime statistics for one account.
    pub async fn statistics(&self, account_id: &AccountId) -> Result<LedgerStatistics, LedgerError> {
        let entries = self
            .storage
            .list_entries_since(account_id, DateTime::<Utc>::UNIX_EPOCH)
            .await?;

        let mut by_status: HashMap<String, usize> = HashMap::new();
        let mut by_band: HashMap<String, usize> = HashMap::new();
        let mut successful_executions = 0;
        let mut failed_executions = 0;

        for entry in &entries {
            *by_status
                .entry(entry.decision.decision.as_str().to_string())
                .or_insert(0) += 1;
            *by_band
                .entry(entry.assessment.risk_band.as_str().to_string())
                .or_insert(0) += 1;

            if let Some(execution) = &entry.execution {
                if execution.success {
                    successful_executions += 1;
                } else {
                    failed_executions += 1;
                }
            }
        }

        Ok(LedgerStatistics {
            total_actions: entries.len(),
            by_status,
            by_band,
            successful_executions,
            failed_executions,
        })
    }
}

impl Default for ActionLedger {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Admitted-action counts for the two rate windows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowCounts {
    pub hourly: usize,
    pub daily: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub executed: usize,
    pub succeeded: usize,
}

impl ExecutionSummary {
    pub fn rate(&self) -> f64 {
        if self.executed == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.executed as f64
        }
    }
}

/// Statistics about one account's ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerStatistics {
    pub total_actions: usize,
    pub by_status: HashMap<String, usize>,
    pub by_band: HashMap<String, usize>,
    pub successful_executions: usize,
    pub failed_executions: usize,
}

/// Ledger-related errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Concurrent write: {0}")]
    Conflict(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for LedgerError {
    fn from(value: StorageError) -> Self {
        match value {
            StorageError::NotFound(msg) => Self::NotFound(msg),
            StorageError::Conflict(msg) => Self::Conflict(msg),
            StorageError::InvariantViolation(msg) => Self::InvalidStateTransition(msg),
            StorageError::InvalidInput(msg)
            | StorageError::Serialization(msg)
            | StorageError::Backend(msg) => Self::Backend(msg),
        }
    }
}
