use crate::StorageResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seed_types::{
    Account, AccountId, ActionId, ApprovalDecision, DecisionStatus, ExecutionResult, LedgerEntry,
    PhaseRecord,
};

/// Generic query window for paged reads. A `limit` of zero means unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryWindow {
    pub limit: usize,
    pub offset: usize,
}

/// Storage interface for connected accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Insert a newly linked account. Fails with `Conflict` on duplicate ids.
    async fn insert_account(&self, account: Account) -> StorageResult<()>;

    async fn get_account(&self, account_id: &AccountId) -> StorageResult<Option<Account>>;

    /// List accounts oldest-first.
    async fn list_accounts(&self, window: QueryWindow) -> StorageResult<Vec<Account>>;

    async fn update_health(
        &self,
        account_id: &AccountId,
        health_score: f64,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Soft delete / reactivate. Accounts are never removed.
    async fn set_active(
        &self,
        account_id: &AccountId,
        is_active: bool,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()>;
}

/// Storage interface for the append-only phase history.
#[async_trait]
pub trait PhaseStore: Send + Sync {
    /// Move the account from `record.from_phase` to `record.to_phase` and
    /// append the record, atomically. Fails with `Conflict` when the stored
    /// phase no longer equals `record.from_phase`.
    async fn transition_phase(&self, record: PhaseRecord) -> StorageResult<()>;

    /// Phase history oldest-first.
    async fn list_phase_records(&self, account_id: &AccountId) -> StorageResult<Vec<PhaseRecord>>;
}

/// Storage interface for the action ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Highest sequence recorded for the account, zero when empty.
    async fn ledger_head(&self, account_id: &AccountId) -> StorageResult<u64>;

    /// Append an entry. `entry.sequence` must equal head + 1, otherwise the
    /// append fails with `Conflict` and nothing is written.
    async fn append_entry(&self, entry: LedgerEntry) -> StorageResult<()>;

    async fn get_entry(&self, action_id: &ActionId) -> StorageResult<Option<LedgerEntry>>;

    /// Entries whose action was created strictly after `since`, newest-first.
    async fn list_entries_since(
        &self,
        account_id: &AccountId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<LedgerEntry>>;

    /// Pending-review entries oldest-first, optionally for one account.
    async fn list_pending(&self, account_id: Option<&AccountId>) -> StorageResult<Vec<LedgerEntry>>;

    /// Replace the decision of an entry whose current status is `expected`.
    async fn transition_decision(
        &self,
        action_id: &ActionId,
        expected: DecisionStatus,
        decision: ApprovalDecision,
    ) -> StorageResult<()>;

    /// Execution outcomes of the account, most recently completed first,
    /// at most `limit` of them.
    async fn list_recent_executions(
        &self,
        account_id: &AccountId,
        limit: usize,
    ) -> StorageResult<Vec<ExecutionResult>>;

    /// Attach the execution outcome. Allowed once, and only for executable
    /// decisions.
    async fn record_execution(
        &self,
        action_id: &ActionId,
        result: ExecutionResult,
    ) -> StorageResult<()>;
}

/// Unified storage bundle used by the growth core.
pub trait SeedStorage: AccountStore + PhaseStore + LedgerStore + Send + Sync {}

impl<T> SeedStorage for T where T: AccountStore + PhaseStore + LedgerStore + Send + Sync {}
