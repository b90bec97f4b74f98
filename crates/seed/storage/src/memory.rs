//! In-memory reference implementation of the storage traits.
//!
//! Deterministic and test-friendly. Every mutating call takes a single write
//! lock, so compare-and-swap semantics hold within one process.

use crate::traits::{AccountStore, LedgerStore, PhaseStore, QueryWindow};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seed_types::{
    Account, AccountId, ActionId, ApprovalDecision, DecisionStatus, ExecutionResult, LedgerEntry,
    PhaseRecord,
};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    entries: HashMap<ActionId, LedgerEntry>,
    by_account: HashMap<AccountId, Vec<ActionId>>,
}

/// In-memory storage adapter.
#[derive(Default)]
pub struct InMemorySeedStorage {
    accounts: RwLock<HashMap<AccountId, Account>>,
    phase_records: RwLock<Vec<PhaseRecord>>,
    ledger: RwLock<LedgerState>,
}

impl InMemorySeedStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn account_exists(&self, account_id: &AccountId) -> StorageResult<bool> {
        let guard = self
            .accounts
            .read()
            .map_err(|_| StorageError::Backend("accounts lock poisoned".to_string()))?;
        Ok(guard.contains_key(account_id))
    }
}

#[async_trait]
impl AccountStore for InMemorySeedStorage {
    async fn insert_account(&self, account: Account) -> StorageResult<()> {
        let mut guard = self
            .accounts
            .write()
            .map_err(|_| StorageError::Backend("accounts lock poisoned".to_string()))?;

        if guard.contains_key(&account.account_id) {
            return Err(StorageError::Conflict(format!(
                "account {} already exists",
                account.account_id
            )));
        }
        guard.insert(account.account_id.clone(), account);
        Ok(())
    }

    async fn get_account(&self, account_id: &AccountId) -> StorageResult<Option<Account>> {
        let guard = self
            .accounts
            .read()
            .map_err(|_| StorageError::Backend("accounts lock poisoned".to_string()))?;
        Ok(guard.get(account_id).cloned())
    }

    async fn list_accounts(&self, window: QueryWindow) -> StorageResult<Vec<Account>> {
        let guard = self
            .accounts
            .read()
            .map_err(|_| StorageError::Backend("accounts lock poisoned".to_string()))?;
        let mut values = guard.values().cloned().collect::<Vec<_>>();
        values.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.account_id.cmp(&b.account_id))
        });
        Ok(apply_window(values, window))
    }

    async fn update_health(
        &self,
        account_id: &AccountId,
        health_score: f64,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        if !(0.0..=1.0).contains(&health_score) {
            return Err(StorageError::InvalidInput(format!(
                "health score {health_score} outside [0, 1]"
            )));
        }
        let mut guard = self
            .accounts
            .write()
            .map_err(|_| StorageError::Backend("accounts lock poisoned".to_string()))?;
        let account = guard
            .get_mut(account_id)
            .ok_or_else(|| StorageError::NotFound(format!("account {} not found", account_id)))?;
        account.health_score = health_score;
        account.updated_at = updated_at;
        Ok(())
    }

    async fn set_active(
        &self,
        account_id: &AccountId,
        is_active: bool,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let mut guard = self
            .accounts
            .write()
            .map_err(|_| StorageError::Backend("accounts lock poisoned".to_string()))?;
        let account = guard
            .get_mut(account_id)
            .ok_or_else(|| StorageError::NotFound(format!("account {} not found", account_id)))?;
        account.is_active = is_active;
        account.updated_at = updated_at;
        Ok(())
    }
}

#[async_trait]
impl PhaseStore for InMemorySeedStorage {
    async fn transition_phase(&self, record: PhaseRecord) -> StorageResult<()> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| StorageError::Backend("accounts lock poisoned".to_string()))?;
        let account = accounts.get_mut(&record.account_id).ok_or_else(|| {
            StorageError::NotFound(format!("account {} not found", record.account_id))
        })?;

        if account.phase != record.from_phase {
            return Err(StorageError::Conflict(format!(
                "account {} is in {}, expected {}",
                record.account_id, account.phase, record.from_phase
            )));
        }

        let mut history = self
            .phase_records
            .write()
            .map_err(|_| StorageError::Backend("phase history lock poisoned".to_string()))?;
        account.phase = record.to_phase;
        account.updated_at = record.changed_at;
        history.push(record);
        Ok(())
    }

    async fn list_phase_records(&self, account_id: &AccountId) -> StorageResult<Vec<PhaseRecord>> {
        let guard = self
            .phase_records
            .read()
            .map_err(|_| StorageError::Backend("phase history lock poisoned".to_string()))?;
        Ok(guard
            .iter()
            .filter(|record| &record.account_id == account_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LedgerStore for InMemorySeedStorage {
    async fn ledger_head(&self, account_id: &AccountId) -> StorageResult<u64> {
        let guard = self
            .ledger
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        Ok(guard
            .by_account
            .get(account_id)
            .map(|ids| ids.len() as u64)
            .unwrap_or(0))
    }

    async fn append_entry(&self, entry: LedgerEntry) -> StorageResult<()> {
        if !self.account_exists(&entry.action.account_id)? {
            return Err(StorageError::NotFound(format!(
                "account {} not found",
                entry.action.account_id
            )));
        }
        if entry.decision.action_id != entry.action.action_id
            || entry.assessment.action_id != entry.action.action_id
        {
            return Err(StorageError::InvalidInput(format!(
                "entry for {} carries a foreign assessment or decision",
                entry.action.action_id
            )));
        }

        let mut guard = self
            .ledger
            .write()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;

        if guard.entries.contains_key(&entry.action.action_id) {
            return Err(StorageError::Conflict(format!(
                "action {} already recorded",
                entry.action.action_id
            )));
        }

        let head = guard
            .by_account
            .get(&entry.action.account_id)
            .map(|ids| ids.len() as u64)
            .unwrap_or(0);
        if entry.sequence != head + 1 {
            return Err(StorageError::Conflict(format!(
                "ledger sequence for {} moved: expected {}, head is {}",
                entry.action.account_id,
                entry.sequence,
                head
            )));
        }

        guard
            .by_account
            .entry(entry.action.account_id.clone())
            .or_default()
            .push(entry.action.action_id.clone());
        guard.entries.insert(entry.action.action_id.clone(), entry);
        Ok(())
    }

    async fn get_entry(&self, action_id: &ActionId) -> StorageResult<Option<LedgerEntry>> {
        let guard = self
            .ledger
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        Ok(guard.entries.get(action_id).cloned())
    }

    async fn list_entries_since(
        &self,
        account_id: &AccountId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<LedgerEntry>> {
        let guard = self
            .ledger
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        let Some(ids) = guard.by_account.get(account_id) else {
            return Ok(Vec::new());
        };

        let mut values = ids
            .iter()
            .filter_map(|id| guard.entries.get(id))
            .filter(|entry| entry.action.created_at > since)
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| b.sequence.cmp(&a.sequence));
        Ok(values)
    }

    async fn list_pending(&self, account_id: Option<&AccountId>) -> StorageResult<Vec<LedgerEntry>> {
        let guard = self
            .ledger
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        let mut values = guard
            .entries
            .values()
            .filter(|entry| entry.decision.decision == DecisionStatus::PendingReview)
            .filter(|entry| account_id.map_or(true, |id| &entry.action.account_id == id))
            .cloned()
            .collect::<Vec<_>>();
        values.sort_by(|a, b| {
            a.decision
                .decided_at
                .cmp(&b.decision.decided_at)
                .then_with(|| a.action.action_id.cmp(&b.action.action_id))
        });
        Ok(values)
    }

    async fn list_recent_executions(
        &self,
        account_id: &AccountId,
        limit: usize,
    ) -> StorageResult<Vec<ExecutionResult>> {
        let guard = self
            .ledger
            .read()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        let Some(ids) = guard.by_account.get(account_id) else {
            return Ok(Vec::new());
        };

        let mut executions = ids
            .iter()
            .filter_map(|id| guard.entries.get(id))
            .filter_map(|entry| entry.execution.clone())
            .collect::<Vec<_>>();
        executions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        executions.truncate(limit);
        Ok(executions)
    }

    async fn transition_decision(
        &self,
        action_id: &ActionId,
        expected: DecisionStatus,
        decision: ApprovalDecision,
    ) -> StorageResult<()> {
        let mut guard = self
            .ledger
            .write()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        let entry = guard
            .entries
            .get_mut(action_id)
            .ok_or_else(|| StorageError::NotFound(format!("action {} not found", action_id)))?;

        if entry.decision.decision != expected {
            return Err(StorageError::InvariantViolation(format!(
                "invalid decision transition for {}: expected {}, found {}",
                action_id, expected, entry.decision.decision
            )));
        }
        if decision.action_id != *action_id {
            return Err(StorageError::InvalidInput(format!(
                "decision for {} cannot replace decision for {}",
                decision.action_id, action_id
            )));
        }

        entry.decision = decision;
        Ok(())
    }

    async fn record_execution(
        &self,
        action_id: &ActionId,
        result: ExecutionResult,
    ) -> StorageResult<()> {
        let mut guard = self
            .ledger
            .write()
            .map_err(|_| StorageError::Backend("ledger lock poisoned".to_string()))?;
        let entry = guard
            .entries
            .get_mut(action_id)
            .ok_or_else(|| StorageError::NotFound(format!("action {} not found", action_id)))?;

        if !entry.decision.decision.allows_execution() {
            return Err(StorageError::InvariantViolation(format!(
                "action {} is {} and cannot carry an execution result",
                action_id, entry.decision.decision
            )));
        }
        if entry.execution.is_some() {
            return Err(StorageError::Conflict(format!(
                "action {} already has an execution result",
                action_id
            )));
        }

        entry.execution = Some(result);
        Ok(())
    }
}

fn apply_window<T>(items: Vec<T>, window: QueryWindow) -> Vec<T> {
    let iter = items.into_iter().skip(window.offset);
    if window.limit == 0 {
        iter.collect()
    } else {
        iter.take(window.limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use seed_types::{
        Action, ActionType, Phase, Platform, RiskAssessment, RiskBand, RiskComponents,
        TransitionKind,
    };

    fn entry_for(account: &Account, sequence: u64, at: DateTime<Utc>) -> LedgerEntry {
        let action = Action::new(account, ActionType::Follow, "@target", at);
        let assessment = RiskAssessment {
            action_id: action.action_id.clone(),
            risk_band: RiskBand::Green,
            score: 0.1,
            reasoning: "test".to_string(),
            components: RiskComponents::default(),
            produced_at: at,
        };
        let decision = ApprovalDecision::auto_approved(action.action_id.clone(), "green", at);
        LedgerEntry {
            sequence,
            action,
            assessment,
            decision,
            execution: None,
            recorded_at: at,
        }
    }

    #[tokio::test]
    async fn append_requires_next_sequence() {
        let storage = InMemorySeedStorage::new();
        let now = Utc::now();
        let account = Account::new(Platform::Tiktok, "seedling", now);
        storage.insert_account(account.clone()).await.unwrap();

        storage.append_entry(entry_for(&account, 1, now)).await.unwrap();
        let stale = storage.append_entry(entry_for(&account, 1, now)).await;
        assert!(matches!(stale, Err(StorageError::Conflict(_))));
        let skipped = storage.append_entry(entry_for(&account, 3, now)).await;
        assert!(matches!(skipped, Err(StorageError::Conflict(_))));

        assert_eq!(storage.ledger_head(&account.account_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn append_for_unknown_account_is_rejected() {
        let storage = InMemorySeedStorage::new();
        let now = Utc::now();
        let ghost = Account::new(Platform::Tiktok, "ghost", now);
        let result = storage.append_entry(entry_for(&ghost, 1, now)).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn window_listing_is_newest_first_and_exclusive() {
        let storage = InMemorySeedStorage::new();
        let start = Utc::now();
        let account = Account::new(Platform::Tiktok, "seedling", start);
        storage.insert_account(account.clone()).await.unwrap();

        for i in 0..3 {
            storage
                .append_entry(entry_for(&account, i + 1, start + Duration::minutes(i as i64)))
                .await
                .unwrap();
        }

        let all = storage
            .list_entries_since(&account.account_id, start - Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(all.iter().map(|e| e.sequence).collect::<Vec<_>>(), vec![3, 2, 1]);

        let tail = storage
            .list_entries_since(&account.account_id, start)
            .await
            .unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[tokio::test]
    async fn decision_transition_is_compare_and_swap() {
        let storage = InMemorySeedStorage::new();
        let now = Utc::now();
        let account = Account::new(Platform::Tiktok, "seedling", now);
        storage.insert_account(account.clone()).await.unwrap();

        let mut entry = entry_for(&account, 1, now);
        entry.decision = ApprovalDecision::pending_review(
            entry.action.action_id.clone(),
            "yellow",
            now,
            Duration::hours(24),
        );
        let action_id = entry.action.action_id.clone();
        storage.append_entry(entry).await.unwrap();
        assert_eq!(storage.list_pending(None).await.unwrap().len(), 1);

        let approved = ApprovalDecision {
            decision: DecisionStatus::Approved,
            reviewer: Some("ops".to_string()),
            expires_at: None,
            ..ApprovalDecision::auto_approved(action_id.clone(), "approved by ops", now)
        };
        storage
            .transition_decision(&action_id, DecisionStatus::PendingReview, approved.clone())
            .await
            .unwrap();

        let again = storage
            .transition_decision(&action_id, DecisionStatus::PendingReview, approved)
            .await;
        assert!(matches!(again, Err(StorageError::InvariantViolation(_))));
        assert!(storage.list_pending(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn execution_is_recorded_once_and_only_when_executable() {
        let storage = InMemorySeedStorage::new();
        let now = Utc::now();
        let account = Account::new(Platform::Tiktok, "seedling", now);
        storage.insert_account(account.clone()).await.unwrap();

        let entry = entry_for(&account, 1, now);
        let action_id = entry.action.action_id.clone();
        storage.append_entry(entry).await.unwrap();

        storage
            .record_execution(&action_id, ExecutionResult::succeeded(now))
            .await
            .unwrap();
        let twice = storage
            .record_execution(&action_id, ExecutionResult::succeeded(now))
            .await;
        assert!(matches!(twice, Err(StorageError::Conflict(_))));

        let mut rejected = entry_for(&account, 2, now);
        rejected.decision =
            ApprovalDecision::rejected(rejected.action.action_id.clone(), "no", now);
        let rejected_id = rejected.action.action_id.clone();
        storage.append_entry(rejected).await.unwrap();
        let result = storage
            .record_execution(&rejected_id, ExecutionResult::succeeded(now))
            .await;
        assert!(matches!(result, Err(StorageError::InvariantViolation(_))));
    }

    #[tokio::test]
    async fn recent_executions_are_newest_completed_first_and_capped() {
        let storage = InMemorySeedStorage::new();
        let start = Utc::now();
        let account = Account::new(Platform::Tiktok, "seedling", start);
        storage.insert_account(account.clone()).await.unwrap();

        for i in 0..4u64 {
            let entry = entry_for(&account, i + 1, start);
            let action_id = entry.action.action_id.clone();
            storage.append_entry(entry).await.unwrap();
            // completion order is the reverse of submission order
            let done = start + Duration::minutes(10 - i as i64);
            let result = if i == 0 {
                ExecutionResult::succeeded(done)
            } else {
                ExecutionResult::failed("blocked", done)
            };
            storage.record_execution(&action_id, result).await.unwrap();
        }

        let recent = storage
            .list_recent_executions(&account.account_id, 2)
            .await
            .unwrap();
        assert_eq!(recent.len(), 2);
        assert!(recent[0].success);
        assert_eq!(recent[0].completed_at, start + Duration::minutes(10));
        assert_eq!(recent[1].completed_at, start + Duration::minutes(9));
        assert!(storage
            .list_recent_executions(&AccountId::new("acct-none"), 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn phase_transition_checks_current_phase() {
        let storage = InMemorySeedStorage::new();
        let now = Utc::now();
        let account = Account::new(Platform::Tiktok, "seedling", now);
        storage.insert_account(account.clone()).await.unwrap();

        let promote = PhaseRecord {
            account_id: account.account_id.clone(),
            from_phase: Phase::Phase1,
            to_phase: Phase::Phase2,
            kind: TransitionKind::Promotion,
            reason: "automatic: criteria met".to_string(),
            changed_at: now,
        };
        storage.transition_phase(promote.clone()).await.unwrap();
        let replay = storage.transition_phase(promote).await;
        assert!(matches!(replay, Err(StorageError::Conflict(_))));

        let stored = storage.get_account(&account.account_id).await.unwrap().unwrap();
        assert_eq!(stored.phase, Phase::Phase2);
        assert_eq!(
            storage
                .list_phase_records(&account.account_id)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn health_must_stay_in_unit_interval() {
        let storage = InMemorySeedStorage::new();
        let now = Utc::now();
        let account = Account::new(Platform::Tiktok, "seedling", now);
        storage.insert_account(account.clone()).await.unwrap();

        let result = storage.update_health(&account.account_id, 1.5, now).await;
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
        storage
            .update_health(&account.account_id, 0.4, now)
            .await
            .unwrap();
        storage
            .set_active(&account.account_id, false, now)
            .await
            .unwrap();
        let stored = storage.get_account(&account.account_id).await.unwrap().unwrap();
        assert_eq!(stored.health_score, 0.4);
        assert!(!stored.is_active);
    }
}
