//! PostgreSQL adapter for SocialSeed storage.
//!
//! The transactional source of truth. Ledger appends rely on the
//! `(account_id, sequence)` unique constraint: two writers racing for the same
//! sequence cannot both commit, and the loser sees `StorageError::Conflict`.

use crate::traits::{AccountStore, LedgerStore, PhaseStore, QueryWindow};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seed_types::{
    Account, AccountId, ActionId, ApprovalDecision, DecisionStatus, ExecutionResult, LedgerEntry,
    Phase, PhaseRecord, Platform, TransitionKind,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

/// PostgreSQL-backed storage adapter.
#[derive(Clone)]
pub struct PostgresSeedStorage {
    pool: PgPool,
}

impl PostgresSeedStorage {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StorageError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create adapter from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StorageResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn init_schema(&self) -> StorageResult<()> {
        let ddl = [
            r#"
            CREATE TABLE IF NOT EXISTS seed_accounts (
                account_id TEXT PRIMARY KEY,
                platform TEXT NOT NULL,
                username TEXT NOT NULL,
                phase TEXT NOT NULL,
                health_score DOUBLE PRECISION NOT NULL CHECK (health_score >= 0 AND health_score <= 1),
                is_active BOOLEAN NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS seed_phase_records (
                record_id BIGSERIAL PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES seed_accounts (account_id),
                from_phase TEXT NOT NULL,
                to_phase TEXT NOT NULL,
                kind TEXT NOT NULL,
                reason TEXT NOT NULL,
                changed_at TIMESTAMPTZ NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS seed_ledger (
                action_id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL REFERENCES seed_accounts (account_id),
                sequence BIGINT NOT NULL,
                action JSONB NOT NULL,
                assessment JSONB NOT NULL,
                risk_band TEXT NOT NULL,
                decision JSONB NOT NULL,
                decision_status TEXT NOT NULL,
                execution JSONB,
                completed_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                recorded_at TIMESTAMPTZ NOT NULL,
                UNIQUE (account_id, sequence)
            )
            "#,
            "ALTER TABLE seed_ledger ADD COLUMN IF NOT EXISTS completed_at TIMESTAMPTZ",
            "CREATE INDEX IF NOT EXISTS seed_ledger_account_created_idx ON seed_ledger (account_id, created_at)",
            "CREATE INDEX IF NOT EXISTS seed_ledger_account_completed_idx ON seed_ledger (account_id, completed_at)",
            "CREATE INDEX IF NOT EXISTS seed_ledger_status_idx ON seed_ledger (decision_status)",
            "CREATE INDEX IF NOT EXISTS seed_phase_records_account_idx ON seed_phase_records (account_id, record_id)",
        ];

        for stmt in ddl {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(format!("schema init failed: {e}")))?;
        }
        Ok(())
    }

    async fn require_account(&self, account_id: &AccountId) -> StorageResult<()> {
        let exists = sqlx::query("SELECT 1 FROM seed_accounts WHERE account_id = $1")
            .bind(account_id.0.clone())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        if exists.is_none() {
            return Err(StorageError::NotFound(format!(
                "account {} not found",
                account_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PostgresSeedStorage {
    async fn insert_account(&self, account: Account) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO seed_accounts
                (account_id, platform, username, phase, health_score, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(account.account_id.0.clone())
        .bind(account.platform.as_str())
        .bind(account.username.clone())
        .bind(account.phase.as_str())
        .bind(account.health_score)
        .bind(account.is_active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get_account(&self, account_id: &AccountId) -> StorageResult<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT account_id, platform, username, phase, health_score, is_active, created_at, updated_at
              FROM seed_accounts
             WHERE account_id = $1
            "#,
        )
        .bind(account_id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(account_from_row).transpose()
    }

    async fn list_accounts(&self, window: QueryWindow) -> StorageResult<Vec<Account>> {
        let limit = if window.limit == 0 {
            None
        } else {
            Some(to_i64(window.limit)?)
        };
        let rows = sqlx::query(
            r#"
            SELECT account_id, platform, username, phase, health_score, is_active, created_at, updated_at
              FROM seed_accounts
             ORDER BY created_at ASC, account_id ASC
             LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(to_i64(window.offset)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(account_from_row).collect()
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
        let result = sqlx::query(
            "UPDATE seed_accounts SET health_score = $1, updated_at = $2 WHERE account_id = $3",
        )
        .bind(health_score)
        .bind(updated_at)
        .bind(account_id.0.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "account {} not found",
                account_id
            )));
        }
        Ok(())
    }

    async fn set_active(
        &self,
        account_id: &AccountId,
        is_active: bool,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE seed_accounts SET is_active = $1, updated_at = $2 WHERE account_id = $3",
        )
        .bind(is_active)
        .bind(updated_at)
        .bind(account_id.0.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(format!(
                "account {} not found",
                account_id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PhaseStore for PostgresSeedStorage {
    async fn transition_phase(&self, record: PhaseRecord) -> StorageResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE seed_accounts
               SET phase = $1, updated_at = $2
             WHERE account_id = $3 AND phase = $4
            "#,
        )
        .bind(record.to_phase.as_str())
        .bind(record.changed_at)
        .bind(record.account_id.0.clone())
        .bind(record.from_phase.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if updated.rows_affected() == 0 {
            drop(tx);
            self.require_account(&record.account_id).await?;
            return Err(StorageError::Conflict(format!(
                "account {} is no longer in {}",
                record.account_id, record.from_phase
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO seed_phase_records
                (account_id, from_phase, to_phase, kind, reason, changed_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.account_id.0.clone())
        .bind(record.from_phase.as_str())
        .bind(record.to_phase.as_str())
        .bind(record.kind.as_str())
        .bind(record.reason.clone())
        .bind(record.changed_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn list_phase_records(&self, account_id: &AccountId) -> StorageResult<Vec<PhaseRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, from_phase, to_phase, kind, reason, changed_at
              FROM seed_phase_records
             WHERE account_id = $1
             ORDER BY record_id ASC
            "#,
        )
        .bind(account_id.0.clone())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(phase_record_from_row).collect()
    }
}

#[async_trait]
impl LedgerStore for PostgresSeedStorage {
    async fn ledger_head(&self, account_id: &AccountId) -> StorageResult<u64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) AS head FROM seed_ledger WHERE account_id = $1",
        )
        .bind(account_id.0.clone())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let head: i64 = row
            .try_get("head")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(head as u64)
    }

    async fn append_entry(&self, entry: LedgerEntry) -> StorageResult<()> {
        if entry.decision.action_id != entry.action.action_id
            || entry.assessment.action_id != entry.action.action_id
        {
            return Err(StorageError::InvalidInput(format!(
                "entry for {} carries a foreign assessment or decision",
                entry.action.action_id
            )));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) AS head FROM seed_ledger WHERE account_id = $1",
        )
        .bind(entry.action.account_id.0.clone())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        let head: i64 = row
            .try_get("head")
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if entry.sequence != head as u64 + 1 {
            return Err(StorageError::Conflict(format!(
                "ledger sequence for {} moved: expected {}, head is {}",
                entry.action.account_id, entry.sequence, head
            )));
        }

        let action_json = to_json(&entry.action)?;
        let assessment_json = to_json(&entry.assessment)?;
        let decision_json = to_json(&entry.decision)?;
        let execution_json = entry.execution.as_ref().map(to_json).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO seed_ledger
                (action_id, account_id, sequence, action, assessment, risk_band, decision,
                 decision_status, execution, completed_at, created_at, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.action.action_id.0.clone())
        .bind(entry.action.account_id.0.clone())
        .bind(entry.sequence as i64)
        .bind(action_json)
        .bind(assessment_json)
        .bind(entry.assessment.risk_band.as_str())
        .bind(decision_json)
        .bind(entry.decision.decision.as_str())
        .bind(execution_json)
        .bind(entry.execution.as_ref().map(|execution| execution.completed_at))
        .bind(entry.action.created_at)
        .bind(entry.recorded_at)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    async fn get_entry(&self, action_id: &ActionId) -> StorageResult<Option<LedgerEntry>> {
        let row = sqlx::query(
            r#"
            SELECT sequence, action, assessment, decision, execution, recorded_at
              FROM seed_ledger
             WHERE action_id = $1
            "#,
        )
        .bind(action_id.0.clone())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(entry_from_row).transpose()
    }

    async fn list_entries_since(
        &self,
        account_id: &AccountId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, action, assessment, decision, execution, recorded_at
              FROM seed_ledger
             WHERE account_id = $1 AND created_at > $2
             ORDER BY sequence DESC
            "#,
        )
        .bind(account_id.0.clone())
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn list_pending(&self, account_id: Option<&AccountId>) -> StorageResult<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, action, assessment, decision, execution, recorded_at
              FROM seed_ledger
             WHERE decision_status = 'pending_review'
               AND ($1::TEXT IS NULL OR account_id = $1)
             ORDER BY recorded_at ASC, action_id ASC
            "#,
        )
        .bind(account_id.map(|id| id.0.clone()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn list_recent_executions(
        &self,
        account_id: &AccountId,
        limit: usize,
    ) -> StorageResult<Vec<ExecutionResult>> {
        let rows = sqlx::query(
            r#"
            SELECT execution
              FROM seed_ledger
             WHERE account_id = $1 AND execution IS NOT NULL
             ORDER BY completed_at DESC, sequence DESC
             LIMIT $2
            "#,
        )
        .bind(account_id.0.clone())
        .bind(to_i64(limit)?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let execution: serde_json::Value = row
                    .try_get("execution")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                from_json(execution)
            })
            .collect()
    }

    async fn transition_decision(
        &self,
        action_id: &ActionId,
        expected: DecisionStatus,
        decision: ApprovalDecision,
    ) -> StorageResult<()> {
        if decision.action_id != *action_id {
            return Err(StorageError::InvalidInput(format!(
                "decision for {} cannot replace decision for {}",
                decision.action_id, action_id
            )));
        }

        let result = sqlx::query(
            r#"
            UPDATE seed_ledger
               SET decision = $1, decision_status = $2
             WHERE action_id = $3 AND decision_status = $4
            "#,
        )
        .bind(to_json(&decision)?)
        .bind(decision.decision.as_str())
        .bind(action_id.0.clone())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            let current = self
                .get_entry(action_id)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("action {} not found", action_id)))?;
            return Err(StorageError::InvariantViolation(format!(
                "invalid decision transition for {}: expected {}, found {}",
                action_id, expected, current.decision.decision
            )));
        }
        Ok(())
    }

    async fn record_execution(
        &self,
        action_id: &ActionId,
        result: ExecutionResult,
    ) -> StorageResult<()> {
        let updated = sqlx::query(
            r#"
            UPDATE seed_ledger
               SET execution = $1, completed_at = $2
             WHERE action_id = $3
               AND execution IS NULL
               AND decision_status IN ('auto_approved', 'approved')
            "#,
        )
        .bind(to_json(&result)?)
        .bind(result.completed_at)
        .bind(action_id.0.clone())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        if updated.rows_affected() == 0 {
            let current = self
                .get_entry(action_id)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("action {} not found", action_id)))?;
            if current.execution.is_some() {
                return Err(StorageError::Conflict(format!(
                    "action {} already has an execution result",
                    action_id
                )));
            }
            return Err(StorageError::InvariantViolation(format!(
                "action {} is {} and cannot carry an execution result",
                action_id, current.decision.decision
            )));
        }
        Ok(())
    }
}

fn account_from_row(row: PgRow) -> StorageResult<Account> {
    let platform: String = row
        .try_get("platform")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let phase: String = row
        .try_get("phase")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(Account {
        account_id: AccountId::new(
            row.try_get::<String, _>("account_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        platform: Platform::parse(&platform)
            .ok_or_else(|| StorageError::Serialization(format!("unknown platform {platform}")))?,
        username: row
            .try_get("username")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        phase: parse_phase(&phase)?,
        health_score: row
            .try_get("health_score")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        is_active: row
            .try_get("is_active")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn phase_record_from_row(row: PgRow) -> StorageResult<PhaseRecord> {
    let from_phase: String = row
        .try_get("from_phase")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let to_phase: String = row
        .try_get("to_phase")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let kind: String = row
        .try_get("kind")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(PhaseRecord {
        account_id: AccountId::new(
            row.try_get::<String, _>("account_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
        ),
        from_phase: parse_phase(&from_phase)?,
        to_phase: parse_phase(&to_phase)?,
        kind: TransitionKind::parse(&kind)
            .ok_or_else(|| StorageError::Serialization(format!("unknown transition {kind}")))?,
        reason: row
            .try_get("reason")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
        changed_at: row
            .try_get("changed_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn entry_from_row(row: PgRow) -> StorageResult<LedgerEntry> {
    let action: serde_json::Value = row
        .try_get("action")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let assessment: serde_json::Value = row
        .try_get("assessment")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let decision: serde_json::Value = row
        .try_get("decision")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let execution: Option<serde_json::Value> = row
        .try_get("execution")
        .map_err(|e| StorageError::Backend(e.to_string()))?;
    let sequence: i64 = row
        .try_get("sequence")
        .map_err(|e| StorageError::Backend(e.to_string()))?;

    Ok(LedgerEntry {
        sequence: sequence as u64,
        action: from_json(action)?,
        assessment: from_json(assessment)?,
        decision: from_json(decision)?,
        execution: execution.map(from_json).transpose()?,
        recorded_at: row
            .try_get("recorded_at")
            .map_err(|e| StorageError::Backend(e.to_string()))?,
    })
}

fn parse_phase(value: &str) -> StorageResult<Phase> {
    Phase::parse(value).ok_or_else(|| StorageError::Serialization(format!("unknown phase {value}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> StorageResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_json<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> StorageResult<T> {
    serde_json::from_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23505") => return StorageError::Conflict(db_err.message().to_string()),
            Some("23503") => return StorageError::NotFound(db_err.message().to_string()),
            _ => {}
        }
    }
    StorageError::Backend(err.to_string())
}

fn to_i64(value: usize) -> StorageResult<i64> {
    i64::try_from(value)
        .map_err(|_| StorageError::InvalidInput("window value too large".to_string()))
}
