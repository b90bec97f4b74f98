use seed_ledger::LedgerError;
use seed_storage::StorageError;
use thiserror::Error;

/// Phase controller errors.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Platform {0} is not unlocked by any phase")]
    PlatformNotSupported(String),

    #[error("Invalid phase transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid phase configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type PhaseResult<T> = Result<T, PhaseError>;
