use seed_gate::GateError;
use seed_ledger::LedgerError;
use seed_phase::PhaseError;
use seed_storage::StorageError;
use seed_types::DecisionStatus;
use thiserror::Error;

/// Service-level errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    #[error("Action {action_id} cannot be executed: decision is {status}")]
    NotExecutable {
        action_id: String,
        status: DecisionStatus,
    },

    #[error("Action {0} was already dispatched")]
    AlreadyDispatched(String),

    #[error("Gate error: {0}")]
    Gate(#[from] GateError),

    #[error("Phase error: {0}")]
    Phase(#[from] PhaseError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<config::ConfigError> for ServiceError {
    fn from(err: config::ConfigError) -> Self {
        ServiceError::Config(err.to_string())
    }
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
