use thiserror::Error;

use crate::blockchain::BlockchainError;
use crate::ledger::LedgerError;
use crate::operations::OperationError;
use crate::registry::RegistryError;
use crate::storage::ids::OperationId;
use crate::storage::StorageError;

/// Errors raised by the polling services and the waits built on them.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Heartbeat is missing or stale; nothing is dispatched or awaited.
    #[error("Network {0} is not alive")]
    NetworkDead(String),

    /// A bounded wait ran out before its operations settled.
    #[error("Timed out after {waited_ms} ms with {pending} operation(s) still pending")]
    WaitTimeout { waited_ms: u64, pending: usize },

    #[error("Invalid service setup: {0}")]
    Setup(String),

    #[error("Operation {0} has no transaction id")]
    MissingTxid(OperationId),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Blockchain(#[from] BlockchainError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;
