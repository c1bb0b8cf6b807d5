use thiserror::Error;

use crate::blockchain::BlockchainError;
use crate::ledger::LedgerError;
use crate::operations::types::{OperationState, OperationType};
use crate::registry::RegistryError;
use crate::storage::ids::{AddressId, OperationId};
use crate::storage::StorageError;

/// Errors raised while creating, performing or transitioning operations.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Address creation was already requested for this address.
    #[error("Address {address} already has creation operation {existing}")]
    MultipleCreationOperations {
        address: AddressId,
        existing: OperationId,
    },

    #[error("Operation not found: {0}")]
    NotFound(OperationId),

    /// The state machine does not allow this move.
    #[error("Operation {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: OperationId,
        from: OperationState,
        to: OperationState,
    },

    /// Only waiting operations can be cancelled.
    #[error("Operation {id} is {state} and can no longer be cancelled")]
    NotCancellable { id: OperationId, state: OperationState },

    /// Another operation on this network already owns the transaction.
    #[error("Transaction {txid} is already attributed to operation {existing}")]
    DuplicateTxid { txid: String, existing: OperationId },

    #[error("Operation {0} has no holding account")]
    MissingHoldingAccount(OperationId),

    #[error("No performer registered for {0} operations")]
    MissingPerformer(OperationType),

    /// The operation cannot run yet (e.g. its address is still pending).
    #[error("Operation {id} is not ready: {reason}")]
    NotReady { id: OperationId, reason: String },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Faux deposits are disabled on this network")]
    FauxDepositsDisabled,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Blockchain(#[from] BlockchainError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OperationError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            OperationError::Blockchain(err) => err.is_transient(),
            OperationError::NotReady { .. } | OperationError::Storage(_) => true,
            _ => false,
        }
    }
}

/// Result type for operation handling.
pub type OperationResult<T> = Result<T, OperationError>;
