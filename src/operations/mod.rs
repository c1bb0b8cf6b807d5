//! Crypto operations: durable records of actions that touch the chain.
//!
//! # Data Flow
//! ```text
//! create_withdraw / create_address / record_deposit
//!     → CryptoOperation { header, kind } + holding account
//!     → queue dispatch (waiting → broadcasted)
//!     → confirmation tracker (broadcasted → success | failed)
//!     → complete_operation releases the holding account, appends a CompletionEvent
//! ```
//!
//! # Invariants
//! - A pending value-moving operation's holding balance equals its amount
//! - `success`, `failed` and `immediate` are terminal
//! - `(network, txid)` identifies at most one broadcast operation
//! - `(network, txid, log_index)` identifies at most one deposit

pub mod error;
pub mod model;
pub mod types;

pub use error::{OperationError, OperationResult};
pub use model::{AttemptOutcome, ConfirmationOutcome, IncomingTransfer, OperationCounts};
pub use types::{
    AddressCreation, CompletionEvent, CryptoOperation, Deposit, EventKey, OperationHeader,
    OperationKind, OperationState, OperationType, Withdraw,
};
