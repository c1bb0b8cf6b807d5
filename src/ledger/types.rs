//! Ledger entities and error definitions.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::storage::ids::{AccountId, AddressId, AssetId, OperationId, TransactionId};

/// Who an account belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AccountOwner {
    /// Not attached to any owner (tests, tooling).
    Standalone,
    /// A user of the custodial service.
    User(Uuid),
    /// The balance of a crypto address in one asset.
    Address(AddressId),
    /// The holding account of an in-flight operation.
    Holding(OperationId),
}

/// A ledger endpoint denominated in a single asset.
///
/// `balance` is a cache of the sum of the account's transactions. It is
/// only ever written by [`Tables::update_balance`](crate::storage::Tables::update_balance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub asset_id: AssetId,
    pub owner: AccountOwner,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// One immutable ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTransaction {
    pub id: TransactionId,
    /// Global insertion order.
    pub sequence: u64,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub message: String,
    /// The paired entry on the other leg of a transfer.
    pub counterparty_id: Option<TransactionId>,
    pub created_at: DateTime<Utc>,
}

/// Errors raised by ledger primitives.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The debit would take the account below zero.
    #[error("Insufficient balance on account {account}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    /// Transfers move strictly positive amounts.
    #[error("Transfer amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    /// Single-sided entries must move a non-zero amount.
    #[error("Ledger entry amount must not be zero")]
    ZeroAmount,

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Asset not found: {0}")]
    AssetNotFound(AssetId),

    /// Both legs of a transfer must be in the same asset.
    #[error("Asset mismatch: account {from} holds {from_asset}, account {to} holds {to_asset}")]
    AssetMismatch {
        from: AccountId,
        from_asset: AssetId,
        to: AccountId,
        to_asset: AssetId,
    },

    #[error("Cannot transfer from account {0} to itself")]
    SameAccount(AccountId),
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LedgerError::InsufficientBalance {
            account: AccountId::new(),
            balance: Decimal::new(5, 0),
            requested: Decimal::new(7, 0),
        };
        let text = err.to_string();
        assert!(text.contains("balance 5"));
        assert!(text.contains("requested 7"));
    }

    #[test]
    fn test_owner_serde_shape() {
        let owner = AccountOwner::Standalone;
        assert_eq!(serde_json::to_string(&owner).unwrap(), r#"{"kind":"standalone"}"#);
    }
}
