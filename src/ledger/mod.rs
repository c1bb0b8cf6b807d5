//! Double-entry ledger.
//!
//! # Data Flow
//! ```text
//! transfer(amount, from, to)
//!     → two AccountTransaction rows (debit + credit, counterparties)
//!     → update_balance(from), update_balance(to)
//!
//! deposit_or_withdraw(account, ±amount)
//!     → one AccountTransaction row (no counterparty)
//!     → update_balance(account)
//! ```
//!
//! # Invariants
//! - The entries created by one transfer sum to exactly zero
//! - `Account::balance` always equals the sum of the account's entries
//! - Only single-sided entries change the total held in an asset

pub mod audit;
pub mod transfer;
pub mod types;

pub use audit::{BalanceMismatch, LedgerAudit};
pub use types::{Account, AccountOwner, AccountTransaction, LedgerError, LedgerResult};
