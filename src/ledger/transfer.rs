//! Double-entry primitives.
//!
//! Balances are never written directly: every mutation appends
//! [`AccountTransaction`] rows and then recomputes the cached balance of
//! each touched account from its log.

use chrono::Utc;
use rust_decimal::Decimal;

use crate::ledger::types::{
    Account, AccountOwner, AccountTransaction, LedgerError, LedgerResult,
};
use crate::storage::ids::{AccountId, AssetId, TransactionId};
use crate::storage::Tables;

impl Tables {
    /// Open a new zero-balance account in `asset_id`.
    pub fn create_account(&mut self, asset_id: AssetId, owner: AccountOwner) -> LedgerResult<AccountId> {
        if !self.assets.contains_key(&asset_id) {
            return Err(LedgerError::AssetNotFound(asset_id));
        }
        let id = AccountId::new();
        self.accounts.insert(
            id,
            Account {
                id,
                asset_id,
                owner,
                balance: Decimal::ZERO,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    /// Look up an account.
    pub fn account(&self, id: AccountId) -> LedgerResult<&Account> {
        self.accounts.get(&id).ok_or(LedgerError::AccountNotFound(id))
    }

    /// Cached balance of an account.
    pub fn balance(&self, id: AccountId) -> LedgerResult<Decimal> {
        self.account(id).map(|account| account.balance)
    }

    /// Ledger entries of an account, oldest first.
    pub fn account_transactions(&self, id: AccountId) -> Vec<&AccountTransaction> {
        self.index
            .transactions_by_account
            .get(&id)
            .map(|ids| ids.iter().filter_map(|tx| self.transactions.get(tx)).collect())
            .unwrap_or_default()
    }

    /// Sum of the account's ledger entries; the source of truth for its balance.
    pub fn computed_balance(&self, id: AccountId) -> Decimal {
        self.account_transactions(id).iter().map(|tx| tx.amount).sum()
    }

    /// Refresh the cached balance from the transaction log.
    pub fn update_balance(&mut self, id: AccountId) -> LedgerResult<Decimal> {
        let balance = self.computed_balance(id);
        let account = self
            .accounts
            .get_mut(&id)
            .ok_or(LedgerError::AccountNotFound(id))?;
        account.balance = balance;
        Ok(balance)
    }

    /// Move `amount` from one account to another.
    ///
    /// Produces exactly two entries summing to zero that reference each
    /// other as counterparties. Fails with [`LedgerError::InsufficientBalance`]
    /// when `from` would go negative; nothing is written in that case.
    pub fn transfer(
        &mut self,
        amount: Decimal,
        from: AccountId,
        to: AccountId,
        note: &str,
    ) -> LedgerResult<(TransactionId, TransactionId)> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        if from == to {
            return Err(LedgerError::SameAccount(from));
        }

        let source = self.account(from)?;
        let destination = self.account(to)?;
        if source.asset_id != destination.asset_id {
            return Err(LedgerError::AssetMismatch {
                from,
                from_asset: source.asset_id,
                to,
                to_asset: destination.asset_id,
            });
        }

        let available = self.computed_balance(from);
        if available - amount < Decimal::ZERO {
            return Err(LedgerError::InsufficientBalance {
                account: from,
                balance: available,
                requested: amount,
            });
        }

        let debit_id = TransactionId::new();
        let credit_id = TransactionId::new();
        self.append_entry(debit_id, from, -amount, note, Some(credit_id));
        self.append_entry(credit_id, to, amount, note, Some(debit_id));

        self.update_balance(from)?;
        self.update_balance(to)?;

        tracing::debug!(%from, %to, %amount, note, "Ledger transfer");
        Ok((debit_id, credit_id))
    }

    /// Record a single-sided entry with no counterparty.
    ///
    /// Only used to reflect value entering or leaving the system through the
    /// chain, so it is the one primitive that changes an asset's total.
    pub fn deposit_or_withdraw(
        &mut self,
        account: AccountId,
        amount: Decimal,
        note: &str,
        allow_negative: bool,
    ) -> LedgerResult<TransactionId> {
        if amount.is_zero() {
            return Err(LedgerError::ZeroAmount);
        }
        self.account(account)?;

        let available = self.computed_balance(account);
        if !allow_negative && available + amount < Decimal::ZERO {
            return Err(LedgerError::InsufficientBalance {
                account,
                balance: available,
                requested: -amount,
            });
        }

        let id = TransactionId::new();
        self.append_entry(id, account, amount, note, None);
        self.update_balance(account)?;

        tracing::debug!(%account, %amount, note, "External ledger entry");
        Ok(id)
    }

    fn append_entry(
        &mut self,
        id: TransactionId,
        account_id: AccountId,
        amount: Decimal,
        message: &str,
        counterparty_id: Option<TransactionId>,
    ) {
        let sequence = self.next_sequence();
        self.transactions.insert(
            id,
            AccountTransaction {
                id,
                sequence,
                account_id,
                amount,
                message: message.to_string(),
                counterparty_id,
                created_at: Utc::now(),
            },
        );
        self.index
            .transactions_by_account
            .entry(account_id)
            .or_default()
            .push(id);
    }
}
