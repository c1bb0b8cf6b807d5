//! Ledger consistency checks.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::storage::ids::{AccountId, AssetId, TransactionId};
use crate::storage::Tables;

/// A cached balance that disagrees with its transaction log.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceMismatch {
    pub account: AccountId,
    pub cached: Decimal,
    pub computed: Decimal,
}

/// Outcome of [`Tables::audit_ledger`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerAudit {
    pub accounts_checked: usize,
    pub transactions_checked: usize,
    pub balance_mismatches: Vec<BalanceMismatch>,
    /// Transfer legs whose counterparty is missing or does not point back.
    pub broken_pairs: Vec<TransactionId>,
}

impl LedgerAudit {
    pub fn is_clean(&self) -> bool {
        self.balance_mismatches.is_empty() && self.broken_pairs.is_empty()
    }
}

impl Tables {
    /// Recompute every balance and check every transfer pairing.
    pub fn audit_ledger(&self) -> LedgerAudit {
        let mut audit = LedgerAudit {
            accounts_checked: self.accounts.len(),
            transactions_checked: self.transactions.len(),
            ..Default::default()
        };

        for account in self.accounts.values() {
            let computed = self.computed_balance(account.id);
            if computed != account.balance {
                audit.balance_mismatches.push(BalanceMismatch {
                    account: account.id,
                    cached: account.balance,
                    computed,
                });
            }
        }

        for tx in self.transactions.values() {
            let Some(counterparty_id) = tx.counterparty_id else {
                continue;
            };
            let paired = self.transactions.get(&counterparty_id).is_some_and(|other| {
                other.counterparty_id == Some(tx.id) && other.amount + tx.amount == Decimal::ZERO
            });
            if !paired {
                audit.broken_pairs.push(tx.id);
            }
        }

        audit
    }

    /// Sum of all account balances in one asset, holding accounts included.
    pub fn asset_total(&self, asset_id: AssetId) -> Decimal {
        self.accounts
            .values()
            .filter(|account| account.asset_id == asset_id)
            .map(|account| account.balance)
            .sum()
    }

    /// Net value that entered the system through single-sided entries.
    pub fn external_net_flow(&self, asset_id: AssetId) -> Decimal {
        self.transactions
            .values()
            .filter(|tx| tx.counterparty_id.is_none())
            .filter(|tx| {
                self.accounts
                    .get(&tx.account_id)
                    .is_some_and(|account| account.asset_id == asset_id)
            })
            .map(|tx| tx.amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AccountOwner;
    use crate::registry::AssetFormat;

    #[test]
    fn test_clean_ledger_and_conservation() {
        let mut tables = Tables::new();
        let network = tables.get_or_create_network("testnet");
        let asset = tables
            .get_or_create_asset(network, "ETH", "Ether", AssetFormat::Native { decimals: 18 })
            .unwrap();
        let a = tables.create_account(asset, AccountOwner::Standalone).unwrap();
        let b = tables.create_account(asset, AccountOwner::Standalone).unwrap();
        tables.deposit_or_withdraw(a, Decimal::new(50, 0), "in", false).unwrap();
        tables.transfer(Decimal::new(20, 0), a, b, "move").unwrap();
        tables.deposit_or_withdraw(b, Decimal::new(-5, 0), "out", false).unwrap();

        let audit = tables.audit_ledger();
        assert!(audit.is_clean());
        assert_eq!(audit.transactions_checked, 4);
        assert_eq!(tables.asset_total(asset), tables.external_net_flow(asset));
        assert_eq!(tables.asset_total(asset), Decimal::new(45, 0));
    }

    #[test]
    fn test_detects_tampered_cache() {
        let mut tables = Tables::new();
        let network = tables.get_or_create_network("testnet");
        let asset = tables
            .get_or_create_asset(network, "ETH", "Ether", AssetFormat::Native { decimals: 18 })
            .unwrap();
        let a = tables.create_account(asset, AccountOwner::Standalone).unwrap();
        tables.deposit_or_withdraw(a, Decimal::ONE, "in", false).unwrap();
        tables.accounts.get_mut(&a).unwrap().balance = Decimal::new(2, 0);

        let audit = tables.audit_ledger();
        assert_eq!(audit.balance_mismatches.len(), 1);
        assert_eq!(audit.balance_mismatches[0].computed, Decimal::ONE);
    }
}
