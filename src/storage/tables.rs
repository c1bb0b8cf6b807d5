//! In-memory tables and secondary indexes.
//!
//! Each primary table remembers the pre-image of every row touched since
//! the last commit. [`Store::atomic`](crate::storage::Store::atomic) uses
//! that journal to write only the changed rows, or to put them back when
//! the unit fails. Indexes are derived data and are rebuilt on load.

use std::collections::{BTreeMap, HashMap};
use std::ops::Index;

use alloy::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::ledger::{Account, AccountTransaction};
use crate::operations::{CompletionEvent, CryptoOperation, EventKey, OperationKind};
use crate::registry::{Asset, AssetNetwork, CryptoAddress, CryptoAddressAccount};
use crate::storage::ids::{
    AccountId, AddressAccountId, AddressId, AssetId, NetworkId, OperationId, TransactionId,
};

/// One primary table with an undo journal.
#[derive(Debug, Clone)]
pub(crate) struct Table<K, V> {
    rows: BTreeMap<K, V>,
    touched: BTreeMap<K, Option<V>>,
}

impl<K, V> Default for Table<K, V> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
            touched: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V: Clone> Table<K, V> {
    pub fn get(&self, key: &K) -> Option<&V> {
        self.rows.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.rows.contains_key(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.remember(key);
        self.rows.get_mut(key)
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.remember(&key);
        self.rows.insert(key, value)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remember(key);
        self.rows.remove(key)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.rows.values()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    fn remember(&mut self, key: &K) {
        if !self.touched.contains_key(key) {
            self.touched.insert(key.clone(), self.rows.get(key).cloned());
        }
    }

    /// Insert a row read from disk, bypassing the journal.
    fn load(&mut self, key: K, value: V) {
        self.rows.insert(key, value);
    }

    fn is_dirty(&self) -> bool {
        !self.touched.is_empty()
    }

    /// Current value of every touched row; `None` means deleted.
    fn changes(&self) -> impl Iterator<Item = (&K, Option<&V>)> {
        self.touched.keys().map(|key| (key, self.rows.get(key)))
    }

    fn settle(&mut self) {
        self.touched.clear();
    }

    fn rollback(&mut self) {
        for (key, before) in std::mem::take(&mut self.touched) {
            match before {
                Some(value) => self.rows.insert(key, value),
                None => self.rows.remove(&key),
            };
        }
    }
}

impl<K: Ord, V> Index<&K> for Table<K, V> {
    type Output = V;

    fn index(&self, key: &K) -> &V {
        &self.rows[key]
    }
}

/// Key prefix of each persisted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum TableTag {
    Meta = 0,
    Networks = 1,
    Assets = 2,
    Accounts = 3,
    Transactions = 4,
    Addresses = 5,
    AddressAccounts = 6,
    Operations = 7,
    Outbox = 8,
    StarterAssets = 9,
}

impl TableTag {
    fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => Self::Meta,
            1 => Self::Networks,
            2 => Self::Assets,
            3 => Self::Accounts,
            4 => Self::Transactions,
            5 => Self::Addresses,
            6 => Self::AddressAccounts,
            7 => Self::Operations,
            8 => Self::Outbox,
            9 => Self::StarterAssets,
            _ => return None,
        })
    }
}

const NEXT_SEQUENCE_KEY: &[u8] = &[TableTag::Meta as u8, b's'];

/// A changed row ready for the store: `(key, Some(value))` or `(key, None)`.
pub(crate) type RowChange = (Vec<u8>, Option<Vec<u8>>);

/// Every entity the custody core persists, plus lookup indexes.
///
/// All mutation goes through `impl Tables` blocks in the ledger, registry
/// and operations modules; callers get a `&mut Tables` only inside
/// [`Store::atomic`](crate::storage::Store::atomic).
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub(crate) next_sequence: u64,
    committed_sequence: u64,

    pub(crate) networks: Table<NetworkId, AssetNetwork>,
    pub(crate) assets: Table<AssetId, Asset>,
    pub(crate) accounts: Table<AccountId, Account>,
    pub(crate) transactions: Table<TransactionId, AccountTransaction>,
    pub(crate) addresses: Table<AddressId, CryptoAddress>,
    pub(crate) address_accounts: Table<AddressAccountId, CryptoAddressAccount>,
    pub(crate) operations: Table<OperationId, CryptoOperation>,
    /// Undelivered completions keyed by sequence; delivery removes the row.
    pub(crate) outbox: Table<u64, CompletionEvent>,
    /// Addresses that already received the starter-asset give-away.
    pub(crate) starter_assets_given: Table<AddressId, DateTime<Utc>>,

    pub(crate) index: Indexes,
}

/// Secondary indexes; also the home of every uniqueness constraint.
#[derive(Debug, Clone, Default)]
pub(crate) struct Indexes {
    pub network_by_name: HashMap<String, NetworkId>,
    pub asset_by_symbol: HashMap<(NetworkId, String), AssetId>,
    pub asset_by_external_id: HashMap<(NetworkId, Address), AssetId>,
    pub transactions_by_account: HashMap<AccountId, Vec<TransactionId>>,
    pub address_by_value: HashMap<(NetworkId, Address), AddressId>,
    pub address_account_by_pair: HashMap<(AddressId, AssetId), AddressAccountId>,
    pub creation_by_address: HashMap<AddressId, OperationId>,
    pub operation_by_txid: HashMap<(NetworkId, TxHash), OperationId>,
    pub operation_by_event: HashMap<(NetworkId, EventKey), OperationId>,
}

/// Apply `$body` to every primary table as `$table` with its tag.
macro_rules! each_table {
    ($tables:expr, |$tag:ident, $table:ident| $body:expr) => {{
        { let $tag = TableTag::Networks; let $table = &mut $tables.networks; $body }
        { let $tag = TableTag::Assets; let $table = &mut $tables.assets; $body }
        { let $tag = TableTag::Accounts; let $table = &mut $tables.accounts; $body }
        { let $tag = TableTag::Transactions; let $table = &mut $tables.transactions; $body }
        { let $tag = TableTag::Addresses; let $table = &mut $tables.addresses; $body }
        { let $tag = TableTag::AddressAccounts; let $table = &mut $tables.address_accounts; $body }
        { let $tag = TableTag::Operations; let $table = &mut $tables.operations; $body }
        { let $tag = TableTag::Outbox; let $table = &mut $tables.outbox; $body }
        { let $tag = TableTag::StarterAssets; let $table = &mut $tables.starter_assets_given; $body }
    }};
}

impl Tables {
    /// Create empty tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next global sequence number.
    pub(crate) fn next_sequence(&mut self) -> u64 {
        self.next_sequence += 1;
        self.next_sequence
    }

    /// Whether anything changed since the last commit or rollback.
    pub(crate) fn is_dirty(&self) -> bool {
        self.next_sequence != self.committed_sequence
            || self.networks.is_dirty()
            || self.assets.is_dirty()
            || self.accounts.is_dirty()
            || self.transactions.is_dirty()
            || self.addresses.is_dirty()
            || self.address_accounts.is_dirty()
            || self.operations.is_dirty()
            || self.outbox.is_dirty()
            || self.starter_assets_given.is_dirty()
    }

    /// Encode every row touched since the last commit.
    pub(crate) fn pending_changes(&mut self) -> Result<Vec<RowChange>, serde_json::Error> {
        let mut changes = Vec::new();
        if self.next_sequence != self.committed_sequence {
            changes.push((NEXT_SEQUENCE_KEY.to_vec(), Some(serde_json::to_vec(&self.next_sequence)?)));
        }
        each_table!(self, |tag, table| {
            for (key, value) in table.changes() {
                changes.push((
                    row_key(tag, key)?,
                    value.map(serde_json::to_vec).transpose()?,
                ));
            }
        });
        Ok(changes)
    }

    /// Accept the open unit: forget the journal.
    pub(crate) fn settle(&mut self) {
        self.committed_sequence = self.next_sequence;
        each_table!(self, |_tag, table| table.settle());
    }

    /// Undo the open unit: restore every touched row.
    pub(crate) fn rollback(&mut self) {
        if !self.is_dirty() {
            return;
        }
        self.next_sequence = self.committed_sequence;
        each_table!(self, |_tag, table| table.rollback());
        self.rebuild_indexes();
    }

    /// Load one persisted row; unknown prefixes are reported and skipped.
    pub(crate) fn load_row(&mut self, key: &[u8], value: &[u8]) -> Result<(), serde_json::Error> {
        let Some((&tag_byte, rest)) = key.split_first() else {
            return Ok(());
        };
        match TableTag::from_byte(tag_byte) {
            Some(TableTag::Meta) => {
                if key == NEXT_SEQUENCE_KEY {
                    self.next_sequence = serde_json::from_slice(value)?;
                    self.committed_sequence = self.next_sequence;
                }
            }
            Some(TableTag::Networks) => load_into(&mut self.networks, rest, value)?,
            Some(TableTag::Assets) => load_into(&mut self.assets, rest, value)?,
            Some(TableTag::Accounts) => load_into(&mut self.accounts, rest, value)?,
            Some(TableTag::Transactions) => load_into(&mut self.transactions, rest, value)?,
            Some(TableTag::Addresses) => load_into(&mut self.addresses, rest, value)?,
            Some(TableTag::AddressAccounts) => load_into(&mut self.address_accounts, rest, value)?,
            Some(TableTag::Operations) => load_into(&mut self.operations, rest, value)?,
            Some(TableTag::Outbox) => load_into(&mut self.outbox, rest, value)?,
            Some(TableTag::StarterAssets) => load_into(&mut self.starter_assets_given, rest, value)?,
            None => tracing::warn!(tag = tag_byte, "Skipping row with unknown table prefix"),
        }
        Ok(())
    }

    /// Recompute every index from the primary tables.
    pub(crate) fn rebuild_indexes(&mut self) {
        let mut index = Indexes::default();

        for network in self.networks.values() {
            index.network_by_name.insert(network.name.clone(), network.id);
        }
        for asset in self.assets.values() {
            index
                .asset_by_symbol
                .insert((asset.network_id, asset.symbol.clone()), asset.id);
            if let Some(external_id) = asset.external_id {
                index
                    .asset_by_external_id
                    .insert((asset.network_id, external_id), asset.id);
            }
        }

        let mut entries: Vec<&AccountTransaction> = self.transactions.values().collect();
        entries.sort_by_key(|tx| tx.sequence);
        for tx in entries {
            index
                .transactions_by_account
                .entry(tx.account_id)
                .or_default()
                .push(tx.id);
        }

        for address in self.addresses.values() {
            if let Some(value) = address.address {
                index
                    .address_by_value
                    .insert((address.network_id, value), address.id);
            }
        }
        for link in self.address_accounts.values() {
            index
                .address_account_by_pair
                .insert((link.address_id, link.asset_id), link.id);
        }

        for op in self.operations.values() {
            let network_id = op.header.network_id;
            match &op.kind {
                OperationKind::AddressCreation(creation) => {
                    index.creation_by_address.insert(creation.address_id, op.header.id);
                }
                OperationKind::Deposit(deposit) => {
                    if let Some(event) = deposit.event {
                        index.operation_by_event.insert((network_id, event), op.header.id);
                    }
                }
                OperationKind::Withdraw(_) => {}
            }
            if op.kind.owns_txid() {
                if let Some(txid) = op.header.txid {
                    index.operation_by_txid.insert((network_id, txid), op.header.id);
                }
            }
        }

        self.index = index;
    }
}

fn row_key<K: Serialize>(tag: TableTag, key: &K) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = vec![tag as u8];
    serde_json::to_writer(&mut bytes, key)?;
    Ok(bytes)
}

fn load_into<K, V>(table: &mut Table<K, V>, key: &[u8], value: &[u8]) -> Result<(), serde_json::Error>
where
    K: Ord + Clone + DeserializeOwned,
    V: Clone + DeserializeOwned,
{
    table.load(serde_json::from_slice(key)?, serde_json::from_slice(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::AccountOwner;
    use crate::registry::AssetFormat;
    use rust_decimal::Decimal;

    #[test]
    fn test_pending_changes_cover_only_touched_rows() {
        let mut tables = Tables::new();
        let network = tables.get_or_create_network("testnet");
        let asset = tables
            .get_or_create_asset(network, "ETH", "Ether", AssetFormat::Native { decimals: 18 })
            .unwrap();
        let a = tables.create_account(asset, AccountOwner::Standalone).unwrap();
        let b = tables.create_account(asset, AccountOwner::Standalone).unwrap();
        tables.deposit_or_withdraw(a, Decimal::new(9, 0), "seed", false).unwrap();
        tables.settle();
        assert!(!tables.is_dirty());

        tables.transfer(Decimal::new(4, 0), a, b, "move").unwrap();
        let changes = tables.pending_changes().unwrap();

        // sequence, two accounts, two entries
        assert_eq!(changes.len(), 5);
        let tags: Vec<u8> = changes.iter().map(|(key, _)| key[0]).collect();
        assert_eq!(tags.iter().filter(|t| **t == TableTag::Accounts as u8).count(), 2);
        assert_eq!(tags.iter().filter(|t| **t == TableTag::Transactions as u8).count(), 2);
        assert!(!tags.contains(&(TableTag::Networks as u8)));
    }

    #[test]
    fn test_rollback_restores_rows_and_indexes() {
        let mut tables = Tables::new();
        let network = tables.get_or_create_network("testnet");
        let asset = tables
            .get_or_create_asset(network, "ETH", "Ether", AssetFormat::Native { decimals: 18 })
            .unwrap();
        let a = tables.create_account(asset, AccountOwner::Standalone).unwrap();
        tables.deposit_or_withdraw(a, Decimal::new(2, 0), "seed", false).unwrap();
        tables.settle();
        let sequence = tables.next_sequence;

        tables.deposit_or_withdraw(a, Decimal::new(5, 0), "later", false).unwrap();
        tables.get_or_create_network("other");
        tables.rollback();

        assert_eq!(tables.balance(a).unwrap(), Decimal::new(2, 0));
        assert_eq!(tables.account_transactions(a).len(), 1);
        assert!(tables.network_by_name("other").is_none());
        assert_eq!(tables.next_sequence, sequence);
        assert!(!tables.is_dirty());
    }

    #[test]
    fn test_load_row_round_trips_pending_changes() {
        let mut tables = Tables::new();
        let network = tables.get_or_create_network("testnet");
        tables.register_address(network, Address::repeat_byte(0x11)).unwrap();

        let mut loaded = Tables::new();
        for (key, value) in tables.pending_changes().unwrap() {
            loaded.load_row(&key, &value.unwrap()).unwrap();
        }
        loaded.rebuild_indexes();

        assert!(!loaded.is_dirty());
        assert_eq!(loaded.next_sequence, tables.next_sequence);
        assert!(loaded.address_by_value(network, Address::repeat_byte(0x11)).is_some());
    }
}
