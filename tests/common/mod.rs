//! Shared fixtures for integration tests: an in-memory chain and funded stores.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, Bytes, TxHash, B256, U256};
use alloy::sol_types::SolEvent;
use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;

use chain_custody::blockchain::contracts::abi;
use chain_custody::blockchain::{
    BlockInfo, BlockchainError, BlockchainResult, ContractRegistry, LogQuery, NodeRpc, RawLog, SignedTx, TxInfo,
    TxParams, TxReceipt,
};
use chain_custody::config::CustodyConfig;
use chain_custody::registry::AssetFormat;
use chain_custody::services::{unix_now, ChainSettings, ServiceResult};
use chain_custody::storage::ids::{AccountId, AddressId, AssetId, NetworkId};
use chain_custody::storage::Store;

pub const WEI_PER_ETH: u64 = 1_000_000_000_000_000_000;

#[derive(Default)]
struct Chain {
    head: u64,
    down: bool,
    failing_sends: usize,
    lost_responses: usize,
    tx_counter: u64,
    signed: HashMap<TxHash, TxParams>,
    sent: Vec<(TxHash, TxParams)>,
    txs: HashMap<TxHash, TxInfo>,
    receipts: HashMap<TxHash, TxReceipt>,
    logs: Vec<RawLog>,
}

/// A programmable chain behind the node RPC boundary.
///
/// Blocks are stamped with the current wall clock, so the heartbeat sees a
/// live chain unless the node is marked down.
#[derive(Default)]
pub struct MockNode {
    chain: Mutex<Chain>,
}

impl MockNode {
    pub fn new(head: u64) -> Arc<Self> {
        let node = Self::default();
        node.chain.lock().head = head;
        Arc::new(node)
    }

    pub fn head(&self) -> u64 {
        self.chain.lock().head
    }

    pub fn advance(&self, blocks: u64) {
        self.chain.lock().head += blocks;
    }

    /// Every call fails with a transient RPC error while down.
    pub fn set_down(&self, down: bool) {
        self.chain.lock().down = down;
    }

    /// The next `count` sends fail before reaching the pool.
    pub fn fail_next_sends(&self, count: usize) {
        self.chain.lock().failing_sends = count;
    }

    /// The next `count` sends are accepted but answer with a timeout.
    pub fn lose_next_send_responses(&self, count: usize) {
        self.chain.lock().lost_responses = count;
    }

    pub fn sent(&self) -> Vec<(TxHash, TxParams)> {
        self.chain.lock().sent.clone()
    }

    pub fn push_log(&self, log: RawLog) {
        self.chain.lock().logs.push(log);
    }

    /// Mine a sent transaction at the current head.
    pub fn mine(&self, tx_hash: TxHash, status: bool, gas_used: u64, contract_address: Option<Address>) {
        let mut chain = self.chain.lock();
        let block = chain.head;
        if let Some(tx) = chain.txs.get_mut(&tx_hash) {
            tx.block_number = Some(block);
        }
        chain.receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: Some(block),
                gas_used,
                status,
                contract_address,
            },
        );
    }

    /// Mine every sent transaction that has no receipt yet, successfully.
    ///
    /// Deployments get `contract_for(index)` as their contract address.
    pub fn mine_pending(&self, contract_for: impl Fn(usize) -> Address) {
        let pending: Vec<(usize, TxHash, bool)> = {
            let chain = self.chain.lock();
            chain
                .sent
                .iter()
                .enumerate()
                .filter(|(_, (hash, _))| !chain.receipts.contains_key(hash))
                .map(|(i, (hash, params))| (i, *hash, params.to.is_none()))
                .collect()
        };
        for (index, hash, is_deploy) in pending {
            let contract = is_deploy.then(|| contract_for(index));
            self.mine(hash, true, 21_000, contract);
        }
    }

    /// Mine a transaction this system did not send (e.g. a user's deposit) at `block`.
    pub fn mine_external(&self, tx_hash: TxHash, block: u64) {
        self.chain.lock().receipts.insert(
            tx_hash,
            TxReceipt {
                tx_hash,
                block_number: Some(block),
                gas_used: 30_000,
                status: true,
                contract_address: None,
            },
        );
    }

    fn check_up(&self, chain: &Chain) -> BlockchainResult<()> {
        if chain.down {
            return Err(BlockchainError::Rpc("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl NodeRpc for MockNode {
    async fn get_block_number(&self) -> BlockchainResult<u64> {
        let chain = self.chain.lock();
        self.check_up(&chain)?;
        Ok(chain.head)
    }

    async fn get_block_by_number(&self, number: u64) -> BlockchainResult<Option<BlockInfo>> {
        let chain = self.chain.lock();
        self.check_up(&chain)?;
        if number > chain.head {
            return Ok(None);
        }
        Ok(Some(BlockInfo {
            number,
            timestamp: unix_now() as u64,
            hash: B256::left_padding_from(&number.to_be_bytes()),
        }))
    }

    async fn get_balance(&self, _address: Address) -> BlockchainResult<U256> {
        let chain = self.chain.lock();
        self.check_up(&chain)?;
        Ok(U256::ZERO)
    }

    async fn sign_transaction(&self, params: TxParams) -> BlockchainResult<SignedTx> {
        let mut chain = self.chain.lock();
        self.check_up(&chain)?;
        chain.tx_counter += 1;
        let mut raw = b"signed:".to_vec();
        raw.extend_from_slice(&chain.tx_counter.to_be_bytes());
        let signed = SignedTx::from_raw(Bytes::from(raw));
        chain.signed.insert(signed.hash, params);
        Ok(signed)
    }

    async fn send_raw_transaction(&self, tx: &SignedTx) -> BlockchainResult<TxHash> {
        let mut chain = self.chain.lock();
        self.check_up(&chain)?;
        if chain.failing_sends > 0 {
            chain.failing_sends -= 1;
            return Err(BlockchainError::Timeout(10));
        }
        if chain.txs.contains_key(&tx.hash) {
            return Ok(tx.hash);
        }
        let Some(params) = chain.signed.get(&tx.hash).cloned() else {
            return Err(BlockchainError::Rejected("invalid signature".into()));
        };
        chain.txs.insert(
            tx.hash,
            TxInfo {
                hash: tx.hash,
                block_number: None,
                gas_limit: params.gas_limit,
            },
        );
        chain.sent.push((tx.hash, params));
        if chain.lost_responses > 0 {
            chain.lost_responses -= 1;
            return Err(BlockchainError::Timeout(10));
        }
        Ok(tx.hash)
    }

    async fn get_transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
        let chain = self.chain.lock();
        self.check_up(&chain)?;
        Ok(chain.receipts.get(&tx_hash).cloned())
    }

    async fn get_transaction_by_hash(&self, tx_hash: TxHash) -> BlockchainResult<Option<TxInfo>> {
        let chain = self.chain.lock();
        self.check_up(&chain)?;
        Ok(chain.txs.get(&tx_hash).cloned())
    }

    async fn get_logs(&self, query: &LogQuery) -> BlockchainResult<Vec<RawLog>> {
        let chain = self.chain.lock();
        self.check_up(&chain)?;
        Ok(chain
            .logs
            .iter()
            .filter(|log| query.addresses.contains(&log.address))
            .filter(|log| {
                log.block_number
                    .is_some_and(|b| b >= query.from_block && b <= query.to_block)
            })
            .cloned()
            .collect())
    }
}

/// Node account that pays for every transaction.
pub fn operator() -> Address {
    Address::repeat_byte(0x0f)
}

/// Configuration with one confirmation everywhere and no retry delay.
pub fn config() -> CustodyConfig {
    let mut config = CustodyConfig::default();
    config.node.operator_address = operator().to_string();
    config.confirmations.address_creation = 1;
    config.confirmations.deposit = 1;
    config.confirmations.withdraw = 1;
    config.retries.max_attempts = 3;
    config.retries.base_delay_ms = 0;
    config.retries.max_delay_ms = 0;
    config.network.rescan_depth = 2;
    config
}

pub fn chain_settings() -> Arc<ChainSettings> {
    Arc::new(ChainSettings {
        operator: operator(),
        gas_price: None,
        deploy_gas_limit: 1_500_000,
        withdraw_gas_limit: 150_000,
        contracts: ContractRegistry::new(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40])),
    })
}

pub fn eth(amount: i64) -> Decimal {
    Decimal::from(amount)
}

pub fn wei(eth: u64) -> U256 {
    U256::from(eth) * U256::from(WEI_PER_ETH)
}

pub struct Fixture {
    pub store: Store,
    pub network: NetworkId,
    pub eth: AssetId,
}

/// A store with network "testnet" and its native asset.
pub fn fixture() -> Fixture {
    let store = Store::in_memory();
    let (network, eth) = store
        .atomic(|t| -> ServiceResult<_> {
            let network = t.get_or_create_network("testnet");
            let eth = t.get_or_create_asset(network, "ETH", "Ether", AssetFormat::Native { decimals: 18 })?;
            Ok((network, eth))
        })
        .unwrap();
    Fixture { store, network, eth }
}

impl Fixture {
    /// Register a hosted address and give it `balance` of the native asset.
    pub fn funded_address(&self, value: Address, balance: i64) -> (AddressId, AccountId) {
        self.store
            .atomic(|t| -> ServiceResult<_> {
                let address = t.get_or_create_address(self.network, value)?;
                let link = t.get_or_create_address_account(address, self.eth)?;
                let account = t.address_account_by_id(link)?.account_id;
                if balance > 0 {
                    t.deposit_or_withdraw(account, eth(balance), "seed", false)?;
                }
                Ok((address, account))
            })
            .unwrap()
    }

    pub fn balance(&self, account: AccountId) -> Decimal {
        self.store.read(|t| t.balance(account).unwrap())
    }

    /// Write a fresh heartbeat so the network counts as alive.
    pub fn mark_alive(&self) {
        let now = unix_now();
        self.store
            .atomic(|t| -> ServiceResult<()> {
                t.update_heartbeat(self.network, 1, now, now)?;
                Ok(())
            })
            .unwrap();
    }
}

/// A hosted wallet's `Deposit(from, value)` log.
pub fn deposit_log(wallet: Address, value: U256, txid: TxHash, log_index: u64, block: u64) -> RawLog {
    let data = abi::Deposit {
        from: Address::repeat_byte(0xee),
        value,
    }
    .encode_log_data();
    RawLog {
        address: wallet,
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        tx_hash: Some(txid),
        log_index: Some(log_index),
        block_number: Some(block),
    }
}

/// A token contract's `Transfer(from, to, value)` log.
pub fn transfer_log(token: Address, to: Address, value: U256, txid: TxHash, block: u64) -> RawLog {
    let data = abi::Transfer {
        from: Address::repeat_byte(0xee),
        to,
        value,
    }
    .encode_log_data();
    RawLog {
        address: token,
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        tx_hash: Some(txid),
        log_index: Some(0),
        block_number: Some(block),
    }
}
