//! Per-type actions that move a waiting operation onto the chain.
//!
//! A performer reads what it needs, talks to the node, then records the
//! result in its own atomic unit. Its error leaves the operation waiting;
//! the queue decides whether it gets another attempt.
//!
//! # Broadcast
//! ```text
//! signed tx stored? ── no ──▶ eth_signTransaction → store signed tx
//!        │ yes                        │
//!        ▼                            ▼
//! node knows hash? ── yes ──▶ mark_broadcasted
//!        │ no
//!        ▼
//! eth_sendRawTransaction(same bytes) → mark_broadcasted
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;

use crate::blockchain::{to_base_units, withdraw_calldata, ContractRegistry, NodeRpc, TxParams};
use crate::config::CustodyConfig;
use crate::operations::{OperationError, OperationKind, OperationResult, OperationType};
use crate::registry::RegistryError;
use crate::services::error::{ServiceError, ServiceResult};
use crate::storage::ids::OperationId;
use crate::storage::Store;

const GWEI: u128 = 1_000_000_000;

/// Who sends transactions and how they are priced.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    /// Node-unlocked account that signs and pays for every transaction.
    pub operator: Address,
    /// Wei; `None` lets the node price the transaction.
    pub gas_price: Option<u128>,
    pub deploy_gas_limit: u64,
    pub withdraw_gas_limit: u64,
    pub contracts: ContractRegistry,
}

impl ChainSettings {
    pub fn from_config(config: &CustodyConfig, contracts: ContractRegistry) -> ServiceResult<Self> {
        let operator: Address = config.node.operator_address.parse().map_err(|e| {
            ServiceError::Setup(format!(
                "node.operator_address '{}' is not an address: {}",
                config.node.operator_address, e
            ))
        })?;
        Ok(Self {
            operator,
            gas_price: config.node.gas_price_gwei.map(|gwei| gwei as u128 * GWEI),
            deploy_gas_limit: config.node.deploy_gas_limit,
            withdraw_gas_limit: config.node.withdraw_gas_limit,
            contracts,
        })
    }
}

/// Send `params` for `id` at most once.
///
/// The signed bytes are committed before they reach the node. A retry
/// after a lost response finds them, asks the node whether it already has
/// the transaction and re-sends the identical bytes only if it does not.
async fn broadcast_once(
    node: &dyn NodeRpc,
    store: &Store,
    id: OperationId,
    params: TxParams,
) -> OperationResult<TxHash> {
    let stored = store.read(|t| -> OperationResult<_> { Ok(t.operation(id)?.header.signed_tx.clone()) })?;

    let signed = match stored {
        Some(signed) => {
            if node.get_transaction_by_hash(signed.hash).await?.is_some() {
                tracing::info!(operation_id = %id, txid = %signed.hash, "Node already has transaction, not resending");
                store.atomic(|t| t.mark_broadcasted(id, signed.hash))?;
                return Ok(signed.hash);
            }
            tracing::debug!(operation_id = %id, txid = %signed.hash, "Resending stored transaction");
            signed
        }
        None => {
            let signed = node.sign_transaction(params).await?;
            store.atomic(|t| t.record_signed_transaction(id, signed.clone()))?;
            signed
        }
    };

    let txid = node.send_raw_transaction(&signed).await?;
    if txid != signed.hash {
        tracing::warn!(operation_id = %id, expected = %signed.hash, %txid, "Node reported a different transaction hash");
    }
    store.atomic(|t| t.mark_broadcasted(id, signed.hash))?;
    Ok(signed.hash)
}

/// Performs one kind of waiting operation.
#[async_trait]
pub trait Performer: Send + Sync {
    async fn perform(&self, node: &dyn NodeRpc, store: &Store, id: OperationId) -> OperationResult<()>;
}

/// Deploys a hosted wallet for a pending address.
pub struct AddressCreationPerformer {
    chain: Arc<ChainSettings>,
}

impl AddressCreationPerformer {
    pub fn new(chain: Arc<ChainSettings>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Performer for AddressCreationPerformer {
    async fn perform(&self, node: &dyn NodeRpc, store: &Store, id: OperationId) -> OperationResult<()> {
        let address_id = store.read(|t| -> OperationResult<_> {
            match &t.operation(id)?.kind {
                OperationKind::AddressCreation(creation) => Ok(creation.address_id),
                other => Err(OperationError::MissingPerformer(other.operation_type())),
            }
        })?;

        let params = TxParams {
            from: self.chain.operator,
            to: None,
            value: U256::ZERO,
            data: self.chain.contracts.hosted_wallet_bytecode()?,
            gas_limit: self.chain.deploy_gas_limit,
            gas_price: self.chain.gas_price,
        };
        let txid = broadcast_once(node, store, id, params).await?;
        tracing::info!(operation_id = %id, %address_id, %txid, "Hosted wallet deployment sent");
        Ok(())
    }
}

/// Sends a withdraw from a hosted wallet.
pub struct WithdrawPerformer {
    chain: Arc<ChainSettings>,
}

impl WithdrawPerformer {
    pub fn new(chain: Arc<ChainSettings>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Performer for WithdrawPerformer {
    async fn perform(&self, node: &dyn NodeRpc, store: &Store, id: OperationId) -> OperationResult<()> {
        let (wallet, token, to, value) = store.read(|t| -> OperationResult<_> {
            let withdraw = match &t.operation(id)?.kind {
                OperationKind::Withdraw(withdraw) => withdraw.clone(),
                other => return Err(OperationError::MissingPerformer(other.operation_type())),
            };
            let wallet = t.crypto_address(withdraw.address_id)?.address.ok_or_else(|| OperationError::NotReady {
                id,
                reason: format!("address {} has no on-chain value yet", withdraw.address_id),
            })?;
            let asset = t.asset(withdraw.asset_id)?;
            let token = if asset.format.is_native() {
                None
            } else {
                Some(asset.external_id.ok_or_else(|| {
                    RegistryError::AssetNotFound(format!("token {} has no contract address", asset.symbol))
                })?)
            };
            let value = to_base_units(withdraw.amount, asset.format.decimals())?;
            Ok((wallet, token, withdraw.to, value))
        })?;

        let params = TxParams {
            from: self.chain.operator,
            to: Some(wallet),
            value: U256::ZERO,
            data: withdraw_calldata(token, to, value),
            gas_limit: self.chain.withdraw_gas_limit,
            gas_price: self.chain.gas_price,
        };
        let txid = broadcast_once(node, store, id, params).await?;
        tracing::info!(operation_id = %id, %wallet, %to, %txid, "Withdraw sent");
        Ok(())
    }
}

/// Performers indexed by the operation type they handle.
#[derive(Clone, Default)]
pub struct PerformerTable {
    performers: HashMap<OperationType, Arc<dyn Performer>>,
}

impl PerformerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Address creation and withdraw; deposits are never dispatched.
    pub fn standard(chain: Arc<ChainSettings>) -> Self {
        let mut table = Self::new();
        table.register(OperationType::AddressCreation, Arc::new(AddressCreationPerformer::new(chain.clone())));
        table.register(OperationType::Withdraw, Arc::new(WithdrawPerformer::new(chain)));
        table
    }

    pub fn register(&mut self, operation_type: OperationType, performer: Arc<dyn Performer>) {
        self.performers.insert(operation_type, performer);
    }

    pub fn get(&self, operation_type: OperationType) -> Option<&Arc<dyn Performer>> {
        self.performers.get(&operation_type)
    }
}
