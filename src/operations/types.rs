//! Crypto operation records.

use alloy::primitives::{Address, TxHash};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::blockchain::SignedTx;
use crate::storage::ids::{AccountId, AddressAccountId, AddressId, AssetId, NetworkId, OperationId};

/// Position of an operation in its state machine.
///
/// ```text
/// waiting ──dispatch──▶ broadcasted ──confirmations──▶ success
///    │                       │
///    └──cancel / retries─────┴──reverted / out of gas──▶ failed
///
/// immediate: bookkeeping-only operations, terminal on creation
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    Waiting,
    Broadcasted,
    Success,
    Failed,
    Immediate,
}

impl OperationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationState::Success | OperationState::Failed | OperationState::Immediate
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::Waiting => "waiting",
            OperationState::Broadcasted => "broadcasted",
            OperationState::Success => "success",
            OperationState::Failed => "failed",
            OperationState::Immediate => "immediate",
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of [`OperationKind`]; keys the performer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    AddressCreation,
    Deposit,
    Withdraw,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::AddressCreation => "address_creation",
            OperationType::Deposit => "deposit",
            OperationType::Withdraw => "withdraw",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields shared by every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationHeader {
    pub id: OperationId,
    /// Global creation order; the queue dispatches by it.
    pub sequence: u64,
    pub network_id: NetworkId,
    pub state: OperationState,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub attempts: u32,
    /// Earliest time the queue may dispatch again after a failed attempt.
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failure_reason: Option<String>,
    pub txid: Option<TxHash>,
    /// Signed bytes of the pending broadcast; retries re-send these.
    #[serde(default)]
    pub signed_tx: Option<SignedTx>,
    /// Block that included `txid`, once seen.
    pub block_number: Option<u64>,
    pub confirmations: u64,
    pub required_confirmations: u64,
    pub crypto_account_id: Option<AddressAccountId>,
    pub holding_account_id: Option<AccountId>,
}

impl OperationHeader {
    pub(crate) fn new(id: OperationId, sequence: u64, network_id: NetworkId, required_confirmations: u64) -> Self {
        Self {
            id,
            sequence,
            network_id,
            state: OperationState::Waiting,
            created_at: Utc::now(),
            attempted_at: None,
            attempts: 0,
            next_attempt_at: None,
            completed_at: None,
            failure_reason: None,
            txid: None,
            signed_tx: None,
            block_number: None,
            confirmations: 0,
            required_confirmations,
            crypto_account_id: None,
            holding_account_id: None,
        }
    }
}

/// Ask the node for a new hosted-wallet address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressCreation {
    pub address_id: AddressId,
}

/// Value seen arriving on chain, parked until confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    pub address_id: AddressId,
    pub asset_id: AssetId,
    pub amount: Decimal,
    pub from: Option<Address>,
    /// Chain event this deposit was ingested from; `None` for faux deposits.
    pub event: Option<EventKey>,
}

/// Value leaving an address for an external destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Withdraw {
    pub address_id: AddressId,
    pub asset_id: AssetId,
    pub amount: Decimal,
    pub to: Address,
    /// Account the funds were locked from; reversals go back here.
    pub source_account_id: AccountId,
    pub note: String,
}

/// Per-type payload, stored in one table tagged by `operation_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "operation_type", rename_all = "snake_case")]
pub enum OperationKind {
    AddressCreation(AddressCreation),
    Deposit(Deposit),
    Withdraw(Withdraw),
}

impl OperationKind {
    pub fn operation_type(&self) -> OperationType {
        match self {
            OperationKind::AddressCreation(_) => OperationType::AddressCreation,
            OperationKind::Deposit(_) => OperationType::Deposit,
            OperationKind::Withdraw(_) => OperationType::Withdraw,
        }
    }

    /// Whether `txid` is a transaction this system broadcast, and therefore
    /// unique per network. Deposits share txids when one transaction emits
    /// several events; they are keyed by [`EventKey`] instead.
    pub fn owns_txid(&self) -> bool {
        !matches!(self, OperationKind::Deposit(_))
    }
}

/// A durable record of one action that touches the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoOperation {
    pub header: OperationHeader,
    pub kind: OperationKind,
}

impl CryptoOperation {
    pub fn id(&self) -> OperationId {
        self.header.id
    }

    pub fn state(&self) -> OperationState {
        self.header.state
    }

    pub fn operation_type(&self) -> OperationType {
        self.kind.operation_type()
    }
}

/// Identity of one chain log: `(txid, log_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub txid: TxHash,
    pub log_index: u64,
}

/// "Operation X completed", recorded in the same atomic unit as the
/// success transition and delivered to consumers after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub sequence: u64,
    pub operation_id: OperationId,
    pub operation_type: OperationType,
    pub network_id: NetworkId,
}
