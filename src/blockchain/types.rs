//! Chain-specific types and error definitions.

use alloy::primitives::{keccak256, Address, BlockHash, Bytes, TxHash, B256, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::schema::NodeConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Blockchain client not initialized or disabled.
    #[error("Blockchain not available: {0}")]
    NotAvailable(String),

    /// A log or return value did not match the expected ABI.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Amount cannot be represented in the target unit.
    #[error("Amount conversion error: {0}")]
    Conversion(String),

    /// Bytecode or contract configuration is missing or malformed.
    #[error("Contract error: {0}")]
    Contract(String),

    /// The node answered and refused the transaction (bad nonce, underpriced).
    #[error("Transaction rejected: {0}")]
    Rejected(String),
}

impl BlockchainError {
    /// Whether the same call may succeed if repeated later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BlockchainError::Rpc(_) | BlockchainError::Timeout(_) | BlockchainError::NotAvailable(_)
        )
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Header fields of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub number: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub hash: BlockHash,
}

/// A transaction to be signed by the node (`eth_signTransaction`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxParams {
    pub from: Address,
    /// `None` deploys `data` as contract creation code.
    pub to: Option<Address>,
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: u64,
    /// Wei; the node's estimate is used when unset.
    pub gas_price: Option<u128>,
}

/// A node-signed transaction, kept so a retry re-sends the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTx {
    pub hash: TxHash,
    pub raw: Bytes,
}

impl SignedTx {
    /// Wrap EIP-2718 encoded bytes; the hash is their keccak digest.
    pub fn from_raw(raw: Bytes) -> Self {
        Self {
            hash: keccak256(&raw),
            raw,
        }
    }
}

/// The parts of a mined receipt the custody core reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_used: u64,
    pub status: bool,
    pub contract_address: Option<Address>,
}

/// The parts of a transaction the custody core reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInfo {
    pub hash: TxHash,
    pub block_number: Option<u64>,
    pub gas_limit: u64,
}

/// An inclusive block range over a set of emitting contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub from_block: u64,
    pub to_block: u64,
    pub addresses: Vec<Address>,
}

/// An undecoded log as returned by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub tx_hash: Option<TxHash>,
    pub log_index: Option<u64>,
    pub block_number: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_conversion() {
        let chain_id = ChainId::from(1u64);
        assert_eq!(chain_id.0, 1);
        assert_eq!(u64::from(chain_id), 1);
    }

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.rpc_timeout_secs, 10);
        assert!(config.gas_price_gwei.is_none());
    }

    #[test]
    fn test_transient_classification() {
        assert!(BlockchainError::Timeout(10).is_transient());
        assert!(BlockchainError::Rpc("connection refused".into()).is_transient());
        assert!(!BlockchainError::Conversion("sub-unit amount".into()).is_transient());
        assert!(!BlockchainError::Decode("bad topic".into()).is_transient());
        assert!(!BlockchainError::Rejected("nonce too low".into()).is_transient());
    }

    #[test]
    fn test_signed_tx_hash_is_digest_of_raw_bytes() {
        let raw = Bytes::from(vec![0x02, 0xf8, 0x6b, 0x01]);
        let signed = SignedTx::from_raw(raw.clone());
        assert_eq!(signed.hash, keccak256(&raw));
        assert_eq!(SignedTx::from_raw(raw), signed);
    }

    #[test]
    fn test_error_display() {
        let err = BlockchainError::Timeout(10);
        assert_eq!(err.to_string(), "RPC timeout after 10 seconds");

        let err = BlockchainError::ChainMismatch {
            expected: 1,
            actual: 5,
        };
        assert!(err.to_string().contains("expected 1"));
    }
}
