//! The node RPC boundary consumed by the custody services.
//!
//! Amounts cross this boundary in the chain's smallest unit. Conversion to
//! decimal display units happens in [`units`](crate::blockchain::units).

use alloy::primitives::{Address, TxHash, U256};
use async_trait::async_trait;

use crate::blockchain::types::{
    BlockInfo, BlockchainResult, LogQuery, RawLog, SignedTx, TxInfo, TxParams, TxReceipt,
};

/// Node operations the services depend on.
///
/// [`BlockchainClient`](crate::blockchain::BlockchainClient) implements this
/// over JSON-RPC; tests substitute an in-memory chain.
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn get_block_number(&self) -> BlockchainResult<u64>;

    async fn get_block_by_number(&self, number: u64) -> BlockchainResult<Option<BlockInfo>>;

    async fn get_balance(&self, address: Address) -> BlockchainResult<U256>;

    /// Have the node sign `params` without broadcasting them.
    async fn sign_transaction(&self, params: TxParams) -> BlockchainResult<SignedTx>;

    /// Broadcast signed bytes. Sending bytes the node already holds is not
    /// an error; a refusal is [`BlockchainError::Rejected`](crate::blockchain::BlockchainError::Rejected).
    async fn send_raw_transaction(&self, tx: &SignedTx) -> BlockchainResult<TxHash>;

    /// `None` while the transaction is not mined.
    async fn get_transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<TxReceipt>>;

    async fn get_transaction_by_hash(&self, tx_hash: TxHash) -> BlockchainResult<Option<TxInfo>>;

    async fn get_logs(&self, query: &LogQuery) -> BlockchainResult<Vec<RawLog>>;
}
