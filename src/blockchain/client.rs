//! Blockchain RPC client with timeout and error handling.
//!
//! # Responsibilities
//! - Connect to the primary JSON-RPC endpoint and its failovers
//! - Query chain state (head, blocks, balances, receipts, logs)
//! - Bound every call by the configured timeout
//! - Have the primary endpoint sign transactions; broadcast the signed bytes

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::consensus::Transaction as _;
use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{Filter, TransactionRequest};
use alloy::transports::TransportError;
use async_trait::async_trait;
use tokio::time::timeout;

use crate::blockchain::rpc::NodeRpc;
use crate::blockchain::types::{
    BlockInfo, BlockchainError, BlockchainResult, ChainId, LogQuery, NodeConfig, RawLog, SignedTx, TxInfo,
    TxParams, TxReceipt,
};

type SharedProvider = Arc<dyn Provider + Send + Sync>;

/// Blockchain RPC client wrapper with failover support.
#[derive(Clone)]
pub struct BlockchainClient {
    /// List of providers (primary + failovers).
    providers: Vec<SharedProvider>,
    config: NodeConfig,
    timeout_duration: Duration,
}

impl BlockchainClient {
    /// Create a new blockchain client.
    ///
    /// A chain ID mismatch is logged, not fatal: the node may simply be
    /// down at startup, and liveness gating covers that case.
    pub async fn new(config: NodeConfig) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as SharedProvider);

        for url_str in &config.failover_urls {
            match url_str.parse::<url::Url>() {
                Ok(url) => providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as SharedProvider),
                Err(_) => tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL"),
            }
        }

        let client = Self {
            providers,
            config: config.clone(),
            timeout_duration,
        };

        match client.verify_chain_id().await {
            Ok(()) => tracing::info!(
                rpc_url = %config.rpc_url,
                chain_id = config.chain_id,
                failovers = client.providers.len() - 1,
                "Blockchain client initialized"
            ),
            Err(e) => tracing::warn!(
                error = %e,
                "Blockchain client initialized but chain verification failed"
            ),
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> BlockchainResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    pub async fn get_chain_id(&self) -> BlockchainResult<ChainId> {
        self.with_failover("get_chain_id", |p| async move { p.get_chain_id().await })
            .await
            .map(ChainId)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Run a read-only call against each provider in turn until one answers.
    async fn with_failover<T, E, F, Fut>(&self, method: &'static str, call: F) -> BlockchainResult<T>
    where
        F: Fn(SharedProvider) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, method, error = %e, "RPC error, trying next provider"),
                Err(_) => tracing::warn!(provider_idx = i, method, "RPC timeout, trying next provider"),
            }
        }
        Err(BlockchainError::Rpc(format!("All RPC providers failed: {}", method)))
    }

    fn primary(&self) -> BlockchainResult<&SharedProvider> {
        self.providers
            .first()
            .ok_or_else(|| BlockchainError::NotAvailable("no RPC provider configured".into()))
    }

    fn build_request(params: TxParams) -> TransactionRequest {
        let mut request = TransactionRequest::default()
            .with_from(params.from)
            .with_value(params.value)
            .with_gas_limit(params.gas_limit);
        request = match params.to {
            Some(to) => request.with_to(to).with_input(params.data),
            None => request.with_deploy_code(params.data),
        };
        if let Some(gas_price) = params.gas_price {
            request = request.with_gas_price(gas_price);
        }
        request
    }
}

#[async_trait]
impl NodeRpc for BlockchainClient {
    async fn get_block_number(&self) -> BlockchainResult<u64> {
        self.with_failover("eth_blockNumber", |p| async move { p.get_block_number().await })
            .await
    }

    async fn get_block_by_number(&self, number: u64) -> BlockchainResult<Option<BlockInfo>> {
        let block = self
            .with_failover("eth_getBlockByNumber", |p| async move {
                p.get_block_by_number(BlockNumberOrTag::Number(number)).await
            })
            .await?;
        Ok(block.map(|block| BlockInfo {
            number: block.header.number,
            timestamp: block.header.timestamp,
            hash: block.header.hash,
        }))
    }

    async fn get_balance(&self, address: Address) -> BlockchainResult<U256> {
        self.with_failover("eth_getBalance", |p| async move { p.get_balance(address).await })
            .await
    }

    async fn sign_transaction(&self, params: TxParams) -> BlockchainResult<SignedTx> {
        // The operator account is unlocked on the primary node only.
        let provider = self.primary()?;
        let request = Self::build_request(params);
        match timeout(self.timeout_duration, provider.sign_transaction(request)).await {
            Ok(Ok(raw)) => Ok(SignedTx::from_raw(raw)),
            Ok(Err(e)) => Err(classify_send_error("eth_signTransaction", e)),
            Err(_) => Err(BlockchainError::Timeout(self.config.rpc_timeout_secs)),
        }
    }

    async fn send_raw_transaction(&self, tx: &SignedTx) -> BlockchainResult<TxHash> {
        let provider = self.primary()?;
        match timeout(self.timeout_duration, provider.send_raw_transaction(&tx.raw)).await {
            Ok(Ok(pending)) => Ok(*pending.tx_hash()),
            Ok(Err(e)) if is_already_known(&e) => {
                tracing::debug!(tx_hash = %tx.hash, "Node already holds transaction");
                Ok(tx.hash)
            }
            Ok(Err(e)) => Err(classify_send_error("eth_sendRawTransaction", e)),
            Err(_) => Err(BlockchainError::Timeout(self.config.rpc_timeout_secs)),
        }
    }

    async fn get_transaction_receipt(&self, tx_hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
        let receipt = self
            .with_failover("eth_getTransactionReceipt", |p| async move {
                p.get_transaction_receipt(tx_hash).await
            })
            .await?;
        Ok(receipt.map(|receipt| TxReceipt {
            tx_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            gas_used: receipt.gas_used,
            status: receipt.status(),
            contract_address: receipt.contract_address,
        }))
    }

    async fn get_transaction_by_hash(&self, tx_hash: TxHash) -> BlockchainResult<Option<TxInfo>> {
        let tx = self
            .with_failover("eth_getTransactionByHash", |p| async move {
                p.get_transaction_by_hash(tx_hash).await
            })
            .await?;
        Ok(tx.map(|tx| TxInfo {
            hash: tx_hash,
            block_number: tx.block_number,
            gas_limit: tx.gas_limit(),
        }))
    }

    async fn get_logs(&self, query: &LogQuery) -> BlockchainResult<Vec<RawLog>> {
        let filter = Filter::new()
            .address(query.addresses.clone())
            .from_block(query.from_block)
            .to_block(query.to_block);
        let logs = self
            .with_failover("eth_getLogs", |p| {
                let filter = filter.clone();
                async move { p.get_logs(&filter).await }
            })
            .await?;
        Ok(logs
            .into_iter()
            .map(|log| RawLog {
                address: log.address(),
                topics: log.topics().to_vec(),
                data: log.data().data.clone(),
                tx_hash: log.transaction_hash,
                log_index: log.log_index,
                block_number: log.block_number,
            })
            .collect())
    }
}

/// An error response is the node refusing; anything else is transport.
fn classify_send_error(method: &str, e: TransportError) -> BlockchainError {
    match e.as_error_resp() {
        Some(payload) => BlockchainError::Rejected(format!("{}: {}", method, payload.message)),
        None => BlockchainError::Rpc(format!("{}: {}", method, e)),
    }
}

fn is_already_known(e: &TransportError) -> bool {
    e.as_error_resp().is_some_and(|payload| {
        let message = payload.message.to_lowercase();
        message.contains("already known") || message.contains("known transaction")
    })
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;

    fn test_config() -> NodeConfig {
        NodeConfig {
            rpc_url: "http://127.0.0.1:1".to_string(),
            rpc_timeout_secs: 1,
            ..NodeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_client_creation_tolerates_unreachable_node() {
        assert!(BlockchainClient::new(test_config()).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_primary_url_is_rejected() {
        let config = NodeConfig {
            rpc_url: "not a url".to_string(),
            ..test_config()
        };
        assert!(matches!(
            BlockchainClient::new(config).await,
            Err(BlockchainError::Rpc(_))
        ));
    }

    #[tokio::test]
    async fn test_rpc_failover_exhausts_all_providers() {
        let mut config = test_config();
        config.failover_urls.push("http://127.0.0.1:2".to_string());

        let client = BlockchainClient::new(config).await.unwrap();
        let err = client.get_block_number().await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("All RPC providers failed"));
    }

    fn error_response(message: &'static str) -> TransportError {
        TransportError::err_resp(alloy::rpc::json_rpc::ErrorPayload {
            code: -32000,
            message: message.into(),
            data: None,
        })
    }

    #[test]
    fn test_send_errors_are_classified() {
        let refused = classify_send_error("eth_sendRawTransaction", error_response("nonce too low"));
        assert!(matches!(refused, BlockchainError::Rejected(_)));
        assert!(!refused.is_transient());

        let dropped = classify_send_error("eth_sendRawTransaction", TransportError::local_usage_str("connection reset"));
        assert!(dropped.is_transient());

        assert!(is_already_known(&error_response("already known")));
        assert!(is_already_known(&error_response("Known transaction: 0xabc")));
        assert!(!is_already_known(&error_response("replacement transaction underpriced")));
    }

    #[test]
    fn test_deploy_request_has_no_recipient() {
        let request = BlockchainClient::build_request(TxParams {
            from: Address::repeat_byte(1),
            to: None,
            value: U256::ZERO,
            data: Bytes::from(vec![0x60, 0x80]),
            gas_limit: 100_000,
            gas_price: Some(1),
        });
        assert_eq!(request.to, Some(alloy::primitives::TxKind::Create));
        assert_eq!(request.gas, Some(100_000));
    }
}
