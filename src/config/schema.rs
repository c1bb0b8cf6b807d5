//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! custody daemon and CLI. All types derive Serde traits for
//! deserialization from TOML files.

use serde::{Deserialize, Serialize};

use crate::operations::OperationType;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CustodyConfig {
    /// Node RPC connection and gas settings.
    pub node: NodeConfig,

    /// The network this process serves.
    pub network: NetworkConfig,

    /// Required confirmation depth per operation type.
    pub confirmations: ConfirmationConfig,

    /// Dispatch retry budget.
    pub retries: RetryConfig,

    /// Liveness thresholds.
    pub heartbeat: HeartbeatConfig,

    pub storage: StorageConfig,

    pub contracts: ContractsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Node RPC configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodeConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Expected chain ID.
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Node-unlocked account that sends and pays for transactions.
    pub operator_address: String,

    /// Fixed gas price in gwei; the node's estimate is used when unset.
    pub gas_price_gwei: Option<u64>,

    /// Gas limit for hosted-wallet deployments.
    pub deploy_gas_limit: u64,

    /// Gas limit for withdraw calls.
    pub withdraw_gas_limit: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 31337,
            rpc_timeout_secs: 10,
            operator_address: String::new(),
            gas_price_gwei: None,
            deploy_gas_limit: 1_500_000,
            withdraw_gas_limit: 150_000,
        }
    }
}

/// Network served by this process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Registry name of the network.
    pub name: String,

    /// Delay between service cycles.
    pub poll_interval_ms: u64,

    /// Maximum number of blocks per `get_logs` request.
    pub log_block_window: u64,

    /// Blocks re-scanned behind the bookmark on every poll.
    pub rescan_depth: u64,

    /// Allow bookkeeping-only deposits (private test networks).
    pub allow_faux_deposits: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            name: "testnet".to_string(),
            poll_interval_ms: 1000,
            log_block_window: 1000,
            rescan_depth: 12,
            allow_faux_deposits: false,
        }
    }
}

/// Required confirmations per operation type.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub address_creation: u64,
    pub deposit: u64,
    pub withdraw: u64,
}

impl ConfirmationConfig {
    pub fn required_for(&self, operation_type: OperationType) -> u64 {
        match operation_type {
            OperationType::AddressCreation => self.address_creation,
            OperationType::Deposit => self.deposit,
            OperationType::Withdraw => self.withdraw,
        }
    }
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            address_creation: 1,
            deposit: 3,
            withdraw: 1,
        }
    }
}

/// Retry configuration for operation dispatch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts before an operation is force-failed.
    pub max_attempts: u32,

    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,

    /// Maximum delay between attempts.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
        }
    }
}

/// Liveness thresholds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Maximum age of our own last heartbeat write.
    pub timeout_secs: u64,

    /// Maximum age of the chain head's block timestamp.
    pub block_timeout_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            block_timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// sled database directory. State is kept in memory only when unset.
    /// The daemon holds an exclusive lock on it while running.
    pub state_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ContractsConfig {
    /// Hosted wallet creation bytecode: hex, or `@path` to a hex file.
    pub hosted_wallet_bytecode: String,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin status API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: CustodyConfig = toml::from_str(
            r#"
            [network]
            name = "devnet"
            "#,
        )
        .unwrap();

        assert_eq!(config.network.name, "devnet");
        assert_eq!(config.network.poll_interval_ms, 1000);
        assert_eq!(config.node.rpc_timeout_secs, 10);
        assert_eq!(config.retries.max_attempts, 5);
        assert!(config.storage.state_path.is_none());
        assert!(!config.admin.enabled);
    }

    #[test]
    fn test_required_confirmations_by_type() {
        let config = ConfirmationConfig {
            address_creation: 2,
            deposit: 6,
            withdraw: 1,
        };
        assert_eq!(config.required_for(OperationType::AddressCreation), 2);
        assert_eq!(config.required_for(OperationType::Deposit), 6);
        assert_eq!(config.required_for(OperationType::Withdraw), 1);
    }
}
