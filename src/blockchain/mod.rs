//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! NodeConfig (RPC URLs, timeout, chain id)
//!     → client.rs (alloy providers, per-call timeout, failover)
//!     → rpc.rs (NodeRpc trait consumed by the services)
//!
//! ContractsConfig
//!     → contracts.rs (bytecode, sol! ABI, log decoding)
//!
//! base units ⇄ display amounts
//!     → units.rs (only at the RPC boundary)
//! ```
//!
//! # Constraints
//! - All RPC calls have configurable timeouts
//! - Transactions are signed by the node; no keys live in this process
//! - Signing and broadcasting are separate calls, so a retry re-sends
//!   the same signed bytes
//! - Graceful degradation when the node is unreachable

pub mod client;
pub mod contracts;
pub mod rpc;
pub mod types;
pub mod units;

pub use client::BlockchainClient;
pub use contracts::{decode_event, withdraw_calldata, ChainEvent, ContractRegistry};
pub use rpc::NodeRpc;
pub use types::{
    BlockInfo, BlockchainError, BlockchainResult, ChainId, LogQuery, NodeConfig, RawLog, SignedTx, TxInfo, TxParams,
    TxReceipt,
};
pub use units::{from_base_units, to_base_units};
