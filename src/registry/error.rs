use alloy::primitives::Address;
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::storage::ids::{AddressId, AssetId, NetworkId};

/// Errors raised by the asset, network and address registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Network not found: {0}")]
    NetworkNotFound(String),

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Address not found: {0}")]
    AddressNotFound(String),

    /// An address holds at most one account per asset.
    #[error("Address {address} already has an account for asset {asset}")]
    MultipleAssetAccountsPerAddress { address: AddressId, asset: AssetId },

    /// `(network, address)` is unique.
    #[error("Address {address} is already registered on network {network}")]
    DuplicateAddress { network: NetworkId, address: Address },

    /// The on-chain value of an address is assigned exactly once.
    #[error("Address {0} already has an on-chain value")]
    AddressAlreadyAssigned(AddressId),

    /// `external_id` is set once, at on-chain registration.
    #[error("Asset {asset} already registered at {existing}")]
    ExternalIdAlreadySet { asset: AssetId, existing: Address },

    #[error("Asset {asset} belongs to network {asset_network}, not {network}")]
    NetworkMismatch {
        asset: AssetId,
        asset_network: NetworkId,
        network: NetworkId,
    },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
