//! Blockchain networks and their metadata bag.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::registry::error::{RegistryError, RegistryResult};
use crate::storage::ids::{AddressId, AssetId, NetworkId};
use crate::storage::Tables;

/// A blockchain (mainnet, testnet or private chain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetNetwork {
    pub id: NetworkId,
    pub name: String,
    #[serde(default)]
    pub metadata: NetworkMetadata,
}

/// Per-network key/value settings.
///
/// Every key is optional; a missing key means the feature it drives is off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkMetadata {
    /// Operator-controlled address that funds give-aways.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub house_address: Option<AddressId>,

    /// Starter assets handed to every newly created address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_assets: Option<InitialAssets>,

    /// Last liveness snapshot written by the poller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heartbeat: Option<Heartbeat>,

    /// Last block fully scanned by the event listener.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_bookmark: Option<u64>,

    /// Unstructured operator notes.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Starter-asset give-away configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialAssets {
    /// Native asset amount in display units (serialized as a string).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_amount: Option<Decimal>,

    /// Token asset handed out alongside the native asset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toybox: Option<AssetId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub toybox_amount: Option<u64>,
}

/// Liveness snapshot: when we last heard from the node and what it reported.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    /// Wall-clock time of the write, seconds since the epoch.
    pub timestamp: f64,
    /// Chain head at the time of the write.
    pub block_number: u64,
    /// Timestamp of the chain head block, seconds since the epoch.
    pub block_timestamp: f64,
}

impl Tables {
    /// Idempotent upsert keyed by name.
    pub fn get_or_create_network(&mut self, name: &str) -> NetworkId {
        if let Some(id) = self.index.network_by_name.get(name) {
            return *id;
        }
        let id = NetworkId::new();
        self.networks.insert(
            id,
            AssetNetwork {
                id,
                name: name.to_string(),
                metadata: NetworkMetadata::default(),
            },
        );
        self.index.network_by_name.insert(name.to_string(), id);
        tracing::info!(network = name, %id, "Network registered");
        id
    }

    pub fn network(&self, id: NetworkId) -> RegistryResult<&AssetNetwork> {
        self.networks
            .get(&id)
            .ok_or_else(|| RegistryError::NetworkNotFound(id.to_string()))
    }

    pub fn network_by_name(&self, name: &str) -> Option<&AssetNetwork> {
        self.index
            .network_by_name
            .get(name)
            .and_then(|id| self.networks.get(id))
    }

    /// Mutable access to a network's metadata bag.
    pub fn network_metadata_mut(&mut self, id: NetworkId) -> RegistryResult<&mut NetworkMetadata> {
        self.networks
            .get_mut(&id)
            .map(|network| &mut network.metadata)
            .ok_or_else(|| RegistryError::NetworkNotFound(id.to_string()))
    }

    pub fn networks(&self) -> impl Iterator<Item = &AssetNetwork> {
        self.networks.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_network_is_idempotent() {
        let mut tables = Tables::new();
        let a = tables.get_or_create_network("goerli");
        let b = tables.get_or_create_network("goerli");
        let c = tables.get_or_create_network("mainnet");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(tables.networks().count(), 2);
        assert_eq!(tables.network_by_name("goerli").unwrap().id, a);
    }

    #[test]
    fn test_metadata_tolerates_missing_keys() {
        let metadata: NetworkMetadata = serde_json::from_str("{}").unwrap();
        assert!(metadata.house_address.is_none());
        assert!(metadata.initial_assets.is_none());
        assert!(metadata.heartbeat.is_none());

        let initial: InitialAssets = serde_json::from_str(r#"{"eth_amount": "0.5"}"#).unwrap();
        assert_eq!(initial.eth_amount, Some(Decimal::new(5, 1)));
        assert!(initial.toybox.is_none());
    }

    #[test]
    fn test_metadata_roundtrip_keeps_decimal_as_string() {
        let metadata = NetworkMetadata {
            initial_assets: Some(InitialAssets {
                eth_amount: Some(Decimal::new(25, 2)),
                toybox: None,
                toybox_amount: Some(10),
            }),
            ..Default::default()
        };
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["initial_assets"]["eth_amount"], "0.25");
    }
}
