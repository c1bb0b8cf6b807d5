//! Assets catalogued per network.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::registry::error::{RegistryError, RegistryResult};
use crate::storage::ids::{AssetId, NetworkId};
use crate::storage::Tables;

/// How an asset exists on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetFormat {
    /// The chain's own currency; moves as transaction value.
    Native { decimals: u32 },
    /// A token contract; `external_id` holds its address.
    Token { decimals: u32 },
}

impl AssetFormat {
    /// Base-unit exponent used at the node boundary.
    pub fn decimals(&self) -> u32 {
        match self {
            AssetFormat::Native { decimals } | AssetFormat::Token { decimals } => *decimals,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, AssetFormat::Native { .. })
    }
}

/// An asset on one network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub network_id: NetworkId,
    pub name: String,
    pub symbol: String,
    /// Contract address once registered on chain.
    pub external_id: Option<Address>,
    pub format: AssetFormat,
}

impl Tables {
    /// Idempotent upsert keyed by `(network, symbol)`.
    ///
    /// An existing asset is returned unchanged; `name` and `format` only
    /// apply on creation.
    pub fn get_or_create_asset(
        &mut self,
        network_id: NetworkId,
        symbol: &str,
        name: &str,
        format: AssetFormat,
    ) -> RegistryResult<AssetId> {
        self.network(network_id)?;
        let key = (network_id, symbol.to_string());
        if let Some(id) = self.index.asset_by_symbol.get(&key) {
            return Ok(*id);
        }

        let id = AssetId::new();
        self.assets.insert(
            id,
            Asset {
                id,
                network_id,
                name: name.to_string(),
                symbol: symbol.to_string(),
                external_id: None,
                format,
            },
        );
        self.index.asset_by_symbol.insert(key, id);
        tracing::info!(%network_id, symbol, "Asset registered");
        Ok(id)
    }

    pub fn asset(&self, id: AssetId) -> RegistryResult<&Asset> {
        self.assets
            .get(&id)
            .ok_or_else(|| RegistryError::AssetNotFound(id.to_string()))
    }

    pub fn asset_by_symbol(&self, network_id: NetworkId, symbol: &str) -> Option<&Asset> {
        self.index
            .asset_by_symbol
            .get(&(network_id, symbol.to_string()))
            .and_then(|id| self.assets.get(id))
    }

    pub fn asset_by_external_id(&self, network_id: NetworkId, external_id: Address) -> Option<&Asset> {
        self.index
            .asset_by_external_id
            .get(&(network_id, external_id))
            .and_then(|id| self.assets.get(id))
    }

    /// The network's native asset, if one is registered.
    pub fn native_asset(&self, network_id: NetworkId) -> Option<&Asset> {
        self.assets
            .values()
            .find(|asset| asset.network_id == network_id && asset.format.is_native())
    }

    /// Token assets with a known contract address.
    pub fn registered_tokens(&self, network_id: NetworkId) -> impl Iterator<Item = &Asset> {
        self.assets.values().filter(move |asset| {
            asset.network_id == network_id
                && !asset.format.is_native()
                && asset.external_id.is_some()
        })
    }

    /// Record the on-chain contract address. Setting the same value twice is a no-op.
    pub fn set_external_id(&mut self, id: AssetId, external_id: Address) -> RegistryResult<()> {
        let asset = self
            .assets
            .get_mut(&id)
            .ok_or_else(|| RegistryError::AssetNotFound(id.to_string()))?;
        match asset.external_id {
            Some(existing) if existing == external_id => return Ok(()),
            Some(existing) => {
                return Err(RegistryError::ExternalIdAlreadySet { asset: id, existing })
            }
            None => {}
        }
        asset.external_id = Some(external_id);
        let network_id = asset.network_id;
        self.index
            .asset_by_external_id
            .insert((network_id, external_id), id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_asset_is_idempotent() {
        let mut tables = Tables::new();
        let network = tables.get_or_create_network("testnet");
        let eth = tables
            .get_or_create_asset(network, "ETH", "Ether", AssetFormat::Native { decimals: 18 })
            .unwrap();
        let again = tables
            .get_or_create_asset(network, "ETH", "Renamed", AssetFormat::Native { decimals: 18 })
            .unwrap();
        assert_eq!(eth, again);
        assert_eq!(tables.asset(eth).unwrap().name, "Ether");
        assert_eq!(tables.native_asset(network).unwrap().id, eth);
    }

    #[test]
    fn test_asset_requires_known_network() {
        let mut tables = Tables::new();
        let result = tables.get_or_create_asset(
            NetworkId::new(),
            "ETH",
            "Ether",
            AssetFormat::Native { decimals: 18 },
        );
        assert!(matches!(result, Err(RegistryError::NetworkNotFound(_))));
    }

    #[test]
    fn test_external_id_is_set_once() {
        let mut tables = Tables::new();
        let network = tables.get_or_create_network("testnet");
        let token = tables
            .get_or_create_asset(network, "TOY", "Toybox", AssetFormat::Token { decimals: 0 })
            .unwrap();
        let first = Address::repeat_byte(0x11);

        tables.set_external_id(token, first).unwrap();
        tables.set_external_id(token, first).unwrap();
        assert!(matches!(
            tables.set_external_id(token, Address::repeat_byte(0x22)),
            Err(RegistryError::ExternalIdAlreadySet { .. })
        ));
        assert_eq!(tables.asset_by_external_id(network, first).unwrap().id, token);
        assert_eq!(tables.registered_tokens(network).count(), 1);
    }
}
