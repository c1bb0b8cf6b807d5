//! Node-hosted addresses and their per-asset accounts.

use alloy::primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::AccountOwner;
use crate::registry::error::{RegistryError, RegistryResult};
use crate::storage::ids::{AccountId, AddressAccountId, AddressId, AssetId, NetworkId};
use crate::storage::Tables;

/// An address hosted by the node.
///
/// `address` stays empty while its creation operation is in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoAddress {
    pub id: AddressId,
    pub network_id: NetworkId,
    pub address: Option<Address>,
    pub created_at: DateTime<Utc>,
}

/// The balance of one address in one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoAddressAccount {
    pub id: AddressAccountId,
    pub address_id: AddressId,
    pub asset_id: AssetId,
    pub account_id: AccountId,
}

impl Tables {
    /// Reserve an address record whose on-chain value is not known yet.
    pub fn create_pending_address(&mut self, network_id: NetworkId) -> RegistryResult<AddressId> {
        self.network(network_id)?;
        let id = AddressId::new();
        self.addresses.insert(
            id,
            CryptoAddress {
                id,
                network_id,
                address: None,
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    /// Register an address that already exists on chain.
    pub fn register_address(&mut self, network_id: NetworkId, address: Address) -> RegistryResult<AddressId> {
        let id = self.create_pending_address(network_id)?;
        self.assign_address(id, address)?;
        Ok(id)
    }

    /// Look up an address by value, registering it if unknown.
    pub fn get_or_create_address(&mut self, network_id: NetworkId, address: Address) -> RegistryResult<AddressId> {
        match self.address_by_value(network_id, address) {
            Some(existing) => Ok(existing.id),
            None => self.register_address(network_id, address),
        }
    }

    /// Fill in the on-chain value of a pending address.
    pub fn assign_address(&mut self, id: AddressId, address: Address) -> RegistryResult<()> {
        let record = self.crypto_address(id)?;
        let network_id = record.network_id;
        if record.address.is_some() {
            return Err(RegistryError::AddressAlreadyAssigned(id));
        }
        if self.index.address_by_value.contains_key(&(network_id, address)) {
            return Err(RegistryError::DuplicateAddress {
                network: network_id,
                address,
            });
        }

        if let Some(record) = self.addresses.get_mut(&id) {
            record.address = Some(address);
        }
        self.index.address_by_value.insert((network_id, address), id);
        tracing::info!(%id, %address, "Address assigned");
        Ok(())
    }

    pub fn crypto_address(&self, id: AddressId) -> RegistryResult<&CryptoAddress> {
        self.addresses
            .get(&id)
            .ok_or_else(|| RegistryError::AddressNotFound(id.to_string()))
    }

    pub fn address_by_value(&self, network_id: NetworkId, address: Address) -> Option<&CryptoAddress> {
        self.index
            .address_by_value
            .get(&(network_id, address))
            .and_then(|id| self.addresses.get(id))
    }

    /// Addresses on a network that have an on-chain value.
    pub fn assigned_addresses(&self, network_id: NetworkId) -> Vec<Address> {
        self.addresses
            .values()
            .filter(|record| record.network_id == network_id)
            .filter_map(|record| record.address)
            .collect()
    }

    /// Open the account holding `address`'s balance in `asset`.
    ///
    /// Fails with [`RegistryError::MultipleAssetAccountsPerAddress`] if one exists.
    pub fn create_address_account(
        &mut self,
        address_id: AddressId,
        asset_id: AssetId,
    ) -> RegistryResult<AddressAccountId> {
        let network_id = self.crypto_address(address_id)?.network_id;
        let asset_network = self.asset(asset_id)?.network_id;
        if asset_network != network_id {
            return Err(RegistryError::NetworkMismatch {
                asset: asset_id,
                asset_network,
                network: network_id,
            });
        }
        if self
            .index
            .address_account_by_pair
            .contains_key(&(address_id, asset_id))
        {
            return Err(RegistryError::MultipleAssetAccountsPerAddress {
                address: address_id,
                asset: asset_id,
            });
        }

        let account_id = self.create_account(asset_id, AccountOwner::Address(address_id))?;
        let id = AddressAccountId::new();
        self.address_accounts.insert(
            id,
            CryptoAddressAccount {
                id,
                address_id,
                asset_id,
                account_id,
            },
        );
        self.index
            .address_account_by_pair
            .insert((address_id, asset_id), id);
        Ok(id)
    }

    pub fn get_or_create_address_account(
        &mut self,
        address_id: AddressId,
        asset_id: AssetId,
    ) -> RegistryResult<AddressAccountId> {
        match self.index.address_account_by_pair.get(&(address_id, asset_id)) {
            Some(id) => Ok(*id),
            None => self.create_address_account(address_id, asset_id),
        }
    }

    pub fn address_account(&self, address_id: AddressId, asset_id: AssetId) -> Option<&CryptoAddressAccount> {
        self.index
            .address_account_by_pair
            .get(&(address_id, asset_id))
            .and_then(|id| self.address_accounts.get(id))
    }

    pub fn address_account_by_id(&self, id: AddressAccountId) -> RegistryResult<&CryptoAddressAccount> {
        self.address_accounts
            .get(&id)
            .ok_or_else(|| RegistryError::AddressNotFound(format!("address account {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AssetFormat;

    fn setup() -> (Tables, NetworkId, AssetId) {
        let mut tables = Tables::new();
        let network = tables.get_or_create_network("testnet");
        let asset = tables
            .get_or_create_asset(network, "ETH", "Ether", AssetFormat::Native { decimals: 18 })
            .unwrap();
        (tables, network, asset)
    }

    #[test]
    fn test_address_unique_per_network() {
        let (mut tables, network, _) = setup();
        let value = Address::repeat_byte(0xaa);
        let id = tables.register_address(network, value).unwrap();

        assert!(matches!(
            tables.register_address(network, value),
            Err(RegistryError::DuplicateAddress { .. })
        ));
        assert_eq!(tables.get_or_create_address(network, value).unwrap(), id);

        let other_network = tables.get_or_create_network("other");
        assert!(tables.register_address(other_network, value).is_ok());
    }

    #[test]
    fn test_pending_address_assigned_once() {
        let (mut tables, network, _) = setup();
        let id = tables.create_pending_address(network).unwrap();
        assert!(tables.assigned_addresses(network).is_empty());

        tables.assign_address(id, Address::repeat_byte(1)).unwrap();
        assert!(matches!(
            tables.assign_address(id, Address::repeat_byte(2)),
            Err(RegistryError::AddressAlreadyAssigned(_))
        ));
        assert_eq!(tables.assigned_addresses(network), vec![Address::repeat_byte(1)]);
    }

    #[test]
    fn test_second_asset_account_is_rejected() {
        let (mut tables, network, asset) = setup();
        let address = tables.register_address(network, Address::repeat_byte(3)).unwrap();

        let first = tables.create_address_account(address, asset).unwrap();
        let err = tables.create_address_account(address, asset).unwrap_err();
        assert!(matches!(err, RegistryError::MultipleAssetAccountsPerAddress { .. }));
        assert_eq!(tables.get_or_create_address_account(address, asset).unwrap(), first);
    }

    #[test]
    fn test_asset_account_network_must_match() {
        let (mut tables, _, asset) = setup();
        let other = tables.get_or_create_network("other");
        let address = tables.register_address(other, Address::repeat_byte(4)).unwrap();
        assert!(matches!(
            tables.create_address_account(address, asset),
            Err(RegistryError::NetworkMismatch { .. })
        ));
    }
}
