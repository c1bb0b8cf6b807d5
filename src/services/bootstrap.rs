//! Network seeding for a fresh state file.
//!
//! Every step is an upsert, so running the same plan twice leaves the
//! tables as they were after the first run.

use alloy::primitives::Address;
use rust_decimal::Decimal;

use crate::registry::{AssetFormat, InitialAssets};
use crate::services::error::{ServiceError, ServiceResult};
use crate::storage::ids::{AddressId, AssetId, NetworkId};
use crate::storage::Tables;

pub const NATIVE_SYMBOL: &str = "ETH";
pub const NATIVE_DECIMALS: u32 = 18;

/// A token asset to register.
#[derive(Debug, Clone)]
pub struct TokenPlan {
    pub symbol: String,
    pub name: String,
    pub contract: Address,
    pub decimals: u32,
}

/// What to seed.
#[derive(Debug, Clone, Default)]
pub struct BootstrapPlan {
    pub network_name: String,
    /// Existing hosted wallet that funds starter assets.
    pub house_address: Option<Address>,
    /// Starter token; also the `toybox` of the starter-asset config.
    pub toybox: Option<TokenPlan>,
    pub starter_eth: Option<Decimal>,
    pub starter_toybox: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct BootstrapReport {
    pub network_id: NetworkId,
    pub native_asset_id: AssetId,
    pub toybox_asset_id: Option<AssetId>,
    pub house_address_id: Option<AddressId>,
}

impl Tables {
    /// Seed the network, its assets, the house address and the starter-asset config.
    pub fn bootstrap_network(&mut self, plan: &BootstrapPlan) -> ServiceResult<BootstrapReport> {
        if plan.network_name.trim().is_empty() {
            return Err(ServiceError::Setup("network name must not be empty".into()));
        }
        let network_id = self.get_or_create_network(&plan.network_name);
        let native_asset_id = self.get_or_create_asset(
            network_id,
            NATIVE_SYMBOL,
            "Ether",
            AssetFormat::Native {
                decimals: NATIVE_DECIMALS,
            },
        )?;

        let toybox_asset_id = match &plan.toybox {
            Some(token) => {
                let id = self.get_or_create_asset(
                    network_id,
                    &token.symbol,
                    &token.name,
                    AssetFormat::Token {
                        decimals: token.decimals,
                    },
                )?;
                self.set_external_id(id, token.contract)?;
                Some(id)
            }
            None => None,
        };

        let house_address_id = match plan.house_address {
            Some(address) => {
                let id = self.get_or_create_address(network_id, address)?;
                self.get_or_create_address_account(id, native_asset_id)?;
                if let Some(toybox) = toybox_asset_id {
                    self.get_or_create_address_account(id, toybox)?;
                }
                Some(id)
            }
            None => None,
        };

        let wants_starter = plan.starter_eth.is_some() || plan.starter_toybox.is_some();
        if wants_starter && house_address_id.is_none() {
            return Err(ServiceError::Setup("starter assets need a house address".into()));
        }
        if plan.starter_toybox.is_some() && toybox_asset_id.is_none() {
            return Err(ServiceError::Setup("starter toybox amount given without a toybox token".into()));
        }

        let metadata = self.network_metadata_mut(network_id)?;
        if house_address_id.is_some() {
            metadata.house_address = house_address_id;
        }
        if wants_starter {
            metadata.initial_assets = Some(InitialAssets {
                eth_amount: plan.starter_eth,
                toybox: toybox_asset_id.filter(|_| plan.starter_toybox.is_some()),
                toybox_amount: plan.starter_toybox,
            });
        }

        tracing::info!(
            network = %plan.network_name,
            %network_id,
            house = ?plan.house_address,
            starter_assets = wants_starter,
            "Network bootstrapped"
        );
        Ok(BootstrapReport {
            network_id,
            native_asset_id,
            toybox_asset_id,
            house_address_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> BootstrapPlan {
        BootstrapPlan {
            network_name: "testnet".into(),
            house_address: Some(Address::repeat_byte(0x01)),
            toybox: Some(TokenPlan {
                symbol: "TOY".into(),
                name: "Toybox".into(),
                contract: Address::repeat_byte(0x70),
                decimals: 0,
            }),
            starter_eth: Some(Decimal::new(1, 1)),
            starter_toybox: Some(5),
        }
    }

    #[test]
    fn test_bootstrap_seeds_everything() {
        let mut tables = Tables::new();
        let report = tables.bootstrap_network(&plan()).unwrap();

        let network = tables.network(report.network_id).unwrap();
        assert_eq!(network.metadata.house_address, report.house_address_id);
        let initial = network.metadata.initial_assets.clone().unwrap();
        assert_eq!(initial.eth_amount, Some(Decimal::new(1, 1)));
        assert_eq!(initial.toybox, report.toybox_asset_id);
        assert_eq!(initial.toybox_amount, Some(5));

        assert_eq!(tables.native_asset(report.network_id).unwrap().id, report.native_asset_id);
        let house = report.house_address_id.unwrap();
        assert!(tables.address_account(house, report.native_asset_id).is_some());
        assert!(tables.address_account(house, report.toybox_asset_id.unwrap()).is_some());
    }

    #[test]
    fn test_bootstrap_is_idempotent() {
        let mut tables = Tables::new();
        let first = tables.bootstrap_network(&plan()).unwrap();
        let second = tables.bootstrap_network(&plan()).unwrap();
        assert_eq!(first.network_id, second.network_id);
        assert_eq!(first.native_asset_id, second.native_asset_id);
        assert_eq!(first.house_address_id, second.house_address_id);
        assert_eq!(tables.address_accounts.len(), 2);
    }

    #[test]
    fn test_starter_assets_require_house() {
        let mut tables = Tables::new();
        let plan = BootstrapPlan {
            house_address: None,
            ..plan()
        };
        assert!(matches!(tables.bootstrap_network(&plan), Err(ServiceError::Setup(_))));
    }

    #[test]
    fn test_minimal_plan() {
        let mut tables = Tables::new();
        let report = tables
            .bootstrap_network(&BootstrapPlan {
                network_name: "devnet".into(),
                ..Default::default()
            })
            .unwrap();
        assert!(report.house_address_id.is_none());
        assert!(tables.network(report.network_id).unwrap().metadata.initial_assets.is_none());
    }
}
