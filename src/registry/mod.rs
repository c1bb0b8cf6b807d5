//! Asset and network registry.
//!
//! # Data Flow
//! ```text
//! bootstrap / listener
//!     → get_or_create_network(name)          (keyed by name)
//!     → get_or_create_asset(network, symbol) (keyed by network + symbol)
//!     → register / assign CryptoAddress      (unique per network)
//!     → CryptoAddressAccount                 (one per address + asset)
//! ```

pub mod address;
pub mod asset;
pub mod error;
pub mod network;

pub use address::{CryptoAddress, CryptoAddressAccount};
pub use asset::{Asset, AssetFormat};
pub use error::{RegistryError, RegistryResult};
pub use network::{AssetNetwork, Heartbeat, InitialAssets, NetworkMetadata};
