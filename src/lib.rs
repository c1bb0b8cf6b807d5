//! Custodial crypto wallet backend.
//!
//! A double-entry ledger, an asset and address registry, and the polling
//! services that move crypto operations between the ledger and an
//! EVM-compatible node.

pub mod admin;
pub mod blockchain;
pub mod config;
pub mod ledger;
pub mod lifecycle;
pub mod observability;
pub mod operations;
pub mod registry;
pub mod resilience;
pub mod services;
pub mod storage;

pub use config::schema::CustodyConfig;
pub use lifecycle::Shutdown;
pub use services::NetworkServices;
pub use storage::{Store, Tables};
