//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CustodyConfig (validated, immutable)
//!     → cloned into the services that need it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, ConfirmationConfig, ContractsConfig, CustodyConfig, HeartbeatConfig, NetworkConfig,
    NodeConfig, ObservabilityConfig, RetryConfig, StorageConfig,
};
pub use validation::{validate_config, ValidationError};
