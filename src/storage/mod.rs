//! Custody state: tables, indexes and the atomic-unit boundary.
//!
//! # Data Flow
//! ```text
//! service / CLI
//!     → Store::atomic(|tables| ...)   (rows journal their pre-image)
//!     → Ok:  touched rows written as one sled batch, journal cleared
//!     → Err: touched rows restored, nothing written
//! ```

pub mod ids;
pub mod store;
pub mod tables;

pub use store::{StorageError, Store};
pub use tables::Tables;
