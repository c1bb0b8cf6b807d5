//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → service loop finishes its cycle → admin server stops
//!     → state flushed → exit 0
//! ```
//!
//! # Design Decisions
//! - A cycle in progress always completes; shutdown is observed between cycles

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{trigger_on_signal, wait_for_signal};
