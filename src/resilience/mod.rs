//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Failed dispatch attempt:
//!     → retries.rs (budget left? when is the next attempt due?)
//!     → operation.next_attempt_at, or force-fail when exhausted
//! ```
//!
//! # Design Decisions
//! - Timeouts live in the RPC client; every node call has a deadline
//! - One policy object is shared by every queued operation type

pub mod retries;

pub use retries::RetryPolicy;
