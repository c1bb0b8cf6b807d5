//! Polling services that move operations between the store and the chain.
//!
//! # Data Flow
//! ```text
//! NetworkServices::run_services (once per poll interval, under NetworkLock)
//!     HeartbeatMonitor     node head ──▶ network metadata
//!     ChainEventListener   get_logs  ──▶ deposits (broadcasted)
//!     OperationQueue       waiting   ──▶ performers ──▶ broadcasted
//!     ConfirmationTracker  receipts  ──▶ success / failed
//!     deliver_completions  outbox    ──▶ consumers (StarterAssets)
//! ```
//!
//! # Invariants
//! - Each log, dispatch and confirmation commits in its own atomic unit
//! - Nothing is dispatched while the network is not alive
//! - One item failing never stops the rest of its stage

pub mod bootstrap;
pub mod confirmations;
pub mod error;
pub mod heartbeat;
pub mod listener;
pub mod lock;
pub mod outbox;
pub mod performers;
pub mod queue;
pub mod runner;
pub mod wait;

pub use bootstrap::{BootstrapPlan, BootstrapReport, TokenPlan};
pub use confirmations::{ConfirmationTracker, TrackOutcome};
pub use error::{ServiceError, ServiceResult};
pub use heartbeat::{is_alive, unix_now, HeartbeatMonitor};
pub use listener::{ingest_log, ChainEventListener, IngestOutcome};
pub use lock::{LocalNetworkLocks, NetworkLock, NetworkLockGuard};
pub use outbox::{deliver_completions, CompletionConsumer, StarterAssets};
pub use performers::{AddressCreationPerformer, ChainSettings, Performer, PerformerTable, WithdrawPerformer};
pub use queue::OperationQueue;
pub use runner::{CycleReport, NetworkServices};
pub use wait::{wait_for_operations, wait_until_clear, WaitOptions};
