//! Operation queue manager.
//!
//! # Responsibilities
//! - Dispatch waiting operations oldest first
//! - Isolate failures: one bad operation never blocks the rest
//! - Apply the retry policy to failed attempts
//! - Stay idle while the network is not alive

use std::sync::Arc;

use chrono::Utc;

use crate::blockchain::NodeRpc;
use crate::config::HeartbeatConfig;
use crate::observability::metrics;
use crate::operations::{AttemptOutcome, OperationError, OperationResult};
use crate::resilience::RetryPolicy;
use crate::services::heartbeat::unix_now;
use crate::services::performers::PerformerTable;
use crate::storage::ids::{NetworkId, OperationId};
use crate::storage::Store;

/// Dispatches waiting operations of one network to their performers.
pub struct OperationQueue {
    network_id: NetworkId,
    performers: PerformerTable,
    policy: RetryPolicy,
    heartbeat: HeartbeatConfig,
}

impl OperationQueue {
    pub fn new(
        network_id: NetworkId,
        performers: PerformerTable,
        policy: RetryPolicy,
        heartbeat: HeartbeatConfig,
    ) -> Self {
        Self {
            network_id,
            performers,
            policy,
            heartbeat,
        }
    }

    /// Attempt every due waiting operation once.
    ///
    /// Returns `(success_count, failure_count)`. Nothing is attempted, and
    /// `(0, 0)` returned, while the network is not alive.
    pub async fn run_waiting_operations(&self, node: &Arc<dyn NodeRpc>, store: &Store) -> (usize, usize) {
        let alive = store.read(|t| t.is_network_alive(self.network_id, &self.heartbeat, unix_now()));
        if !alive {
            tracing::warn!(network_id = %self.network_id, "Network not alive, skipping dispatch");
            return (0, 0);
        }

        let waiting = store.read(|t| t.waiting_operations(self.network_id, Utc::now()));

        let mut success = 0;
        let mut failure = 0;

        for (id, operation_type) in waiting {
            let Some(performer) = self.performers.get(operation_type) else {
                tracing::error!(operation_id = %id, %operation_type, "No performer registered");
                metrics::record_dispatch(operation_type.as_str(), "no_performer");
                failure += 1;
                continue;
            };

            let attempts = match store.atomic(|t| t.begin_attempt(id, Utc::now())) {
                Ok(attempts) => attempts,
                Err(e) => {
                    tracing::warn!(operation_id = %id, error = %e, "Could not start attempt");
                    failure += 1;
                    continue;
                }
            };

            match performer.perform(node.as_ref(), store, id).await {
                Ok(()) => {
                    metrics::record_dispatch(operation_type.as_str(), "success");
                    success += 1;
                }
                Err(e) => {
                    failure += 1;
                    let outcome = self.record_failure(store, id, &e);
                    tracing::warn!(
                        operation_id = %id,
                        %operation_type,
                        attempts,
                        error = %e,
                        outcome = ?outcome,
                        "Operation attempt failed"
                    );
                    metrics::record_dispatch(operation_type.as_str(), "failure");
                }
            }
        }

        if success + failure > 0 {
            tracing::info!(network_id = %self.network_id, success, failure, "Dispatch cycle finished");
        }
        (success, failure)
    }

    fn record_failure(
        &self,
        store: &Store,
        id: OperationId,
        error: &OperationError,
    ) -> OperationResult<AttemptOutcome> {
        let result = store.atomic(|t| t.record_attempt_failure(id, error, &self.policy, Utc::now()));
        if let Err(e) = &result {
            tracing::error!(operation_id = %id, error = %e, "Could not record failed attempt");
        }
        result
    }
}
