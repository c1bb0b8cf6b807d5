//! One polling cycle over a network.
//!
//! # Cycle
//! ```text
//! take network lock (skip the cycle if held elsewhere)
//!     → heartbeat        record chain head; abort if the network is dead
//!     → listener         ingest new deposits
//!     → queue            dispatch waiting operations
//!     → tracker          confirm / fail broadcasted operations
//!     → outbox           deliver completions to consumers
//! release lock
//! ```
//!
//! Per-item failures are folded into the report counts. Only a dead
//! network aborts the cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::blockchain::NodeRpc;
use crate::config::CustodyConfig;
use crate::observability::metrics;
use crate::operations::OperationType;
use crate::resilience::RetryPolicy;
use crate::services::confirmations::ConfirmationTracker;
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::heartbeat::HeartbeatMonitor;
use crate::services::listener::ChainEventListener;
use crate::services::lock::{NetworkLock, NetworkLockGuard};
use crate::services::outbox::{deliver_completions, CompletionConsumer, StarterAssets};
use crate::services::performers::{ChainSettings, PerformerTable};
use crate::services::queue::OperationQueue;
use crate::storage::ids::NetworkId;
use crate::storage::Store;

/// `(success, failure)` counts of one cycle, per stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Lock was held elsewhere; nothing ran.
    pub skipped: bool,
    pub events: (usize, usize),
    pub dispatched: (usize, usize),
    pub confirmations: (usize, usize),
    pub completions: (usize, usize),
    pub duration: Duration,
}

/// Everything that runs against one network, wired together.
pub struct NetworkServices {
    network_id: NetworkId,
    network_name: String,
    holder: String,
    node: Arc<dyn NodeRpc>,
    store: Store,
    lock: Arc<dyn NetworkLock>,
    heartbeat: HeartbeatMonitor,
    listener: ChainEventListener,
    queue: OperationQueue,
    tracker: ConfirmationTracker,
    consumers: Vec<Arc<dyn CompletionConsumer>>,
}

impl NetworkServices {
    /// Wire the standard performers and the starter-asset consumer.
    ///
    /// Registers the configured network if the store does not know it yet.
    pub fn new(
        config: &CustodyConfig,
        node: Arc<dyn NodeRpc>,
        store: Store,
        lock: Arc<dyn NetworkLock>,
        chain: Arc<ChainSettings>,
    ) -> ServiceResult<Self> {
        Self::with_performers(config, node, store, lock, PerformerTable::standard(chain))
    }

    pub fn with_performers(
        config: &CustodyConfig,
        node: Arc<dyn NodeRpc>,
        store: Store,
        lock: Arc<dyn NetworkLock>,
        performers: PerformerTable,
    ) -> ServiceResult<Self> {
        let name = config.network.name.clone();
        let network_id = store.atomic(|t| -> ServiceResult<NetworkId> { Ok(t.get_or_create_network(&name)) })?;

        let starter: Arc<dyn CompletionConsumer> =
            Arc::new(StarterAssets::new(config.confirmations.required_for(OperationType::Withdraw)));

        Ok(Self {
            network_id,
            network_name: name,
            holder: format!("runner-{}", Uuid::new_v4()),
            node,
            store,
            lock,
            heartbeat: HeartbeatMonitor::new(network_id, config.heartbeat.clone()),
            listener: ChainEventListener::new(network_id, config.network.clone(), &config.confirmations),
            queue: OperationQueue::new(
                network_id,
                performers,
                RetryPolicy::from_config(&config.retries),
                config.heartbeat.clone(),
            ),
            tracker: ConfirmationTracker::new(network_id),
            consumers: vec![starter],
        })
    }

    /// Add a completion consumer after the built-in ones.
    pub fn add_consumer(&mut self, consumer: Arc<dyn CompletionConsumer>) {
        self.consumers.push(consumer);
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Run one cycle.
    pub async fn run_services(&self) -> ServiceResult<CycleReport> {
        let Some(_guard) = NetworkLockGuard::try_acquire(self.lock.as_ref(), self.network_id, &self.holder) else {
            tracing::debug!(network = %self.network_name, "Network locked by another runner, skipping cycle");
            return Ok(CycleReport {
                skipped: true,
                ..Default::default()
            });
        };
        let started = Instant::now();

        if let Err(e) = self.heartbeat.beat(self.node.as_ref(), &self.store).await {
            tracing::warn!(network = %self.network_name, error = %e, "Heartbeat failed");
        }
        let alive = self.heartbeat.is_alive(&self.store);
        metrics::record_network_alive(&self.network_name, alive);
        if !alive {
            return Err(ServiceError::NetworkDead(self.network_name.clone()));
        }

        let events = self.listener.poll(&self.node, &self.store).await.unwrap_or_else(|e| {
            tracing::warn!(network = %self.network_name, error = %e, "Event poll failed");
            (0, 1)
        });
        let dispatched = self.queue.run_waiting_operations(&self.node, &self.store).await;
        let confirmations = self.tracker.poll(&self.node, &self.store).await.unwrap_or_else(|e| {
            tracing::warn!(network = %self.network_name, error = %e, "Confirmation poll failed");
            (0, 1)
        });
        let completions = deliver_completions(&self.store, &self.consumers);

        let duration = started.elapsed();
        metrics::record_cycle_duration(duration);
        let report = CycleReport {
            skipped: false,
            events,
            dispatched,
            confirmations,
            completions,
            duration,
        };
        tracing::debug!(network = %self.network_name, report = ?report, "Cycle finished");
        Ok(report)
    }
}
