//! Node liveness.
//!
//! Two clocks are checked: when we last wrote a heartbeat (is our poller
//! running and reaching the node?) and the timestamp of the chain head it
//! reported (is the chain itself producing blocks?).

use std::time::Duration;

use chrono::Utc;

use crate::blockchain::NodeRpc;
use crate::config::HeartbeatConfig;
use crate::registry::{Heartbeat, RegistryResult};
use crate::services::error::{ServiceError, ServiceResult};
use crate::storage::ids::NetworkId;
use crate::storage::{Store, Tables};

/// Current wall-clock time as fractional epoch seconds.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Whether `heartbeat` is fresh at time `now`.
pub fn is_alive(heartbeat: Option<&Heartbeat>, timeout: Duration, block_timeout: Duration, now: f64) -> bool {
    let Some(heartbeat) = heartbeat else {
        return false;
    };
    if now - heartbeat.timestamp > timeout.as_secs_f64() {
        return false;
    }
    now - heartbeat.block_timestamp <= block_timeout.as_secs_f64()
}

impl Tables {
    /// Record that the node reported `block_number` (mined at `block_timestamp`) at time `now`.
    pub fn update_heartbeat(
        &mut self,
        network_id: NetworkId,
        block_number: u64,
        block_timestamp: f64,
        now: f64,
    ) -> RegistryResult<()> {
        let metadata = self.network_metadata_mut(network_id)?;
        metadata.heartbeat = Some(Heartbeat {
            timestamp: now,
            block_number,
            block_timestamp,
        });
        Ok(())
    }

    pub fn heartbeat(&self, network_id: NetworkId) -> Option<Heartbeat> {
        self.network(network_id).ok().and_then(|n| n.metadata.heartbeat)
    }

    pub fn is_network_alive(&self, network_id: NetworkId, config: &HeartbeatConfig, now: f64) -> bool {
        is_alive(
            self.heartbeat(network_id).as_ref(),
            Duration::from_secs(config.timeout_secs),
            Duration::from_secs(config.block_timeout_secs),
            now,
        )
    }
}

/// Writes heartbeats from the node's chain head.
pub struct HeartbeatMonitor {
    network_id: NetworkId,
    config: HeartbeatConfig,
}

impl HeartbeatMonitor {
    pub fn new(network_id: NetworkId, config: HeartbeatConfig) -> Self {
        Self { network_id, config }
    }

    /// Query the chain head and record it.
    pub async fn beat(&self, node: &dyn NodeRpc, store: &Store) -> ServiceResult<Heartbeat> {
        let number = node.get_block_number().await?;
        let block = node
            .get_block_by_number(number)
            .await?
            .ok_or_else(|| ServiceError::Setup(format!("node has no block {} at its own head", number)))?;
        let now = unix_now();
        store.atomic(|t| -> ServiceResult<()> {
            t.update_heartbeat(self.network_id, block.number, block.timestamp as f64, now)?;
            Ok(())
        })?;
        tracing::debug!(block_number = block.number, block_timestamp = block.timestamp, "Heartbeat recorded");
        Ok(Heartbeat {
            timestamp: now,
            block_number: block.number,
            block_timestamp: block.timestamp as f64,
        })
    }

    pub fn is_alive(&self, store: &Store) -> bool {
        let now = unix_now();
        store.read(|t| t.is_network_alive(self.network_id, &self.config, now))
    }
}
