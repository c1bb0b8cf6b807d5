//! Bounded waits for callers that need an operation settled.
//!
//! These only observe the store; the runner is what moves operations. A
//! wait never changes operation state, whichever way it ends.

use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::config::HeartbeatConfig;
use crate::services::error::{ServiceError, ServiceResult};
use crate::services::heartbeat::unix_now;
use crate::storage::ids::{NetworkId, OperationId};
use crate::storage::{Store, Tables};

#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Wait until every operation in `ids` is terminal.
///
/// Unknown ids count as pending.
pub async fn wait_for_operations(
    store: &Store,
    ids: &[OperationId],
    network_id: NetworkId,
    heartbeat: &HeartbeatConfig,
    options: WaitOptions,
) -> ServiceResult<()> {
    wait_until(store, network_id, heartbeat, options, |t| {
        ids.iter()
            .filter(|id| t.operation(**id).map_or(true, |op| !op.state().is_terminal()))
            .count()
    })
    .await
}

/// Wait until the network has no non-terminal operations.
pub async fn wait_until_clear(
    store: &Store,
    network_id: NetworkId,
    heartbeat: &HeartbeatConfig,
    options: WaitOptions,
) -> ServiceResult<()> {
    wait_until(store, network_id, heartbeat, options, |t| t.pending_operation_count(network_id)).await
}

async fn wait_until(
    store: &Store,
    network_id: NetworkId,
    heartbeat: &HeartbeatConfig,
    options: WaitOptions,
    pending: impl Fn(&Tables) -> usize,
) -> ServiceResult<()> {
    let started = Instant::now();
    loop {
        let (alive, remaining, name) = store.read(|t| {
            let name = t
                .network(network_id)
                .map(|n| n.name.clone())
                .unwrap_or_else(|_| network_id.to_string());
            (t.is_network_alive(network_id, heartbeat, unix_now()), pending(t), name)
        });

        if remaining == 0 {
            return Ok(());
        }
        if !alive {
            return Err(ServiceError::NetworkDead(name));
        }

        let waited = started.elapsed();
        if waited >= options.timeout {
            tracing::warn!(network = %name, pending = remaining, "Wait timed out");
            return Err(ServiceError::WaitTimeout {
                waited_ms: waited.as_millis() as u64,
                pending: remaining,
            });
        }
        sleep(options.poll_interval.min(options.timeout - waited)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn options(timeout_ms: u64) -> WaitOptions {
        WaitOptions {
            timeout: Duration::from_millis(timeout_ms),
            poll_interval: Duration::from_millis(10),
        }
    }

    fn alive_store() -> (Store, NetworkId) {
        let store = Store::in_memory();
        let network = store
            .atomic(|t| -> ServiceResult<_> {
                let network = t.get_or_create_network("testnet");
                let now = unix_now();
                t.update_heartbeat(network, 1, now, now)?;
                Ok(network)
            })
            .unwrap();
        (store, network)
    }

    #[tokio::test]
    async fn test_dead_network_fails_fast() {
        let store = Store::in_memory();
        let network = store.atomic(|t| -> ServiceResult<_> { Ok(t.get_or_create_network("down")) }).unwrap();
        store
            .atomic(|t| -> ServiceResult<_> { Ok(t.create_address(network, 1)?) })
            .unwrap();

        let result = wait_until_clear(&store, network, &HeartbeatConfig::default(), options(5_000)).await;
        assert!(matches!(result, Err(ServiceError::NetworkDead(name)) if name == "down"));
    }

    #[tokio::test]
    async fn test_timeout_leaves_state_alone() {
        let (store, network) = alive_store();
        let (_, op) = store
            .atomic(|t| -> ServiceResult<_> { Ok(t.create_address(network, 1)?) })
            .unwrap();

        let result = wait_for_operations(&store, &[op], network, &HeartbeatConfig::default(), options(50)).await;
        assert!(matches!(result, Err(ServiceError::WaitTimeout { pending: 1, .. })));
        assert!(!store.read(|t| t.operation(op).unwrap().state().is_terminal()));
    }

    #[tokio::test]
    async fn test_returns_once_terminal() {
        let (store, network) = alive_store();
        let (_, op) = store
            .atomic(|t| -> ServiceResult<_> { Ok(t.create_address(network, 1)?) })
            .unwrap();
        store
            .atomic(|t| -> ServiceResult<_> { Ok(t.cancel_operation(op, Utc::now())?) })
            .unwrap();

        wait_for_operations(&store, &[op], network, &HeartbeatConfig::default(), options(50))
            .await
            .unwrap();
        wait_until_clear(&store, network, &HeartbeatConfig::default(), options(50))
            .await
            .unwrap();
    }
}
