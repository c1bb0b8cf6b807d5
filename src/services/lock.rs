//! Per-network cycle lock.
//!
//! One polling cycle per network at a time. The in-process implementation
//! covers several runners sharing one store; a deployment with several
//! processes plugs in a distributed lock behind the same trait.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::storage::ids::NetworkId;

/// Advisory lock keyed by network.
pub trait NetworkLock: Send + Sync {
    /// Take the lock for `holder`; `false` if anyone (including `holder`) holds it.
    fn try_lock(&self, network_id: NetworkId, holder: &str) -> bool;

    /// Release the lock if `holder` owns it.
    fn unlock(&self, network_id: NetworkId, holder: &str);
}

/// Locks held in this process.
#[derive(Debug, Clone, Default)]
pub struct LocalNetworkLocks {
    held: Arc<DashMap<NetworkId, String>>,
}

impl LocalNetworkLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self, network_id: NetworkId) -> Option<String> {
        self.held.get(&network_id).map(|entry| entry.value().clone())
    }
}

impl NetworkLock for LocalNetworkLocks {
    fn try_lock(&self, network_id: NetworkId, holder: &str) -> bool {
        match self.held.entry(network_id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(holder.to_string());
                true
            }
        }
    }

    fn unlock(&self, network_id: NetworkId, holder: &str) {
        self.held.remove_if(&network_id, |_, owner| owner == holder);
    }
}

/// Releases the lock when dropped.
pub struct NetworkLockGuard<'a> {
    lock: &'a dyn NetworkLock,
    network_id: NetworkId,
    holder: String,
}

impl<'a> NetworkLockGuard<'a> {
    /// `None` when the lock is held elsewhere.
    pub fn try_acquire(lock: &'a dyn NetworkLock, network_id: NetworkId, holder: &str) -> Option<Self> {
        lock.try_lock(network_id, holder).then(|| Self {
            lock,
            network_id,
            holder: holder.to_string(),
        })
    }
}

impl Drop for NetworkLockGuard<'_> {
    fn drop(&mut self) {
        self.lock.unlock(self.network_id, &self.holder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_is_exclusive() {
        let locks = LocalNetworkLocks::new();
        let network = NetworkId::new();

        assert!(locks.try_lock(network, "a"));
        assert!(!locks.try_lock(network, "b"));
        assert!(!locks.try_lock(network, "a"));
        assert!(locks.try_lock(NetworkId::new(), "b"));

        // Only the owner can release.
        locks.unlock(network, "b");
        assert_eq!(locks.holder(network).as_deref(), Some("a"));
        locks.unlock(network, "a");
        assert!(locks.try_lock(network, "b"));
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let locks = LocalNetworkLocks::new();
        let network = NetworkId::new();
        {
            let _guard = NetworkLockGuard::try_acquire(&locks, network, "runner").unwrap();
            assert!(NetworkLockGuard::try_acquire(&locks, network, "other").is_none());
        }
        assert!(locks.holder(network).is_none());
    }

    #[test]
    fn test_clones_share_state() {
        let locks = LocalNetworkLocks::new();
        let shared = locks.clone();
        let network = NetworkId::new();
        assert!(locks.try_lock(network, "a"));
        assert!(!shared.try_lock(network, "b"));
    }
}
