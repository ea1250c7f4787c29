use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};
use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::warn;

/// Counts live client connections so shutdown can stop accepting and then
/// wait for the rest to finish.
pub struct ActiveConnections {
    added: AtomicI64,
    removed: AtomicI64,
    max_connections: u32,
    drained: Notify,
}

impl ActiveConnections {
    pub fn new(max_connections: u32) -> Arc<Self> {
        Arc::new(Self {
            added: Default::default(),
            removed: Default::default(),
            max_connections,
            drained: Notify::new(),
        })
    }

    /// len returns the number of active connections at the current moment.
    /// Unlike the count we do in try_add() that may understate the actual, this may slightly overstate it.
    /// That's because this decides the drained state, and we must never report drained early.
    pub fn len(&self) -> usize {
        let removed = self.removed.load(Acquire);
        let count = self.added.load(Acquire) - removed;
        // This can't be negative, because we load removed first.
        // Added will always be >= removed at the same or later point in time.
        debug_assert!(count >= 0);
        count as usize
    }

    /// Claims a connection slot, or refuses when the limit is reached.
    /// The slot is released by dropping the returned guard.
    pub fn try_add(self: &Arc<Self>) -> Option<ConnectionGuard> {
        // Because removed is loaded second, this might impose a very slightly lower limit (but never higher)
        let added = self.added.fetch_add(1, AcqRel) + 1;
        if added - self.removed.load(Acquire) > self.max_connections as i64 {
            self.added.fetch_add(-1, Relaxed);
            warn!(limit = self.max_connections, "reached connection limit");
            return None;
        }
        Some(ConnectionGuard {
            connections: self.clone(),
        })
    }

    fn remove(&self) {
        self.removed.fetch_add(1, AcqRel);
        if self.len() == 0 {
            self.drained.notify_waiters();
        }
    }

    /// Waits until no connections remain. Returns immediately if none are active.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.len() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Releases its connection slot on drop, so a handler that panics or errors
/// out still counts down.
pub struct ConnectionGuard {
    connections: Arc<ActiveConnections>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.connections.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_enforced_and_released() {
        let connections = ActiveConnections::new(2);
        let a = connections.try_add().unwrap();
        let _b = connections.try_add().unwrap();
        assert_eq!(connections.len(), 2);
        assert!(connections.try_add().is_none());
        assert_eq!(connections.len(), 2);
        drop(a);
        assert_eq!(connections.len(), 1);
        assert!(connections.try_add().is_some());
    }

    #[tokio::test]
    async fn test_wait_drained() {
        let connections = ActiveConnections::new(16);
        let guard = connections.try_add().unwrap();
        let waiter = {
            let connections = connections.clone();
            tokio::spawn(async move { connections.wait_drained().await })
        };
        tokio::task::yield_now().await;
        drop(guard);
        waiter.await.unwrap();
        assert_eq!(connections.len(), 0);
        // drained with nothing active returns immediately
        connections.wait_drained().await;
    }
}
