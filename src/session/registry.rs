//! Registry of live client connections

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify, RwLock};
use tokio::time::timeout;

/// Identifier assigned to each accepted connection
pub type ConnectionId = u64;

/// Public view of a live connection
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub connected_at: Instant,
}

impl ConnectionInfo {
    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Receiving side of a close request, held by the connection handler
pub struct CloseSignal {
    receiver: watch::Receiver<bool>,
}

impl CloseSignal {
    /// Resolves once the registry asks this connection to close
    pub async fn requested(&mut self) {
        // A dropped sender means the entry is gone; treat it as a close request
        let _ = self.receiver.wait_for(|close| *close).await;
    }
}

struct ConnectionEntry {
    info: ConnectionInfo,
    close_tx: watch::Sender<bool>,
}

/// Tracks every live connection so shutdown can reach them
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
    next_id: AtomicU64,
    /// Fired whenever the last connection leaves
    emptied: Notify,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            emptied: Notify::new(),
        }
    }

    /// Register a newly accepted connection
    pub async fn register(&self, addr: SocketAddr) -> (ConnectionInfo, CloseSignal) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let info = ConnectionInfo {
            id,
            addr,
            connected_at: Instant::now(),
        };
        let (close_tx, receiver) = watch::channel(false);

        let entry = ConnectionEntry {
            info: info.clone(),
            close_tx,
        };
        self.connections.write().await.insert(id, entry);

        (info, CloseSignal { receiver })
    }

    /// Remove a connection. Returns `false` if it was not registered.
    pub async fn unregister(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(&id).is_some();
        if connections.is_empty() {
            self.emptied.notify_waiters();
        }
        removed
    }

    /// Ask every live connection to close. Returns how many were asked.
    pub async fn close_all(&self) -> usize {
        let connections = self.connections.read().await;
        for entry in connections.values() {
            entry.close_tx.send_replace(true);
        }
        connections.len()
    }

    /// Wait until every connection has unregistered, at most `grace`.
    /// Returns `true` if the registry emptied in time.
    pub async fn wait_until_empty(&self, grace: Duration) -> bool {
        let drained = async {
            loop {
                // Created before the check so a concurrent notify is not missed
                let emptied = self.emptied.notified();
                if self.connections.read().await.is_empty() {
                    return;
                }
                emptied.await;
            }
        };
        timeout(grace, drained).await.is_ok()
    }

    /// Check whether a connection is registered
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Get info about every live connection
    pub async fn snapshot(&self) -> Vec<ConnectionInfo> {
        let connections = self.connections.read().await;
        let mut infos: Vec<_> = connections.values().map(|e| e.info.clone()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Get the number of live connections
    pub async fn count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = ConnectionRegistry::new();
        let (first, _) = registry.register(addr(5000)).await;
        let (second, _) = registry.register(addr(5001)).await;

        assert_ne!(first.id, second.id);
        assert_eq!(registry.count().await, 2);
        assert!(registry.contains(first.id).await);

        assert!(registry.unregister(first.id).await);
        assert!(!registry.unregister(first.id).await);
        assert!(!registry.contains(first.id).await);

        let remaining = registry.snapshot().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].addr, addr(5001));
    }

    #[tokio::test]
    async fn test_close_all_signals_every_connection() {
        let registry = ConnectionRegistry::new();
        let (_, mut a) = registry.register(addr(5000)).await;
        let (_, mut b) = registry.register(addr(5001)).await;
        assert!(
            tokio::time::timeout(Duration::from_millis(20), a.requested())
                .await
                .is_err(),
            "no close requested yet"
        );

        assert_eq!(registry.close_all().await, 2);

        tokio::time::timeout(Duration::from_secs(1), async {
            a.requested().await;
            b.requested().await;
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_wait_until_empty() {
        let registry = Arc::new(ConnectionRegistry::new());
        assert!(registry.wait_until_empty(Duration::from_millis(10)).await);

        let (info, _) = registry.register(addr(5000)).await;
        assert!(!registry.wait_until_empty(Duration::from_millis(20)).await);

        let remover = {
            let registry = registry.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                registry.unregister(info.id).await;
            })
        };
        assert!(registry.wait_until_empty(Duration::from_secs(1)).await);
        remover.await.unwrap();
    }

    #[tokio::test]
    async fn test_signal_resolves_when_entry_is_dropped() {
        let registry = ConnectionRegistry::new();
        let (info, mut signal) = registry.register(addr(5000)).await;
        registry.unregister(info.id).await;

        tokio::time::timeout(Duration::from_secs(1), signal.requested())
            .await
            .unwrap();
    }
}
