//! The live-client set shared by the accept loop and the broadcaster.
//!
//! The lock only guards the map. Nothing awaits or writes to a socket
//! while it is held: broadcasts copy the handles out, enqueue with
//! `try_send`, then evict dead clients in a second locked step.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type ClientId = u64;

/// Non-owning handle to one connection: its outbound queue and its
/// cancellation token. The socket itself belongs to the connection task.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    peer: SocketAddr,
    tx: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
}

impl ClientHandle {
    pub fn new(
        id: ClientId,
        peer: SocketAddr,
        tx: mpsc::Sender<Bytes>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            tx,
            cancel,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Enqueue without waiting.
    pub fn try_send(&self, line: Bytes) -> Result<(), TrySendError<Bytes>> {
        self.tx.try_send(line)
    }

    /// Ask the connection task to stop.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    /// Clients whose queue accepted the message.
    pub delivered: usize,
    /// Clients found full or closed and evicted.
    pub dropped: usize,
}

/// Thread-safe set of live clients. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<Mutex<HashMap<ClientId, ClientHandle>>>,
    next_id: Arc<AtomicU64>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh client id. Ids are never reused.
    pub fn next_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, ClientHandle>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, client: ClientHandle) {
        debug!(client = client.id, peer = %client.peer, "client registered");
        self.lock().insert(client.id, client);
    }

    pub fn deregister(&self, id: ClientId) -> Option<ClientHandle> {
        let removed = self.lock().remove(&id);
        if removed.is_some() {
            debug!(client = id, "client deregistered");
        }
        removed
    }

    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the current handles, taken under the lock.
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.lock().values().cloned().collect()
    }

    /// Enqueue `line` on every live client.
    ///
    /// A full or closed queue marks the client dead; dead clients are
    /// closed and removed once the pass over the snapshot is complete.
    pub fn broadcast(&self, line: Bytes) -> PublishReport {
        let clients = self.snapshot();
        let mut report = PublishReport::default();
        let mut dead = Vec::new();

        for client in &clients {
            match client.try_send(line.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(client = client.id, peer = %client.peer, "outbound queue full, dropping client");
                    dead.push(client.id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client = client.id, "outbound queue closed");
                    dead.push(client.id);
                }
            }
        }

        for id in dead {
            if let Some(client) = self.deregister(id) {
                client.close();
            }
            report.dropped += 1;
        }
        report
    }

    /// Cancel every registered connection.
    pub fn close_all(&self) {
        for client in self.snapshot() {
            client.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn client(registry: &ClientRegistry, depth: usize) -> (ClientHandle, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(depth);
        let handle = ClientHandle::new(registry.next_id(), peer(), tx, CancellationToken::new());
        registry.register(handle.clone());
        (handle, rx)
    }

    #[test]
    fn ids_are_unique() {
        let registry = ClientRegistry::new();
        let a = registry.next_id();
        let b = registry.clone().next_id();
        assert_ne!(a, b);
    }

    #[test]
    fn register_and_deregister() {
        let registry = ClientRegistry::new();
        let (a, _rx) = client(&registry, 4);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(a.id()));

        assert!(registry.deregister(a.id()).is_some());
        assert!(registry.deregister(a.id()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn broadcast_to_nobody_is_a_no_op() {
        let registry = ClientRegistry::new();
        assert_eq!(registry.broadcast(Bytes::from_static(b"x\n")), PublishReport::default());
    }

    #[test]
    fn broadcast_reaches_every_client() {
        let registry = ClientRegistry::new();
        let (_a, mut rx_a) = client(&registry, 4);
        let (_b, mut rx_b) = client(&registry, 4);

        let report = registry.broadcast(Bytes::from_static(b"hello\n"));
        assert_eq!(report, PublishReport { delivered: 2, dropped: 0 });
        assert_eq!(&rx_a.try_recv().unwrap()[..], b"hello\n");
        assert_eq!(&rx_b.try_recv().unwrap()[..], b"hello\n");
    }

    #[test]
    fn closed_client_is_evicted_after_pass() {
        let registry = ClientRegistry::new();
        let (_a, mut rx_a) = client(&registry, 4);
        let (b, rx_b) = client(&registry, 4);
        let (_c, mut rx_c) = client(&registry, 4);
        drop(rx_b);

        let report = registry.broadcast(Bytes::from_static(b"t\n"));
        assert_eq!(report, PublishReport { delivered: 2, dropped: 1 });
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(b.id()));
        assert!(b.is_closed());
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_c.try_recv().is_ok());

        let next = registry.broadcast(Bytes::from_static(b"t\n"));
        assert_eq!(next, PublishReport { delivered: 2, dropped: 0 });
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn slow_client_is_dropped_when_queue_is_full() {
        let registry = ClientRegistry::new();
        let (slow, _rx) = client(&registry, 1);

        assert_eq!(registry.broadcast(Bytes::from_static(b"1\n")).delivered, 1);
        let report = registry.broadcast(Bytes::from_static(b"2\n"));
        assert_eq!(report.dropped, 1);
        assert!(registry.is_empty());
        assert!(slow.is_closed());
    }

    #[test]
    fn close_all_cancels_every_client() {
        let registry = ClientRegistry::new();
        let (a, _ra) = client(&registry, 1);
        let (b, _rb) = client(&registry, 1);
        registry.close_all();
        assert!(a.is_closed() && b.is_closed());
    }
}
