//! ---
//! nmea_section: "05-networking-external-interfaces"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Client transports and connection registry."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Connection registry and non-blocking fan-out.
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nmea_codec::TransportKind;
use nmea_common::ConnectionConfig;
use nmea_metrics::BridgeMetrics;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::OutboundMessage;

/// One live client as seen by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeConnection {
    /// Registry-unique id.
    pub id: u64,
    /// Transport the client is attached through.
    pub transport: TransportKind,
    /// Peer address.
    pub remote_address: SocketAddr,
    /// Registration time.
    pub connected_at: DateTime<Utc>,
}

/// Outcome of one broadcast call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Queues that accepted the message.
    pub delivered: usize,
    /// Queues that were full; the message was dropped for them.
    pub skipped: usize,
    /// Connections removed during this call.
    pub removed: usize,
}

/// Registration that unregisters its connection when dropped, including when
/// the owning task is aborted.
#[derive(Debug)]
pub struct ConnectionGuard {
    registry: Arc<ConnectionRegistry>,
    connection: BridgeConnection,
}

impl ConnectionGuard {
    /// Registered client.
    pub fn connection(&self) -> &BridgeConnection {
        &self.connection
    }

    /// Registry id of the client.
    pub fn id(&self) -> u64 {
        self.connection.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.registry.unregister(self.connection.id);
    }
}

#[derive(Debug)]
struct Slot {
    connection: BridgeConnection,
    queue: mpsc::Sender<Arc<OutboundMessage>>,
    full_strikes: u32,
}

/// Sole owner of connection records and their send queues.
#[derive(Debug)]
pub struct ConnectionRegistry {
    slots: Mutex<BTreeMap<u64, Slot>>,
    next_id: AtomicU64,
    queue_capacity: usize,
    max_full_strikes: u32,
    metrics: BridgeMetrics,
}

impl ConnectionRegistry {
    /// Empty registry with the configured queue limits.
    pub fn new(config: &ConnectionConfig, metrics: BridgeMetrics) -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: config.queue_capacity.max(1),
            max_full_strikes: config.max_full_strikes.max(1),
            metrics,
        }
    }

    /// Metrics handle shared with the transports.
    pub fn metrics(&self) -> &BridgeMetrics {
        &self.metrics
    }

    /// Record a new client and hand back the receiving end of its queue.
    pub fn register(
        &self,
        transport: TransportKind,
        remote_address: SocketAddr,
    ) -> (BridgeConnection, mpsc::Receiver<Arc<OutboundMessage>>) {
        let (queue, receiver) = mpsc::channel(self.queue_capacity);
        let connection = BridgeConnection {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            transport,
            remote_address,
            connected_at: Utc::now(),
        };
        self.slots.lock().insert(
            connection.id,
            Slot {
                connection: connection.clone(),
                queue,
                full_strikes: 0,
            },
        );
        self.metrics.connection_opened(&transport.to_string());
        info!(
            connection = connection.id,
            transport = %transport,
            remote = %remote_address,
            "client connected"
        );
        (connection, receiver)
    }

    /// [`register`](Self::register) tied to the lifetime of the returned guard.
    pub fn attach(
        self: &Arc<Self>,
        transport: TransportKind,
        remote_address: SocketAddr,
    ) -> (ConnectionGuard, mpsc::Receiver<Arc<OutboundMessage>>) {
        let (connection, receiver) = self.register(transport, remote_address);
        let guard = ConnectionGuard {
            registry: Arc::clone(self),
            connection,
        };
        (guard, receiver)
    }

    /// Remove a client. Dropping its queue sender ends the writer task once the
    /// backlog is drained. Returns `None` when the id was already gone.
    pub fn unregister(&self, id: u64) -> Option<BridgeConnection> {
        let slot = self.slots.lock().remove(&id)?;
        self.metrics
            .connection_closed(&slot.connection.transport.to_string());
        info!(
            connection = id,
            transport = %slot.connection.transport,
            remote = %slot.connection.remote_address,
            "client disconnected"
        );
        Some(slot.connection)
    }

    /// Offer `message` to every client without waiting. Full queues skip the
    /// message; a client whose queue stays full for `max_full_strikes`
    /// consecutive broadcasts is disconnected.
    pub fn broadcast(&self, message: OutboundMessage) -> BroadcastReport {
        let protocol = message.protocol();
        let message = Arc::new(message);
        let mut report = BroadcastReport::default();
        let mut removed = Vec::new();
        {
            let mut slots = self.slots.lock();
            for (id, slot) in slots.iter_mut() {
                match slot.queue.try_send(Arc::clone(&message)) {
                    Ok(()) => {
                        slot.full_strikes = 0;
                        report.delivered += 1;
                    }
                    Err(TrySendError::Full(_)) => {
                        slot.full_strikes += 1;
                        report.skipped += 1;
                        debug!(
                            connection = id,
                            strikes = slot.full_strikes,
                            "client queue full, message skipped"
                        );
                        if slot.full_strikes >= self.max_full_strikes {
                            removed.push((*id, true));
                        }
                    }
                    Err(TrySendError::Closed(_)) => removed.push((*id, false)),
                }
            }
            for (id, slow) in &removed {
                if let Some(slot) = slots.remove(id) {
                    let transport = slot.connection.transport.to_string();
                    self.metrics.connection_closed(&transport);
                    if *slow {
                        self.metrics.record_slow_consumer(&transport);
                        warn!(
                            connection = id,
                            transport = %transport,
                            remote = %slot.connection.remote_address,
                            "dropping slow consumer"
                        );
                    } else {
                        debug!(connection = id, "removing closed client queue");
                    }
                }
            }
        }
        report.removed = removed.len();
        self.metrics.record_broadcast(protocol);
        report
    }

    /// Drop every queue; writer tasks finish after draining.
    pub fn close_all(&self) {
        let drained = std::mem::take(&mut *self.slots.lock());
        for slot in drained.values() {
            self.metrics
                .connection_closed(&slot.connection.transport.to_string());
        }
        if !drained.is_empty() {
            info!(connections = drained.len(), "closed all client queues");
        }
    }

    /// Snapshot of every registered client.
    pub fn connections(&self) -> Vec<BridgeConnection> {
        self.slots
            .lock()
            .values()
            .map(|slot| slot.connection.clone())
            .collect()
    }

    /// Whether `id` is still registered.
    pub fn contains(&self, id: u64) -> bool {
        self.slots.lock().contains_key(&id)
    }

    /// Clients attached over `transport`.
    pub fn count(&self, transport: TransportKind) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.connection.transport == transport)
            .count()
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether no client is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(capacity: usize, strikes: u32) -> ConnectionRegistry {
        let config = ConnectionConfig {
            queue_capacity: capacity,
            max_full_strikes: strikes,
            ..ConnectionConfig::default()
        };
        ConnectionRegistry::new(&config, BridgeMetrics::detached().unwrap())
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn line(n: usize) -> OutboundMessage {
        OutboundMessage::Sentence(format!("$IIXDR,{n}*00\r\n"))
    }

    #[tokio::test]
    async fn slow_consumer_is_dropped_without_affecting_healthy_client() {
        let registry = registry(2, 3);
        let (slow, _slow_rx) = registry.register(TransportKind::Tcp, addr(1));
        let (fast, mut fast_rx) = registry.register(TransportKind::Tcp, addr(2));
        assert_eq!(registry.metrics().active_connections("tcp"), 2);

        let mut received = 0;
        for n in 0..6 {
            registry.broadcast(line(n));
            while fast_rx.try_recv().is_ok() {
                received += 1;
            }
        }
        assert_eq!(received, 6);
        assert!(!registry.contains(slow.id));
        assert!(registry.contains(fast.id));
        assert_eq!(registry.metrics().active_connections("tcp"), 1);
    }

    #[tokio::test]
    async fn strikes_reset_after_successful_delivery() {
        let registry = registry(1, 2);
        let (client, mut rx) = registry.register(TransportKind::WebSocket, addr(3));
        registry.broadcast(line(0));
        let report = registry.broadcast(line(1));
        assert_eq!(report.skipped, 1);
        rx.recv().await.unwrap();
        registry.broadcast(line(2));
        registry.broadcast(line(3));
        assert!(registry.contains(client.id), "one strike since last delivery");
    }

    #[tokio::test]
    async fn closed_queue_is_removed_on_next_broadcast() {
        let registry = registry(4, 8);
        let (client, rx) = registry.register(TransportKind::Udp, addr(4));
        drop(rx);
        let report = registry.broadcast(line(0));
        assert_eq!(report.removed, 1);
        assert!(!registry.contains(client.id));
        assert!(registry.unregister(client.id).is_none());
        assert_eq!(registry.metrics().active_connections("udp"), 0);
    }

    #[tokio::test]
    async fn guard_unregisters_on_drop() {
        let registry = Arc::new(registry(4, 8));
        let (guard, _rx) = registry.attach(TransportKind::WebSocket, addr(6));
        assert!(registry.contains(guard.id()));
        let id = guard.id();
        drop(guard);
        assert!(!registry.contains(id));
        assert_eq!(registry.metrics().active_connections("websocket"), 0);
    }

    #[tokio::test]
    async fn writer_drains_backlog_after_close_all() {
        let registry = registry(4, 8);
        let (_client, mut rx) = registry.register(TransportKind::Tcp, addr(5));
        registry.broadcast(line(0));
        registry.close_all();
        assert!(registry.is_empty());
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }
}
