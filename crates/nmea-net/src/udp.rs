//! ---
//! nmea_section: "05-networking-external-interfaces"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Client transports and connection registry."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! UDP datagram endpoint.
//!
//! Static targets receive every broadcast for the lifetime of the endpoint.
//! Any peer that sends a datagram becomes a subscriber until it has been
//! silent for `udp_subscriber_ttl`.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use nmea_codec::{ReadingSource, TransportKind};
use nmea_common::UdpConfig;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::registry::ConnectionGuard;
use crate::{split_lines, OutboundMessage, TransportContext, TransportError};

const MAX_DATAGRAM: usize = 65_507;

struct Subscriber {
    _guard: ConnectionGuard,
    last_seen: Instant,
}

#[derive(Debug)]
pub struct UdpEndpoint {
    socket: Arc<UdpSocket>,
    targets: Vec<SocketAddr>,
    context: TransportContext,
}

impl UdpEndpoint {
    /// Bind the socket. Configured targets attach once `run` starts.
    pub async fn bind(config: &UdpConfig, context: TransportContext) -> Result<Self, TransportError> {
        let bind_error = |source| TransportError::Bind {
            transport: TransportKind::Udp,
            address: config.listen,
            source,
        };
        let socket = UdpSocket::bind(config.listen).await.map_err(bind_error)?;
        if config.broadcast {
            socket.set_broadcast(true).map_err(bind_error)?;
        }
        Ok(Self {
            socket: Arc::new(socket),
            targets: config.targets.clone(),
            context,
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Attach targets, then receive datagrams until `shutdown` flips.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let local = self.socket.local_addr()?;
        let ttl = self.context.connection.udp_subscriber_ttl;
        let mut writers = JoinSet::new();
        let mut targets = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let (guard, queue) = self.context.registry.attach(TransportKind::Udp, *target);
            writers.spawn(send_datagrams(Arc::clone(&self.socket), queue, *target));
            targets.push(guard);
        }
        info!(address = %local, targets = targets.len(), "udp endpoint started");

        let mut subscribers: HashMap<SocketAddr, Subscriber> = HashMap::new();
        let mut sweep = tokio::time::interval((ttl / 4).max(Duration::from_millis(10)));
        let mut buffer = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = sweep.tick() => {
                    let now = Instant::now();
                    subscribers.retain(|peer, subscriber| {
                        let live = now.duration_since(subscriber.last_seen) < ttl;
                        if !live {
                            debug!(peer = %peer, "udp subscriber expired");
                        }
                        live
                    });
                }
                received = self.socket.recv_from(&mut buffer) => match received {
                    Ok((len, peer)) => {
                        if !self.targets.contains(&peer) {
                            self.touch(&mut subscribers, &mut writers, peer);
                        }
                        let text = String::from_utf8_lossy(&buffer[..len]);
                        let source = ReadingSource::remote(TransportKind::Udp, peer);
                        for line in split_lines(&text) {
                            self.context.deliver_line(line, source.clone()).await;
                        }
                    }
                    Err(err) => warn!(error = %err, "udp receive failed"),
                },
                Some(_) = writers.join_next(), if !writers.is_empty() => {}
            }
        }
        drop(subscribers);
        drop(targets);
        writers.shutdown().await;
        info!(address = %local, "udp endpoint stopped");
        Ok(())
    }

    fn touch(
        &self,
        subscribers: &mut HashMap<SocketAddr, Subscriber>,
        writers: &mut JoinSet<()>,
        peer: SocketAddr,
    ) {
        if let Some(subscriber) = subscribers.get_mut(&peer) {
            subscriber.last_seen = Instant::now();
            return;
        }
        let (guard, queue) = self.context.registry.attach(TransportKind::Udp, peer);
        writers.spawn(send_datagrams(Arc::clone(&self.socket), queue, peer));
        subscribers.insert(
            peer,
            Subscriber {
                _guard: guard,
                last_seen: Instant::now(),
            },
        );
    }
}

async fn send_datagrams(
    socket: Arc<UdpSocket>,
    mut queue: mpsc::Receiver<Arc<OutboundMessage>>,
    target: SocketAddr,
) {
    while let Some(message) = queue.recv().await {
        if let Err(err) = socket.send_to(message.as_bytes(), target).await {
            debug!(target = %target, error = %err, "udp send failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ConnectionRegistry, InboundHandler};
    use async_trait::async_trait;
    use nmea_common::ConnectionConfig;
    use nmea_metrics::BridgeMetrics;
    use parking_lot::Mutex;
    use tokio::time::timeout;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    #[async_trait]
    impl InboundHandler for Recorder {
        async fn handle_line(&self, line: &str, _source: ReadingSource) {
            self.0.lock().push(line.to_string());
        }
    }

    async fn wait_for<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn context(recorder: Arc<Recorder>, ttl: Duration) -> TransportContext {
        let connection = ConnectionConfig {
            udp_subscriber_ttl: ttl,
            ..ConnectionConfig::default()
        };
        let registry = Arc::new(ConnectionRegistry::new(
            &connection,
            BridgeMetrics::detached().unwrap(),
        ));
        TransportContext::new(registry, recorder, connection)
    }

    #[tokio::test]
    async fn static_targets_and_subscribers_receive_datagrams() {
        let target = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let config = UdpConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            targets: vec![target.local_addr().unwrap()],
            broadcast: false,
        };
        let recorder = Arc::new(Recorder::default());
        let ctx = context(recorder.clone(), Duration::from_secs(30));
        let registry = ctx.registry.clone();
        let endpoint = UdpEndpoint::bind(&config, ctx).await.unwrap();
        let address = endpoint.local_addr().unwrap();
        let (stop, stop_rx) = watch::channel(false);
        let server = tokio::spawn(endpoint.run(stop_rx));
        wait_for(|| registry.len() == 1).await;

        let subscriber = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        subscriber
            .send_to(b"$IIHDM,10.0,M*00\r\n$IIHDM,11.0,M*00\r\n", address)
            .await
            .unwrap();
        wait_for(|| recorder.0.lock().len() == 2).await;
        assert_eq!(registry.count(TransportKind::Udp), 2);

        registry.broadcast(OutboundMessage::Sentence("$IIMTW,18.5,C*00\r\n".into()));
        let mut buf = [0u8; 128];
        for socket in [&target, &subscriber] {
            let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert_eq!(&buf[..len], b"$IIMTW,18.5,C*00\r\n");
        }

        stop.send(true).unwrap();
        server.await.unwrap().unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn silent_subscribers_expire() {
        let config = UdpConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            targets: Vec::new(),
            broadcast: false,
        };
        let ctx = context(Arc::new(Recorder::default()), Duration::from_millis(100));
        let registry = ctx.registry.clone();
        let endpoint = UdpEndpoint::bind(&config, ctx).await.unwrap();
        let address = endpoint.local_addr().unwrap();
        let (stop, stop_rx) = watch::channel(false);
        let server = tokio::spawn(endpoint.run(stop_rx));

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        peer.send_to(b"hello\n", address).await.unwrap();
        wait_for(|| registry.len() == 1).await;
        wait_for(|| registry.is_empty()).await;

        stop.send(true).unwrap();
        server.await.unwrap().unwrap();
    }
}
