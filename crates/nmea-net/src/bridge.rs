//! ---
//! nmea_section: "05-networking-external-interfaces"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Client transports and connection registry."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Starts the configured transports as one unit.
use std::net::SocketAddr;
use std::sync::Arc;

use nmea_common::AppConfig;
use nmea_rt::TaskGroup;
use tokio::sync::watch;
use tracing::info;

use crate::{
    BroadcastReport, ConnectionRegistry, InboundHandler, OutboundMessage, TcpListenerTask,
    TransportContext, TransportError, UdpEndpoint, UpstreamSource, WebSocketServer,
};

/// Addresses the enabled listeners actually bound to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundAddresses {
    /// TCP listener.
    pub tcp: Option<SocketAddr>,
    /// UDP socket.
    pub udp: Option<SocketAddr>,
    /// WebSocket listener.
    pub websocket: Option<SocketAddr>,
}

/// Entry point for the transport layer.
#[derive(Debug)]
pub struct TransportBridge;

impl TransportBridge {
    /// Bind every enabled listener, then spawn their loops and the optional
    /// upstream feed. A bind failure aborts startup before any task runs.
    pub async fn start(
        config: &AppConfig,
        registry: Arc<ConnectionRegistry>,
        handler: Arc<dyn InboundHandler>,
    ) -> Result<BridgeHandle, TransportError> {
        let context = TransportContext::new(
            Arc::clone(&registry),
            handler,
            config.connection.clone(),
        );

        let tcp = match &config.transports.tcp {
            Some(tcp) => Some(TcpListenerTask::bind(tcp.listen, context.clone()).await?),
            None => None,
        };
        let udp = match &config.transports.udp {
            Some(udp) => Some(UdpEndpoint::bind(udp, context.clone()).await?),
            None => None,
        };
        let websocket = match &config.transports.websocket {
            Some(websocket) => Some(WebSocketServer::bind(websocket, context.clone()).await?),
            None => None,
        };

        let mut addresses = BoundAddresses::default();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = TaskGroup::new();
        if let Some(listener) = tcp {
            addresses.tcp = Some(listener.local_addr()?);
            tasks.spawn("tcp", listener.run(shutdown_rx.clone()));
        }
        if let Some(endpoint) = udp {
            addresses.udp = Some(endpoint.local_addr()?);
            tasks.spawn("udp", endpoint.run(shutdown_rx.clone()));
        }
        if let Some(server) = websocket {
            addresses.websocket = Some(server.local_addr()?);
            tasks.spawn("websocket", server.run(shutdown_rx.clone()));
        }
        if let Some(upstream) = &config.upstream {
            let source = UpstreamSource::new(upstream.clone(), context);
            tasks.spawn("upstream", source.run(shutdown_rx));
        }
        info!(
            tcp = ?addresses.tcp,
            udp = ?addresses.udp,
            websocket = ?addresses.websocket,
            upstream = config.upstream.as_ref().map(|u| u.address.as_str()),
            "transport bridge started"
        );

        Ok(BridgeHandle {
            addresses,
            registry,
            shutdown,
            tasks,
        })
    }
}

/// Running transports.
#[derive(Debug)]
pub struct BridgeHandle {
    addresses: BoundAddresses,
    registry: Arc<ConnectionRegistry>,
    shutdown: watch::Sender<bool>,
    tasks: TaskGroup,
}

impl BridgeHandle {
    /// Addresses the listeners actually bound.
    pub fn addresses(&self) -> BoundAddresses {
        self.addresses
    }

    /// Registry shared by every transport.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Fan a message out to every client. Never waits on a socket.
    pub fn broadcast(&self, message: OutboundMessage) -> BroadcastReport {
        self.registry.broadcast(message)
    }

    /// Stop accepting, close every client and wait for all transport tasks.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(true);
        let result = self.tasks.join().await;
        self.registry.close_all();
        info!("transport bridge stopped");
        result
    }
}
