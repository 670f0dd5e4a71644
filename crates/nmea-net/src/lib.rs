//! ---
//! nmea_section: "05-networking-external-interfaces"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Client transports and connection registry."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Client-facing transports of the bridge.
//!
//! Every connected client owns a bounded queue inside the
//! [`ConnectionRegistry`]. Producers call [`ConnectionRegistry::broadcast`],
//! which never waits on a socket; per-connection writer tasks drain the queues.
//! Inbound lines and frames are handed to an [`InboundHandler`].
#![warn(missing_docs)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use nmea_codec::n2k::{encode_frame, FrameError, PgnFrame};
use nmea_codec::{RawSentence, ReadingSource, TransportKind};
use nmea_common::ConnectionConfig;

pub mod bridge;
pub mod registry;
pub mod tcp;
pub mod udp;
pub mod upstream;
pub mod websocket;

/// Payload queued for delivery to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// NMEA 0183 line including its `\r\n` terminator.
    Sentence(String),
    /// Actisense-framed NMEA 2000 message.
    Frame(Vec<u8>),
}

impl OutboundMessage {
    /// Wire line for a sealed sentence.
    pub fn sentence(sentence: &RawSentence) -> Self {
        OutboundMessage::Sentence(sentence.to_line())
    }

    /// Binary frame for a PGN message.
    pub fn frame(frame: &PgnFrame) -> Result<Self, FrameError> {
        encode_frame(frame).map(OutboundMessage::Frame)
    }

    /// Protocol label used for metrics.
    pub fn protocol(&self) -> &'static str {
        match self {
            OutboundMessage::Sentence(_) => "nmea0183",
            OutboundMessage::Frame(_) => "nmea2000",
        }
    }

    /// Raw bytes written to stream and datagram transports.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            OutboundMessage::Sentence(line) => line.as_bytes(),
            OutboundMessage::Frame(bytes) => bytes,
        }
    }
}

/// Receives everything clients and upstream feeds send to the bridge.
#[async_trait]
pub trait InboundHandler: Send + Sync + 'static {
    /// One text line, terminator stripped.
    async fn handle_line(&self, line: &str, source: ReadingSource);

    /// One binary NMEA 2000 frame. Ignored unless overridden.
    async fn handle_frame(&self, frame: &[u8], source: ReadingSource) {
        let _ = (frame, source);
    }
}

/// Transport failures. Only bind failures surface to callers; the rest are
/// local to one connection and logged.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A requested listener could not be bound.
    #[error("failed to bind {transport} listener on {address}: {source}")]
    Bind {
        /// Transport being started.
        transport: TransportKind,
        /// Requested address.
        address: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },
    /// Delivery to one connection failed.
    #[error("send to connection {connection} failed: {reason}")]
    Send {
        /// Registry id of the connection.
        connection: u64,
        /// Human readable cause.
        reason: String,
    },
    /// Socket level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// State shared by every transport task.
#[derive(Clone)]
pub struct TransportContext {
    /// Fan-out registry the transport registers its clients with.
    pub registry: Arc<ConnectionRegistry>,
    /// Consumer of inbound traffic.
    pub handler: Arc<dyn InboundHandler>,
    /// Queue, timeout and expiry limits.
    pub connection: ConnectionConfig,
}

impl TransportContext {
    /// Bundle the shared transport state.
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        handler: Arc<dyn InboundHandler>,
        connection: ConnectionConfig,
    ) -> Self {
        Self {
            registry,
            handler,
            connection,
        }
    }

    pub(crate) async fn deliver_line(&self, line: &str, source: ReadingSource) {
        self.registry
            .metrics()
            .record_received(&source.transport.to_string());
        self.handler.handle_line(line, source).await;
    }

    pub(crate) async fn deliver_frame(&self, frame: &[u8], source: ReadingSource) {
        self.registry
            .metrics()
            .record_received(&source.transport.to_string());
        self.handler.handle_frame(frame, source).await;
    }
}

impl std::fmt::Debug for TransportContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportContext")
            .field("connections", &self.registry.len())
            .field("connection", &self.connection)
            .finish()
    }
}

/// Split a chunk of text into non-empty lines, accepting `\r\n`, `\n` or `\r`.
pub(crate) fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

pub use bridge::{BoundAddresses, BridgeHandle, TransportBridge};
pub use registry::{BridgeConnection, BroadcastReport, ConnectionGuard, ConnectionRegistry};
pub use tcp::TcpListenerTask;
pub use udp::UdpEndpoint;
pub use upstream::UpstreamSource;
pub use websocket::{Envelope, WebSocketServer};
