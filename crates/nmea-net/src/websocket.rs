//! ---
//! nmea_section: "05-networking-external-interfaces"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Client transports and connection registry."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! WebSocket transport for browser and app clients.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use nmea_codec::{ReadingSource, TransportKind};
use nmea_common::WebSocketConfig;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{interval_at, sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::{split_lines, OutboundMessage, TransportContext, TransportError};

const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Payload kind carried by an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// One NMEA 0183 sentence without terminator.
    Nmea,
    /// Hex-encoded Actisense NMEA 2000 frame.
    Pgn,
}

/// JSON wrapper used when `json_envelope` is enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Payload kind.
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Sentence text or hex frame.
    pub data: String,
    /// Time the bridge sent or received the payload.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Wrap an outbound message.
    pub fn outbound(message: &OutboundMessage) -> Self {
        let (kind, data) = match message {
            OutboundMessage::Sentence(line) => (EnvelopeKind::Nmea, line.trim_end().to_string()),
            OutboundMessage::Frame(bytes) => (EnvelopeKind::Pgn, hex::encode_upper(bytes)),
        };
        Self {
            kind,
            data,
            timestamp: Utc::now(),
        }
    }
}

fn encode(message: &OutboundMessage, json_envelope: bool) -> Option<Message> {
    if json_envelope {
        return match serde_json::to_string(&Envelope::outbound(message)) {
            Ok(text) => Some(Message::Text(text)),
            Err(err) => {
                warn!(error = %err, "failed to serialise websocket envelope");
                None
            }
        };
    }
    Some(match message {
        OutboundMessage::Sentence(line) => Message::Text(line.trim_end().to_string()),
        OutboundMessage::Frame(bytes) => Message::Binary(bytes.clone()),
    })
}

/// axum WebSocket server bound to a single route.
#[derive(Debug)]
pub struct WebSocketServer {
    listener: TcpListener,
    path: String,
    json_envelope: bool,
    context: TransportContext,
}

struct SessionState {
    context: TransportContext,
    json_envelope: bool,
    shutdown: watch::Receiver<bool>,
    sessions: Mutex<JoinSet<()>>,
}

impl WebSocketServer {
    /// Bind the HTTP listener that upgrades `path` requests.
    pub async fn bind(
        config: &WebSocketConfig,
        context: TransportContext,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|source| TransportError::Bind {
                transport: TransportKind::WebSocket,
                address: config.listen,
                source,
            })?;
        let path = if config.path.starts_with('/') {
            config.path.clone()
        } else {
            format!("/{}", config.path)
        };
        Ok(Self {
            listener,
            path,
            json_envelope: config.json_envelope,
            context,
        })
    }

    /// Bound address.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Upgrade path, for example `/nmea`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Serve until `shutdown` flips, then close every session.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let local = self.listener.local_addr()?;
        info!(address = %local, path = %self.path, "websocket server listening");

        let state = Arc::new(SessionState {
            context: self.context,
            json_envelope: self.json_envelope,
            shutdown: shutdown.clone(),
            sessions: Mutex::new(JoinSet::new()),
        });
        let app = Router::new()
            .route(&self.path, get(upgrade_handler))
            .with_state(Arc::clone(&state));

        let mut stop = shutdown;
        let server = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop.changed().await;
        });
        if let Err(err) = server.await {
            warn!(error = %err, "websocket server exited with error");
        }

        let mut sessions = std::mem::take(&mut *state.sessions.lock());
        sessions.shutdown().await;
        info!(address = %local, "websocket server stopped");
        Ok(())
    }
}

async fn upgrade_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<Arc<SessionState>>,
) -> axum::response::Response {
    ws.on_upgrade(move |socket| async move {
        let session = client_loop(socket, remote, Arc::clone(&state));
        let mut sessions = state.sessions.lock();
        while sessions.try_join_next().is_some() {}
        sessions.spawn(session);
    })
}

async fn client_loop(mut socket: WebSocket, remote: SocketAddr, state: Arc<SessionState>) {
    let context = &state.context;
    let (guard, mut queue) = context.registry.attach(TransportKind::WebSocket, remote);
    let source = ReadingSource::remote(TransportKind::WebSocket, remote);
    let write_timeout = context.connection.write_timeout;
    let idle_timeout = context.connection.idle_timeout;
    let mut shutdown = state.shutdown.clone();
    let mut ping = interval_at(Instant::now() + PING_INTERVAL, PING_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        let idle = async move {
            match idle_timeout {
                Some(limit) => sleep_until(last_activity + limit).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            _ = idle => {
                info!(connection = guard.id(), "closing idle websocket client");
                let _ = socket.send(Message::Close(None)).await;
                break;
            }
            outbound = queue.recv() => {
                let Some(outbound) = outbound else {
                    break;
                };
                let Some(message) = encode(&outbound, state.json_envelope) else {
                    continue;
                };
                match timeout(write_timeout, socket.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(connection = guard.id(), error = %err, "websocket send failed");
                        break;
                    }
                    Err(_) => {
                        warn!(connection = guard.id(), "websocket write timed out");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            message = socket.recv() => {
                let Some(Ok(message)) = message else {
                    break;
                };
                last_activity = Instant::now();
                match message {
                    Message::Text(text) => handle_text(context, &text, &source).await,
                    Message::Binary(bytes) => context.deliver_frame(&bytes, source.clone()).await,
                    Message::Ping(payload) => {
                        if socket.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Message::Pong(_) => {}
                    Message::Close(_) => break,
                }
            }
        }
    }
}

async fn handle_text(context: &TransportContext, text: &str, source: &ReadingSource) {
    if !text.trim_start().starts_with('{') {
        for line in split_lines(text) {
            context.deliver_line(line, source.clone()).await;
        }
        return;
    }
    match serde_json::from_str::<Envelope>(text) {
        Ok(Envelope {
            kind: EnvelopeKind::Nmea,
            data,
            ..
        }) => {
            for line in split_lines(&data) {
                context.deliver_line(line, source.clone()).await;
            }
        }
        Ok(Envelope {
            kind: EnvelopeKind::Pgn,
            data,
            ..
        }) => match hex::decode(data.trim()) {
            Ok(bytes) => context.deliver_frame(&bytes, source.clone()).await,
            Err(err) => warn!(error = %err, "invalid hex in pgn envelope"),
        },
        Err(err) => warn!(error = %err, "invalid websocket envelope"),
    }
}
