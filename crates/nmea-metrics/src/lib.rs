//! ---
//! nmea_section: "03-observability"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Metrics collection and export utilities."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across crates.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Spawn an HTTP server that exposes the registry at `/metrics`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let local_addr = std_listener.local_addr()?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %local_addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let service = app.into_make_service();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, service)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: local_addr,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("text/plain"),
                )],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Why an inbound sentence never became a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    Checksum,
    ParseFailure,
    UnknownType,
    UnknownCommand,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed",
            DropReason::Checksum => "checksum",
            DropReason::ParseFailure => "parse_failure",
            DropReason::UnknownType => "unknown_type",
            DropReason::UnknownCommand => "unknown_command",
        }
    }
}

/// Counters and gauges recorded by the bridge and simulator.
#[derive(Clone, Debug)]
pub struct BridgeMetrics {
    registry: SharedRegistry,
    received: IntCounterVec,
    dropped: IntCounterVec,
    broadcast: IntCounterVec,
    connections: IntGaugeVec,
    slow_consumer_drops: IntCounterVec,
    autopilot_commands: IntCounterVec,
}

impl BridgeMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let received = IntCounterVec::new(
            Opts::new(
                "nmea_sentences_received_total",
                "Inbound sentences received by transport",
            ),
            &["transport"],
        )?;
        registry.register(Box::new(received.clone()))?;

        let dropped = IntCounterVec::new(
            Opts::new(
                "nmea_sentences_dropped_total",
                "Inbound sentences discarded before producing a reading",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(dropped.clone()))?;

        let broadcast = IntCounterVec::new(
            Opts::new(
                "nmea_messages_broadcast_total",
                "Outbound messages handed to connected clients",
            ),
            &["protocol"],
        )?;
        registry.register(Box::new(broadcast.clone()))?;

        let connections = IntGaugeVec::new(
            Opts::new(
                "nmea_connections_active",
                "Live client connections per transport",
            ),
            &["transport"],
        )?;
        registry.register(Box::new(connections.clone()))?;

        let slow_consumer_drops = IntCounterVec::new(
            Opts::new(
                "nmea_slow_consumer_drops_total",
                "Clients disconnected because their send queue stayed full",
            ),
            &["transport"],
        )?;
        registry.register(Box::new(slow_consumer_drops.clone()))?;

        let autopilot_commands = IntCounterVec::new(
            Opts::new(
                "nmea_autopilot_commands_total",
                "Autopilot commands handled by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(autopilot_commands.clone()))?;

        Ok(Self {
            registry,
            received,
            dropped,
            broadcast,
            connections,
            slow_consumer_drops,
            autopilot_commands,
        })
    }

    /// Metrics bound to a private registry, for tests and tools that never scrape.
    pub fn detached() -> Result<Self> {
        Self::new(new_registry())
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_received(&self, transport: &str) {
        self.received.with_label_values(&[transport]).inc();
    }

    pub fn record_dropped(&self, reason: DropReason) {
        self.dropped.with_label_values(&[reason.as_str()]).inc();
    }

    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.dropped.with_label_values(&[reason.as_str()]).get()
    }

    pub fn record_broadcast(&self, protocol: &str) {
        self.broadcast.with_label_values(&[protocol]).inc();
    }

    pub fn connection_opened(&self, transport: &str) {
        self.connections.with_label_values(&[transport]).inc();
    }

    pub fn connection_closed(&self, transport: &str) {
        self.connections.with_label_values(&[transport]).dec();
    }

    pub fn active_connections(&self, transport: &str) -> i64 {
        self.connections.with_label_values(&[transport]).get()
    }

    pub fn record_slow_consumer(&self, transport: &str) {
        self.slow_consumer_drops.with_label_values(&[transport]).inc();
    }

    pub fn record_autopilot_command(&self, outcome: &str) {
        self.autopilot_commands.with_label_values(&[outcome]).inc();
    }

    pub fn autopilot_commands(&self, outcome: &str) -> u64 {
        self.autopilot_commands.with_label_values(&[outcome]).get()
    }
}

pub use prometheus;
