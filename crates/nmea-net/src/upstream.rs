//! ---
//! nmea_section: "05-networking-external-interfaces"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Client transports and connection registry."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! TCP client for a real instrument feed (multiplexer, gateway).
use anyhow::Result;
use nmea_codec::{ReadingSource, TransportKind};
use nmea_common::UpstreamConfig;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::tcp::read_lines;
use crate::TransportContext;

/// Reconnecting reader of an upstream NMEA TCP source.
#[derive(Debug)]
pub struct UpstreamSource {
    config: UpstreamConfig,
    context: TransportContext,
}

impl UpstreamSource {
    /// Feed that reconnects to `config.address` until shutdown.
    pub fn new(config: UpstreamConfig, context: TransportContext) -> Self {
        Self { config, context }
    }

    /// Connect, read until the feed drops, wait `reconnect_backoff`, repeat.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let address = self.config.address.as_str();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                connected = TcpStream::connect(address) => match connected {
                    Ok(stream) => {
                        let source = ReadingSource {
                            transport: TransportKind::Upstream,
                            remote: stream.peer_addr().ok(),
                        };
                        info!(upstream = %address, peer = ?source.remote, "upstream feed connected");
                        tokio::select! {
                            _ = shutdown.changed() => break,
                            _ = read_lines(stream, &self.context, source, None) => {
                                warn!(upstream = %address, "upstream feed disconnected");
                            }
                        }
                    }
                    Err(err) => warn!(upstream = %address, error = %err, "upstream connect failed"),
                },
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.config.reconnect_backoff) => {}
            }
        }
        info!(upstream = %address, "upstream feed stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::{ConnectionRegistry, InboundHandler};
    use async_trait::async_trait;
    use nmea_common::ConnectionConfig;
    use nmea_metrics::BridgeMetrics;
    use parking_lot::Mutex;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(String, TransportKind)>>);

    #[async_trait]
    impl InboundHandler for Recorder {
        async fn handle_line(&self, line: &str, source: ReadingSource) {
            self.0.lock().push((line.to_string(), source.transport));
        }
    }

    #[tokio::test]
    async fn reconnects_after_feed_drops() {
        let feed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let recorder = Arc::new(Recorder::default());
        let connection = ConnectionConfig::default();
        let registry = Arc::new(ConnectionRegistry::new(
            &connection,
            BridgeMetrics::detached().unwrap(),
        ));
        let source = UpstreamSource::new(
            UpstreamConfig {
                address: feed.local_addr().unwrap().to_string(),
                reconnect_backoff: Duration::from_millis(20),
            },
            TransportContext::new(registry.clone(), recorder.clone(), connection),
        );
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(source.run(stop_rx));

        for n in 0..2 {
            let (mut stream, _) = feed.accept().await.unwrap();
            stream
                .write_all(format!("$IIDPT,{n}.0,0.0*00\r\n").as_bytes())
                .await
                .unwrap();
            drop(stream);
        }
        for _ in 0..200 {
            if recorder.0.lock().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let lines = recorder.0.lock().clone();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|(_, kind)| *kind == TransportKind::Upstream));
        assert!(registry.is_empty(), "upstream feeds are not clients");

        stop.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
