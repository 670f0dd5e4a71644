//! ---
//! nmea_section: "05-networking-external-interfaces"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Client transports and connection registry."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Line-oriented TCP listener.
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use nmea_codec::{ReadingSource, TransportKind};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::{split_lines, OutboundMessage, TransportContext, TransportError};

/// Accept loop for NMEA-over-TCP clients.
#[derive(Debug)]
pub struct TcpListenerTask {
    listener: TcpListener,
    context: TransportContext,
}

impl TcpListenerTask {
    /// Bind the listening socket.
    pub async fn bind(address: SocketAddr, context: TransportContext) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| TransportError::Bind {
                transport: TransportKind::Tcp,
                address,
                source,
            })?;
        Ok(Self { listener, context })
    }

    /// Bound address, useful when listening on port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until `shutdown` flips, then tear down every connection.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let local = self.listener.local_addr()?;
        info!(address = %local, "tcp listener started");
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let context = self.context.clone();
                        let shutdown = shutdown.clone();
                        connections.spawn(serve_connection(stream, remote, context, shutdown));
                    }
                    Err(err) => {
                        warn!(error = %err, "tcp accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
        connections.shutdown().await;
        info!(address = %local, "tcp listener stopped");
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    context: TransportContext,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(err) = stream.set_nodelay(true) {
        debug!(remote = %remote, error = %err, "failed to disable nagle");
    }
    let (reader, writer) = stream.into_split();
    let (guard, queue) = context.registry.attach(TransportKind::Tcp, remote);
    let source = ReadingSource::remote(TransportKind::Tcp, remote);

    tokio::select! {
        outcome = write_queue(writer, queue, context.connection.write_timeout, guard.id()) => {
            if let Err(err) = outcome {
                warn!(connection = guard.id(), error = %err, "tcp writer stopped");
            }
        }
        _ = read_lines(reader, &context, source, context.connection.idle_timeout) => {}
        _ = shutdown.changed() => {}
    }
}

/// Drain a client queue into a stream. Ends cleanly when the registry drops the
/// queue.
pub(crate) async fn write_queue<W>(
    mut writer: W,
    mut queue: mpsc::Receiver<Arc<OutboundMessage>>,
    write_timeout: Duration,
    connection: u64,
) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = queue.recv().await {
        match timeout(write_timeout, writer.write_all(message.as_bytes())).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(TransportError::Io(err)),
            Err(_) => {
                return Err(TransportError::Send {
                    connection,
                    reason: format!("write exceeded {write_timeout:?}"),
                })
            }
        }
    }
    let _ = writer.shutdown().await;
    Ok(())
}

/// Feed every line of a stream to the inbound handler until EOF, error or idle
/// timeout. Invalid UTF-8 is replaced rather than ending the stream.
pub(crate) async fn read_lines<R>(
    reader: R,
    context: &TransportContext,
    source: ReadingSource,
    idle_timeout: Option<Duration>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::with_capacity(128);
    loop {
        buffer.clear();
        let read = match idle_timeout {
            Some(limit) => match timeout(limit, reader.read_until(b'\n', &mut buffer)).await {
                Ok(read) => read,
                Err(_) => {
                    info!(remote = ?source.remote, "closing idle client");
                    return;
                }
            },
            None => reader.read_until(b'\n', &mut buffer).await,
        };
        match read {
            Ok(0) => return,
            Ok(_) => {
                let text = String::from_utf8_lossy(&buffer);
                for line in split_lines(&text) {
                    context.deliver_line(line, source.clone()).await;
                }
            }
            Err(err) => {
                debug!(remote = ?source.remote, error = %err, "read failed");
                return;
            }
        }
    }
}
