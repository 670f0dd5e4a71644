//! ---
//! nmea_section: "15-testing-qa-runbook"
//! nmea_subsection: "integration-tests"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Transport bridge start, fan-out and shutdown across TCP, UDP and WebSocket."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures_util::StreamExt;
use nmea_codec::{ReadingSource, TransportKind};
use nmea_common::{AppConfig, TcpConfig, TransportsConfig, UdpConfig, WebSocketConfig};
use nmea_metrics::BridgeMetrics;
use nmea_net::{ConnectionRegistry, InboundHandler, OutboundMessage, TransportBridge, TransportError};
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};

#[derive(Default)]
struct Recorder(Mutex<Vec<TransportKind>>);

#[async_trait]
impl InboundHandler for Recorder {
    async fn handle_line(&self, _line: &str, source: ReadingSource) {
        self.0.lock().push(source.transport);
    }
}

fn loopback_config() -> AppConfig {
    let any = "127.0.0.1:0".parse().unwrap();
    AppConfig {
        transports: TransportsConfig {
            tcp: Some(TcpConfig { listen: any }),
            udp: Some(UdpConfig {
                listen: any,
                targets: Vec::new(),
                broadcast: false,
            }),
            websocket: Some(WebSocketConfig {
                listen: any,
                path: "/".into(),
                json_envelope: false,
            }),
        },
        ..AppConfig::default()
    }
}

async fn wait_for<F: Fn() -> bool>(check: F) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn one_broadcast_reaches_every_transport() -> Result<()> {
    let config = loopback_config();
    let registry = Arc::new(ConnectionRegistry::new(
        &config.connection,
        BridgeMetrics::detached()?,
    ));
    let recorder = Arc::new(Recorder::default());
    let bridge = TransportBridge::start(&config, registry.clone(), recorder.clone()).await?;
    let addresses = bridge.addresses();

    let tcp = TcpStream::connect(addresses.tcp.unwrap()).await?;
    let mut tcp = BufReader::new(tcp).lines();
    let udp = UdpSocket::bind("127.0.0.1:0").await?;
    udp.send_to(b"$IIVHW,,T,,M,5.0,N,9.3,K*00\r\n", addresses.udp.unwrap())
        .await?;
    let (mut ws, _) = connect_async(format!("ws://{}/", addresses.websocket.unwrap())).await?;
    wait_for(|| registry.len() == 3).await;
    wait_for(|| recorder.0.lock().contains(&TransportKind::Udp)).await;

    let line = "$IIMTW,18.5,C*00\r\n";
    let report = bridge.broadcast(OutboundMessage::Sentence(line.into()));
    assert_eq!(report.delivered, 3);

    let received = timeout(Duration::from_secs(2), tcp.next_line()).await??;
    assert_eq!(received.as_deref(), Some("$IIMTW,18.5,C*00"));
    let mut buf = [0u8; 64];
    let (len, _) = timeout(Duration::from_secs(2), udp.recv_from(&mut buf)).await??;
    assert_eq!(&buf[..len], line.as_bytes());
    let message = timeout(Duration::from_secs(2), ws.next()).await?.unwrap()?;
    assert_eq!(message, WsMessage::Text("$IIMTW,18.5,C*00".into()));

    bridge.shutdown().await?;
    assert!(registry.is_empty());
    assert_eq!(registry.metrics().active_connections("tcp"), 0);
    Ok(())
}

#[tokio::test]
async fn stalled_client_does_not_hold_back_healthy_one() -> Result<()> {
    let mut config = loopback_config();
    config.transports.udp = None;
    config.transports.websocket = None;
    let registry = Arc::new(ConnectionRegistry::new(
        &config.connection,
        BridgeMetrics::detached()?,
    ));
    let bridge =
        TransportBridge::start(&config, registry.clone(), Arc::new(Recorder::default())).await?;
    let address = bridge.addresses().tcp.unwrap();

    let _stalled = TcpStream::connect(address).await?;
    let healthy = TcpStream::connect(address).await?;
    let mut healthy = BufReader::new(healthy).lines();
    wait_for(|| registry.len() == 2).await;

    for n in 0..50 {
        bridge.broadcast(OutboundMessage::Sentence(format!("$IIXDR,C,{n},C,ENGT*00\r\n")));
        let line = timeout(Duration::from_secs(1), healthy.next_line()).await??;
        assert_eq!(line, Some(format!("$IIXDR,C,{n},C,ENGT*00")));
    }

    bridge.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn occupied_port_fails_startup() -> Result<()> {
    let holder = std::net::TcpListener::bind("127.0.0.1:0")?;
    let mut config = loopback_config();
    config.transports.tcp = Some(TcpConfig {
        listen: holder.local_addr()?,
    });
    let registry = Arc::new(ConnectionRegistry::new(
        &config.connection,
        BridgeMetrics::detached()?,
    ));
    match TransportBridge::start(&config, registry, Arc::new(Recorder::default())).await {
        Err(TransportError::Bind { transport, .. }) => assert_eq!(transport, TransportKind::Tcp),
        other => panic!("expected bind failure, got {:?}", other.map(|h| h.addresses())),
    }
    Ok(())
}
