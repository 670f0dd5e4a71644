//! ---
//! nmea_section: "15-testing-qa-runbook"
//! nmea_subsection: "integration-tests"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Daemon-level runs across UDP and WebSocket clients."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use nmea_codec::n2k::{decode_frame, encode_frame, PgnFrame};
use nmea_codec::decode_verified;
use nmea_common::config::{
    AppConfig, Mode, ProtocolMode, TransportsConfig, UdpConfig, WebSocketConfig,
};
use nmea_core::BridgeOrchestrator;
use nmea_sim::{encode_command, AutopilotIntent, AutopilotMode};
use regex::Regex;
use serde_json::Value;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

fn scenario_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../scenarios/coastal-passage.yaml")
}

#[allow(clippy::field_reassign_with_default)]
fn config(transports: TransportsConfig, protocol: ProtocolMode) -> AppConfig {
    let mut config = AppConfig::default();
    config.mode = Mode::Simulation;
    config.protocol = protocol;
    config.transports = transports;
    config.simulation.scenario = Some(scenario_path());
    config.simulation.tick_interval = Some(Duration::from_millis(20));
    config.simulation.autopilot_interval = Duration::from_millis(100);
    config
}

fn websocket(json_envelope: bool) -> TransportsConfig {
    TransportsConfig {
        tcp: None,
        udp: None,
        websocket: Some(WebSocketConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            path: "/nmea".into(),
            json_envelope,
        }),
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

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn websocket_envelopes_carry_both_protocols() -> Result<()> {
    let handle = BridgeOrchestrator::new(config(websocket(true), ProtocolMode::Hybrid))
        .start()
        .await?;
    let address = handle.addresses().websocket.unwrap();
    let (mut ws, _) = connect_async(format!("ws://{address}/nmea")).await?;

    let mut sentences = 0;
    let mut frames = 0;
    for _ in 0..500 {
        if sentences > 0 && frames > 0 {
            break;
        }
        let message = timeout(Duration::from_secs(2), ws.next()).await?.unwrap()?;
        let Message::Text(text) = message else {
            continue;
        };
        let envelope: Value = serde_json::from_str(&text)?;
        assert!(envelope["timestamp"].is_string(), "envelope carries a timestamp");
        let data = envelope["data"].as_str().unwrap();
        match envelope["type"].as_str() {
            Some("nmea") => {
                decode_verified(data)?;
                sentences += 1;
            }
            Some("pgn") => {
                let frame = decode_frame(&hex::decode(data)?)?;
                assert!(frame.pgn > 0);
                frames += 1;
            }
            other => panic!("unexpected envelope type {other:?}"),
        }
    }
    assert!(sentences > 0, "no nmea envelope received");
    assert!(frames > 0, "no pgn envelope received");

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn udp_subscriber_receives_terminated_sentences() -> Result<()> {
    let transports = TransportsConfig {
        tcp: None,
        udp: Some(UdpConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            targets: Vec::new(),
            broadcast: false,
        }),
        websocket: None,
    };
    let handle = BridgeOrchestrator::new(config(transports, ProtocolMode::Nmea0183))
        .start()
        .await?;

    let client = UdpSocket::bind("127.0.0.1:0").await?;
    client
        .send_to(b"$IIMTW,18.5,C*00\r\n", handle.addresses().udp.unwrap())
        .await?;
    wait_for(|| handle.registry().len() == 1).await;

    let pattern = Regex::new(r"^\$[A-Z]{5},.+\*[0-9A-F]{2}\r\n$")?;
    let mut buffer = [0u8; 1024];
    for _ in 0..20 {
        let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buffer)).await??;
        let datagram = std::str::from_utf8(&buffer[..len])?;
        assert!(pattern.is_match(datagram), "malformed datagram {datagram:?}");
        decode_verified(datagram.trim_end())?;
    }

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn binary_websocket_command_switches_pilot_mode() -> Result<()> {
    let handle = BridgeOrchestrator::new(config(websocket(false), ProtocolMode::Nmea0183))
        .start()
        .await?;
    let address = handle.addresses().websocket.unwrap();
    let (mut ws, _) = connect_async(format!("ws://{address}/nmea")).await?;
    wait_for(|| handle.registry().len() == 1).await;

    let command = encode_command(AutopilotIntent::SetMode(AutopilotMode::Track))?;
    let frame = PgnFrame::from_pcdin(&command)?;
    ws.send(Message::Binary(encode_frame(&frame)?)).await?;

    wait_for(|| handle.autopilot_state().mode == AutopilotMode::Track).await;
    assert!(handle.autopilot_state().engaged);

    handle.shutdown().await?;
    Ok(())
}
