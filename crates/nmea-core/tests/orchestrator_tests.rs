//! ---
//! nmea_section: "01-core-functionality"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Orchestrator runs over loopback TCP."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::path::Path;
use std::time::Duration;

use nmea_codec::{decode_verified, Catalog, ReadingSource, SentenceType, TransportKind};
use nmea_common::config::{AppConfig, Mode, TcpConfig, TransportsConfig, UpstreamConfig};
use nmea_core::BridgeOrchestrator;
use nmea_sim::{encode_command, AutopilotIntent, AutopilotMode, EngineStatus};
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

const HEADING_SCENARIO: &str = r#"
name: harbour exit
description: steady heading with a depth sounder
version: 1
category: test
duration: 600
phases:
  - name: cruise
    duration: 600
data:
  heading:
    type: sine_wave
    base: 90.0
    amplitude: 5.0
    frequency: 0.05
  depth:
    type: constant
    base: 12.5
timing:
  heading: 0.05
  depth: 0.1
"#;

fn write_scenario(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("scenario.yaml");
    std::fs::write(&path, body).unwrap();
    path
}

#[allow(clippy::field_reassign_with_default)]
fn simulation_config(scenario: std::path::PathBuf) -> AppConfig {
    let mut config = AppConfig::default();
    config.mode = Mode::Simulation;
    config.transports = TransportsConfig {
        tcp: Some(TcpConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
        }),
        udp: None,
        websocket: None,
    };
    config.simulation.scenario = Some(scenario);
    config.simulation.tick_interval = Some(Duration::from_millis(20));
    config.simulation.autopilot_interval = Duration::from_millis(100);
    config
}

async fn next_line(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> Option<String> {
    match timeout(Duration::from_secs(2), lines.next_line()).await {
        Ok(Ok(line)) => line,
        _ => None,
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
async fn simulation_streams_parseable_sentences() {
    let temp = tempdir().expect("tempdir");
    let config = simulation_config(write_scenario(temp.path(), HEADING_SCENARIO));
    let handle = BridgeOrchestrator::new(config).start().await.unwrap();
    let stream = TcpStream::connect(handle.addresses().tcp.unwrap())
        .await
        .unwrap();
    let (read, _write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let catalog = Catalog::standard();
    let mut seen = Vec::new();
    while seen.len() < 20 {
        let line = next_line(&mut lines).await.expect("simulated sentence");
        let raw = decode_verified(&line).expect("valid checksum");
        if raw.sentence_id == "PCDIN" {
            continue;
        }
        let reading = catalog
            .parse(&raw, ReadingSource::internal())
            .unwrap()
            .expect("catalogued sentence");
        seen.push(reading.sentence_type);
    }
    assert!(seen.contains(&SentenceType::Hdg));
    assert!(seen.contains(&SentenceType::Dpt));

    let scenario = handle.scenario_state().unwrap();
    assert_eq!(scenario.status, EngineStatus::Running);
    assert_eq!(scenario.name, "harbour exit");
    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inbound_pcdin_command_steers_autopilot() {
    let temp = tempdir().expect("tempdir");
    let config = simulation_config(write_scenario(temp.path(), HEADING_SCENARIO));
    let handle = BridgeOrchestrator::new(config).start().await.unwrap();
    let stream = TcpStream::connect(handle.addresses().tcp.unwrap())
        .await
        .unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    wait_for(|| handle.registry().len() == 1).await;

    let command = encode_command(AutopilotIntent::SetMode(AutopilotMode::Wind)).unwrap();
    write
        .write_all(command.to_line().as_bytes())
        .await
        .unwrap();
    wait_for(|| handle.autopilot_state().mode == AutopilotMode::Wind).await;
    assert!(handle.autopilot_state().engaged);

    let mut status = None;
    for _ in 0..200 {
        let line = next_line(&mut lines).await.expect("stream continues");
        if line.starts_with("$PCDIN") {
            status = Some(line);
            break;
        }
    }
    assert!(status.is_some(), "autopilot status reached the client");
    assert_eq!(handle.metrics().autopilot_commands("applied"), 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn programmatic_command_matches_wire_command() {
    let temp = tempdir().expect("tempdir");
    let config = simulation_config(write_scenario(temp.path(), HEADING_SCENARIO));
    let handle = BridgeOrchestrator::new(config).start().await.unwrap();

    let engaged = handle.send_autopilot_command(AutopilotIntent::Engage);
    assert!(engaged.engaged);
    assert_eq!(engaged.mode, AutopilotMode::Auto);
    let adjusted = handle.send_autopilot_command(AutopilotIntent::AdjustHeading(10.0));
    let expected = (engaged.target_heading + 10.0).rem_euclid(360.0);
    assert!((adjusted.target_heading - expected).abs() < 1e-9);
    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_scenario_halts_emission() {
    let temp = tempdir().expect("tempdir");
    let config = simulation_config(write_scenario(temp.path(), HEADING_SCENARIO));
    let handle = BridgeOrchestrator::new(config).start().await.unwrap();
    let stream = TcpStream::connect(handle.addresses().tcp.unwrap())
        .await
        .unwrap();
    let (read, _write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    assert!(next_line(&mut lines).await.is_some());

    handle.stop_scenario();
    assert_eq!(handle.scenario_state().unwrap().status, EngineStatus::Idle);
    // Drain what was queued before the stop.
    while let Ok(Ok(Some(_))) = timeout(Duration::from_millis(200), lines.next_line()).await {}
    let quiet = timeout(Duration::from_millis(400), lines.next_line()).await;
    assert!(quiet.is_err(), "no sentence after stop");
    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_scenario_fails_startup() {
    let temp = tempdir().expect("tempdir");
    let body = HEADING_SCENARIO.replace("heading: 0.05", "heading: -1.0");
    let config = simulation_config(write_scenario(temp.path(), &body));
    let err = BridgeOrchestrator::new(config).start().await.unwrap_err();
    assert!(format!("{err:#}").contains("scenario"));
}

#[allow(clippy::field_reassign_with_default)]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bridge_mode_relays_upstream_readings() {
    let feed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = AppConfig::default();
    config.mode = Mode::Bridge;
    config.transports.tcp = Some(TcpConfig {
        listen: "127.0.0.1:0".parse().unwrap(),
    });
    config.upstream = Some(UpstreamConfig {
        address: feed.local_addr().unwrap().to_string(),
        reconnect_backoff: Duration::from_millis(50),
    });
    let handle = BridgeOrchestrator::new(config).start().await.unwrap();
    let mut readings = handle.subscribe_readings();

    let client = TcpStream::connect(handle.addresses().tcp.unwrap())
        .await
        .unwrap();
    let (read, _write) = client.into_split();
    let mut lines = BufReader::new(read).lines();
    wait_for(|| handle.registry().len() == 1).await;

    let (mut upstream, _) = feed.accept().await.unwrap();
    let rmc = "$GPRMC,123519.487,A,3746.710,N,12225.354,W,5.2,54.7,021125,001.3,W*5C";
    upstream
        .write_all(format!("{rmc}\r\n$GPRMC,bad*00\r\n").as_bytes())
        .await
        .unwrap();

    let reading = timeout(Duration::from_secs(2), readings.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reading.source.transport, TransportKind::Upstream);
    assert!((reading.number("speed_over_ground").unwrap() - 5.2).abs() < 1e-9);
    assert_eq!(next_line(&mut lines).await.as_deref(), Some(rmc));
    assert!(handle.scenario_state().is_none());
    handle.shutdown().await.unwrap();
}
