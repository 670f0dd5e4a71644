//! ---
//! nmea_section: "11-simulation"
//! nmea_subsection: "01-bootstrap"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Offline renderer turning a scenario run into a sentence log."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Steps a scenario in simulated time without sockets and writes every
//! emitted sentence, so runs can be diffed, replayed or fed to other tools.
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use clap::{Parser, ValueEnum};
use nmea_codec::Catalog;
use nmea_common::config::{AutopilotConfig, ProtocolMode};
use nmea_common::init_cli_tracing;
use nmea_sim::{AutopilotInterpreter, EngineStatus, ScenarioEngine};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Nmea,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Protocol {
    Nmea0183,
    Nmea2000,
    Hybrid,
}

impl From<Protocol> for ProtocolMode {
    fn from(value: Protocol) -> Self {
        match value {
            Protocol::Nmea0183 => ProtocolMode::Nmea0183,
            Protocol::Nmea2000 => ProtocolMode::Nmea2000,
            Protocol::Hybrid => ProtocolMode::Hybrid,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Render an NMEA scenario run into a sentence log",
    long_about = None
)]
struct Cli {
    /// Scenario document (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    scenario: PathBuf,

    /// Output file path. Use '-' for stdout.
    #[arg(long, default_value = "-")]
    output: PathBuf,

    /// Simulated milliseconds between engine ticks
    #[arg(long, default_value_t = 100)]
    step_ms: u64,

    /// Explicit output format when the extension is ambiguous
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// Wire protocol to render; NMEA 2000 frames are written as PCDIN lines
    #[arg(long, value_enum, default_value_t = Protocol::Nmea0183)]
    protocol: Protocol,

    /// Seed for the gaussian generators
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Wall-clock time of scenario start (RFC 3339); defaults to now
    #[arg(long)]
    start: Option<DateTime<Utc>>,

    /// Log engine decisions to stderr
    #[arg(short, long)]
    verbose: bool,
}

/// One emitted sentence.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct Record {
    /// Scenario seconds at emission.
    elapsed: f64,
    phase: Option<String>,
    timestamp: DateTime<Utc>,
    sentence: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.verbose);
    if cli.step_ms == 0 {
        return Err(anyhow!("step-ms must be greater than zero"));
    }

    let format = determine_format(&cli.output, cli.format);
    let engine = ScenarioEngine::load_scenario(&cli.scenario, cli.seed)
        .with_context(|| format!("failed to load scenario {}", cli.scenario.display()))?;
    let records = render(
        engine,
        cli.step_ms,
        cli.protocol.into(),
        cli.start.unwrap_or_else(Utc::now),
    )?;

    let writer: Box<dyn Write> = if cli.output.as_os_str() == "-" {
        Box::new(io::stdout().lock())
    } else {
        Box::new(File::create(&cli.output).with_context(|| {
            format!("failed to create output file {}", cli.output.display())
        })?)
    };
    let mut writer = BufWriter::new(writer);
    match format {
        OutputFormat::Nmea => write_nmea(&mut writer, &records)?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, &records)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;

    if cli.output.as_os_str() != "-" {
        eprintln!(
            "rendered {} sentences from {} -> {}",
            records.len(),
            cli.scenario.display(),
            cli.output.display()
        );
    }
    Ok(())
}

fn determine_format(path: &Path, override_format: Option<OutputFormat>) -> OutputFormat {
    if let Some(format) = override_format {
        return format;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => OutputFormat::Json,
        _ => OutputFormat::Nmea,
    }
}

/// Run the scenario to completion in `step_ms` increments.
fn render(
    mut engine: ScenarioEngine,
    step_ms: u64,
    protocol: ProtocolMode,
    start: DateTime<Utc>,
) -> Result<Vec<Record>> {
    let catalog = Catalog::standard();
    let mut autopilot = AutopilotInterpreter::new(AutopilotConfig::default());
    engine
        .start(&catalog, &mut autopilot)
        .context("failed to start scenario")?;

    let step = step_ms as f64 / 1000.0;
    let max_steps = (engine.config().duration / step).ceil() as u64 + 1;
    let mut records = Vec::new();
    let mut delta = 0.0;
    for _ in 0..=max_steps {
        engine.tick(delta, &mut autopilot);
        let elapsed = engine.state().scenario_elapsed;
        let timestamp = start + ChronoDuration::milliseconds((elapsed * 1000.0).round() as i64);
        let emission = engine.emit_due(&catalog, autopilot.state(), timestamp, protocol);
        let phase = engine
            .config()
            .phases
            .get(engine.state().phase_index)
            .map(|phase| phase.name.clone());
        let sentences = emission
            .sentences
            .iter()
            .cloned()
            .chain(emission.frames.iter().map(|frame| frame.to_pcdin()));
        for sentence in sentences {
            records.push(Record {
                elapsed,
                phase: phase.clone(),
                timestamp,
                sentence: sentence.to_line().trim_end().to_owned(),
            });
        }
        if engine.status() == EngineStatus::Complete {
            break;
        }
        delta = step;
    }
    Ok(records)
}

fn write_nmea(writer: &mut impl Write, records: &[Record]) -> Result<()> {
    for record in records {
        writeln!(writer, "{}", record.sentence)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nmea_codec::decode_verified;
    use nmea_sim::{ScenarioConfig, ScenarioFormat};

    const SCENARIO: &str = r#"
name: short run
description: depth and heading
version: 1
category: test
duration: 3
phases:
  - name: first
    duration: 1
  - name: second
    duration: 2
data:
  depth:
    type: constant
    base: 8.0
  heading:
    type: constant
    base: 270.0
timing:
  depth: 1.0
  heading: 0.5
"#;

    fn engine() -> ScenarioEngine {
        let config = ScenarioConfig::parse(SCENARIO, ScenarioFormat::Yaml).unwrap();
        ScenarioEngine::from_config(config, 7).unwrap()
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn renders_every_due_sentence_until_complete() {
        let records = render(engine(), 100, ProtocolMode::Nmea0183, start()).unwrap();
        let count = |id: &str| {
            records
                .iter()
                .filter(|record| record.sentence[3..6] == *id)
                .count()
        };
        // depth at 0,1,2,3 and heading every half second from 0 to 3
        assert_eq!(count("DBT"), 4);
        assert_eq!(count("DPT"), 4);
        assert_eq!(count("HDG"), 7);
        assert!(records.iter().all(|record| decode_verified(&record.sentence).is_ok()));
        assert_eq!(records.last().unwrap().phase.as_deref(), Some("second"));
    }

    #[test]
    fn timestamps_follow_simulated_time() {
        let records = render(engine(), 250, ProtocolMode::Nmea0183, start()).unwrap();
        let last = records.last().unwrap();
        assert_eq!(last.timestamp - start(), ChronoDuration::seconds(3));
        assert!((last.elapsed - 3.0).abs() < 1e-9);
    }

    #[test]
    fn nmea2000_frames_render_as_pcdin() {
        let records = render(engine(), 500, ProtocolMode::Nmea2000, start()).unwrap();
        assert!(!records.is_empty());
        assert!(records.iter().all(|record| record.sentence.starts_with("$PCDIN")));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(determine_format(Path::new("run.json"), None), OutputFormat::Json);
        assert_eq!(determine_format(Path::new("run.log"), None), OutputFormat::Nmea);
        assert_eq!(
            determine_format(Path::new("-"), Some(OutputFormat::Json)),
            OutputFormat::Json
        );
    }

    #[test]
    fn nmea_output_is_one_sentence_per_line() {
        let records = render(engine(), 500, ProtocolMode::Nmea0183, start()).unwrap();
        let mut buffer = Vec::new();
        write_nmea(&mut buffer, &records).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text.lines().count(), records.len());
    }
}
