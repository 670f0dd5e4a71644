//! ---
//! nmea_section: "01-core-functionality"
//! nmea_subsection: "binary"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Binary entrypoint for the NMEA bridge daemon."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nmea_common::config::{AppConfig, Mode, ProtocolMode};
use nmea_common::{init_cli_tracing, init_tracing};
use nmea_core::BridgeOrchestrator;
use nmea_metrics::{new_registry, spawn_http_server};
use nmea_sim::{validate, ScenarioConfig, ScenarioFormat, ValidationReport};
use tokio::signal;
use tracing::{info, warn};

const DEFAULT_CONFIG_CANDIDATES: [&str; 2] = ["configs/nmea-bridge.toml", "nmea-bridge.toml"];

#[derive(Debug, Parser)]
#[command(author, version, about = "NMEA bridge and scenario simulator daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", global = true, help = "Path to configuration file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Simulation,
    Bridge,
    Hybrid,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Simulation => Mode::Simulation,
            CliMode::Bridge => Mode::Bridge,
            CliMode::Hybrid => Mode::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliProtocol {
    Nmea0183,
    Nmea2000,
    Hybrid,
}

impl From<CliProtocol> for ProtocolMode {
    fn from(value: CliProtocol) -> Self {
        match value {
            CliProtocol::Nmea0183 => ProtocolMode::Nmea0183,
            CliProtocol::Nmea2000 => ProtocolMode::Nmea2000,
            CliProtocol::Hybrid => ProtocolMode::Hybrid,
        }
    }
}

#[derive(Debug, Default, clap::Args)]
struct RunArgs {
    #[arg(long, value_enum, help = "Override operating mode")]
    mode: Option<CliMode>,

    #[arg(long, value_enum, help = "Override emitted wire protocol")]
    protocol: Option<CliProtocol>,

    #[arg(long, value_name = "FILE", help = "Scenario to simulate")]
    scenario: Option<PathBuf>,

    #[arg(long, help = "Seed for the gaussian generators")]
    seed: Option<u64>,

    #[arg(long, help = "Simulated seconds per real second")]
    speedup: Option<f64>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the bridge until interrupted")]
    Run(RunArgs),
    #[command(about = "Validate a scenario document and print the report")]
    Validate {
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        #[arg(long, help = "Print the report as JSON")]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            let (config, source) = load_config(cli.config.as_deref(), &args)?;
            init_tracing("nmea-bridged", &config.logging)?;
            match &source {
                Some(path) => info!(config_path = %path.display(), "configuration loaded"),
                None => info!("no configuration file found; using defaults"),
            }
            run_daemon(config).await
        }
        Commands::Validate { scenario, json } => {
            init_cli_tracing(false);
            let report = validate_file(&scenario)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&scenario, &report);
            }
            if report.valid {
                Ok(())
            } else {
                Err(anyhow!(
                    "scenario {} has {} error(s)",
                    scenario.display(),
                    report.errors.len()
                ))
            }
        }
    }
}

/// Resolve the configuration file, fall back to defaults, then apply command
/// line overrides. Validation happens at orchestrator start.
fn load_config(explicit: Option<&Path>, args: &RunArgs) -> Result<(AppConfig, Option<PathBuf>)> {
    let source = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => AppConfig::locate(&DEFAULT_CONFIG_CANDIDATES),
    };
    let mut config = match &source {
        Some(path) => AppConfig::read(path)?,
        None => AppConfig::default(),
    };
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    if let Some(protocol) = args.protocol {
        config.protocol = protocol.into();
    }
    if let Some(scenario) = &args.scenario {
        config.simulation.scenario = Some(scenario.clone());
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }
    if let Some(speedup) = args.speedup {
        config.simulation.speedup = speedup;
    }
    Ok((config, source))
}

async fn run_daemon(config: AppConfig) -> Result<()> {
    let metrics_settings = config.metrics.clone();
    let mut orchestrator = BridgeOrchestrator::new(config);
    let metrics_server = if metrics_settings.enabled {
        let registry = new_registry();
        orchestrator = orchestrator.with_metrics(registry.clone());
        info!(address = %metrics_settings.listen, "metrics exporter enabled");
        Some(spawn_http_server(registry, metrics_settings.listen)?)
    } else {
        info!("metrics exporter disabled by configuration");
        None
    };

    let handle = orchestrator.start().await?;
    info!(mode = ?handle.mode(), addresses = ?handle.addresses(), "daemon running; waiting for termination signal");
    signal::ctrl_c().await?;
    info!("ctrl-c received; shutting down");
    handle.shutdown().await?;

    if let Some(server) = metrics_server {
        if let Err(err) = server.shutdown().await {
            warn!(error = %err, "metrics exporter shutdown failed");
        }
    }
    Ok(())
}

/// Parse and validate without failing on validation errors.
fn validate_file(path: &Path) -> Result<ValidationReport> {
    let format = ScenarioFormat::from_path(path)
        .ok_or_else(|| anyhow!("unsupported scenario extension: {}", path.display()))?;
    let contents = fs::read_to_string(path)
        .with_context(|| format!("unable to read scenario {}", path.display()))?;
    let config = ScenarioConfig::parse(&contents, format)
        .map_err(|reason| anyhow!("failed to parse scenario {}: {}", path.display(), reason))?;
    Ok(validate(&config))
}

fn print_report(path: &Path, report: &ValidationReport) {
    let verdict = if report.valid { "valid" } else { "invalid" };
    println!("{}: {}", path.display(), verdict);
    for issue in &report.errors {
        println!("  error   {}", issue);
    }
    for issue in &report.warnings {
        println!("  warning {}", issue);
    }
}
