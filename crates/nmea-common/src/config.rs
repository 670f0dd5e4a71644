//! ---
//! nmea_section: "01-core-functionality"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Shared primitives and utilities for the core runtime."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_mode() -> Mode {
    Mode::Simulation
}

fn default_protocol() -> ProtocolMode {
    ProtocolMode::Nmea0183
}

fn default_tcp_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 2000))
}

fn default_udp_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 2002))
}

fn default_websocket_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_websocket_path() -> String {
    "/".to_owned()
}

fn default_queue_capacity() -> usize {
    256
}

fn default_max_full_strikes() -> u32 {
    8
}

fn default_write_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_udp_subscriber_ttl() -> Duration {
    Duration::from_secs(30)
}

fn default_simulation_seed() -> u64 {
    0x5EA_5EEDu64
}

fn default_speedup() -> f64 {
    1.0
}

fn default_autopilot_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_max_rudder_angle() -> f64 {
    35.0
}

fn default_turn_rate() -> f64 {
    3.0
}

fn default_off_course_limit() -> f64 {
    20.0
}

fn default_rudder_gain() -> f64 {
    1.5
}

fn default_reconnect_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

/// Primary configuration object for the bridge daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_mode")]
    pub mode: Mode,
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolMode,
    #[serde(default)]
    pub transports: TransportsConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub autopilot: AutopilotConfig,
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &'static str = "NMEA_BRIDGE_CONFIG";

    /// Load configuration from disk, respecting the `NMEA_BRIDGE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        let path = Self::locate(candidates).ok_or_else(|| {
            anyhow!(
                "no configuration files found. inspected: {}",
                candidates
                    .iter()
                    .map(|p| p.as_ref().display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?;
        let config = Self::from_path(&path)?;
        Ok(LoadedAppConfig {
            config,
            source: path,
        })
    }

    /// `NMEA_BRIDGE_CONFIG` if set, else the first existing candidate.
    pub fn locate<P: AsRef<Path>>(candidates: &[P]) -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Some(PathBuf::from(env_path));
            }
        }
        candidates
            .iter()
            .map(|candidate| candidate.as_ref())
            .find(|candidate| candidate.exists())
            .map(Path::to_path_buf)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating, for callers that apply overrides first.
    pub fn read(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.mode.runs_simulation() && self.simulation.scenario.is_none() {
            return Err(anyhow!("{:?} mode requires simulation.scenario", self.mode));
        }
        self.validate_sections()
    }

    /// Everything [`AppConfig::validate`] checks except the scenario path, for
    /// callers that supply a scenario programmatically.
    pub fn validate_sections(&self) -> Result<()> {
        if !self.transports.any_enabled() && self.upstream.is_none() {
            return Err(anyhow!(
                "configuration must enable at least one transport or an upstream source"
            ));
        }
        self.connection.validate()?;
        self.simulation.validate()?;
        self.autopilot.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            protocol: default_protocol(),
            transports: TransportsConfig::default(),
            connection: ConnectionConfig::default(),
            simulation: SimulationConfig::default(),
            autopilot: AutopilotConfig::default(),
            upstream: None,
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Where readings come from.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Scenario-driven synthetic data.
    #[default]
    Simulation,
    /// Relay and parse a real sensor feed.
    Bridge,
    /// Scenario data plus a real feed.
    Hybrid,
}

impl Mode {
    pub fn runs_simulation(&self) -> bool {
        matches!(self, Mode::Simulation | Mode::Hybrid)
    }

    pub fn relays_real_data(&self) -> bool {
        matches!(self, Mode::Bridge | Mode::Hybrid)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "simulation" => Ok(Mode::Simulation),
            "bridge" => Ok(Mode::Bridge),
            "hybrid" => Ok(Mode::Hybrid),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Wire protocol emitted to clients.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    #[default]
    Nmea0183,
    Nmea2000,
    Hybrid,
}

impl ProtocolMode {
    pub fn emits_0183(&self) -> bool {
        matches!(self, ProtocolMode::Nmea0183 | ProtocolMode::Hybrid)
    }

    pub fn emits_2000(&self) -> bool {
        matches!(self, ProtocolMode::Nmea2000 | ProtocolMode::Hybrid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportsConfig {
    #[serde(default)]
    pub tcp: Option<TcpConfig>,
    #[serde(default)]
    pub udp: Option<UdpConfig>,
    #[serde(default)]
    pub websocket: Option<WebSocketConfig>,
}

impl TransportsConfig {
    pub fn any_enabled(&self) -> bool {
        self.tcp.is_some() || self.udp.is_some() || self.websocket.is_some()
    }
}

impl Default for TransportsConfig {
    fn default() -> Self {
        Self {
            tcp: Some(TcpConfig::default()),
            udp: None,
            websocket: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcpConfig {
    #[serde(default = "default_tcp_listen")]
    pub listen: SocketAddr,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            listen: default_tcp_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UdpConfig {
    #[serde(default = "default_udp_listen")]
    pub listen: SocketAddr,
    /// Fixed destinations that always receive output (unicast or broadcast).
    #[serde(default)]
    pub targets: Vec<SocketAddr>,
    #[serde(default)]
    pub broadcast: bool,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            listen: default_udp_listen(),
            targets: Vec::new(),
            broadcast: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "default_websocket_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_websocket_path")]
    pub path: String,
    /// Wrap each sentence as `{type, data, timestamp}` for browser clients.
    #[serde(default)]
    pub json_envelope: bool,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            listen: default_websocket_listen(),
            path: default_websocket_path(),
            json_envelope: false,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Consecutive full-queue broadcasts tolerated before a client is dropped.
    #[serde(default = "default_max_full_strikes")]
    pub max_full_strikes: u32,
    #[serde(default = "default_write_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub write_timeout: Duration,
    /// Close clients that send nothing for this long. Disabled when unset.
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub idle_timeout: Option<Duration>,
    #[serde(default = "default_udp_subscriber_ttl")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub udp_subscriber_ttl: Duration,
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(anyhow!("connection.queue_capacity must be greater than zero"));
        }
        if self.max_full_strikes == 0 {
            return Err(anyhow!(
                "connection.max_full_strikes must be greater than zero"
            ));
        }
        Ok(())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_full_strikes: default_max_full_strikes(),
            write_timeout: default_write_timeout(),
            idle_timeout: None,
            udp_subscriber_ttl: default_udp_subscriber_ttl(),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub scenario: Option<PathBuf>,
    #[serde(default = "default_simulation_seed")]
    pub seed: u64,
    /// Simulated seconds per wall-clock second.
    #[serde(default = "default_speedup")]
    pub speedup: f64,
    /// Overrides the scheduler period derived from the scenario timing table.
    #[serde(default)]
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    pub tick_interval: Option<Duration>,
    #[serde(default = "default_autopilot_interval")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub autopilot_interval: Duration,
    #[serde(default)]
    pub loop_scenario: bool,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.speedup.is_finite() && self.speedup > 0.0) {
            return Err(anyhow!("simulation.speedup must be a positive number"));
        }
        if let Some(interval) = self.tick_interval {
            if interval.is_zero() {
                return Err(anyhow!("simulation.tick_interval must be greater than zero"));
            }
        }
        if self.autopilot_interval.is_zero() {
            return Err(anyhow!(
                "simulation.autopilot_interval must be greater than zero"
            ));
        }
        Ok(())
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            scenario: None,
            seed: default_simulation_seed(),
            speedup: default_speedup(),
            tick_interval: None,
            autopilot_interval: default_autopilot_interval(),
            loop_scenario: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutopilotConfig {
    /// Rudder travel limit either side of centre, degrees.
    #[serde(default = "default_max_rudder_angle")]
    pub max_rudder_angle: f64,
    /// Degrees per second the simulated vessel can turn.
    #[serde(default = "default_turn_rate")]
    pub turn_rate: f64,
    #[serde(default = "default_off_course_limit")]
    pub off_course_limit: f64,
    /// Rudder degrees commanded per degree of heading error.
    #[serde(default = "default_rudder_gain")]
    pub rudder_gain: f64,
    #[serde(default)]
    pub initial_heading: f64,
}

impl AutopilotConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.max_rudder_angle.is_finite() && self.max_rudder_angle > 0.0) {
            return Err(anyhow!("autopilot.max_rudder_angle must be positive"));
        }
        if !(self.turn_rate.is_finite() && self.turn_rate > 0.0) {
            return Err(anyhow!("autopilot.turn_rate must be positive"));
        }
        if !(self.off_course_limit.is_finite() && self.off_course_limit > 0.0) {
            return Err(anyhow!("autopilot.off_course_limit must be positive"));
        }
        Ok(())
    }
}

impl Default for AutopilotConfig {
    fn default() -> Self {
        Self {
            max_rudder_angle: default_max_rudder_angle(),
            turn_rate: default_turn_rate(),
            off_course_limit: default_off_course_limit(),
            rudder_gain: default_rudder_gain(),
            initial_heading: 0.0,
        }
    }
}

/// Real NMEA TCP feed relayed in bridge mode.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// `host:port` of the sensor multiplexer.
    pub address: String,
    #[serde(default = "default_reconnect_backoff")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub reconnect_backoff: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"
mode = "simulation"
protocol = "hybrid"

[transports.tcp]
listen = "127.0.0.1:10110"

[transports.udp]
listen = "127.0.0.1:10111"
targets = ["127.0.0.1:10112"]

[transports.websocket]
listen = "127.0.0.1:8081"
json_envelope = true

[connection]
queue_capacity = 64
write_timeout = 250
idle_timeout = 30

[simulation]
scenario = "scenarios/coastal.yaml"
seed = 7
speedup = 2.0
"#;

    #[test]
    fn parses_full_document() {
        let config: AppConfig = SAMPLE.parse().unwrap();
        assert_eq!(config.protocol, ProtocolMode::Hybrid);
        assert!(config.protocol.emits_0183() && config.protocol.emits_2000());
        assert_eq!(config.connection.queue_capacity, 64);
        assert_eq!(config.connection.write_timeout, Duration::from_millis(250));
        assert_eq!(config.connection.idle_timeout, Some(Duration::from_secs(30)));
        let ws = config.transports.websocket.as_ref().unwrap();
        assert!(ws.json_envelope);
        assert_eq!(ws.path, "/");
        assert_eq!(config.simulation.seed, 7);
        assert_eq!(config.autopilot.max_rudder_angle, 35.0);
    }

    #[test]
    fn simulation_mode_requires_scenario() {
        let err = "mode = \"simulation\"\n".parse::<AppConfig>().unwrap_err();
        assert!(err.to_string().contains("simulation.scenario"));
    }

    #[test]
    fn bridge_mode_without_scenario_is_valid() {
        let config: AppConfig = "mode = \"bridge\"\n".parse().unwrap();
        assert!(config.mode.relays_real_data());
        assert!(!config.mode.runs_simulation());
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let doc = "mode = \"bridge\"\n[connection]\nqueue_capacity = 0\n";
        assert!(doc.parse::<AppConfig>().is_err());
    }

    #[test]
    fn rejects_non_positive_speedup() {
        let mut config = AppConfig::default();
        config.simulation.scenario = Some(PathBuf::from("s.yaml"));
        config.simulation.speedup = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_with_source_picks_first_existing_candidate() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "mode = \"bridge\"")?;
        file.flush()?;
        let missing = PathBuf::from("does/not/exist.toml");
        let loaded = AppConfig::load_with_source(&[missing, file.path().to_path_buf()])?;
        assert_eq!(loaded.source, file.path());
        assert_eq!(loaded.config.mode, Mode::Bridge);
        Ok(())
    }

    #[test]
    fn read_defers_validation_to_the_caller() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "mode = \"simulation\"")?;
        file.flush()?;
        let mut config = AppConfig::read(file.path())?;
        assert!(config.validate().is_err());
        config.simulation.scenario = Some(PathBuf::from("scenarios/coastal-passage.yaml"));
        config.validate()?;
        assert!(AppConfig::from_path(file.path()).is_err());
        Ok(())
    }
}
