//! ---
//! nmea_section: "01-core-functionality"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Configuration, tracing bootstrap and time helpers for the bridge."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Shared primitives for the NMEA bridge workspace: configuration loading,
//! tracing bootstrap and time helpers consumed by every other crate.

pub mod config;
pub mod logging;
pub mod time;

pub use config::{
    AppConfig, AutopilotConfig, ConnectionConfig, LoadedAppConfig, LoggingConfig, MetricsConfig,
    Mode, ProtocolMode, SimulationConfig, TcpConfig, TransportsConfig, UdpConfig,
    UpstreamConfig, WebSocketConfig,
};
pub use logging::{init_cli_tracing, init_tracing, LogFormat};
