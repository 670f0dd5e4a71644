//! ---
//! nmea_section: "11-simulation"
//! nmea_subsection: "01-bootstrap"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Simulation runtime module exports and shared types."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Scenario-driven data synthesis for the NMEA bridge.
//!
//! A [`ScenarioEngine`] walks a phased [`ScenarioConfig`], evaluates the
//! [`GeneratorSpec`] bound to each channel and hands values to the sentence
//! catalog. Inbound pilot commands go through the [`AutopilotInterpreter`],
//! which owns the simulated helm.

pub mod autopilot;
pub mod channels;
pub mod engine;
pub mod error;
pub mod generator;
pub mod scenario;
pub mod validator;

pub use autopilot::{
    command_sentence, decode_command, encode_command, AutopilotIntent, AutopilotInterpreter,
    AutopilotMode, AutopilotState,
};
pub use engine::{
    EmissionLedger, Emission, EngineStatus, EventOutcome, FiredEvent, ScenarioEngine,
    ScenarioState, TickReport,
};
pub use error::{CommandError, ScenarioLoadError};
pub use generator::{channel_salt, GeneratorSpec};
pub use scenario::{Event, EventCommand, EventCommandError, Phase, ScenarioConfig, ScenarioFormat};
pub use validator::{
    validate, validate_threshold_order, ThresholdDirection, ThresholdSet, ValidationIssue,
    ValidationReport,
};
