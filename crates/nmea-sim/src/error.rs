//! ---
//! nmea_section: "11-simulation"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Scenario runtime, generators and autopilot simulation."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::path::PathBuf;

use nmea_codec::{GenerateError, SentenceType};

use crate::validator::ValidationReport;

/// Scenario could not be loaded or started. The engine is left untouched.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioLoadError {
    #[error("unable to read scenario {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed scenario {}: {message}", .path.display())]
    Format { path: PathBuf, message: String },
    #[error("unsupported scenario format: {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("scenario failed validation: {0}")]
    Invalid(ValidationReport),
    #[error("channel '{channel}' cannot drive {sentence}: {source}")]
    Binding {
        channel: String,
        sentence: SentenceType,
        #[source]
        source: GenerateError,
    },
}

/// Inbound autopilot command rejected. Autopilot state is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown autopilot command {0:#04x}")]
    UnknownCommand(u8),
    #[error("sentence is not an autopilot command frame")]
    NotAutopilotFrame,
    #[error("malformed autopilot payload: {0}")]
    MalformedPayload(String),
    #[error("intent has no wire encoding: {0}")]
    Unencodable(String),
}
