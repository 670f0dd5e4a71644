//! ---
//! nmea_section: "11-simulation"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Scenario runtime, generators and autopilot simulation."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::autopilot::{AutopilotIntent, AutopilotMode};
use crate::error::ScenarioLoadError;
use crate::generator::GeneratorSpec;
use crate::validator::{validate, ValidationReport};

/// Declarative scenario document. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(default)]
    pub category: String,
    /// Total run length in seconds.
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub phases: Vec<Phase>,
    #[serde(default)]
    pub data: IndexMap<String, GeneratorSpec>,
    /// Emission interval in seconds per channel.
    #[serde(default)]
    pub timing: IndexMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Phase {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "autopilotMode")]
    pub autopilot_mode: Option<AutopilotMode>,
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Event {
    /// Seconds from the start of the owning phase.
    #[serde(
        default,
        alias = "time_offset",
        alias = "timeOffset",
        alias = "timeOffsetWithinPhase"
    )]
    pub time: f64,
    pub command: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub value: String,
    #[serde(default)]
    pub description: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Integer(i64),
        Number(f64),
        Flag(bool),
    }

    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        Some(Scalar::Text(text)) => text,
        Some(Scalar::Integer(value)) => value.to_string(),
        Some(Scalar::Number(value)) => value.to_string(),
        Some(Scalar::Flag(value)) => value.to_string(),
        None => String::new(),
    })
}

/// Scenario event command after parsing `command`/`value`.
#[derive(Debug, Clone, PartialEq)]
pub enum EventCommand {
    EngageAutopilot,
    DisengageAutopilot,
    SetAutopilotMode(AutopilotMode),
    SetTargetHeading(f64),
    AdjustHeading(f64),
    OverrideChannel { channel: String, value: f64 },
    ClearOverride(String),
    RaiseAlarm,
    ClearAlarm,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventCommandError {
    #[error("unknown event command '{0}'")]
    Unknown(String),
    #[error("invalid value '{value}' for {command}: {reason}")]
    InvalidValue {
        command: String,
        value: String,
        reason: String,
    },
}

impl EventCommand {
    /// Commands match case-insensitively, in snake or camel case.
    pub fn parse(command: &str, value: &str) -> Result<Self, EventCommandError> {
        let key: String = command
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        let value = value.trim();
        let invalid = |reason: &str| EventCommandError::InvalidValue {
            command: command.to_owned(),
            value: value.to_owned(),
            reason: reason.to_owned(),
        };
        let degrees = || {
            value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid("expected a number of degrees"))
        };

        match key.as_str() {
            "engageautopilot" => Ok(EventCommand::EngageAutopilot),
            "disengageautopilot" => Ok(EventCommand::DisengageAutopilot),
            "setautopilotmode" => value
                .parse::<AutopilotMode>()
                .map(EventCommand::SetAutopilotMode)
                .map_err(|_| invalid("expected standby, auto, wind or track")),
            "settargetheading" => degrees().map(EventCommand::SetTargetHeading),
            "adjustheading" => degrees().map(EventCommand::AdjustHeading),
            "overridechannel" => {
                let (channel, raw) = value
                    .split_once('=')
                    .ok_or_else(|| invalid("expected <channel>=<value>"))?;
                let channel = channel.trim();
                if channel.is_empty() {
                    return Err(invalid("channel name is empty"));
                }
                let parsed = raw
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| invalid("override value is not a number"))?;
                Ok(EventCommand::OverrideChannel {
                    channel: channel.to_owned(),
                    value: parsed,
                })
            }
            "clearoverride" => {
                if value.is_empty() {
                    Err(invalid("expected a channel name"))
                } else {
                    Ok(EventCommand::ClearOverride(value.to_owned()))
                }
            }
            "raisealarm" => Ok(EventCommand::RaiseAlarm),
            "clearalarm" => Ok(EventCommand::ClearAlarm),
            _ => Err(EventCommandError::Unknown(command.to_owned())),
        }
    }

    /// The autopilot intent this command maps to, if it targets the pilot.
    pub fn intent(&self) -> Option<AutopilotIntent> {
        match self {
            EventCommand::EngageAutopilot => Some(AutopilotIntent::Engage),
            EventCommand::DisengageAutopilot => Some(AutopilotIntent::Disengage),
            EventCommand::SetAutopilotMode(mode) => Some(AutopilotIntent::SetMode(*mode)),
            EventCommand::SetTargetHeading(heading) => {
                Some(AutopilotIntent::SetTargetHeading(*heading))
            }
            EventCommand::AdjustHeading(delta) => Some(AutopilotIntent::AdjustHeading(*delta)),
            EventCommand::RaiseAlarm => Some(AutopilotIntent::SetAlarm(true)),
            EventCommand::ClearAlarm => Some(AutopilotIntent::SetAlarm(false)),
            EventCommand::OverrideChannel { .. } | EventCommand::ClearOverride(_) => None,
        }
    }
}

impl Event {
    pub fn parsed(&self) -> Result<EventCommand, EventCommandError> {
        EventCommand::parse(&self.command, &self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioFormat {
    Yaml,
    Json,
}

impl ScenarioFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("yaml") | Some("yml") => Some(ScenarioFormat::Yaml),
            Some("json") => Some(ScenarioFormat::Json),
            _ => None,
        }
    }
}

impl ScenarioConfig {
    /// Parse and validate; warnings are discarded.
    pub fn load(path: &Path) -> Result<Self, ScenarioLoadError> {
        Self::load_with_report(path).map(|(config, _)| config)
    }

    /// Parse and validate, returning the report so callers can surface warnings.
    pub fn load_with_report(path: &Path) -> Result<(Self, ValidationReport), ScenarioLoadError> {
        let format = ScenarioFormat::from_path(path)
            .ok_or_else(|| ScenarioLoadError::UnsupportedFormat(path.to_path_buf()))?;
        let contents = fs::read_to_string(path).map_err(|source| ScenarioLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&contents, format).map_err(|message| ScenarioLoadError::Format {
            path: path.to_path_buf(),
            message,
        })?;
        let report = validate(&config);
        if !report.valid {
            return Err(ScenarioLoadError::Invalid(report));
        }
        debug!(
            scenario = %config.name,
            path = %path.display(),
            phases = config.phases.len(),
            channels = config.data.len(),
            warnings = report.warnings.len(),
            "scenario loaded"
        );
        Ok((config, report))
    }

    /// Parse without validating.
    pub fn parse(contents: &str, format: ScenarioFormat) -> Result<Self, String> {
        match format {
            ScenarioFormat::Yaml => serde_yaml::from_str(contents).map_err(|err| err.to_string()),
            ScenarioFormat::Json => serde_json::from_str(contents).map_err(|err| err.to_string()),
        }
    }

    /// Sum of phase durations.
    pub fn phase_total(&self) -> f64 {
        self.phases.iter().map(|phase| phase.duration).sum()
    }

    /// Smallest emission interval, used as the scheduler period.
    pub fn min_interval(&self) -> Option<f64> {
        self.timing
            .values()
            .copied()
            .filter(|interval| interval.is_finite() && *interval > 0.0)
            .min_by(f64::total_cmp)
    }
}
