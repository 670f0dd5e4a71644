//! ---
//! nmea_section: "11-simulation"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Scenario runtime, generators and autopilot simulation."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Structural checks for scenario documents.
//!
//! Errors make a scenario unloadable. Warnings are surfaced to the operator
//! but never block a run.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::channels;
use crate::generator::GeneratorSpec;
use crate::scenario::{EventCommandError, ScenarioConfig};

const DURATION_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dotted location inside the document, e.g. `phases[1].events[0].time`.
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue {
            path: path.into(),
            message: message.into(),
        });
    }

    fn finish(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        )?;
        for issue in &self.errors {
            write!(f, "; {}", issue)?;
        }
        Ok(())
    }
}

fn check_finite(report: &mut ValidationReport, path: String, value: f64) -> bool {
    if value.is_finite() {
        true
    } else {
        report.error(path, "must be a finite number");
        false
    }
}

/// Validate a parsed scenario.
pub fn validate(config: &ScenarioConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if config.name.trim().is_empty() {
        report.error("name", "scenario name is required");
    }
    if config.version.trim().is_empty() {
        report.error("version", "scenario version is required");
    }
    if config.description.trim().is_empty() {
        report.warn("description", "description is empty");
    }
    if config.category.trim().is_empty() {
        report.warn("category", "category is empty");
    }
    if check_finite(&mut report, "duration".into(), config.duration) && config.duration <= 0.0 {
        report.error("duration", "duration must be greater than zero");
    }

    validate_phases(config, &mut report);
    validate_channels(config, &mut report);
    report.finish()
}

fn validate_phases(config: &ScenarioConfig, report: &mut ValidationReport) {
    if config.phases.is_empty() {
        report.error("phases", "at least one phase is required");
        return;
    }

    for (index, phase) in config.phases.iter().enumerate() {
        let base = format!("phases[{}]", index);
        let duration_ok = check_finite(report, format!("{base}.duration"), phase.duration);
        if duration_ok && phase.duration <= 0.0 {
            report.error(
                format!("{base}.duration"),
                format!("phase '{}' must have a positive duration", phase.name),
            );
        }

        for (event_index, event) in phase.events.iter().enumerate() {
            let event_path = format!("{base}.events[{}]", event_index);
            if check_finite(report, format!("{event_path}.time"), event.time) {
                if event.time < 0.0 {
                    report.error(format!("{event_path}.time"), "event offset cannot be negative");
                } else if duration_ok && event.time > phase.duration {
                    report.error(
                        format!("{event_path}.time"),
                        format!(
                            "event offset {}s exceeds phase duration {}s",
                            event.time, phase.duration
                        ),
                    );
                }
            }
            match event.parsed() {
                Ok(_) => {}
                Err(EventCommandError::Unknown(command)) => report.warn(
                    format!("{event_path}.command"),
                    format!("unknown command '{}' will be skipped", command),
                ),
                Err(err @ EventCommandError::InvalidValue { .. }) => {
                    report.error(format!("{event_path}.value"), err.to_string())
                }
            }
        }
    }

    let total = config.phase_total();
    if total.is_finite()
        && config.duration.is_finite()
        && (total - config.duration).abs() > DURATION_TOLERANCE
    {
        report.warn(
            "phases",
            format!(
                "phase durations sum to {}s but scenario duration is {}s",
                total, config.duration
            ),
        );
    }
}

fn validate_channels(config: &ScenarioConfig, report: &mut ValidationReport) {
    for (channel, interval) in &config.timing {
        let path = format!("timing.{}", channel);
        if !config.data.contains_key(channel) {
            report.error(path.clone(), "timing entry has no matching data channel");
        }
        if check_finite(report, path.clone(), *interval) && *interval <= 0.0 {
            report.error(path, "emission interval must be greater than zero");
        }
    }

    for (channel, spec) in &config.data {
        let path = format!("data.{}", channel);
        if !config.timing.contains_key(channel) && !channels::is_companion(channel) {
            report.error(path.clone(), "data channel has no timing entry");
        }
        if !channels::is_known(channel) {
            report.warn(
                path.clone(),
                "channel has no sentence binding and will not be emitted",
            );
        }
        validate_generator(&path, spec, report);
    }
}

fn validate_generator(path: &str, spec: &GeneratorSpec, report: &mut ValidationReport) {
    let mut finite = true;
    for (name, value) in spec.parameters() {
        finite &= check_finite(report, format!("{path}.{name}"), value);
    }
    if !finite {
        return;
    }
    match *spec {
        GeneratorSpec::Constant { .. } => {}
        GeneratorSpec::SineWave { frequency, .. } => {
            if frequency < 0.0 {
                report.error(format!("{path}.frequency"), "frequency cannot be negative");
            }
        }
        GeneratorSpec::Gaussian {
            mean,
            std_dev,
            min,
            max,
        } => {
            if min > max {
                report.error(
                    format!("{path}.min"),
                    format!("min {} is greater than max {}", min, max),
                );
            }
            if std_dev < 0.0 {
                report.error(format!("{path}.std_dev"), "standard deviation cannot be negative");
            }
            if min <= max && !(min..=max).contains(&mean) {
                report.warn(
                    format!("{path}.mean"),
                    format!("mean {} lies outside [{}, {}]", mean, min, max),
                );
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdDirection {
    /// Alarm when the value rises past the levels.
    Above,
    /// Alarm when the value falls past the levels.
    Below,
}

/// Two-level alarm threshold with optional hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub warning: f64,
    pub critical: f64,
    pub direction: ThresholdDirection,
    #[serde(default)]
    pub hysteresis: f64,
}

/// Severity levels must escalate in the alarm direction. A hysteresis wider
/// than the gap between levels is accepted with a warning.
pub fn validate_threshold_order(thresholds: &ThresholdSet) -> ValidationReport {
    let mut report = ValidationReport::default();
    let finite = check_finite(&mut report, "warning".into(), thresholds.warning)
        & check_finite(&mut report, "critical".into(), thresholds.critical)
        & check_finite(&mut report, "hysteresis".into(), thresholds.hysteresis);
    if !finite {
        return report.finish();
    }

    let ordered = match thresholds.direction {
        ThresholdDirection::Above => thresholds.warning < thresholds.critical,
        ThresholdDirection::Below => thresholds.warning > thresholds.critical,
    };
    if !ordered {
        let relation = match thresholds.direction {
            ThresholdDirection::Above => "below",
            ThresholdDirection::Below => "above",
        };
        report.error(
            "critical",
            format!(
                "warning level {} must be {} critical level {}",
                thresholds.warning, relation, thresholds.critical
            ),
        );
    }

    if thresholds.hysteresis < 0.0 {
        report.error("hysteresis", "hysteresis cannot be negative");
    } else if ordered {
        let gap = (thresholds.critical - thresholds.warning).abs();
        if thresholds.hysteresis >= gap {
            report.warn(
                "hysteresis",
                format!(
                    "hysteresis {} is not smaller than the {} gap between levels",
                    thresholds.hysteresis, gap
                ),
            );
        }
    }
    report.finish()
}
