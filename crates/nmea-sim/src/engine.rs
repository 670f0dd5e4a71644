//! ---
//! nmea_section: "11-simulation"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Scenario runtime, generators and autopilot simulation."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Scenario state machine.
//!
//! `Idle -> Running -> Complete`. Time only advances through [`ScenarioEngine::tick`];
//! phase overflow carries into the next phase and events fire once each, in
//! scenario time order, even when a single tick crosses several phases.
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use nmea_codec::n2k::PgnFrame;
use nmea_codec::{Catalog, GenerateError, RawSentence, SyntheticInputs};
use nmea_common::ProtocolMode;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{debug, info, warn};

use crate::autopilot::{AutopilotIntent, AutopilotInterpreter, AutopilotState};
use crate::channels::{self, Binding};
use crate::error::ScenarioLoadError;
use crate::generator::channel_salt;
use crate::scenario::{Event, EventCommand, ScenarioConfig};
use crate::validator::{validate, ValidationIssue, ValidationReport};

/// Last emission time, in scenario seconds, per channel.
pub type EmissionLedger = BTreeMap<String, f64>;

const DUE_EPSILON: f64 = 1e-9;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EngineStatus {
    #[default]
    Idle,
    Running,
    Complete,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScenarioState {
    pub phase_index: usize,
    pub phase_elapsed: f64,
    pub scenario_elapsed: f64,
    pub phase_progress: f64,
    pub scenario_progress: f64,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    Applied,
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FiredEvent {
    pub phase_index: usize,
    pub event_index: usize,
    /// Scenario time the event was scheduled for.
    pub at: f64,
    pub command: String,
    pub outcome: EventOutcome,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickReport {
    pub entered_phases: Vec<usize>,
    pub fired: Vec<FiredEvent>,
    pub completed: bool,
}

/// Output of one scheduler pass.
#[derive(Debug, Clone, Default)]
pub struct Emission {
    pub channels: Vec<String>,
    pub sentences: Vec<RawSentence>,
    pub frames: Vec<PgnFrame>,
}

impl Emission {
    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty() && self.frames.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ScenarioEngine {
    config: ScenarioConfig,
    warnings: Vec<ValidationIssue>,
    seed: u64,
    status: EngineStatus,
    state: ScenarioState,
    fired: BTreeSet<(usize, usize)>,
    emissions: EmissionLedger,
    overrides: BTreeMap<String, f64>,
}

impl ScenarioEngine {
    /// Load and validate a scenario document. The engine starts `Idle`.
    pub fn load_scenario(path: &Path, seed: u64) -> Result<Self, ScenarioLoadError> {
        let (config, report) = ScenarioConfig::load_with_report(path)?;
        Ok(Self::with_report(config, report, seed))
    }

    pub fn from_config(config: ScenarioConfig, seed: u64) -> Result<Self, ScenarioLoadError> {
        let report = validate(&config);
        if !report.valid {
            return Err(ScenarioLoadError::Invalid(report));
        }
        Ok(Self::with_report(config, report, seed))
    }

    fn with_report(config: ScenarioConfig, report: ValidationReport, seed: u64) -> Self {
        for warning in &report.warnings {
            warn!(scenario = %config.name, path = %warning.path, "{}", warning.message);
        }
        Self {
            config,
            warnings: report.warnings,
            seed,
            status: EngineStatus::Idle,
            state: ScenarioState::default(),
            fired: BTreeSet::new(),
            emissions: EmissionLedger::new(),
            overrides: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn state(&self) -> &ScenarioState {
        &self.state
    }

    pub fn emissions(&self) -> &EmissionLedger {
        &self.emissions
    }

    pub fn overrides(&self) -> &BTreeMap<String, f64> {
        &self.overrides
    }

    /// Resume emission bookkeeping from a saved ledger.
    pub fn restore_emissions(&mut self, ledger: EmissionLedger) {
        self.emissions = ledger;
    }

    /// Back to `Idle` at time zero. Overrides and the ledger are cleared.
    pub fn reset(&mut self) {
        self.status = EngineStatus::Idle;
        self.state = ScenarioState::default();
        self.fired.clear();
        self.emissions.clear();
        self.overrides.clear();
    }

    /// `Idle -> Running`. Fails without changing anything when a bound
    /// sentence cannot be generated from the scenario's channels.
    pub fn start(
        &mut self,
        catalog: &Catalog,
        autopilot: &mut AutopilotInterpreter,
    ) -> Result<(), ScenarioLoadError> {
        if self.status != EngineStatus::Idle {
            return Ok(());
        }
        self.check_bindings(catalog, autopilot.state())?;
        self.status = EngineStatus::Running;
        self.enter_phase(0, autopilot);
        self.refresh_progress();
        info!(
            scenario = %self.config.name,
            duration = self.config.duration,
            phases = self.config.phases.len(),
            seed = self.seed,
            "scenario started"
        );
        Ok(())
    }

    fn check_bindings(
        &self,
        catalog: &Catalog,
        autopilot: &AutopilotState,
    ) -> Result<(), ScenarioLoadError> {
        let inputs = self.inputs(autopilot, Utc::now());
        for channel in self.config.data.keys() {
            for binding in channels::bindings(channel) {
                let fail = |source: GenerateError| ScenarioLoadError::Binding {
                    channel: channel.clone(),
                    sentence: binding.sentence,
                    source,
                };
                if catalog.handler(binding.sentence).is_none() {
                    return Err(fail(GenerateError::Unsupported {
                        sentence_type: binding.sentence,
                    }));
                }
                // Binding texts pick which inputs the generator requires.
                match generate_bound(catalog, binding, &inputs) {
                    Ok(_) => {}
                    Err(err @ GenerateError::MissingInput { .. })
                    | Err(err @ GenerateError::Unsupported { .. }) => return Err(fail(err)),
                    Err(err) => {
                        warn!(channel = %channel, sentence = %binding.sentence, error = %err, "initial value not encodable");
                    }
                }
            }
        }
        Ok(())
    }

    /// Advance simulated time by `delta` seconds. A no-op unless `Running`.
    pub fn tick(&mut self, delta: f64, autopilot: &mut AutopilotInterpreter) -> TickReport {
        let mut report = TickReport::default();
        if self.status != EngineStatus::Running {
            return report;
        }
        if !(delta.is_finite() && delta >= 0.0) {
            warn!(delta, "ignoring invalid tick delta");
            return report;
        }

        let start_phase = self.state.phase_index;
        self.state.scenario_elapsed += delta;
        self.state.phase_elapsed += delta;
        let last_phase = self.config.phases.len().saturating_sub(1);
        while self.state.phase_index < last_phase
            && self.state.phase_elapsed >= self.config.phases[self.state.phase_index].duration
        {
            self.state.phase_elapsed -= self.config.phases[self.state.phase_index].duration;
            self.state.phase_index += 1;
        }

        for phase_index in start_phase..=self.state.phase_index {
            if phase_index > start_phase {
                self.enter_phase(phase_index, autopilot);
                report.entered_phases.push(phase_index);
            }
            let reached = if phase_index < self.state.phase_index {
                self.config.phases[phase_index].duration
            } else {
                self.state.phase_elapsed
            };
            self.fire_events(phase_index, reached, autopilot, &mut report);
        }

        if !autopilot.state().engaged {
            if let Some(heading) = self.channel_value("heading", autopilot.state()) {
                autopilot.observe_heading(heading);
            }
        }
        autopilot.step(delta);

        if self.state.scenario_elapsed >= self.config.duration {
            self.state.is_complete = true;
            self.status = EngineStatus::Complete;
            report.completed = true;
            info!(
                scenario = %self.config.name,
                elapsed = self.state.scenario_elapsed,
                "scenario complete"
            );
        }
        self.refresh_progress();
        report
    }

    fn enter_phase(&self, index: usize, autopilot: &mut AutopilotInterpreter) {
        let Some(phase) = self.config.phases.get(index) else {
            return;
        };
        info!(scenario = %self.config.name, phase = %phase.name, index, "phase entered");
        if let Some(mode) = phase.autopilot_mode {
            autopilot.apply(AutopilotIntent::SetMode(mode));
        }
    }

    fn phase_start(&self, index: usize) -> f64 {
        self.config.phases[..index].iter().map(|phase| phase.duration).sum()
    }

    fn fire_events(
        &mut self,
        phase_index: usize,
        reached: f64,
        autopilot: &mut AutopilotInterpreter,
        report: &mut TickReport,
    ) {
        let mut pending: Vec<(usize, Event)> = self.config.phases[phase_index]
            .events
            .iter()
            .enumerate()
            .filter(|(index, event)| {
                event.time <= reached && !self.fired.contains(&(phase_index, *index))
            })
            .map(|(index, event)| (index, event.clone()))
            .collect();
        if pending.is_empty() {
            return;
        }
        pending.sort_by(|a, b| a.1.time.total_cmp(&b.1.time));
        let phase_start = self.phase_start(phase_index);

        for (event_index, event) in pending {
            self.fired.insert((phase_index, event_index));
            let outcome = self.apply_event(&event, autopilot);
            debug!(
                phase = phase_index,
                event = event_index,
                command = %event.command,
                value = %event.value,
                ?outcome,
                "scenario event fired"
            );
            report.fired.push(FiredEvent {
                phase_index,
                event_index,
                at: phase_start + event.time,
                command: event.command,
                outcome,
            });
        }
    }

    fn apply_event(&mut self, event: &Event, autopilot: &mut AutopilotInterpreter) -> EventOutcome {
        match event.parsed() {
            Ok(EventCommand::OverrideChannel { channel, value }) => {
                self.overrides.insert(channel, value);
                EventOutcome::Applied
            }
            Ok(EventCommand::ClearOverride(channel)) => {
                self.overrides.remove(&channel);
                EventOutcome::Applied
            }
            Ok(command) => {
                if let Some(intent) = command.intent() {
                    autopilot.apply(intent);
                }
                EventOutcome::Applied
            }
            Err(err) => {
                warn!(command = %event.command, error = %err, "scenario event skipped");
                EventOutcome::Skipped(err.to_string())
            }
        }
    }

    fn refresh_progress(&mut self) {
        let state = &mut self.state;
        let phase_duration = self
            .config
            .phases
            .get(state.phase_index)
            .map(|phase| phase.duration)
            .unwrap_or(0.0);
        state.phase_progress = if phase_duration > 0.0 {
            (state.phase_elapsed / phase_duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        state.scenario_progress = if self.config.duration > 0.0 {
            (state.scenario_elapsed / self.config.duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    /// Value of `channel` at the current scenario time. Overrides win; an
    /// engaged autopilot owns `heading` and `rudder_angle`.
    pub fn channel_value(&self, channel: &str, autopilot: &AutopilotState) -> Option<f64> {
        if let Some(value) = self.overrides.get(channel) {
            return Some(*value);
        }
        if autopilot.engaged {
            match channel {
                "heading" => return Some(autopilot.current_heading),
                "rudder_angle" => return Some(autopilot.rudder_angle),
                _ => {}
            }
        }
        let spec = self.config.data.get(channel)?;
        Some(spec.evaluate(
            self.state.scenario_elapsed,
            self.seed,
            channel_salt(channel),
        ))
    }

    /// Every channel value, ready for the catalog.
    pub fn inputs(&self, autopilot: &AutopilotState, timestamp: DateTime<Utc>) -> SyntheticInputs {
        let mut inputs = SyntheticInputs::new(timestamp);
        let names = self.config.data.keys().chain(self.overrides.keys());
        for channel in names {
            if let Some(value) = self.channel_value(channel, autopilot) {
                inputs.values.insert(channel.clone(), value);
            }
        }
        inputs
    }

    /// Channels whose interval has elapsed since their last emission.
    pub fn due_channels(&self) -> Vec<String> {
        if self.status == EngineStatus::Idle {
            return Vec::new();
        }
        self.config
            .timing
            .iter()
            .filter(|(channel, _)| self.config.data.contains_key(*channel))
            .filter(|(channel, interval)| match self.emissions.get(*channel) {
                None => true,
                Some(last) => self.state.scenario_elapsed - last + DUE_EPSILON >= **interval,
            })
            .map(|(channel, _)| channel.clone())
            .collect()
    }

    /// NMEA 0183 sentences for `due`. A sentence bound to several due
    /// channels is generated once. Failures are logged and skipped.
    pub fn generate_messages(
        &self,
        due: &[String],
        catalog: &Catalog,
        autopilot: &AutopilotState,
        timestamp: DateTime<Utc>,
    ) -> Vec<RawSentence> {
        let inputs = self.inputs(autopilot, timestamp);
        let mut generated: Vec<Binding> = Vec::new();
        let mut sentences = Vec::new();
        for channel in due {
            for binding in channels::bindings(channel) {
                if generated.contains(binding) {
                    continue;
                }
                generated.push(*binding);
                match generate_bound(catalog, binding, &inputs) {
                    Ok(sentence) => sentences.push(sentence),
                    Err(err) => {
                        warn!(channel = %channel, sentence = %binding.sentence, error = %err, "sentence generation skipped");
                    }
                }
            }
        }
        sentences
    }

    /// NMEA 2000 frames for `due` channels that have a PGN equivalent.
    pub fn generate_frames(
        &self,
        due: &[String],
        autopilot: &AutopilotState,
        timestamp: DateTime<Utc>,
    ) -> Vec<PgnFrame> {
        let inputs = self.inputs(autopilot, timestamp);
        let millis = channels::frame_millis(timestamp);
        due.iter()
            .filter_map(|channel| channels::frame_for(channel, &inputs))
            .map(|frame| frame.at(millis))
            .collect()
    }

    pub fn mark_emitted(&mut self, channels: &[String]) {
        for channel in channels {
            self.emissions
                .insert(channel.clone(), self.state.scenario_elapsed);
        }
    }

    /// Generate everything due for `protocol` and record the emissions.
    pub fn emit_due(
        &mut self,
        catalog: &Catalog,
        autopilot: &AutopilotState,
        timestamp: DateTime<Utc>,
        protocol: ProtocolMode,
    ) -> Emission {
        let due = self.due_channels();
        if due.is_empty() {
            return Emission::default();
        }
        let sentences = if protocol.emits_0183() {
            self.generate_messages(&due, catalog, autopilot, timestamp)
        } else {
            Vec::new()
        };
        let frames = if protocol.emits_2000() {
            self.generate_frames(&due, autopilot, timestamp)
        } else {
            Vec::new()
        };
        self.mark_emitted(&due);
        Emission {
            channels: due,
            sentences,
            frames,
        }
    }
}

fn generate_bound(
    catalog: &Catalog,
    binding: &Binding,
    inputs: &SyntheticInputs,
) -> Result<RawSentence, GenerateError> {
    if binding.texts.is_empty() {
        return catalog.generate(binding.sentence, inputs);
    }
    let mut tagged = inputs.clone();
    for (name, value) in binding.texts {
        tagged.texts.insert((*name).to_owned(), (*value).to_owned());
    }
    catalog.generate(binding.sentence, &tagged)
}
