//! ---
//! nmea_section: "01-core-functionality"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Engine and autopilot behind one lock."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Scenario engine and autopilot owned together, so that ticks and inbound
//! commands serialise behind one lock.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use nmea_codec::{Catalog, PgnFrame, RawSentence};
use nmea_common::{AutopilotConfig, ProtocolMode};
use nmea_net::OutboundMessage;
use nmea_sim::{
    AutopilotIntent, AutopilotInterpreter, AutopilotState, CommandError, EngineStatus,
    ScenarioEngine, ScenarioLoadError, ScenarioState, TickReport,
};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

pub type SharedSimulation = Arc<Mutex<Simulation>>;

/// Scenario progress as exposed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioSnapshot {
    pub name: String,
    pub status: EngineStatus,
    pub state: ScenarioState,
}

/// Result of one scheduler pass.
#[derive(Debug, Default)]
pub struct Advance {
    pub report: TickReport,
    pub messages: Vec<OutboundMessage>,
    pub restarted: bool,
}

#[derive(Debug)]
pub struct Simulation {
    engine: Option<ScenarioEngine>,
    autopilot: AutopilotInterpreter,
    stopped: bool,
}

impl Simulation {
    pub fn new(autopilot: AutopilotConfig, engine: Option<ScenarioEngine>) -> Self {
        Self {
            engine,
            autopilot: AutopilotInterpreter::new(autopilot),
            stopped: false,
        }
    }

    pub fn into_shared(self) -> SharedSimulation {
        Arc::new(Mutex::new(self))
    }

    pub fn engine(&self) -> Option<&ScenarioEngine> {
        self.engine.as_ref()
    }

    pub fn autopilot(&self) -> &AutopilotState {
        self.autopilot.state()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Start the loaded scenario. A no-op without one.
    pub fn start(&mut self, catalog: &Catalog) -> Result<(), ScenarioLoadError> {
        match self.engine.as_mut() {
            Some(engine) => engine.start(catalog, &mut self.autopilot),
            None => Ok(()),
        }
    }

    /// Halt the scenario for good. Nothing is emitted afterwards.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
            info!(scenario = %engine.config().name, "scenario stopped");
        }
    }

    pub fn scenario(&self) -> Option<ScenarioSnapshot> {
        self.engine.as_ref().map(|engine| ScenarioSnapshot {
            name: engine.config().name.clone(),
            status: engine.status(),
            state: engine.state().clone(),
        })
    }

    /// Advance simulated time by `delta` seconds and collect everything that
    /// fell due. A completed scenario restarts when `loop_scenario` is set.
    pub fn advance(
        &mut self,
        delta: f64,
        catalog: &Catalog,
        now: DateTime<Utc>,
        protocol: ProtocolMode,
        loop_scenario: bool,
    ) -> Advance {
        let mut advance = Advance::default();
        if self.stopped {
            return advance;
        }
        let Some(engine) = self.engine.as_mut() else {
            return advance;
        };
        advance.report = engine.tick(delta, &mut self.autopilot);
        let emission = engine.emit_due(catalog, self.autopilot.state(), now, protocol);
        advance.messages.extend(emission.sentences.iter().map(OutboundMessage::sentence));
        advance.messages.extend(emission.frames.iter().filter_map(framed));

        if loop_scenario && engine.status() == EngineStatus::Complete {
            engine.reset();
            match engine.start(catalog, &mut self.autopilot) {
                Ok(()) => {
                    advance.restarted = true;
                    info!(scenario = %engine.config().name, "scenario restarted");
                }
                Err(err) => warn!(error = %err, "scenario restart failed"),
            }
        }
        advance
    }

    /// Apply a decoded inbound sentence. State is untouched on error.
    pub fn handle_command(&mut self, sentence: &RawSentence) -> Result<AutopilotIntent, CommandError> {
        self.autopilot.handle_sentence(sentence)
    }

    pub fn apply(&mut self, intent: AutopilotIntent) {
        self.autopilot.apply(intent);
    }

    /// Autopilot status for the wire, reflecting the state at call time.
    pub fn status_messages(
        &self,
        catalog: &Catalog,
        now: DateTime<Utc>,
        protocol: ProtocolMode,
    ) -> Vec<OutboundMessage> {
        let mut messages = Vec::new();
        if protocol.emits_0183() {
            match self.autopilot.status_sentences(catalog, now) {
                Ok(sentences) => messages.extend(sentences.iter().map(OutboundMessage::sentence)),
                Err(err) => warn!(error = %err, "autopilot status generation failed"),
            }
        }
        if protocol.emits_2000() {
            messages.extend(self.autopilot.status_frames(now).iter().filter_map(framed));
        }
        messages
    }
}

fn framed(frame: &PgnFrame) -> Option<OutboundMessage> {
    match OutboundMessage::frame(frame) {
        Ok(message) => Some(message),
        Err(err) => {
            warn!(pgn = frame.pgn, error = %err, "dropping unencodable frame");
            None
        }
    }
}
