//! ---
//! nmea_section: "11-simulation"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Scenario runtime, generators and autopilot simulation."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Autopilot command interpreter.
//!
//! Commands arrive as `$PCDIN` sentences carrying PGN 126720 (`01EF00`) with a
//! Raymarine keystroke payload:
//!
//! ```text
//! 3B 9F  F0 81  <cmd> <!cmd>  [args...]
//! ```
//!
//! | cmd | meaning                                   |
//! |-----|-------------------------------------------|
//! | 01  | auto (engage)                             |
//! | 02  | standby (disengage)                       |
//! | 23  | wind vane mode                            |
//! | 28  | track mode                                |
//! | 05  | -1°                                       |
//! | 06  | -10°                                      |
//! | 07  | +1°                                       |
//! | 08  | +10°                                      |
//! | 50  | set heading, u16 LE in 0.0001 rad         |
//! | 60  | status request                            |
use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use nmea_codec::n2k::{self, pgn, pilot_mode, PgnFrame, RAYMARINE_HEADER};
use nmea_codec::{Catalog, GenerateError, RawSentence, SentenceType, SyntheticInputs};
use nmea_common::AutopilotConfig;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::CommandError;

const COMMAND_GROUP: [u8; 2] = [0xF0, 0x81];
const AUTOPILOT_SOURCE: u8 = 204;

const CMD_AUTO: u8 = 0x01;
const CMD_STANDBY: u8 = 0x02;
const CMD_MINUS_1: u8 = 0x05;
const CMD_MINUS_10: u8 = 0x06;
const CMD_PLUS_1: u8 = 0x07;
const CMD_PLUS_10: u8 = 0x08;
const CMD_WIND: u8 = 0x23;
const CMD_TRACK: u8 = 0x28;
const CMD_SET_HEADING: u8 = 0x50;
const CMD_STATUS: u8 = 0x60;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AutopilotMode {
    #[default]
    Standby,
    Auto,
    Wind,
    Track,
}

impl AutopilotMode {
    fn code(&self) -> u16 {
        match self {
            AutopilotMode::Standby => pilot_mode::STANDBY,
            AutopilotMode::Auto => pilot_mode::AUTO,
            AutopilotMode::Wind => pilot_mode::WIND,
            AutopilotMode::Track => pilot_mode::TRACK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutopilotState {
    pub engaged: bool,
    pub mode: AutopilotMode,
    pub current_heading: f64,
    pub target_heading: f64,
    pub locked_heading: f64,
    pub rudder_angle: f64,
    pub alarm: bool,
    pub off_course: bool,
}

impl AutopilotState {
    fn at_heading(heading: f64) -> Self {
        let heading = normalize(heading);
        Self {
            engaged: false,
            mode: AutopilotMode::Standby,
            current_heading: heading,
            target_heading: heading,
            locked_heading: heading,
            rudder_angle: 0.0,
            alarm: false,
            off_course: false,
        }
    }

    /// Signed error from current to target heading, in `(-180, 180]`.
    pub fn heading_error(&self) -> f64 {
        signed_difference(self.target_heading, self.current_heading)
    }
}

/// A decoded command, from the wire or from a scenario event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "value", rename_all = "snake_case")]
pub enum AutopilotIntent {
    Engage,
    Disengage,
    SetMode(AutopilotMode),
    SetTargetHeading(f64),
    AdjustHeading(f64),
    RequestStatus,
    SetAlarm(bool),
}

fn normalize(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 || !wrapped.is_finite() {
        0.0
    } else {
        wrapped
    }
}

fn signed_difference(to: f64, from: f64) -> f64 {
    let diff = normalize(to - from);
    if diff > 180.0 {
        diff - 360.0
    } else {
        diff
    }
}

/// Owns [`AutopilotState`]; the single entry point for every mutation.
#[derive(Debug, Clone)]
pub struct AutopilotInterpreter {
    state: AutopilotState,
    limits: AutopilotConfig,
}

impl AutopilotInterpreter {
    pub fn new(limits: AutopilotConfig) -> Self {
        Self {
            state: AutopilotState::at_heading(limits.initial_heading),
            limits,
        }
    }

    pub fn state(&self) -> &AutopilotState {
        &self.state
    }

    pub fn limits(&self) -> &AutopilotConfig {
        &self.limits
    }

    /// Decode and apply an inbound sentence. Nothing changes on error.
    pub fn handle_sentence(
        &mut self,
        sentence: &RawSentence,
    ) -> Result<AutopilotIntent, CommandError> {
        let intent = decode_command(sentence)?;
        self.apply(intent);
        Ok(intent)
    }

    pub fn apply(&mut self, intent: AutopilotIntent) {
        let state = &mut self.state;
        match intent {
            AutopilotIntent::Engage => {
                if !state.engaged {
                    state.target_heading = state.current_heading;
                }
                state.engaged = true;
                if state.mode == AutopilotMode::Standby {
                    state.mode = AutopilotMode::Auto;
                }
                state.locked_heading = state.target_heading;
            }
            AutopilotIntent::Disengage | AutopilotIntent::SetMode(AutopilotMode::Standby) => {
                state.engaged = false;
                state.mode = AutopilotMode::Standby;
                state.rudder_angle = 0.0;
                state.off_course = false;
            }
            AutopilotIntent::SetMode(mode) => {
                if !state.engaged {
                    state.target_heading = state.current_heading;
                }
                state.engaged = true;
                state.mode = mode;
                state.locked_heading = state.target_heading;
            }
            AutopilotIntent::SetTargetHeading(heading) => {
                if heading.is_finite() {
                    state.target_heading = normalize(heading);
                    state.locked_heading = state.target_heading;
                }
            }
            AutopilotIntent::AdjustHeading(delta) => {
                if delta.is_finite() {
                    state.target_heading = normalize(state.target_heading + delta);
                    state.locked_heading = state.target_heading;
                }
            }
            AutopilotIntent::RequestStatus => {}
            AutopilotIntent::SetAlarm(alarm) => state.alarm = alarm,
        }
        debug!(?intent, engaged = state.engaged, mode = %state.mode, target = state.target_heading, "autopilot intent applied");
    }

    /// Track the measured heading while the pilot is in standby.
    pub fn observe_heading(&mut self, heading: f64) {
        if !self.state.engaged && heading.is_finite() {
            self.state.current_heading = normalize(heading);
            self.state.target_heading = self.state.current_heading;
        }
    }

    /// Advance the helm model by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        if !(dt.is_finite() && dt > 0.0) {
            return;
        }
        let limits = &self.limits;
        let state = &mut self.state;
        if !state.engaged {
            state.rudder_angle = 0.0;
            return;
        }
        let error = state.heading_error();
        let max_turn = limits.turn_rate * dt;
        state.current_heading = normalize(state.current_heading + error.clamp(-max_turn, max_turn));
        state.rudder_angle =
            (error * limits.rudder_gain).clamp(-limits.max_rudder_angle, limits.max_rudder_angle);
        let remaining = state.heading_error();
        state.off_course = remaining.abs() > limits.off_course_limit;
        if state.off_course {
            state.alarm = true;
        }
    }

    /// PCDIN pilot mode, PCDIN locked heading and RSA reflecting the current state.
    pub fn status_sentences(
        &self,
        catalog: &Catalog,
        timestamp: DateTime<Utc>,
    ) -> Result<Vec<RawSentence>, GenerateError> {
        let mut sentences = Vec::with_capacity(3);
        for frame in self.status_frames(timestamp) {
            let inputs = SyntheticInputs::new(timestamp)
                .with_text("pgn", format!("{:06X}", frame.pgn))
                .with_text("payload", hex::encode_upper(&frame.data))
                .with_value("source", frame.source as f64);
            sentences.push(catalog.generate(SentenceType::Pcdin, &inputs)?);
        }
        let rudder = SyntheticInputs::new(timestamp).with_value("rudder_angle", self.state.rudder_angle);
        sentences.push(catalog.generate(SentenceType::Rsa, &rudder)?);
        Ok(sentences)
    }

    /// Binary equivalents of the PCDIN status sentences.
    pub fn status_frames(&self, timestamp: DateTime<Utc>) -> Vec<PgnFrame> {
        let ms = crate::channels::frame_millis(timestamp);
        vec![
            PgnFrame::new(pgn::PILOT_MODE, AUTOPILOT_SOURCE, n2k::pilot_mode(self.state.mode.code())).at(ms),
            PgnFrame::new(
                pgn::LOCKED_HEADING,
                AUTOPILOT_SOURCE,
                n2k::locked_heading(self.state.locked_heading),
            )
            .at(ms),
        ]
    }
}

/// Decode a PCDIN autopilot command without touching any state.
pub fn decode_command(sentence: &RawSentence) -> Result<AutopilotIntent, CommandError> {
    if sentence.sentence_id != "PCDIN" {
        return Err(CommandError::NotAutopilotFrame);
    }
    let frame = PgnFrame::from_pcdin(sentence)
        .map_err(|err| CommandError::MalformedPayload(err.to_string()))?;
    if frame.pgn != pgn::PROPRIETARY_COMMAND {
        return Err(CommandError::NotAutopilotFrame);
    }
    let data = frame.data.as_slice();
    if data.len() < 6 {
        return Err(CommandError::MalformedPayload(format!(
            "payload of {} bytes is too short",
            data.len()
        )));
    }
    if data[..2] != RAYMARINE_HEADER {
        return Err(CommandError::NotAutopilotFrame);
    }
    if data[2..4] != COMMAND_GROUP {
        return Err(CommandError::MalformedPayload(format!(
            "unexpected command group {:02X}{:02X}",
            data[2], data[3]
        )));
    }
    let command = data[4];
    if data[5] != !command {
        return Err(CommandError::MalformedPayload(format!(
            "complement {:02X} does not match command {:02X}",
            data[5], command
        )));
    }
    match command {
        CMD_AUTO => Ok(AutopilotIntent::Engage),
        CMD_STANDBY => Ok(AutopilotIntent::Disengage),
        CMD_WIND => Ok(AutopilotIntent::SetMode(AutopilotMode::Wind)),
        CMD_TRACK => Ok(AutopilotIntent::SetMode(AutopilotMode::Track)),
        CMD_MINUS_1 => Ok(AutopilotIntent::AdjustHeading(-1.0)),
        CMD_MINUS_10 => Ok(AutopilotIntent::AdjustHeading(-10.0)),
        CMD_PLUS_1 => Ok(AutopilotIntent::AdjustHeading(1.0)),
        CMD_PLUS_10 => Ok(AutopilotIntent::AdjustHeading(10.0)),
        CMD_SET_HEADING => {
            let Some(raw) = data.get(6..8) else {
                return Err(CommandError::MalformedPayload(
                    "set heading without argument".into(),
                ));
            };
            let radians = u16::from_le_bytes([raw[0], raw[1]]) as f64 / 10_000.0;
            Ok(AutopilotIntent::SetTargetHeading(normalize(radians * 180.0 / PI)))
        }
        CMD_STATUS => Ok(AutopilotIntent::RequestStatus),
        other => Err(CommandError::UnknownCommand(other)),
    }
}

/// Build the PCDIN sentence a client would send for `intent`.
pub fn encode_command(intent: AutopilotIntent) -> Result<RawSentence, CommandError> {
    let (command, args): (u8, Vec<u8>) = match intent {
        AutopilotIntent::Engage | AutopilotIntent::SetMode(AutopilotMode::Auto) => (CMD_AUTO, vec![]),
        AutopilotIntent::Disengage | AutopilotIntent::SetMode(AutopilotMode::Standby) => {
            (CMD_STANDBY, vec![])
        }
        AutopilotIntent::SetMode(AutopilotMode::Wind) => (CMD_WIND, vec![]),
        AutopilotIntent::SetMode(AutopilotMode::Track) => (CMD_TRACK, vec![]),
        AutopilotIntent::AdjustHeading(delta) if delta == -1.0 => (CMD_MINUS_1, vec![]),
        AutopilotIntent::AdjustHeading(delta) if delta == -10.0 => (CMD_MINUS_10, vec![]),
        AutopilotIntent::AdjustHeading(delta) if delta == 1.0 => (CMD_PLUS_1, vec![]),
        AutopilotIntent::AdjustHeading(delta) if delta == 10.0 => (CMD_PLUS_10, vec![]),
        AutopilotIntent::SetTargetHeading(heading) if heading.is_finite() => {
            let raw = (normalize(heading).to_radians() * 10_000.0).round() as u16;
            (CMD_SET_HEADING, raw.to_le_bytes().to_vec())
        }
        AutopilotIntent::RequestStatus => (CMD_STATUS, vec![]),
        other => return Err(CommandError::Unencodable(format!("{:?}", other))),
    };
    Ok(command_sentence(command, &args))
}

/// Raw keystroke frame; exposed so tests and tools can send arbitrary command bytes.
pub fn command_sentence(command: u8, args: &[u8]) -> RawSentence {
    let mut data = RAYMARINE_HEADER.to_vec();
    data.extend_from_slice(&COMMAND_GROUP);
    data.extend_from_slice(&[command, !command]);
    data.extend_from_slice(args);
    PgnFrame::new(pgn::PROPRIETARY_COMMAND, 0, data).to_pcdin()
}
