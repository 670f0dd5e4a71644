//! ---
//! nmea_section: "01-core-functionality"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Routes inbound lines and frames to the autopilot or reading stream."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Inbound traffic routing: autopilot commands to the simulation, everything
//! else through the catalog to reading subscribers.
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use nmea_codec::n2k::decode_frame;
use nmea_codec::{decode_verified, Catalog, CodecError, ParsedReading, RawSentence, ReadingSource, TransportKind};
use nmea_common::{Mode, ProtocolMode};
use nmea_metrics::{BridgeMetrics, DropReason};
use nmea_net::{ConnectionRegistry, InboundHandler, OutboundMessage};
use nmea_sim::{decode_command, AutopilotIntent, AutopilotState, CommandError};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::simulation::SharedSimulation;

/// What happened to one inbound sentence.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// Applied to the autopilot.
    Command(AutopilotIntent),
    /// Parsed and published to reading subscribers.
    Reading,
    /// Dropped for the given reason.
    Dropped(DropReason),
}

pub struct InboundRouter {
    catalog: Arc<Catalog>,
    simulation: SharedSimulation,
    registry: Arc<ConnectionRegistry>,
    readings: broadcast::Sender<ParsedReading>,
    metrics: BridgeMetrics,
    mode: Mode,
    protocol: ProtocolMode,
}

impl std::fmt::Debug for InboundRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundRouter")
            .field("mode", &self.mode)
            .field("protocol", &self.protocol)
            .field("reading_subscribers", &self.readings.receiver_count())
            .finish()
    }
}

impl InboundRouter {
    pub fn new(
        catalog: Arc<Catalog>,
        simulation: SharedSimulation,
        registry: Arc<ConnectionRegistry>,
        readings: broadcast::Sender<ParsedReading>,
        mode: Mode,
        protocol: ProtocolMode,
    ) -> Self {
        let metrics = registry.metrics().clone();
        Self {
            catalog,
            simulation,
            registry,
            readings,
            metrics,
            mode,
            protocol,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ParsedReading> {
        self.readings.subscribe()
    }

    /// Decode and dispatch one line.
    pub fn route_line(&self, line: &str, source: ReadingSource) -> RouteOutcome {
        match decode_verified(line) {
            Ok(raw) => self.route_sentence(&raw, source),
            Err(CodecError::ChecksumMismatch { expected, actual }) => {
                debug!(line, expected, ?actual, "checksum mismatch");
                self.drop_with(DropReason::Checksum)
            }
            Err(err @ CodecError::MalformedSentence { .. }) => {
                debug!(line, error = %err, "malformed sentence");
                self.drop_with(DropReason::Malformed)
            }
        }
    }

    /// Dispatch a verified sentence.
    pub fn route_sentence(&self, raw: &RawSentence, source: ReadingSource) -> RouteOutcome {
        match decode_command(raw) {
            Ok(intent) => return self.apply_command(raw, intent),
            Err(CommandError::NotAutopilotFrame) => {}
            Err(CommandError::UnknownCommand(code)) => {
                info!(code, "unknown autopilot command ignored");
                self.metrics.record_autopilot_command("unknown");
                return self.drop_with(DropReason::UnknownCommand);
            }
            Err(err) => {
                debug!(error = %err, "autopilot command rejected");
                self.metrics.record_autopilot_command("malformed");
                return self.drop_with(DropReason::Malformed);
            }
        }

        match self.catalog.parse(raw, source.clone()) {
            Ok(Some(reading)) => {
                if self.mode.relays_real_data() && source.transport == TransportKind::Upstream {
                    self.registry
                        .broadcast(OutboundMessage::sentence(raw));
                }
                let _ = self.readings.send(reading);
                RouteOutcome::Reading
            }
            Ok(None) => {
                trace!(address = %raw.address(), "unknown sentence type");
                self.drop_with(DropReason::UnknownType)
            }
            Err(failure) => {
                debug!(error = %failure, "sentence parse failure");
                self.drop_with(DropReason::ParseFailure)
            }
        }
    }

    /// Apply an intent from any source and broadcast the resulting status.
    pub fn send_autopilot_command(&self, intent: AutopilotIntent) -> AutopilotState {
        let simulation = &mut *self.simulation.lock();
        simulation.apply(intent);
        self.metrics.record_autopilot_command("applied");
        self.broadcast_status(simulation);
        simulation.autopilot().clone()
    }

    fn apply_command(&self, raw: &RawSentence, intent: AutopilotIntent) -> RouteOutcome {
        let simulation = &mut *self.simulation.lock();
        match simulation.handle_command(raw) {
            Ok(_) => {
                info!(?intent, "autopilot command applied");
                self.metrics.record_autopilot_command("applied");
                self.broadcast_status(simulation);
                RouteOutcome::Command(intent)
            }
            Err(err) => {
                debug!(error = %err, "autopilot command rejected");
                self.drop_with(DropReason::Malformed)
            }
        }
    }

    fn broadcast_status(&self, simulation: &crate::simulation::Simulation) {
        if !self.mode.runs_simulation() || simulation.is_stopped() {
            return;
        }
        for message in simulation.status_messages(&self.catalog, Utc::now(), self.protocol) {
            self.registry.broadcast(message);
        }
    }

    fn drop_with(&self, reason: DropReason) -> RouteOutcome {
        self.metrics.record_dropped(reason);
        RouteOutcome::Dropped(reason)
    }
}

#[async_trait]
impl InboundHandler for InboundRouter {
    async fn handle_line(&self, line: &str, source: ReadingSource) {
        self.route_line(line, source);
    }

    async fn handle_frame(&self, frame: &[u8], source: ReadingSource) {
        match decode_frame(frame) {
            Ok(frame) => {
                self.route_sentence(&frame.to_pcdin(), source);
            }
            Err(err) => {
                debug!(error = %err, "malformed nmea 2000 frame");
                self.drop_with(DropReason::Malformed);
            }
        }
    }
}
