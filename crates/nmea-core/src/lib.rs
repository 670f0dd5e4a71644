//! ---
//! nmea_section: "01-core-functionality"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Orchestrator wiring the scenario engine to the transport bridge."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Bridge orchestrator: scenario scheduling, inbound routing and transport
//! lifecycle behind a single handle.

pub mod orchestrator;
pub mod router;
pub mod simulation;

pub use orchestrator::{BridgeOrchestrator, OrchestratorHandle};
pub use router::{InboundRouter, RouteOutcome};
pub use simulation::{Advance, ScenarioSnapshot, SharedSimulation, Simulation};
