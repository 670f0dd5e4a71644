//! ---
//! nmea_section: "01-core-functionality"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Runtime helpers supporting the orchestrator."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Scheduling helpers shared by the simulator and the transport bridge.

pub mod scheduling;

pub use scheduling::{RateLimiter, TaskGroup};
