//! ---
//! nmea_section: "11-simulation"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Scenario runtime, generators and autopilot simulation."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Fixed mapping from scenario channel names to the sentences and PGNs they drive.
use chrono::{DateTime, Timelike, Utc};
use nmea_codec::n2k::{self, pgn, PgnFrame, WindReference};
use nmea_codec::{SentenceType, SyntheticInputs};

const FEET_TO_METERS: f64 = 0.3048;
const SIMULATOR_SOURCE: u8 = 35;

/// One sentence emitted when a channel falls due. `texts` are passed to the
/// generator as fixed text inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub sentence: SentenceType,
    pub texts: &'static [(&'static str, &'static str)],
}

const fn plain(sentence: SentenceType) -> Binding {
    Binding {
        sentence,
        texts: &[],
    }
}

const DEPTH: &[Binding] = &[plain(SentenceType::Dbt), plain(SentenceType::Dpt)];
const SPEED: &[Binding] = &[plain(SentenceType::Vhw)];
const SOG: &[Binding] = &[plain(SentenceType::Vtg)];
const POSITION: &[Binding] = &[plain(SentenceType::Rmc), plain(SentenceType::Gga)];
const HEADING: &[Binding] = &[plain(SentenceType::Hdg), plain(SentenceType::Hdm)];
const APPARENT_WIND: &[Binding] = &[plain(SentenceType::Mwv), plain(SentenceType::Vwr)];
const TRUE_WIND: &[Binding] = &[
    Binding {
        sentence: SentenceType::Mwv,
        texts: &[("reference", "T")],
    },
    plain(SentenceType::Vwt),
];
const WATER_TEMPERATURE: &[Binding] = &[plain(SentenceType::Mtw)];
const RUDDER: &[Binding] = &[plain(SentenceType::Rsa)];
const ENGINE_SPEED: &[Binding] = &[plain(SentenceType::Rpm)];
const TRANSDUCERS: &[Binding] = &[plain(SentenceType::Xdr)];

/// Inputs consumed by other channels' sentences; they never emit on their own.
pub const COMPANION_CHANNELS: &[&str] = &[
    "longitude",
    "wind_speed",
    "true_wind_speed",
    "cog",
    "depth_offset",
    "engine_instance",
    "pitch",
    "magnetic_variation",
    "altitude",
];

/// Sentences driven by `channel`. Empty for companions and unknown names.
pub fn bindings(channel: &str) -> &'static [Binding] {
    match channel {
        "depth" => DEPTH,
        "speed" => SPEED,
        "sog" => SOG,
        "latitude" => POSITION,
        "heading" => HEADING,
        "wind_angle" => APPARENT_WIND,
        "true_wind_angle" => TRUE_WIND,
        "water_temperature" => WATER_TEMPERATURE,
        "rudder_angle" => RUDDER,
        "rpm" => ENGINE_SPEED,
        "coolant_temperature" | "oil_pressure" | "alternator_voltage" => TRANSDUCERS,
        _ => &[],
    }
}

pub fn is_companion(channel: &str) -> bool {
    COMPANION_CHANNELS.iter().any(|companion| *companion == channel)
}

pub fn is_known(channel: &str) -> bool {
    !bindings(channel).is_empty() || is_companion(channel)
}

/// Frame timestamp: milliseconds since UTC midnight.
pub fn frame_millis(timestamp: DateTime<Utc>) -> u32 {
    timestamp.num_seconds_from_midnight() * 1000 + timestamp.timestamp_subsec_millis().min(999)
}

/// NMEA 2000 frame for a due channel, when it has a PGN equivalent and its
/// companion inputs are present.
pub fn frame_for(channel: &str, inputs: &SyntheticInputs) -> Option<PgnFrame> {
    let value = inputs.value(channel)?;
    let (pgn, data) = match channel {
        "depth" => (
            pgn::WATER_DEPTH,
            n2k::water_depth(
                value * FEET_TO_METERS,
                inputs.value("depth_offset").unwrap_or(0.0),
            ),
        ),
        "speed" => (pgn::SPEED, n2k::speed(value)),
        "heading" => (
            pgn::VESSEL_HEADING,
            n2k::vessel_heading(value, inputs.value("magnetic_variation")),
        ),
        "wind_angle" => (
            pgn::WIND_DATA,
            n2k::wind_data(inputs.value("wind_speed")?, value, WindReference::Apparent),
        ),
        "true_wind_angle" => (
            pgn::WIND_DATA,
            n2k::wind_data(inputs.value("true_wind_speed")?, value, WindReference::TrueBoat),
        ),
        "rpm" => {
            let instance = inputs.value("engine_instance").unwrap_or(0.0).clamp(0.0, 255.0);
            (pgn::ENGINE_RAPID, n2k::engine_rapid(instance as u8, value))
        }
        "latitude" => (
            pgn::POSITION_RAPID,
            n2k::position_rapid(value, inputs.value("longitude")?),
        ),
        _ => return None,
    };
    Some(PgnFrame::new(pgn, SIMULATOR_SOURCE, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use nmea_codec::n2k::decode_fields;

    #[test]
    fn every_bound_channel_is_known_and_companions_emit_nothing() {
        for channel in ["depth", "true_wind_angle", "oil_pressure", "rpm"] {
            assert!(is_known(channel));
            assert!(!bindings(channel).is_empty());
        }
        for channel in COMPANION_CHANNELS {
            assert!(is_known(channel));
            assert!(bindings(channel).is_empty());
        }
        assert!(!is_known("bilge_level"));
    }

    #[test]
    fn true_wind_uses_true_reference_mwv() {
        let mwv = bindings("true_wind_angle")[0];
        assert_eq!(mwv.sentence, SentenceType::Mwv);
        assert_eq!(mwv.texts, &[("reference", "T")]);
    }

    #[test]
    fn depth_frame_is_in_meters() {
        let inputs = SyntheticInputs::new(Utc::now())
            .with_value("depth", 10.0)
            .with_value("depth_offset", 0.5);
        let frame = frame_for("depth", &inputs).unwrap();
        assert_eq!(frame.pgn, pgn::WATER_DEPTH);
        let fields = decode_fields(frame.pgn, &frame.data).unwrap();
        let depth = fields.iter().find(|(k, _)| k == "depth").unwrap().1.value.as_f64().unwrap();
        assert!((depth - 3.048).abs() < 0.01);
    }

    #[test]
    fn frame_millis_counts_from_midnight() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 2).unwrap();
        assert_eq!(frame_millis(at), 2000);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap();
        assert_eq!(frame_millis(at), 86_399_000);
    }

    #[test]
    fn wind_frame_needs_companion_speed() {
        let inputs = SyntheticInputs::new(Utc::now()).with_value("wind_angle", -30.0);
        assert!(frame_for("wind_angle", &inputs).is_none());
        let inputs = inputs.with_value("wind_speed", 12.0);
        assert_eq!(frame_for("wind_angle", &inputs).unwrap().pgn, pgn::WIND_DATA);
        assert!(frame_for("water_temperature", &inputs).is_none());
    }
}
