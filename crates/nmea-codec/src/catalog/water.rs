//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Depth, speed through water and water temperature.
use super::fields::{
    fixed, normalize_degrees, optional_fixed, put, FieldMap, Fields, FEET_PER_FATHOM,
    METERS_PER_FOOT,
};
use super::{FieldError, GenerateError, SentenceHandler, SentenceType, SyntheticInputs};
use crate::reading::Unit;

pub(super) fn handlers() -> Vec<SentenceHandler> {
    vec![
        SentenceHandler {
            kind: SentenceType::Dbt,
            parse: parse_dbt,
            generate: generate_dbt,
            required_inputs: &["depth"],
            default_talker: "SD",
        },
        SentenceHandler {
            kind: SentenceType::Dpt,
            parse: parse_dpt,
            generate: generate_dpt,
            required_inputs: &["depth"],
            default_talker: "SD",
        },
        SentenceHandler {
            kind: SentenceType::Vhw,
            parse: parse_vhw,
            generate: generate_vhw,
            required_inputs: &["speed"],
            default_talker: "VW",
        },
        SentenceHandler {
            kind: SentenceType::Mtw,
            parse: parse_mtw,
            generate: generate_mtw,
            required_inputs: &["water_temperature"],
            default_talker: "SD",
        },
    ]
}

/// Depth channels are in feet and must not be negative.
fn depth_feet(kind: SentenceType, inputs: &SyntheticInputs) -> Result<f64, GenerateError> {
    let feet = inputs.require(kind, "depth")?;
    if feet < 0.0 {
        return Err(GenerateError::InvalidInput {
            sentence_type: kind,
            input: "depth".into(),
            reason: format!("negative depth {}", feet),
        });
    }
    Ok(feet)
}

// feet, f, metres, M, fathoms, F
fn parse_dbt(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 6, 6)?;
    f.letter(1, &["f"])?;
    f.letter(3, &["M"])?;
    f.letter(5, &["F"])?;
    let mut out = FieldMap::new();
    put(&mut out, "depth_feet", f.number(0)?, Unit::Feet);
    put(&mut out, "depth_meters", f.number(2)?, Unit::Meters);
    put(&mut out, "depth_fathoms", f.number(4)?, Unit::Fathoms);
    Ok(out)
}

fn generate_dbt(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let feet = depth_feet(SentenceType::Dbt, inputs)?;
    Ok(vec![
        fixed(feet, 2),
        "f".into(),
        fixed(feet * METERS_PER_FOOT, 2),
        "M".into(),
        fixed(feet / FEET_PER_FATHOM, 2),
        "F".into(),
    ])
}

// depth metres, offset metres [, max range]
fn parse_dpt(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 2, 3)?;
    let mut out = FieldMap::new();
    put(&mut out, "depth", Some(f.required_number(0)?), Unit::Meters);
    put(&mut out, "offset", f.number(1)?, Unit::Meters);
    put(&mut out, "max_range", f.number(2)?, Unit::Meters);
    Ok(out)
}

fn generate_dpt(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let feet = depth_feet(SentenceType::Dpt, inputs)?;
    Ok(vec![
        fixed(feet * METERS_PER_FOOT, 2),
        optional_fixed(inputs.value("depth_offset"), 1),
    ])
}

// heading true, T, heading magnetic, M, knots, N, km/h, K
fn parse_vhw(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 8, 8)?;
    let mut out = FieldMap::new();
    put(&mut out, "heading_true", f.number(0)?, Unit::Degrees);
    put(&mut out, "heading_magnetic", f.number(2)?, Unit::Degrees);
    put(&mut out, "speed_knots", f.number(4)?, Unit::Knots);
    put(&mut out, "speed_kmh", f.number(6)?, Unit::KilometersPerHour);
    Ok(out)
}

fn generate_vhw(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let speed = inputs.require(SentenceType::Vhw, "speed")?.max(0.0);
    let heading = inputs.value("heading").map(normalize_degrees);
    let magnetic = heading
        .map(|h| normalize_degrees(h - inputs.value("magnetic_variation").unwrap_or(0.0)));
    Ok(vec![
        optional_fixed(heading, 1),
        "T".into(),
        optional_fixed(magnetic, 1),
        "M".into(),
        fixed(speed, 1),
        "N".into(),
        fixed(speed * 1.852, 1),
        "K".into(),
    ])
}

fn parse_mtw(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 2, 2)?;
    let temperature = f.required_number(0)?;
    f.letter(1, &["C"])?;
    let mut out = FieldMap::new();
    put(&mut out, "water_temperature", Some(temperature), Unit::Celsius);
    Ok(out)
}

fn generate_mtw(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let temperature = inputs.require(SentenceType::Mtw, "water_temperature")?;
    Ok(vec![fixed(temperature, 1), "C".into()])
}
