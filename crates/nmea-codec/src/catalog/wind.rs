//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Wind sentences. Internally angles are signed, negative to port.
use super::fields::{
    fixed, invalid_value, normalize_degrees, put, signed_degrees, FieldMap, Fields, KNOTS_PER_KMH,
    KNOTS_PER_MPH, KNOTS_PER_MS,
};
use super::{FieldError, GenerateError, SentenceHandler, SentenceType, SyntheticInputs};
use crate::reading::{Measurement, Unit};

pub(super) fn handlers() -> Vec<SentenceHandler> {
    vec![
        SentenceHandler {
            kind: SentenceType::Mwv,
            parse: parse_mwv,
            generate: generate_mwv,
            required_inputs: &["wind_angle", "wind_speed"],
            default_talker: "WI",
        },
        SentenceHandler {
            kind: SentenceType::Vwr,
            parse: parse_split_wind,
            generate: generate_vwr,
            required_inputs: &["wind_angle", "wind_speed"],
            default_talker: "WI",
        },
        SentenceHandler {
            kind: SentenceType::Vwt,
            parse: parse_split_wind,
            generate: generate_vwt,
            required_inputs: &["true_wind_angle", "true_wind_speed"],
            default_talker: "WI",
        },
    ]
}

// angle 0-360, R/T, speed, K/M/N/S, status
fn parse_mwv(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 5, 5)?;
    let mut out = FieldMap::new();
    if let Some(angle) = f.number(0)? {
        if !(0.0..=360.0).contains(&angle) {
            return Err(invalid_value(0, f.raw(0)));
        }
        put(&mut out, "wind_angle", Some(signed_degrees(angle)), Unit::Degrees);
    }
    let reference = match f.letter(1, &["R", "T"])? {
        Some("T") => "true",
        _ => "relative",
    };
    out.push(("reference".into(), Measurement::text(reference)));
    if let Some(speed) = f.number(2)? {
        let knots = match f.letter(3, &["K", "M", "N", "S"])? {
            Some("K") => speed * KNOTS_PER_KMH,
            Some("M") => speed * KNOTS_PER_MS,
            Some("S") => speed * KNOTS_PER_MPH,
            _ => speed,
        };
        put(&mut out, "wind_speed", Some(knots), Unit::Knots);
    }
    if let Some(valid) = f.flag(4)? {
        out.push(("valid".into(), Measurement::flag(valid)));
    }
    Ok(out)
}

/// `texts["reference"] = "T"` selects the true wind channels.
fn generate_mwv(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let true_wind = inputs.text("reference") == Some("T");
    let (angle_key, speed_key, reference) = if true_wind {
        ("true_wind_angle", "true_wind_speed", "T")
    } else {
        ("wind_angle", "wind_speed", "R")
    };
    let angle = inputs.require(SentenceType::Mwv, angle_key)?;
    let speed = inputs.require(SentenceType::Mwv, speed_key)?.max(0.0);
    Ok(vec![
        fixed(normalize_degrees(angle), 1),
        reference.into(),
        fixed(speed, 1),
        "N".into(),
        "A".into(),
    ])
}

// angle 0-180, L/R, knots, N, m/s, M, km/h, K
fn parse_split_wind(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 8, 8)?;
    let mut out = FieldMap::new();
    if let Some(angle) = f.number(0)? {
        if !(0.0..=180.0).contains(&angle) {
            return Err(invalid_value(0, f.raw(0)));
        }
        let signed = match f.letter(1, &["L", "R"])? {
            Some("L") => -angle,
            Some(_) => angle,
            None => return Err(FieldError::new(1, super::FieldErrorKind::MissingValue)),
        };
        put(&mut out, "wind_angle", Some(signed), Unit::Degrees);
    }
    let knots = f.number(2)?;
    let meters_per_second = f.number(4)?;
    let kmh = f.number(6)?;
    let speed = knots
        .or(meters_per_second.map(|v| v * KNOTS_PER_MS))
        .or(kmh.map(|v| v * KNOTS_PER_KMH));
    put(&mut out, "wind_speed", speed, Unit::Knots);
    put(&mut out, "wind_speed_ms", meters_per_second, Unit::MetersPerSecond);
    put(&mut out, "wind_speed_kmh", kmh, Unit::KilometersPerHour);
    Ok(out)
}

fn split_wind_fields(angle: f64, knots: f64) -> Vec<String> {
    let signed = signed_degrees(angle);
    let side = if signed < 0.0 { "L" } else { "R" };
    let knots = knots.max(0.0);
    vec![
        fixed(signed.abs(), 1),
        side.into(),
        fixed(knots, 1),
        "N".into(),
        fixed(knots / KNOTS_PER_MS, 1),
        "M".into(),
        fixed(knots * 1.852, 1),
        "K".into(),
    ]
}

fn generate_vwr(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let angle = inputs.require(SentenceType::Vwr, "wind_angle")?;
    let speed = inputs.require(SentenceType::Vwr, "wind_speed")?;
    Ok(split_wind_fields(angle, speed))
}

fn generate_vwt(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let angle = inputs.require(SentenceType::Vwt, "true_wind_angle")?;
    let speed = inputs.require(SentenceType::Vwt, "true_wind_speed")?;
    Ok(split_wind_fields(angle, speed))
}
