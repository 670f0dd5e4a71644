//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Position, course, heading and steering sentences.
use super::fields::{
    date_field, fixed, latitude_fields, longitude_fields, normalize_degrees, optional_fixed, put,
    time_field, FieldMap, Fields,
};
use super::{FieldError, GenerateError, SentenceHandler, SentenceType, SyntheticInputs};
use crate::reading::{Measurement, Unit};

pub(super) fn handlers() -> Vec<SentenceHandler> {
    vec![
        SentenceHandler {
            kind: SentenceType::Rmc,
            parse: parse_rmc,
            generate: generate_rmc,
            required_inputs: &["latitude", "longitude"],
            default_talker: "GP",
        },
        SentenceHandler {
            kind: SentenceType::Gga,
            parse: parse_gga,
            generate: generate_gga,
            required_inputs: &["latitude", "longitude"],
            default_talker: "GP",
        },
        SentenceHandler {
            kind: SentenceType::Vtg,
            parse: parse_vtg,
            generate: generate_vtg,
            required_inputs: &["sog"],
            default_talker: "GP",
        },
        SentenceHandler {
            kind: SentenceType::Hdg,
            parse: parse_hdg,
            generate: generate_hdg,
            required_inputs: &["heading"],
            default_talker: "HC",
        },
        SentenceHandler {
            kind: SentenceType::Hdm,
            parse: parse_hdm,
            generate: generate_hdm,
            required_inputs: &["heading"],
            default_talker: "HC",
        },
        SentenceHandler {
            kind: SentenceType::Rsa,
            parse: parse_rsa,
            generate: generate_rsa,
            required_inputs: &["rudder_angle"],
            default_talker: "AG",
        },
    ]
}

fn hemisphere(value: f64, positive: &str, negative: &str) -> String {
    let letter = if value < 0.0 { negative } else { positive };
    letter.to_owned()
}

// time, status, lat, N/S, lon, E/W, sog, cog, date, variation, E/W [, mode [, nav status]]
fn parse_rmc(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 11, 13)?;
    let mut out = FieldMap::new();
    if let Some(time) = f.time(0)? {
        out.push(("time".into(), Measurement::time(time)));
    }
    if let Some(valid) = f.flag(1)? {
        out.push(("valid".into(), Measurement::flag(valid)));
    }
    put(&mut out, "latitude", f.coordinate(2, "N", "S", 90.0)?, Unit::Degrees);
    put(&mut out, "longitude", f.coordinate(4, "E", "W", 180.0)?, Unit::Degrees);
    put(&mut out, "speed_over_ground", f.number(6)?, Unit::Knots);
    put(&mut out, "course_over_ground", f.number(7)?, Unit::Degrees);
    if let Some(date) = f.date(8)? {
        out.push(("date".into(), Measurement::date(date)));
    }
    put(&mut out, "magnetic_variation", f.signed(9, "E", "W")?, Unit::Degrees);
    if let Some(mode) = f.text(11) {
        out.push(("mode".into(), Measurement::text(mode)));
    }
    Ok(out)
}

fn generate_rmc(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let latitude = inputs.require(SentenceType::Rmc, "latitude")?;
    let longitude = inputs.require(SentenceType::Rmc, "longitude")?;
    let [lat, ns] = latitude_fields(latitude);
    let [lon, ew] = longitude_fields(longitude);
    let variation = inputs.value("magnetic_variation");
    Ok(vec![
        time_field(&inputs.timestamp),
        "A".into(),
        lat,
        ns,
        lon,
        ew,
        fixed(inputs.value("sog").unwrap_or(0.0).max(0.0), 1),
        fixed(normalize_degrees(inputs.value("cog").unwrap_or(0.0)), 1),
        date_field(&inputs.timestamp),
        optional_fixed(variation.map(f64::abs), 1),
        variation
            .map(|v| hemisphere(v, "E", "W"))
            .unwrap_or_default(),
        "A".into(),
    ])
}

// time, lat, N/S, lon, E/W, quality, satellites, hdop, altitude, M [, geoid, M, age, station]
fn parse_gga(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 10, 14)?;
    let mut out = FieldMap::new();
    if let Some(time) = f.time(0)? {
        out.push(("time".into(), Measurement::time(time)));
    }
    put(&mut out, "latitude", f.coordinate(1, "N", "S", 90.0)?, Unit::Degrees);
    put(&mut out, "longitude", f.coordinate(3, "E", "W", 180.0)?, Unit::Degrees);
    if let Some(quality) = f.integer(5)? {
        out.push(("fix_quality".into(), Measurement::integer(quality, Unit::Count)));
    }
    if let Some(satellites) = f.integer(6)? {
        out.push(("satellites".into(), Measurement::integer(satellites, Unit::Count)));
    }
    put(&mut out, "hdop", f.number(7)?, Unit::Count);
    put(&mut out, "altitude", f.number(8)?, Unit::Meters);
    put(&mut out, "geoid_separation", f.number(10)?, Unit::Meters);
    Ok(out)
}

fn generate_gga(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let latitude = inputs.require(SentenceType::Gga, "latitude")?;
    let longitude = inputs.require(SentenceType::Gga, "longitude")?;
    let [lat, ns] = latitude_fields(latitude);
    let [lon, ew] = longitude_fields(longitude);
    Ok(vec![
        time_field(&inputs.timestamp),
        lat,
        ns,
        lon,
        ew,
        "1".into(),
        "08".into(),
        "0.9".into(),
        fixed(inputs.value("altitude").unwrap_or(0.0), 1),
        "M".into(),
        "0.0".into(),
        "M".into(),
        String::new(),
        String::new(),
    ])
}

// course true, T, course magnetic, M, knots, N, km/h, K [, mode]
fn parse_vtg(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 8, 9)?;
    let mut out = FieldMap::new();
    put(&mut out, "course_true", f.number(0)?, Unit::Degrees);
    put(&mut out, "course_magnetic", f.number(2)?, Unit::Degrees);
    put(&mut out, "speed_over_ground", f.number(4)?, Unit::Knots);
    put(&mut out, "speed_kmh", f.number(6)?, Unit::KilometersPerHour);
    Ok(out)
}

fn generate_vtg(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let sog = inputs.require(SentenceType::Vtg, "sog")?.max(0.0);
    let course = inputs.value("cog").map(normalize_degrees);
    let magnetic = course.map(|c| normalize_degrees(c - inputs.value("magnetic_variation").unwrap_or(0.0)));
    Ok(vec![
        optional_fixed(course, 1),
        "T".into(),
        optional_fixed(magnetic, 1),
        "M".into(),
        fixed(sog, 1),
        "N".into(),
        fixed(sog * 1.852, 1),
        "K".into(),
        "A".into(),
    ])
}

// heading, deviation, E/W, variation, E/W
fn parse_hdg(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 5, 5)?;
    let mut out = FieldMap::new();
    put(&mut out, "heading", f.number(0)?, Unit::Degrees);
    put(&mut out, "deviation", f.signed(1, "E", "W")?, Unit::Degrees);
    put(&mut out, "variation", f.signed(3, "E", "W")?, Unit::Degrees);
    Ok(out)
}

fn generate_hdg(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let heading = normalize_degrees(inputs.require(SentenceType::Hdg, "heading")?);
    let variation = inputs.value("magnetic_variation");
    Ok(vec![
        fixed(heading, 1),
        String::new(),
        String::new(),
        optional_fixed(variation.map(f64::abs), 1),
        variation
            .map(|v| hemisphere(v, "E", "W"))
            .unwrap_or_default(),
    ])
}

fn parse_hdm(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 2, 2)?;
    let mut out = FieldMap::new();
    put(&mut out, "heading_magnetic", Some(f.required_number(0)?), Unit::Degrees);
    Ok(out)
}

fn generate_hdm(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let heading = normalize_degrees(inputs.require(SentenceType::Hdm, "heading")?);
    Ok(vec![fixed(heading, 1), "M".into()])
}

// starboard angle, status [, port angle, status]
fn parse_rsa(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 2, 4)?;
    let mut out = FieldMap::new();
    put(&mut out, "rudder_angle", f.number(0)?, Unit::Degrees);
    if let Some(valid) = f.flag(1)? {
        out.push(("valid".into(), Measurement::flag(valid)));
    }
    put(&mut out, "port_rudder_angle", f.number(2)?, Unit::Degrees);
    Ok(out)
}

fn generate_rsa(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let angle = inputs.require(SentenceType::Rsa, "rudder_angle")?;
    Ok(vec![fixed(angle, 1), "A".into(), String::new(), String::new()])
}
