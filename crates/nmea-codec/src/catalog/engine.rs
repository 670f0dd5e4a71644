//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Engine revolutions and transducer quadruples.
use super::fields::{fixed, invalid_value, optional_fixed, put, FieldMap, Fields};
use super::{
    FieldError, FieldErrorKind, GenerateError, SentenceHandler, SentenceType, SyntheticInputs,
};
use crate::reading::{Measurement, Unit};

pub(super) fn handlers() -> Vec<SentenceHandler> {
    vec![
        SentenceHandler {
            kind: SentenceType::Rpm,
            parse: parse_rpm,
            generate: generate_rpm,
            required_inputs: &["rpm"],
            default_talker: "ER",
        },
        SentenceHandler {
            kind: SentenceType::Xdr,
            parse: parse_xdr,
            generate: generate_xdr,
            required_inputs: &[],
            default_talker: "II",
        },
    ]
}

fn engine_instance(inputs: &SyntheticInputs) -> i64 {
    inputs
        .value("engine_instance")
        .map(|v| v.round().max(0.0) as i64)
        .unwrap_or(0)
}

// source E/S, instance, rpm, pitch %, status
fn parse_rpm(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 5, 5)?;
    let mut out = FieldMap::new();
    if let Some(source) = f.letter(0, &["E", "S"])? {
        let source = if source == "E" { "engine" } else { "shaft" };
        out.push(("source".into(), Measurement::text(source)));
    }
    if let Some(instance) = f.integer(1)? {
        out.push(("engine_instance".into(), Measurement::integer(instance, Unit::Count)));
    }
    put(&mut out, "rpm", f.number(2)?, Unit::Rpm);
    put(&mut out, "pitch", f.number(3)?, Unit::Percent);
    if let Some(valid) = f.flag(4)? {
        out.push(("valid".into(), Measurement::flag(valid)));
    }
    Ok(out)
}

fn generate_rpm(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let rpm = inputs.require(SentenceType::Rpm, "rpm")?;
    Ok(vec![
        "E".into(),
        engine_instance(inputs).to_string(),
        fixed(rpm, 1),
        optional_fixed(inputs.value("pitch"), 1),
        "A".into(),
    ])
}

/// Transducer category for an XDR type code.
fn transducer_kind(code: &str) -> Option<(&'static str, Unit)> {
    Some(match code {
        "C" => ("temperature", Unit::Celsius),
        "P" => ("pressure", Unit::Pascals),
        "U" => ("voltage", Unit::Volts),
        "A" => ("angle", Unit::Degrees),
        "T" => ("tachometer", Unit::Rpm),
        "H" => ("humidity", Unit::Percent),
        "V" => ("volume", Unit::Count),
        "G" => ("generic", Unit::Count),
        _ => return None,
    })
}

// (type, value, unit, name) repeated
fn parse_xdr(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 4, usize::MAX)?;
    let partial = f.len() % 4;
    if partial != 0 {
        let start = f.len() - partial;
        return Err(FieldError::new(
            start,
            FieldErrorKind::FieldCount {
                expected: start + 4,
                actual: f.len(),
            },
        ));
    }
    let mut out = FieldMap::new();
    for quad in 0..f.len() / 4 {
        let base = quad * 4;
        let code = f.raw(base);
        let (kind, unit) = transducer_kind(code).ok_or_else(|| invalid_value(base, code))?;
        let Some(mut value) = f.number(base + 1)? else {
            continue;
        };
        if code == "P" && f.raw(base + 2) == "B" {
            value *= 100_000.0;
        }
        let name = f.text(base + 3).unwrap_or("xdr");
        put(&mut out, &format!("{}.{}", name, kind), Some(value), unit);
    }
    Ok(out)
}

fn generate_xdr(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let instance = engine_instance(inputs);
    let mut fields: Vec<String> = Vec::new();
    if let Some(temperature) = inputs.value("coolant_temperature") {
        fields.extend([
            "C".into(),
            fixed(temperature, 1),
            "C".into(),
            format!("ENGINE#{}", instance),
        ]);
    }
    if let Some(pressure) = inputs.value("oil_pressure") {
        fields.extend([
            "P".into(),
            fixed(pressure, 0),
            "P".into(),
            format!("ENGINE#{}", instance),
        ]);
    }
    if let Some(voltage) = inputs.value("alternator_voltage") {
        fields.extend([
            "U".into(),
            fixed(voltage, 2),
            "V".into(),
            format!("ALTERNATOR#{}", instance),
        ]);
    }
    if fields.is_empty() {
        return Err(GenerateError::MissingInput {
            sentence_type: SentenceType::Xdr,
            input: "coolant_temperature".into(),
        });
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::catalog::{Catalog, FieldErrorKind, GenerateError, SentenceType, SyntheticInputs};
    use crate::reading::{FieldValue, ReadingSource};
    use crate::sentence::{decode, encode};

    fn parse(line: &str) -> Result<Option<crate::ParsedReading>, crate::ParseFailure> {
        Catalog::standard().parse(&decode(line).unwrap(), ReadingSource::internal())
    }

    #[test]
    fn rpm_round_trip() {
        let inputs = SyntheticInputs::new(Utc::now())
            .with_value("rpm", 2150.0)
            .with_value("engine_instance", 1.0)
            .with_value("pitch", 85.0);
        let line = Catalog::standard()
            .generate(SentenceType::Rpm, &inputs)
            .unwrap()
            .to_line();
        assert!(line.starts_with("$ERRPM,E,1,2150.0,85.0,A*"));
        let reading = parse(&line).unwrap().unwrap();
        assert_eq!(reading.number("rpm"), Some(2150.0));
        assert_eq!(reading.number("engine_instance"), Some(1.0));
        assert_eq!(reading.field("source").unwrap().value, FieldValue::Text("engine".into()));
    }

    #[test]
    fn xdr_keys_by_instance_and_kind() {
        let inputs = SyntheticInputs::new(Utc::now())
            .with_value("coolant_temperature", 82.5)
            .with_value("oil_pressure", 310_000.0)
            .with_value("alternator_voltage", 14.2)
            .with_value("engine_instance", 1.0);
        let line = Catalog::standard()
            .generate(SentenceType::Xdr, &inputs)
            .unwrap()
            .to_line();
        let reading = parse(&line).unwrap().unwrap();
        assert_eq!(reading.number("ENGINE#1.temperature"), Some(82.5));
        assert_eq!(reading.number("ENGINE#1.pressure"), Some(310_000.0));
        assert_eq!(reading.number("ALTERNATOR#1.voltage"), Some(14.2));
    }

    #[test]
    fn xdr_bar_pressure_converted() {
        let reading = parse(&encode("II", "XDR", &["P", "3.1", "B", "ENGINE#0"]))
            .unwrap()
            .unwrap();
        assert!((reading.number("ENGINE#0.pressure").unwrap() - 310_000.0).abs() < 1e-6);
    }

    #[test]
    fn xdr_partial_quadruple_fails_at_its_first_index() {
        let line = encode("II", "XDR", &["C", "82.5", "C", "ENGINE#0", "P", "310000"]);
        let failure = parse(&line).unwrap_err();
        assert_eq!(failure.field_index, 4);
        assert_eq!(
            failure.reason,
            FieldErrorKind::FieldCount {
                expected: 8,
                actual: 6
            }
        );
    }

    #[test]
    fn xdr_unknown_type_code_is_rejected() {
        let failure = parse(&encode("II", "XDR", &["Z", "1", "X", "THING"])).unwrap_err();
        assert_eq!(failure.field_index, 0);
    }

    #[test]
    fn xdr_requires_at_least_one_channel() {
        let err = Catalog::standard()
            .generate(SentenceType::Xdr, &SyntheticInputs::new(Utc::now()))
            .unwrap_err();
        assert!(matches!(err, GenerateError::MissingInput { .. }));
    }
}
