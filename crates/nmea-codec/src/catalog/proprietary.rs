//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! NMEA 2000 data tunnelled as hex: `$PCDIN,<pgn>,<timestamp>,<source>,<payload>`.
use chrono::Timelike;

use super::fields::{invalid_value, FieldMap, Fields};
use super::{FieldError, GenerateError, SentenceHandler, SentenceType, SyntheticInputs};
use crate::n2k::{decode_fields, parse_hex_u32};
use crate::reading::{Measurement, Unit};

pub(super) fn handlers() -> Vec<SentenceHandler> {
    vec![SentenceHandler {
        kind: SentenceType::Pcdin,
        parse: parse_pcdin,
        generate: generate_pcdin,
        required_inputs: &["pgn", "payload"],
        default_talker: "",
    }]
}

fn hex_field(f: &Fields<'_>, index: usize, width: usize) -> Result<u32, FieldError> {
    let text = f.raw(index);
    if text.len() != width {
        return Err(invalid_value(index, text));
    }
    parse_hex_u32(text).map_err(|_| invalid_value(index, text))
}

fn parse_pcdin(raw: &[String]) -> Result<FieldMap, FieldError> {
    let f = Fields::new(raw, 4, 4)?;
    let pgn = hex_field(&f, 0, 6)?;
    let timestamp = hex_field(&f, 1, 8)?;
    let source = hex_field(&f, 2, 2)?;
    let payload_text = f.raw(3);
    let payload = hex::decode(payload_text).map_err(|_| invalid_value(3, payload_text))?;

    let mut out = vec![
        ("pgn".to_owned(), Measurement::integer(pgn as i64, Unit::Count)),
        ("timestamp".to_owned(), Measurement::integer(timestamp as i64, Unit::Count)),
        ("source".to_owned(), Measurement::integer(source as i64, Unit::Count)),
        ("payload".to_owned(), Measurement::text(payload_text.to_ascii_uppercase())),
    ];
    let decoded = decode_fields(pgn, &payload).map_err(|_| invalid_value(3, payload_text))?;
    out.extend(decoded);
    Ok(out)
}

fn generate_pcdin(inputs: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
    let invalid = |input: &str, reason: String| GenerateError::InvalidInput {
        sentence_type: SentenceType::Pcdin,
        input: input.to_owned(),
        reason,
    };
    let pgn_text = inputs.require_text(SentenceType::Pcdin, "pgn")?;
    let pgn = u32::from_str_radix(pgn_text, 16)
        .ok()
        .filter(|pgn| *pgn <= 0x03_FFFF)
        .ok_or_else(|| invalid("pgn", format!("'{}' is not a PGN in hex", pgn_text)))?;
    let payload = inputs.require_text(SentenceType::Pcdin, "payload")?;
    let bytes = hex::decode(payload).map_err(|err| invalid("payload", err.to_string()))?;
    let source = inputs.value("source").unwrap_or(0.0).clamp(0.0, 255.0) as u8;
    let ts = &inputs.timestamp;
    let millis = ts.num_seconds_from_midnight() * 1000 + ts.timestamp_subsec_millis().min(999);
    Ok(vec![
        format!("{:06X}", pgn),
        format!("{:08X}", millis),
        format!("{:02X}", source),
        hex::encode_upper(bytes),
    ])
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::catalog::{Catalog, GenerateError, SentenceType, SyntheticInputs};
    use crate::n2k::{self, pgn};
    use crate::reading::{FieldValue, ReadingSource};
    use crate::sentence::{decode, encode};

    #[test]
    fn pcdin_exposes_raw_and_decoded_fields() {
        let payload = hex::encode_upper(n2k::water_depth(4.2, 0.3));
        let line = encode("", "PCDIN", &["01F50B", "00000000", "23", payload.as_str()]);
        let reading = Catalog::standard()
            .parse(&decode(&line).unwrap(), ReadingSource::internal())
            .unwrap()
            .unwrap();
        assert_eq!(reading.talker_id, "");
        assert_eq!(reading.number("pgn"), Some(128_267.0));
        assert_eq!(reading.number("source"), Some(35.0));
        assert_eq!(reading.field("payload").unwrap().value, FieldValue::Text(payload));
        assert!((reading.number("depth").unwrap() - 4.2).abs() < 1e-9);
    }

    #[test]
    fn pcdin_rejects_short_pgn_and_bad_hex() {
        let catalog = Catalog::standard();
        let line = encode("", "PCDIN", &["1F50B", "00000000", "23", "00"]);
        let failure = catalog
            .parse(&decode(&line).unwrap(), ReadingSource::internal())
            .unwrap_err();
        assert_eq!(failure.field_index, 0);

        let line = encode("", "PCDIN", &["01F50B", "00000000", "23", "0G"]);
        let failure = catalog
            .parse(&decode(&line).unwrap(), ReadingSource::internal())
            .unwrap_err();
        assert_eq!(failure.field_index, 3);
    }

    #[test]
    fn pcdin_generation_stamps_time_of_day() {
        let timestamp = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 10).unwrap();
        let inputs = SyntheticInputs::new(timestamp)
            .with_text("pgn", "00FF63")
            .with_text("payload", "3b9f4000")
            .with_value("source", 204.0);
        let sentence = Catalog::standard()
            .generate(SentenceType::Pcdin, &inputs)
            .unwrap();
        assert_eq!(sentence.address(), "PCDIN");
        assert_eq!(sentence.fields, vec!["00FF63", "00002710", "CC", "3B9F4000"]);
        assert_eq!(pgn::PILOT_MODE, 0x00FF63);
    }

    #[test]
    fn pcdin_generation_requires_pgn() {
        let inputs = SyntheticInputs::new(Utc::now()).with_text("payload", "00");
        assert!(matches!(
            Catalog::standard().generate(SentenceType::Pcdin, &inputs),
            Err(GenerateError::MissingInput { .. })
        ));
    }
}
