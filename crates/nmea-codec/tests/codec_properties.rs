//! ---
//! nmea_section: "15-testing-qa-runbook"
//! nmea_subsection: "integration-tests"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Codec and catalog properties exercised through the public API."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use anyhow::Result;
use chrono::Utc;
use nmea_codec::{
    checksum, decode, encode, Catalog, ReadingSource, SentenceType, SyntheticInputs,
};
use proptest::prelude::*;
use regex::Regex;

const REFERENCE_RMC: &str =
    "$GPRMC,123519.487,A,3746.710,N,12225.354,W,5.2,54.7,021125,001.3,W*5C\r\n";

fn full_inputs() -> SyntheticInputs {
    SyntheticInputs::new(Utc::now())
        .with_value("latitude", 37.7785)
        .with_value("longitude", -122.4226)
        .with_value("sog", 5.2)
        .with_value("cog", 54.7)
        .with_value("depth", 32.8)
        .with_value("speed", 6.1)
        .with_value("heading", 270.0)
        .with_value("wind_angle", -35.0)
        .with_value("wind_speed", 14.0)
        .with_value("true_wind_angle", -50.0)
        .with_value("true_wind_speed", 11.0)
        .with_value("water_temperature", 18.5)
        .with_value("rudder_angle", 4.0)
        .with_value("rpm", 1800.0)
        .with_value("coolant_temperature", 82.0)
        .with_text("pgn", "01F50B")
        .with_text("payload", "FFE80300002C01FF")
}

#[test]
fn reference_rmc_parses_to_expected_reading() -> Result<()> {
    let raw = decode(REFERENCE_RMC)?;
    assert!(raw.valid);
    let reading = Catalog::standard()
        .parse(&raw, ReadingSource::internal())?
        .expect("RMC is catalogued");
    assert!((reading.number("latitude").unwrap() - 37.7785).abs() < 1e-4);
    assert!((reading.number("longitude").unwrap() + 122.4226).abs() < 1e-4);
    assert_eq!(reading.number("speed_over_ground"), Some(5.2));
    assert_eq!(reading.number("course_over_ground"), Some(54.7));
    Ok(())
}

#[test]
fn published_rmc_checksum_does_not_verify() -> Result<()> {
    let line = REFERENCE_RMC.replace("*5C", "*6A");
    let raw = decode(&line)?;
    assert!(!raw.valid);
    assert!(Catalog::standard()
        .parse(&raw, ReadingSource::internal())?
        .is_none());
    Ok(())
}

#[test]
fn every_generated_sentence_matches_wire_grammar() -> Result<()> {
    let grammar = Regex::new(r"^\$[A-Z]{5},.+\*[0-9A-F]{2}\r\n$")?;
    let catalog = Catalog::standard();
    let inputs = full_inputs();
    for kind in catalog.kinds().collect::<Vec<_>>() {
        let line = catalog.generate(kind, &inputs)?.to_line();
        assert!(grammar.is_match(&line), "{kind} produced {line:?}");
        let raw = decode(&line)?;
        let reading = catalog.parse(&raw, ReadingSource::internal())?;
        assert_eq!(reading.map(|r| r.sentence_type), Some(kind));
    }
    Ok(())
}

#[test]
fn mwv_true_reference_parses_as_true() -> Result<()> {
    let catalog = Catalog::standard();
    let inputs = full_inputs().with_text("reference", "T");
    let line = catalog.generate(SentenceType::Mwv, &inputs)?.to_line();
    let reading = catalog
        .parse(&decode(&line)?, ReadingSource::internal())?
        .expect("MWV is catalogued");
    assert_eq!(reading.number("wind_angle"), Some(-50.0));
    assert_eq!(
        reading.field("reference").and_then(|m| m.value.as_str()),
        Some("true")
    );
    Ok(())
}

proptest! {
    #[test]
    fn corrupted_checksum_never_yields_reading(
        depth in 0.0f64..500.0,
        flip in 1u8..=255,
    ) {
        let catalog = Catalog::standard();
        let inputs = SyntheticInputs::new(Utc::now()).with_value("depth", depth);
        let sentence = catalog.generate(SentenceType::Dbt, &inputs).unwrap();
        let body = sentence.to_line();
        let body = &body[1..body.len() - 5];
        let good = u8::from_str_radix(&checksum(body), 16).unwrap();
        let line = format!("${}*{:02X}\r\n", body, good ^ flip);
        let raw = decode(&line).unwrap();
        prop_assert!(!raw.valid);
        prop_assert!(catalog.parse(&raw, ReadingSource::internal()).unwrap().is_none());
    }

    #[test]
    fn encoded_lines_always_verify(
        fields in proptest::collection::vec("[0-9A-Z.]{1,8}", 1..20),
    ) {
        let line = encode("II", "XDR", &fields);
        prop_assert!(decode(&line).unwrap().valid);
    }
}
