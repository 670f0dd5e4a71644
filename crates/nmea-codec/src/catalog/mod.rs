//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Per-sentence parse/generate pairs keyed by a closed [`SentenceType`].
//!
//! [`Catalog::standard`] is the single place where the built-in handlers are
//! registered. Callers may replace or add entries through [`Catalog::register`]
//! before the catalog is shared.
use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::trace;

use crate::reading::{Measurement, ParsedReading, ReadingSource};
use crate::sentence::RawSentence;

mod engine;
mod fields;
mod navigation;
mod proprietary;
mod water;
mod wind;

pub use fields::FieldMap;

/// Every sentence the catalog knows how to handle.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum SentenceType {
    /// Recommended minimum navigation data.
    Rmc,
    /// GPS fix data.
    Gga,
    /// Track made good and ground speed.
    Vtg,
    /// Depth below transducer.
    Dbt,
    /// Depth with offset.
    Dpt,
    /// Water speed and heading.
    Vhw,
    /// Wind speed and angle.
    Mwv,
    /// Relative wind.
    Vwr,
    /// True wind.
    Vwt,
    /// Heading, deviation and variation.
    Hdg,
    /// Magnetic heading.
    Hdm,
    /// Rudder sensor angle.
    Rsa,
    /// Water temperature.
    Mtw,
    /// Engine or shaft revolutions.
    Rpm,
    /// Transducer measurements.
    Xdr,
    /// Proprietary NMEA 2000 PGN carried in ASCII hex.
    Pcdin,
}

/// Why a single field could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldErrorKind {
    /// Sentence carries the wrong number of fields.
    #[error("expected {expected} fields, found {actual}")]
    FieldCount {
        /// Number of fields required at this point.
        expected: usize,
        /// Number of fields present.
        actual: usize,
    },
    /// Numeric field failed to parse.
    #[error("invalid number '{value}'")]
    InvalidNumber {
        /// Offending text.
        value: String,
    },
    /// Enumerated or structured field holds an unexpected value.
    #[error("invalid value '{value}'")]
    InvalidValue {
        /// Offending text.
        value: String,
    },
    /// Mandatory field is empty.
    #[error("required field is empty")]
    MissingValue,
}

/// Error returned by a handler's parse function, before the catalog attaches the sentence type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Zero based index into [`RawSentence::fields`].
    pub index: usize,
    /// What went wrong.
    pub kind: FieldErrorKind,
}

impl FieldError {
    /// Build a field error.
    pub fn new(index: usize, kind: FieldErrorKind) -> Self {
        Self { index, kind }
    }
}

/// A recognised sentence with a bad field. No reading is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{sentence_type} field {field_index}: {reason}")]
pub struct ParseFailure {
    /// Sentence type being parsed.
    pub sentence_type: SentenceType,
    /// Index of the offending field.
    pub field_index: usize,
    /// Cause.
    pub reason: FieldErrorKind,
}

/// Generation refused. Raised instead of emitting a malformed sentence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    /// A required synthetic input is absent.
    #[error("{sentence_type} requires input '{input}'")]
    MissingInput {
        /// Sentence being generated.
        sentence_type: SentenceType,
        /// Name of the missing channel or text input.
        input: String,
    },
    /// An input is present but unusable.
    #[error("{sentence_type} input '{input}' is invalid: {reason}")]
    InvalidInput {
        /// Sentence being generated.
        sentence_type: SentenceType,
        /// Name of the input.
        input: String,
        /// Cause.
        reason: String,
    },
    /// No handler is registered for the type.
    #[error("no generator registered for {sentence_type}")]
    Unsupported {
        /// Requested sentence type.
        sentence_type: SentenceType,
    },
}

/// Values a generator may draw from. Channel values are keyed by channel name
/// (`depth`, `wind_angle`, ...); `texts` carries non-numeric options such as the
/// MWV `reference` or PCDIN `pgn`/`payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticInputs {
    /// Time stamped into time/date fields.
    pub timestamp: DateTime<Utc>,
    /// Numeric channel values.
    pub values: BTreeMap<String, f64>,
    /// Text options.
    pub texts: BTreeMap<String, String>,
    /// Talker override; the handler default applies when `None`.
    pub talker: Option<String>,
}

impl SyntheticInputs {
    /// Empty inputs stamped with `timestamp`.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
            texts: BTreeMap::new(),
            talker: None,
        }
    }

    /// Add a numeric input.
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Add a text input.
    pub fn with_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.texts.insert(name.into(), value.into());
        self
    }

    /// Override the talker id.
    pub fn with_talker(mut self, talker: impl Into<String>) -> Self {
        self.talker = Some(talker.into());
        self
    }

    /// Optional numeric input; non-finite values are treated as absent.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied().filter(|v| v.is_finite())
    }

    /// Optional text input.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.texts.get(name).map(String::as_str)
    }

    /// Required numeric input.
    pub fn require(&self, kind: SentenceType, name: &str) -> Result<f64, GenerateError> {
        match self.values.get(name) {
            Some(value) if value.is_finite() => Ok(*value),
            Some(value) => Err(GenerateError::InvalidInput {
                sentence_type: kind,
                input: name.to_owned(),
                reason: format!("{} is not finite", value),
            }),
            None => Err(GenerateError::MissingInput {
                sentence_type: kind,
                input: name.to_owned(),
            }),
        }
    }

    /// Required text input.
    pub fn require_text(&self, kind: SentenceType, name: &str) -> Result<&str, GenerateError> {
        self.text(name).ok_or_else(|| GenerateError::MissingInput {
            sentence_type: kind,
            input: name.to_owned(),
        })
    }
}

/// Parse function: fields after the address to named measurements.
pub type ParseFn = fn(&[String]) -> Result<FieldMap, FieldError>;
/// Generate function: synthetic inputs to fields after the address.
pub type GenerateFn = fn(&SyntheticInputs) -> Result<Vec<String>, GenerateError>;

/// One catalog entry.
#[derive(Debug, Clone, Copy)]
pub struct SentenceHandler {
    /// Sentence type handled.
    pub kind: SentenceType,
    /// Field extraction.
    pub parse: ParseFn,
    /// Field synthesis.
    pub generate: GenerateFn,
    /// Inputs the default generation path needs.
    pub required_inputs: &'static [&'static str],
    /// Talker used when the inputs do not override it.
    pub default_talker: &'static str,
}

/// Registry of sentence handlers.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    handlers: BTreeMap<SentenceType, SentenceHandler>,
}

impl Catalog {
    /// Catalog with no handlers.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog with every built-in handler registered.
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        for handler in navigation::handlers()
            .into_iter()
            .chain(water::handlers())
            .chain(wind::handlers())
            .chain(engine::handlers())
            .chain(proprietary::handlers())
        {
            catalog.register(handler);
        }
        catalog
    }

    /// Add or replace a handler, returning the one it replaced.
    pub fn register(&mut self, handler: SentenceHandler) -> Option<SentenceHandler> {
        self.handlers.insert(handler.kind, handler)
    }

    /// Handler for `kind`, if registered.
    pub fn handler(&self, kind: SentenceType) -> Option<&SentenceHandler> {
        self.handlers.get(&kind)
    }

    /// Registered sentence types in declaration order.
    pub fn kinds(&self) -> impl Iterator<Item = SentenceType> + '_ {
        SentenceType::iter().filter(|kind| self.handlers.contains_key(kind))
    }

    /// Map a wire sentence id to a registered type.
    pub fn lookup(&self, sentence_id: &str) -> Option<SentenceType> {
        SentenceType::from_str(sentence_id)
            .ok()
            .filter(|kind| self.handlers.contains_key(kind))
    }

    /// Parse a decoded sentence.
    ///
    /// Returns `Ok(None)` for sentences that failed checksum verification and
    /// for sentence ids without a registered handler.
    pub fn parse(
        &self,
        raw: &RawSentence,
        source: ReadingSource,
    ) -> Result<Option<ParsedReading>, ParseFailure> {
        if !raw.valid {
            trace!(address = %raw.address(), "skipping unverified sentence");
            return Ok(None);
        }
        let Some(kind) = self.lookup(&raw.sentence_id) else {
            trace!(address = %raw.address(), "no handler for sentence");
            return Ok(None);
        };
        let handler = &self.handlers[&kind];
        let pairs = (handler.parse)(&raw.fields).map_err(|err| ParseFailure {
            sentence_type: kind,
            field_index: err.index,
            reason: err.kind,
        })?;
        let fields: IndexMap<String, Measurement> = pairs.into_iter().collect();
        Ok(Some(ParsedReading {
            sentence_type: kind,
            talker_id: raw.talker_id.clone(),
            fields,
            received_at: Utc::now(),
            source,
        }))
    }

    /// Synthesise a sealed sentence of `kind`.
    pub fn generate(
        &self,
        kind: SentenceType,
        inputs: &SyntheticInputs,
    ) -> Result<RawSentence, GenerateError> {
        let handler = self
            .handlers
            .get(&kind)
            .ok_or(GenerateError::Unsupported { sentence_type: kind })?;
        let fields = (handler.generate)(inputs)?;
        let talker = match kind {
            SentenceType::Pcdin => "",
            _ => inputs.talker.as_deref().unwrap_or(handler.default_talker),
        };
        Ok(RawSentence::new(talker, kind.as_ref(), fields).seal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentence::{decode, encode};

    fn parse_line(line: &str) -> Result<Option<ParsedReading>, ParseFailure> {
        let raw = decode(line).unwrap();
        Catalog::standard().parse(&raw, ReadingSource::internal())
    }

    #[test]
    fn standard_catalog_registers_every_type() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.kinds().count(), SentenceType::iter().count());
        assert_eq!(catalog.lookup("RMC"), Some(SentenceType::Rmc));
        assert_eq!(catalog.lookup("PCDIN"), Some(SentenceType::Pcdin));
        assert_eq!(catalog.lookup("ZDA"), None);
    }

    #[test]
    fn unknown_sentence_yields_no_reading() {
        let line = encode("GP", "ZDA", &["201530.00", "04", "07", "2002", "00", "00"]);
        assert_eq!(parse_line(&line).unwrap(), None);
    }

    #[test]
    fn invalid_checksum_yields_no_reading() {
        let line = "$GPRMC,123519.487,A,3746.710,N,12225.354,W,5.2,54.7,021125,001.3,W*6A";
        assert_eq!(parse_line(line).unwrap(), None);
    }

    #[test]
    fn wrong_field_count_reports_index() {
        let line = encode("SD", "DBT", &["32.8", "f", "10.0"]);
        let failure = parse_line(&line).unwrap_err();
        assert_eq!(failure.sentence_type, SentenceType::Dbt);
        assert_eq!(failure.field_index, 3);
        assert!(matches!(failure.reason, FieldErrorKind::FieldCount { expected: 6, actual: 3 }));
    }

    #[test]
    fn unparseable_number_reports_index() {
        let line = encode("II", "MTW", &["warm", "C"]);
        let failure = parse_line(&line).unwrap_err();
        assert_eq!(failure.field_index, 0);
        assert!(matches!(failure.reason, FieldErrorKind::InvalidNumber { .. }));
    }

    #[test]
    fn generate_refuses_missing_input() {
        let catalog = Catalog::standard();
        let err = catalog
            .generate(SentenceType::Dbt, &SyntheticInputs::new(Utc::now()))
            .unwrap_err();
        assert_eq!(
            err,
            GenerateError::MissingInput {
                sentence_type: SentenceType::Dbt,
                input: "depth".into()
            }
        );
    }

    #[test]
    fn generate_rejects_non_finite_input() {
        let inputs = SyntheticInputs::new(Utc::now()).with_value("depth", f64::NAN);
        let err = Catalog::standard()
            .generate(SentenceType::Dbt, &inputs)
            .unwrap_err();
        assert!(matches!(err, GenerateError::InvalidInput { .. }));
    }

    #[test]
    fn unregistered_type_is_unsupported() {
        let err = Catalog::empty()
            .generate(SentenceType::Mtw, &SyntheticInputs::new(Utc::now()))
            .unwrap_err();
        assert_eq!(
            err,
            GenerateError::Unsupported {
                sentence_type: SentenceType::Mtw
            }
        );
    }

    #[test]
    fn talker_override_and_default() {
        let catalog = Catalog::standard();
        let inputs = SyntheticInputs::new(Utc::now()).with_value("water_temperature", 18.5);
        assert_eq!(catalog.generate(SentenceType::Mtw, &inputs).unwrap().talker_id, "SD");
        let inputs = inputs.with_talker("YX");
        let sentence = catalog.generate(SentenceType::Mtw, &inputs).unwrap();
        assert_eq!(sentence.address(), "YXMTW");
        assert!(sentence.valid);
    }

    #[test]
    fn register_replaces_existing_handler() {
        fn fixed(_: &SyntheticInputs) -> Result<Vec<String>, GenerateError> {
            Ok(vec!["1.0".into(), "C".into()])
        }
        let mut catalog = Catalog::standard();
        let original = *catalog.handler(SentenceType::Mtw).unwrap();
        let replaced = catalog.register(SentenceHandler {
            generate: fixed,
            ..original
        });
        assert!(replaced.is_some());
        let sentence = catalog
            .generate(SentenceType::Mtw, &SyntheticInputs::new(Utc::now()))
            .unwrap();
        assert_eq!(sentence.fields, vec!["1.0", "C"]);
    }
}
