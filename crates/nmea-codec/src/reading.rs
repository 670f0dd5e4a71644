//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Structured readings handed to consumers once a sentence has been parsed.
use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::catalog::SentenceType;

/// Transport a sentence arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransportKind {
    /// TCP client connection.
    Tcp,
    /// UDP datagram.
    Udp,
    /// WebSocket client.
    #[strum(serialize = "websocket")]
    #[serde(rename = "websocket")]
    WebSocket,
    /// Outbound connection to a real instrument feed.
    Upstream,
    /// Produced in-process (simulator, tests).
    Internal,
}

/// Where a reading came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingSource {
    /// Transport the line arrived on.
    pub transport: TransportKind,
    /// Peer address when known.
    pub remote: Option<SocketAddr>,
}

impl ReadingSource {
    /// Source for readings produced inside the process.
    pub fn internal() -> Self {
        Self {
            transport: TransportKind::Internal,
            remote: None,
        }
    }

    /// Source for a line received from a network peer.
    pub fn remote(transport: TransportKind, remote: SocketAddr) -> Self {
        Self {
            transport,
            remote: Some(remote),
        }
    }
}

/// Physical unit attached to a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Unit {
    /// Decimal degrees (angles, positions).
    Degrees,
    /// Knots.
    Knots,
    /// Kilometres per hour.
    KilometersPerHour,
    /// Metres per second.
    MetersPerSecond,
    /// Metres.
    Meters,
    /// Feet.
    Feet,
    /// Fathoms.
    Fathoms,
    /// Degrees Celsius.
    Celsius,
    /// Pascals.
    Pascals,
    /// Volts.
    Volts,
    /// Revolutions per minute.
    Rpm,
    /// Percent.
    Percent,
    /// Dimensionless count or code.
    Count,
    /// Raw hex payload or free text.
    None,
}

/// Typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Floating point quantity.
    Number(f64),
    /// Integral quantity (counts, instance numbers, PGNs).
    Integer(i64),
    /// Free text or enumerated code.
    Text(String),
    /// Status flag (`A` = true, `V` = false).
    Flag(bool),
    /// UTC time of day.
    Time(NaiveTime),
    /// Calendar date.
    Date(NaiveDate),
}

impl FieldValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(value) => Some(*value),
            FieldValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Text view of the value, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Integer(v) => write!(f, "{}", v),
            FieldValue::Text(v) => f.write_str(v),
            FieldValue::Flag(v) => write!(f, "{}", v),
            FieldValue::Time(v) => write!(f, "{}", v),
            FieldValue::Date(v) => write!(f, "{}", v),
        }
    }
}

/// A value with its unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Typed value.
    pub value: FieldValue,
    /// Unit of `value`.
    pub unit: Unit,
}

impl Measurement {
    /// Floating point quantity.
    pub fn number(value: f64, unit: Unit) -> Self {
        Self {
            value: FieldValue::Number(value),
            unit,
        }
    }

    /// Integral quantity.
    pub fn integer(value: i64, unit: Unit) -> Self {
        Self {
            value: FieldValue::Integer(value),
            unit,
        }
    }

    /// Free text.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            value: FieldValue::Text(value.into()),
            unit: Unit::None,
        }
    }

    /// Status flag.
    pub fn flag(value: bool) -> Self {
        Self {
            value: FieldValue::Flag(value),
            unit: Unit::None,
        }
    }

    /// UTC time of day.
    pub fn time(value: NaiveTime) -> Self {
        Self {
            value: FieldValue::Time(value),
            unit: Unit::None,
        }
    }

    /// Calendar date.
    pub fn date(value: NaiveDate) -> Self {
        Self {
            value: FieldValue::Date(value),
            unit: Unit::None,
        }
    }
}

/// Immutable result of parsing one sentence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReading {
    /// Catalog entry that produced the reading.
    pub sentence_type: SentenceType,
    /// Talker of the source sentence (empty for proprietary sentences).
    pub talker_id: String,
    /// Semantic field name to value, in sentence order.
    pub fields: IndexMap<String, Measurement>,
    /// Time the reading was produced.
    pub received_at: DateTime<Utc>,
    /// Transport the sentence arrived on.
    pub source: ReadingSource,
}

impl ParsedReading {
    /// Look up a field.
    pub fn field(&self, name: &str) -> Option<&Measurement> {
        self.fields.get(name)
    }

    /// Numeric value of a field.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(|m| m.value.as_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_labels_match_metrics() {
        assert_eq!(TransportKind::WebSocket.to_string(), "websocket");
        assert_eq!(TransportKind::Upstream.to_string(), "upstream");
        let json = serde_json::to_string(&TransportKind::WebSocket).unwrap();
        assert_eq!(json, "\"websocket\"");
    }

    #[test]
    fn reading_serializes_with_tagged_values() {
        let mut fields = IndexMap::new();
        fields.insert("depth_meters".to_owned(), Measurement::number(10.0, Unit::Meters));
        fields.insert("valid".to_owned(), Measurement::flag(true));
        let reading = ParsedReading {
            sentence_type: SentenceType::Dbt,
            talker_id: "SD".into(),
            fields,
            received_at: Utc::now(),
            source: ReadingSource::internal(),
        };
        let json = serde_json::to_value(&reading).unwrap();
        assert_eq!(json["fields"]["depth_meters"]["value"]["kind"], "number");
        assert_eq!(json["fields"]["depth_meters"]["unit"], "meters");
        assert_eq!(reading.number("depth_meters"), Some(10.0));
        assert_eq!(reading.number("valid"), None);
    }
}
