//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! NMEA 2000 PGN messages and their Actisense serial framing.
//!
//! A frame on the wire is
//! `DLE STX 0x93 len prio pgn[3] dst src ts[4] dlen data[dlen] checksum DLE ETX`,
//! with every DLE between the delimiters doubled. The checksum byte makes the sum
//! of everything from the command byte to the checksum zero modulo 256.
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::catalog::FieldMap;
use crate::reading::{Measurement, Unit};
use crate::sentence::RawSentence;

const DLE: u8 = 0x10;
const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const N2K_MSG_RECEIVED: u8 = 0x93;
const HEADER_LEN: usize = 11;
/// Largest payload whose frame length still fits in one byte.
pub const MAX_FRAME_PAYLOAD: usize = u8::MAX as usize - HEADER_LEN;

/// Raymarine proprietary header (manufacturer 1851, marine industry).
pub const RAYMARINE_HEADER: [u8; 2] = [0x3B, 0x9F];

/// PGNs with payload codecs.
pub mod pgn {
    /// Water depth.
    pub const WATER_DEPTH: u32 = 128_267;
    /// Speed through water.
    pub const SPEED: u32 = 128_259;
    /// Vessel heading.
    pub const VESSEL_HEADING: u32 = 127_250;
    /// Wind data.
    pub const WIND_DATA: u32 = 130_306;
    /// Engine parameters, rapid update.
    pub const ENGINE_RAPID: u32 = 127_488;
    /// Position, rapid update.
    pub const POSITION_RAPID: u32 = 129_025;
    /// Raymarine locked heading.
    pub const LOCKED_HEADING: u32 = 65_360;
    /// Raymarine pilot mode.
    pub const PILOT_MODE: u32 = 65_379;
    /// Proprietary addressed command (autopilot keystrokes).
    pub const PROPRIETARY_COMMAND: u32 = 126_720;
}

/// Raymarine pilot mode codes carried in PGN 65379.
pub mod pilot_mode {
    /// Standby.
    pub const STANDBY: u16 = 0x0000;
    /// Auto (heading hold).
    pub const AUTO: u16 = 0x0040;
    /// Wind vane.
    pub const WIND: u16 = 0x0100;
    /// Track.
    pub const TRACK: u16 = 0x0180;
}

/// Framing or payload failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Input ended early.
    #[error("frame truncated")]
    Truncated,
    /// `DLE STX` / `DLE ETX` delimiters missing.
    #[error("frame delimiters missing")]
    MissingDelimiter,
    /// A lone DLE inside the frame.
    #[error("invalid DLE escape at byte {0}")]
    BadEscape(usize),
    /// Command byte other than N2K message received.
    #[error("unsupported command byte {0:#04x}")]
    UnsupportedCommand(u8),
    /// Declared lengths disagree with the bytes present.
    #[error("length mismatch: declared {declared}, found {actual}")]
    LengthMismatch {
        /// Length from the header.
        declared: usize,
        /// Bytes present.
        actual: usize,
    },
    /// Payload does not fit the one-byte length field.
    #[error("payload of {length} bytes exceeds the {max} byte frame limit")]
    PayloadTooLong {
        /// Payload bytes supplied.
        length: usize,
        /// Largest payload a frame can carry.
        max: usize,
    },
    /// Checksum did not sum to zero.
    #[error("frame checksum invalid")]
    Checksum,
    /// PGN payload shorter than its layout.
    #[error("PGN {pgn} payload needs {expected} bytes, found {actual}")]
    PayloadTooShort {
        /// PGN being decoded.
        pgn: u32,
        /// Minimum length.
        expected: usize,
        /// Bytes present.
        actual: usize,
    },
    /// Hex text could not be decoded.
    #[error("invalid hex: {0}")]
    Hex(String),
}

/// A single NMEA 2000 message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgnFrame {
    /// Priority 0-7.
    pub priority: u8,
    /// Parameter group number.
    pub pgn: u32,
    /// Source address.
    pub source: u8,
    /// Destination address, 255 for broadcast.
    pub destination: u8,
    /// Milliseconds, as stamped by the gateway.
    pub timestamp: u32,
    /// Payload.
    pub data: Vec<u8>,
}

impl PgnFrame {
    /// Broadcast frame with default priority.
    pub fn new(pgn: u32, source: u8, data: Vec<u8>) -> Self {
        let priority = match pgn {
            pgn::ENGINE_RAPID | pgn::POSITION_RAPID | pgn::VESSEL_HEADING => 2,
            _ => 3,
        };
        Self {
            priority,
            pgn,
            source,
            destination: 255,
            timestamp: 0,
            data,
        }
    }

    /// Same frame with a timestamp.
    pub fn at(mut self, timestamp_ms: u32) -> Self {
        self.timestamp = timestamp_ms;
        self
    }

    /// Wrap as a sealed `$PCDIN,<pgn>,<timestamp>,<source>,<hex>` sentence.
    pub fn to_pcdin(&self) -> RawSentence {
        RawSentence::new(
            "",
            "PCDIN",
            vec![
                format!("{:06X}", self.pgn),
                format!("{:08X}", self.timestamp),
                format!("{:02X}", self.source),
                hex::encode_upper(&self.data),
            ],
        )
        .seal()
    }

    /// Recover a frame from a PCDIN sentence.
    pub fn from_pcdin(sentence: &RawSentence) -> Result<Self, FrameError> {
        let field = |index: usize| -> Result<&str, FrameError> {
            sentence
                .fields
                .get(index)
                .map(String::as_str)
                .ok_or(FrameError::Truncated)
        };
        let pgn = parse_hex_u32(field(0)?)?;
        let timestamp = parse_hex_u32(field(1)?)?;
        let source = u8::try_from(parse_hex_u32(field(2)?)?)
            .map_err(|_| FrameError::Hex(field(2).unwrap_or_default().to_owned()))?;
        let data = hex::decode(field(3)?).map_err(|err| FrameError::Hex(err.to_string()))?;
        Ok(Self {
            priority: 3,
            pgn,
            source,
            destination: 255,
            timestamp,
            data,
        })
    }
}

pub(crate) fn parse_hex_u32(text: &str) -> Result<u32, FrameError> {
    u32::from_str_radix(text, 16).map_err(|_| FrameError::Hex(text.to_owned()))
}

/// Encode a frame with Actisense framing and DLE stuffing.
pub fn encode_frame(frame: &PgnFrame) -> Result<Vec<u8>, FrameError> {
    let too_long = || FrameError::PayloadTooLong {
        length: frame.data.len(),
        max: MAX_FRAME_PAYLOAD,
    };
    let data_len = u8::try_from(frame.data.len()).map_err(|_| too_long())?;
    let total_len = u8::try_from(HEADER_LEN + frame.data.len()).map_err(|_| too_long())?;
    let mut body = Vec::with_capacity(HEADER_LEN + frame.data.len() + 2);
    body.push(N2K_MSG_RECEIVED);
    body.push(total_len);
    body.push(frame.priority);
    body.extend_from_slice(&frame.pgn.to_le_bytes()[..3]);
    body.push(frame.destination);
    body.push(frame.source);
    body.extend_from_slice(&frame.timestamp.to_le_bytes());
    body.push(data_len);
    body.extend_from_slice(&frame.data);
    let sum = body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    body.push(0u8.wrapping_sub(sum));

    let mut out = Vec::with_capacity(body.len() + 8);
    out.extend_from_slice(&[DLE, STX]);
    for byte in body {
        out.push(byte);
        if byte == DLE {
            out.push(DLE);
        }
    }
    out.extend_from_slice(&[DLE, ETX]);
    Ok(out)
}

/// True when `bytes` opens like an Actisense frame.
pub fn is_frame(bytes: &[u8]) -> bool {
    bytes.starts_with(&[DLE, STX])
}

/// Decode one complete frame.
pub fn decode_frame(bytes: &[u8]) -> Result<PgnFrame, FrameError> {
    if bytes.len() < 4 {
        return Err(FrameError::Truncated);
    }
    if !bytes.starts_with(&[DLE, STX]) || !bytes.ends_with(&[DLE, ETX]) {
        return Err(FrameError::MissingDelimiter);
    }
    let stuffed = &bytes[2..bytes.len() - 2];
    let mut body = Vec::with_capacity(stuffed.len());
    let mut idx = 0;
    while idx < stuffed.len() {
        let byte = stuffed[idx];
        if byte == DLE {
            if stuffed.get(idx + 1) != Some(&DLE) {
                return Err(FrameError::BadEscape(idx + 2));
            }
            idx += 1;
        }
        body.push(byte);
        idx += 1;
    }

    if body.len() < HEADER_LEN + 3 {
        return Err(FrameError::Truncated);
    }
    if body[0] != N2K_MSG_RECEIVED {
        return Err(FrameError::UnsupportedCommand(body[0]));
    }
    if body.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) != 0 {
        return Err(FrameError::Checksum);
    }
    let declared = body[1] as usize;
    let payload = &body[2..body.len() - 1];
    if declared != payload.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }
    let data_len = payload[10] as usize;
    let data = &payload[HEADER_LEN..];
    if data_len != data.len() {
        return Err(FrameError::LengthMismatch {
            declared: data_len,
            actual: data.len(),
        });
    }
    Ok(PgnFrame {
        priority: payload[0],
        pgn: u32::from_le_bytes([payload[1], payload[2], payload[3], 0]),
        destination: payload[4],
        source: payload[5],
        timestamp: u32::from_le_bytes([payload[6], payload[7], payload[8], payload[9]]),
        data: data.to_vec(),
    })
}

const KNOTS_PER_MS: f64 = 3600.0 / 1852.0;

fn radians_u16(degrees: f64) -> u16 {
    let radians = degrees.rem_euclid(360.0).to_radians();
    (radians * 10_000.0).round().clamp(0.0, 65_532.0) as u16
}

fn degrees_from_u16(raw: u16) -> f64 {
    (raw as f64 / 10_000.0) * 180.0 / PI
}

fn radians_i16(degrees: f64) -> i16 {
    (degrees.to_radians() * 10_000.0)
        .round()
        .clamp(-32_767.0, 32_766.0) as i16
}

fn le_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn le_i16(data: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([data[at], data[at + 1]])
}

fn le_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

fn le_i32(data: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// PGN 128267.
pub fn water_depth(depth_m: f64, offset_m: f64) -> Vec<u8> {
    let depth = (depth_m.max(0.0) * 100.0).round().min(4_294_967_294.0) as u32;
    let offset = (offset_m * 1000.0).round().clamp(-32_767.0, 32_766.0) as i16;
    let mut data = vec![0xFF];
    data.extend_from_slice(&depth.to_le_bytes());
    data.extend_from_slice(&offset.to_le_bytes());
    data.push(0xFF);
    data
}

/// PGN 128259, water referenced.
pub fn speed(water_knots: f64) -> Vec<u8> {
    let stw = (water_knots.max(0.0) / KNOTS_PER_MS * 100.0)
        .round()
        .min(65_532.0) as u16;
    let mut data = vec![0xFF];
    data.extend_from_slice(&stw.to_le_bytes());
    data.extend_from_slice(&[0xFF, 0xFF, 0x00, 0xFF, 0xFF]);
    data
}

/// PGN 127250, magnetic reference.
pub fn vessel_heading(heading_deg: f64, variation_deg: Option<f64>) -> Vec<u8> {
    let mut data = vec![0xFF];
    data.extend_from_slice(&radians_u16(heading_deg).to_le_bytes());
    data.extend_from_slice(&i16::MAX.to_le_bytes());
    let variation = variation_deg.map(radians_i16).unwrap_or(i16::MAX);
    data.extend_from_slice(&variation.to_le_bytes());
    data.push(0xFD);
    data
}

/// Wind reference codes in PGN 130306.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindReference {
    /// Relative to the bow.
    Apparent,
    /// True, boat referenced.
    TrueBoat,
}

/// PGN 130306; `angle_deg` signed, negative to port.
pub fn wind_data(speed_knots: f64, angle_deg: f64, reference: WindReference) -> Vec<u8> {
    let speed = (speed_knots.max(0.0) / KNOTS_PER_MS * 100.0)
        .round()
        .min(65_532.0) as u16;
    let code = match reference {
        WindReference::Apparent => 2,
        WindReference::TrueBoat => 3,
    };
    let mut data = vec![0xFF];
    data.extend_from_slice(&speed.to_le_bytes());
    data.extend_from_slice(&radians_u16(angle_deg).to_le_bytes());
    data.extend_from_slice(&[0xF8 | code, 0xFF, 0xFF]);
    data
}

/// PGN 127488.
pub fn engine_rapid(instance: u8, rpm: f64) -> Vec<u8> {
    let speed = (rpm.max(0.0) * 4.0).round().min(65_532.0) as u16;
    let mut data = vec![instance];
    data.extend_from_slice(&speed.to_le_bytes());
    data.extend_from_slice(&[0xFF, 0xFF, 0x7F, 0xFF, 0xFF]);
    data
}

/// PGN 129025.
pub fn position_rapid(latitude: f64, longitude: f64) -> Vec<u8> {
    let lat = (latitude.clamp(-90.0, 90.0) * 1e7).round() as i32;
    let lon = (longitude.clamp(-180.0, 180.0) * 1e7).round() as i32;
    let mut data = Vec::with_capacity(8);
    data.extend_from_slice(&lat.to_le_bytes());
    data.extend_from_slice(&lon.to_le_bytes());
    data
}

/// PGN 65360, Raymarine locked heading (true and magnetic).
pub fn locked_heading(heading_deg: f64) -> Vec<u8> {
    let raw = radians_u16(heading_deg).to_le_bytes();
    let mut data = RAYMARINE_HEADER.to_vec();
    data.push(0xFF);
    data.extend_from_slice(&raw);
    data.extend_from_slice(&raw);
    data.push(0xFF);
    data
}

/// PGN 65379, Raymarine pilot mode.
pub fn pilot_mode(mode: u16) -> Vec<u8> {
    let mut data = RAYMARINE_HEADER.to_vec();
    data.extend_from_slice(&mode.to_le_bytes());
    data.extend_from_slice(&[0x00, 0x00, 0xFF, 0xFF]);
    data
}

fn pilot_mode_name(code: u16) -> &'static str {
    match code {
        pilot_mode::STANDBY => "standby",
        pilot_mode::AUTO => "auto",
        pilot_mode::WIND => "wind",
        pilot_mode::TRACK => "track",
        _ => "unknown",
    }
}

fn need(pgn: u32, data: &[u8], expected: usize) -> Result<(), FrameError> {
    if data.len() < expected {
        return Err(FrameError::PayloadTooShort {
            pgn,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn push(out: &mut FieldMap, name: &str, value: f64, unit: Unit) {
    out.push((name.to_owned(), Measurement::number(value, unit)));
}

/// Decode a supported PGN payload into reading fields. Unsupported PGNs decode
/// to no fields.
pub fn decode_fields(pgn: u32, data: &[u8]) -> Result<FieldMap, FrameError> {
    let mut out = FieldMap::new();
    match pgn {
        pgn::WATER_DEPTH => {
            need(pgn, data, 7)?;
            let depth = le_u32(data, 1);
            if depth != u32::MAX {
                push(&mut out, "depth", depth as f64 / 100.0, Unit::Meters);
            }
            let offset = le_i16(data, 5);
            if offset != i16::MAX {
                push(&mut out, "offset", offset as f64 / 1000.0, Unit::Meters);
            }
        }
        pgn::SPEED => {
            need(pgn, data, 3)?;
            let stw = le_u16(data, 1);
            if stw != u16::MAX {
                push(&mut out, "speed_water", stw as f64 / 100.0 * KNOTS_PER_MS, Unit::Knots);
            }
        }
        pgn::VESSEL_HEADING => {
            need(pgn, data, 7)?;
            let heading = le_u16(data, 1);
            if heading != u16::MAX {
                push(&mut out, "heading", degrees_from_u16(heading), Unit::Degrees);
            }
            let variation = le_i16(data, 5);
            if variation != i16::MAX {
                let degrees = (variation as f64 / 10_000.0).to_degrees();
                push(&mut out, "variation", degrees, Unit::Degrees);
            }
        }
        pgn::WIND_DATA => {
            need(pgn, data, 6)?;
            let speed = le_u16(data, 1);
            if speed != u16::MAX {
                push(&mut out, "wind_speed", speed as f64 / 100.0 * KNOTS_PER_MS, Unit::Knots);
            }
            let angle = le_u16(data, 3);
            if angle != u16::MAX {
                let degrees = degrees_from_u16(angle);
                let signed = if degrees > 180.0 { degrees - 360.0 } else { degrees };
                push(&mut out, "wind_angle", signed, Unit::Degrees);
            }
            let reference = match data[5] & 0x07 {
                2 => "relative",
                _ => "true",
            };
            out.push(("reference".into(), Measurement::text(reference)));
        }
        pgn::ENGINE_RAPID => {
            need(pgn, data, 3)?;
            out.push((
                "engine_instance".into(),
                Measurement::integer(data[0] as i64, Unit::Count),
            ));
            let speed = le_u16(data, 1);
            if speed != u16::MAX {
                push(&mut out, "rpm", speed as f64 / 4.0, Unit::Rpm);
            }
        }
        pgn::POSITION_RAPID => {
            need(pgn, data, 8)?;
            push(&mut out, "latitude", le_i32(data, 0) as f64 / 1e7, Unit::Degrees);
            push(&mut out, "longitude", le_i32(data, 4) as f64 / 1e7, Unit::Degrees);
        }
        pgn::LOCKED_HEADING => {
            need(pgn, data, 7)?;
            push(&mut out, "locked_heading", degrees_from_u16(le_u16(data, 3)), Unit::Degrees);
            push(
                &mut out,
                "locked_heading_magnetic",
                degrees_from_u16(le_u16(data, 5)),
                Unit::Degrees,
            );
        }
        pgn::PILOT_MODE => {
            need(pgn, data, 4)?;
            let code = le_u16(data, 2);
            out.push(("pilot_mode".into(), Measurement::text(pilot_mode_name(code))));
            out.push((
                "pilot_mode_code".into(),
                Measurement::integer(code as i64, Unit::Count),
            ));
        }
        _ => {}
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(fields: &FieldMap, name: &str) -> f64 {
        fields
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, m)| m.value.as_f64())
            .unwrap()
    }

    #[test]
    fn frame_round_trips_with_dle_stuffing() {
        let frame = PgnFrame::new(pgn::WATER_DEPTH, 0x10, vec![0x10, 0x02, 0x10, 0x03, 0xAA]).at(0x1010);
        let bytes = encode_frame(&frame).unwrap();
        assert!(is_frame(&bytes));
        assert!(bytes.windows(2).filter(|w| w[0] == DLE && w[1] == DLE).count() >= 3);
        assert_eq!(decode_frame(&bytes).unwrap(), frame);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let largest = PgnFrame::new(pgn::WATER_DEPTH, 1, vec![0xAB; MAX_FRAME_PAYLOAD]);
        let bytes = encode_frame(&largest).unwrap();
        assert_eq!(decode_frame(&bytes).unwrap(), largest);

        let oversized = PgnFrame::new(pgn::WATER_DEPTH, 1, vec![0xAB; MAX_FRAME_PAYLOAD + 1]);
        assert_eq!(
            encode_frame(&oversized),
            Err(FrameError::PayloadTooLong {
                length: MAX_FRAME_PAYLOAD + 1,
                max: MAX_FRAME_PAYLOAD,
            })
        );
    }

    #[test]
    fn corrupted_frame_fails_checksum() {
        let frame = PgnFrame::new(pgn::SPEED, 3, speed(6.0));
        let mut bytes = encode_frame(&frame).unwrap();
        let idx = bytes.len() - 5;
        bytes[idx] ^= 0x01;
        assert!(matches!(
            decode_frame(&bytes),
            Err(FrameError::Checksum) | Err(FrameError::BadEscape(_))
        ));
    }

    #[test]
    fn lone_dle_is_rejected() {
        let bytes = [DLE, STX, 0x93, DLE, 0x01, DLE, ETX];
        assert_eq!(decode_frame(&bytes), Err(FrameError::BadEscape(3)));
        assert_eq!(decode_frame(&[0x00, 0x01]), Err(FrameError::Truncated));
        assert_eq!(
            decode_frame(&[0x00, 0x01, 0x02, 0x03, 0x04]),
            Err(FrameError::MissingDelimiter)
        );
    }

    #[test]
    fn depth_and_position_payloads_decode() {
        let fields = decode_fields(pgn::WATER_DEPTH, &water_depth(12.34, -0.5)).unwrap();
        assert!((number(&fields, "depth") - 12.34).abs() < 1e-9);
        assert!((number(&fields, "offset") + 0.5).abs() < 1e-9);

        let fields =
            decode_fields(pgn::POSITION_RAPID, &position_rapid(37.7785, -122.4226)).unwrap();
        assert!((number(&fields, "latitude") - 37.7785).abs() < 1e-6);
        assert!((number(&fields, "longitude") + 122.4226).abs() < 1e-6);
    }

    #[test]
    fn heading_and_wind_payloads_decode() {
        let fields = decode_fields(pgn::VESSEL_HEADING, &vessel_heading(270.0, Some(-2.0))).unwrap();
        assert!((number(&fields, "heading") - 270.0).abs() < 0.01);
        assert!((number(&fields, "variation") + 2.0).abs() < 0.01);

        let fields =
            decode_fields(pgn::WIND_DATA, &wind_data(12.0, -45.0, WindReference::Apparent)).unwrap();
        assert!((number(&fields, "wind_angle") + 45.0).abs() < 0.01);
        assert!((number(&fields, "wind_speed") - 12.0).abs() < 0.02);
    }

    #[test]
    fn pilot_payloads_decode() {
        let fields = decode_fields(pgn::PILOT_MODE, &pilot_mode(pilot_mode::AUTO)).unwrap();
        assert_eq!(fields[0].1, Measurement::text("auto"));
        let fields = decode_fields(pgn::LOCKED_HEADING, &locked_heading(90.0)).unwrap();
        assert!((number(&fields, "locked_heading") - 90.0).abs() < 0.01);
        let fields = decode_fields(pgn::ENGINE_RAPID, &engine_rapid(1, 2150.0)).unwrap();
        assert_eq!(number(&fields, "rpm"), 2150.0);
    }

    #[test]
    fn short_payload_is_reported() {
        assert_eq!(
            decode_fields(pgn::POSITION_RAPID, &[0, 1, 2]),
            Err(FrameError::PayloadTooShort {
                pgn: pgn::POSITION_RAPID,
                expected: 8,
                actual: 3
            })
        );
        assert!(decode_fields(59_904, &[1, 2, 3]).unwrap().is_empty());
    }

    #[test]
    fn pcdin_wrapping_round_trips() {
        let frame = PgnFrame::new(pgn::WATER_DEPTH, 0x23, water_depth(5.0, 0.0)).at(42);
        let sentence = frame.to_pcdin();
        assert_eq!(sentence.fields[0], "01F50B");
        assert!(sentence.valid);
        let back = PgnFrame::from_pcdin(&sentence).unwrap();
        assert_eq!(back.pgn, frame.pgn);
        assert_eq!(back.source, 0x23);
        assert_eq!(back.timestamp, 42);
        assert_eq!(back.data, frame.data);
    }
}
