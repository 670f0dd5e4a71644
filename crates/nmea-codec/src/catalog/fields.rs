//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Field access and formatting helpers shared by the handlers.
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use super::{FieldError, FieldErrorKind};
use crate::reading::{Measurement, Unit};

/// Named measurements in sentence order.
pub type FieldMap = Vec<(String, Measurement)>;

/// Positional view over a sentence's fields with typed accessors.
///
/// Empty fields read as `None`; anything present but unparseable is an error
/// carrying the field index.
pub(crate) struct Fields<'a> {
    fields: &'a [String],
}

impl<'a> Fields<'a> {
    /// Check the field count lies in `min..=max`.
    pub fn new(fields: &'a [String], min: usize, max: usize) -> Result<Self, FieldError> {
        if fields.len() < min {
            return Err(FieldError::new(
                fields.len(),
                FieldErrorKind::FieldCount {
                    expected: min,
                    actual: fields.len(),
                },
            ));
        }
        if fields.len() > max {
            return Err(FieldError::new(
                max,
                FieldErrorKind::FieldCount {
                    expected: max,
                    actual: fields.len(),
                },
            ));
        }
        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn raw(&self, index: usize) -> &'a str {
        self.fields.get(index).map(|s| s.trim()).unwrap_or("")
    }

    pub fn text(&self, index: usize) -> Option<&'a str> {
        Some(self.raw(index)).filter(|s| !s.is_empty())
    }

    pub fn number(&self, index: usize) -> Result<Option<f64>, FieldError> {
        let Some(text) = self.text(index) else {
            return Ok(None);
        };
        match text.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(Some(value)),
            _ => Err(invalid_number(index, text)),
        }
    }

    pub fn required_number(&self, index: usize) -> Result<f64, FieldError> {
        self.number(index)?
            .ok_or_else(|| FieldError::new(index, FieldErrorKind::MissingValue))
    }

    pub fn integer(&self, index: usize) -> Result<Option<i64>, FieldError> {
        let Some(text) = self.text(index) else {
            return Ok(None);
        };
        text.parse::<i64>()
            .map(Some)
            .map_err(|_| invalid_number(index, text))
    }

    /// `A` → true, `V` → false.
    pub fn flag(&self, index: usize) -> Result<Option<bool>, FieldError> {
        match self.text(index) {
            None => Ok(None),
            Some("A") => Ok(Some(true)),
            Some("V") => Ok(Some(false)),
            Some(other) => Err(invalid_value(index, other)),
        }
    }

    /// One of `allowed`, or `None` when empty.
    pub fn letter(&self, index: usize, allowed: &[&str]) -> Result<Option<&'a str>, FieldError> {
        match self.text(index) {
            None => Ok(None),
            Some(letter) if allowed.contains(&letter) => Ok(Some(letter)),
            Some(other) => Err(invalid_value(index, other)),
        }
    }

    /// `value` field followed by a hemisphere/direction letter; `negative` flips the sign.
    pub fn signed(
        &self,
        index: usize,
        positive: &str,
        negative: &str,
    ) -> Result<Option<f64>, FieldError> {
        let Some(value) = self.number(index)? else {
            return Ok(None);
        };
        match self.letter(index + 1, &[positive, negative])? {
            Some(letter) if letter == negative => Ok(Some(-value)),
            _ => Ok(Some(value)),
        }
    }

    /// `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere letter → decimal degrees.
    pub fn coordinate(
        &self,
        index: usize,
        positive: &str,
        negative: &str,
        limit: f64,
    ) -> Result<Option<f64>, FieldError> {
        let Some(text) = self.text(index) else {
            return Ok(None);
        };
        let raw: f64 = text.parse().map_err(|_| invalid_number(index, text))?;
        let degrees = (raw / 100.0).trunc();
        let minutes = raw - degrees * 100.0;
        if !(0.0..60.0).contains(&minutes) {
            return Err(invalid_value(index, text));
        }
        let decimal = degrees + minutes / 60.0;
        if decimal > limit {
            return Err(invalid_value(index, text));
        }
        match self.letter(index + 1, &[positive, negative])? {
            Some(letter) if letter == negative => Ok(Some(-decimal)),
            Some(_) => Ok(Some(decimal)),
            None => Err(FieldError::new(index + 1, FieldErrorKind::MissingValue)),
        }
    }

    /// `hhmmss` with optional fractional seconds.
    pub fn time(&self, index: usize) -> Result<Option<NaiveTime>, FieldError> {
        let Some(text) = self.text(index) else {
            return Ok(None);
        };
        let (whole, fraction) = text.split_once('.').unwrap_or((text, ""));
        let digits_ok = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if whole.len() != 6 || !digits_ok(whole) || !digits_ok(fraction) {
            return Err(invalid_value(index, text));
        }
        let part = |range: std::ops::Range<usize>| whole[range].parse::<u32>().unwrap_or(99);
        let nanos = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{:0<9}", &fraction[..fraction.len().min(9)]);
            padded.parse::<u32>().unwrap_or(0)
        };
        NaiveTime::from_hms_nano_opt(part(0..2), part(2..4), part(4..6), nanos)
            .map(Some)
            .ok_or_else(|| invalid_value(index, text))
    }

    /// `ddmmyy`.
    pub fn date(&self, index: usize) -> Result<Option<NaiveDate>, FieldError> {
        let Some(text) = self.text(index) else {
            return Ok(None);
        };
        NaiveDate::parse_from_str(text, "%d%m%y")
            .map(Some)
            .map_err(|_| invalid_value(index, text))
    }
}

pub(crate) fn invalid_number(index: usize, text: &str) -> FieldError {
    FieldError::new(
        index,
        FieldErrorKind::InvalidNumber {
            value: text.to_owned(),
        },
    )
}

pub(crate) fn invalid_value(index: usize, text: &str) -> FieldError {
    FieldError::new(
        index,
        FieldErrorKind::InvalidValue {
            value: text.to_owned(),
        },
    )
}

/// Push a numeric measurement when present.
pub(crate) fn put(out: &mut FieldMap, name: &str, value: Option<f64>, unit: Unit) {
    if let Some(value) = value {
        out.push((name.to_owned(), Measurement::number(value, unit)));
    }
}

pub(crate) fn fixed(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

pub(crate) fn optional_fixed(value: Option<f64>, decimals: usize) -> String {
    value.map(|v| fixed(v, decimals)).unwrap_or_default()
}

/// Normalise an angle into `[0, 360)`.
pub(crate) fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Map an angle into `(-180, 180]`; negative is port.
pub(crate) fn signed_degrees(angle: f64) -> f64 {
    let wrapped = normalize_degrees(angle);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

fn degrees_minutes(value: f64, degree_digits: usize) -> String {
    let total_minutes = (value.abs() * 60.0 * 10_000.0).round() / 10_000.0;
    let degrees = (total_minutes / 60.0).floor();
    let minutes = total_minutes - degrees * 60.0;
    format!(
        "{:0width$}{:07.4}",
        degrees as u32,
        minutes,
        width = degree_digits
    )
}

/// Decimal latitude → `[ddmm.mmmm, N|S]`.
pub(crate) fn latitude_fields(latitude: f64) -> [String; 2] {
    let hemisphere = if latitude < 0.0 { "S" } else { "N" };
    [degrees_minutes(latitude, 2), hemisphere.to_owned()]
}

/// Decimal longitude → `[dddmm.mmmm, E|W]`.
pub(crate) fn longitude_fields(longitude: f64) -> [String; 2] {
    let hemisphere = if longitude < 0.0 { "W" } else { "E" };
    [degrees_minutes(longitude, 3), hemisphere.to_owned()]
}

pub(crate) fn time_field(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%H%M%S%.3f").to_string()
}

pub(crate) fn date_field(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%d%m%y").to_string()
}

pub(crate) const KNOTS_PER_KMH: f64 = 1.0 / 1.852;
pub(crate) const KNOTS_PER_MS: f64 = 3600.0 / 1852.0;
pub(crate) const KNOTS_PER_MPH: f64 = 1609.344 / 1852.0;
pub(crate) const METERS_PER_FOOT: f64 = 0.3048;
pub(crate) const FEET_PER_FATHOM: f64 = 6.0;

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn coordinates_convert_and_negate() {
        let raw = owned(&["3746.710", "N", "12225.354", "W"]);
        let fields = Fields::new(&raw, 4, 4).unwrap();
        let lat = fields.coordinate(0, "N", "S", 90.0).unwrap().unwrap();
        let lon = fields.coordinate(2, "E", "W", 180.0).unwrap().unwrap();
        assert!((lat - 37.7785).abs() < 1e-4);
        assert!((lon + 122.4226).abs() < 1e-4);
    }

    #[test]
    fn coordinate_formatting_round_trips() {
        let [lat, ns] = latitude_fields(-33.8568);
        let [lon, ew] = longitude_fields(151.2153);
        let raw = vec![lat.clone(), ns, lon.clone(), ew];
        let fields = Fields::new(&raw, 4, 4).unwrap();
        assert!((fields.coordinate(0, "N", "S", 90.0).unwrap().unwrap() + 33.8568).abs() < 1e-5);
        assert!((fields.coordinate(2, "E", "W", 180.0).unwrap().unwrap() - 151.2153).abs() < 1e-5);
        assert_eq!(lat.len(), 9);
        assert_eq!(lon.len(), 10);
    }

    #[test]
    fn minute_rounding_never_produces_sixty() {
        let [lat, _] = latitude_fields(10.999_999_99);
        assert_eq!(lat, "1100.0000");
    }

    #[test]
    fn time_accepts_fraction_and_rejects_garbage() {
        let raw = owned(&["123519.487", "123519", "1235", "256000"]);
        let fields = Fields::new(&raw, 4, 4).unwrap();
        let time = fields.time(0).unwrap().unwrap();
        assert_eq!(time.format("%H:%M:%S%.3f").to_string(), "12:35:19.487");
        assert!(fields.time(1).unwrap().is_some());
        assert!(fields.time(2).is_err());
        assert!(fields.time(3).is_err());
    }

    #[test]
    fn angle_helpers_wrap() {
        assert_eq!(normalize_degrees(-10.0), 350.0);
        assert_eq!(normalize_degrees(720.0), 0.0);
        assert_eq!(signed_degrees(270.0), -90.0);
        assert_eq!(signed_degrees(180.0), 180.0);
    }

    #[test]
    fn too_many_fields_points_past_the_last_allowed() {
        let raw = owned(&["1", "2", "3"]);
        let err = Fields::new(&raw, 1, 2).err().unwrap();
        assert_eq!(err.index, 2);
    }
}
