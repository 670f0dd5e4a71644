//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{CodecError, Result};

/// Leading character of a sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StartDelimiter {
    /// `$` parametric sentence.
    Dollar,
    /// `!` encapsulated sentence (AIS and friends).
    Bang,
}

impl StartDelimiter {
    /// Character written on the wire.
    pub fn as_char(&self) -> char {
        match self {
            StartDelimiter::Dollar => '$',
            StartDelimiter::Bang => '!',
        }
    }
}

/// Tokenised sentence without any semantic interpretation.
///
/// Proprietary sentences (address starting with `P`) carry an empty talker id and
/// keep the full address in `sentence_id`, e.g. `PCDIN`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSentence {
    /// Leading delimiter.
    pub start: StartDelimiter,
    /// Two character talker id, empty for proprietary sentences.
    pub talker_id: String,
    /// Sentence id (`RMC`) or full proprietary address (`PCDIN`).
    pub sentence_id: String,
    /// Fields after the address, in order. Field index 0 is the first of these.
    pub fields: Vec<String>,
    /// Two uppercase hex digits, as received or as computed by [`RawSentence::seal`].
    pub checksum: Option<String>,
    /// True once the checksum has been verified or computed.
    pub valid: bool,
}

impl RawSentence {
    /// Build an unsealed `$` sentence; call [`RawSentence::seal`] before transmission.
    pub fn new(
        talker_id: impl Into<String>,
        sentence_id: impl Into<String>,
        fields: Vec<String>,
    ) -> Self {
        Self {
            start: StartDelimiter::Dollar,
            talker_id: talker_id.into(),
            sentence_id: sentence_id.into(),
            fields,
            checksum: None,
            valid: false,
        }
    }

    /// Talker and sentence id joined, as written after the delimiter.
    pub fn address(&self) -> String {
        format!("{}{}", self.talker_id, self.sentence_id)
    }

    /// Compute the checksum over the current fields and mark the sentence valid.
    pub fn seal(mut self) -> Self {
        self.checksum = Some(checksum(&self.body()));
        self.valid = true;
        self
    }

    /// Render the sentence as a transmittable line ending in `\r\n`.
    pub fn to_line(&self) -> String {
        let body = self.body();
        format!("{}{}*{}\r\n", self.start.as_char(), body, checksum(&body))
    }

    fn body(&self) -> String {
        let mut body = self.address();
        for field in &self.fields {
            body.push(',');
            body.push_str(field);
        }
        body
    }
}

impl fmt::Display for RawSentence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_line().trim_end())
    }
}

/// XOR of every byte in `body`, as two uppercase hex digits.
///
/// `body` is the text strictly between the start delimiter and `*`.
pub fn checksum(body: &str) -> String {
    let value = body.bytes().fold(0u8, |acc, byte| acc ^ byte);
    format!("{:02X}", value)
}

/// Tokenise a line. Checksum problems are reported through `valid = false`;
/// only framing problems are errors.
pub fn decode(line: &str) -> Result<RawSentence> {
    let trimmed = line.trim();
    let start = match trimmed.as_bytes().first() {
        Some(b'$') => StartDelimiter::Dollar,
        Some(b'!') => StartDelimiter::Bang,
        Some(_) => return Err(CodecError::malformed("missing '$' or '!' prefix")),
        None => return Err(CodecError::malformed("empty line")),
    };
    if !trimmed.is_ascii() {
        return Err(CodecError::malformed("non-ascii content"));
    }
    let rest = &trimmed[1..];
    let (body, received) = match rest.rfind('*') {
        Some(idx) => (&rest[..idx], Some(&rest[idx + 1..])),
        None => (rest, None),
    };
    if let Some(received) = received {
        if received.len() != 2 || !received.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CodecError::malformed(format!(
                "checksum suffix '{}' is not two hex digits",
                received
            )));
        }
    }

    let mut parts = body.split(',');
    let address = parts.next().unwrap_or_default();
    let (talker_id, sentence_id) = split_address(address)?;
    let fields = parts.map(str::to_owned).collect();

    let computed = checksum(body);
    let valid = received.is_some_and(|value| value.eq_ignore_ascii_case(&computed));
    Ok(RawSentence {
        start,
        talker_id,
        sentence_id,
        fields,
        checksum: received.map(str::to_ascii_uppercase),
        valid,
    })
}

/// Like [`decode`], but a missing or wrong checksum is an error.
pub fn decode_verified(line: &str) -> Result<RawSentence> {
    let sentence = decode(line)?;
    if sentence.valid {
        return Ok(sentence);
    }
    Err(CodecError::ChecksumMismatch {
        expected: checksum(&sentence.body()),
        actual: sentence.checksum,
    })
}

/// Join fields into a checksummed `$` line terminated by `\r\n`.
pub fn encode<S: AsRef<str>>(talker_id: &str, sentence_id: &str, fields: &[S]) -> String {
    let mut body = format!("{}{}", talker_id, sentence_id);
    for field in fields {
        body.push(',');
        body.push_str(field.as_ref());
    }
    format!("${}*{}\r\n", body, checksum(&body))
}

/// Five-character proprietary addresses. Any other five-character address is
/// a talker plus sentence id, even when the talker starts with `P`.
const PROPRIETARY_ADDRESSES: &[&str] = &["PCDIN"];

fn is_proprietary(address: &str) -> bool {
    if !address.starts_with('P') {
        return false;
    }
    match address.len() {
        5 => PROPRIETARY_ADDRESSES.contains(&address),
        len => (4..=8).contains(&len),
    }
}

fn split_address(address: &str) -> Result<(String, String)> {
    if !address.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(CodecError::malformed(format!(
            "address '{}' contains invalid characters",
            address
        )));
    }
    if is_proprietary(address) {
        return Ok((String::new(), address.to_owned()));
    }
    if address.len() != 5 {
        return Err(CodecError::malformed(format!(
            "address '{}' must be five characters",
            address
        )));
    }
    Ok((address[..2].to_owned(), address[2..].to_owned()))
}
