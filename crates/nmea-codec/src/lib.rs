//! ---
//! nmea_section: "02-protocol-codecs"
//! nmea_subsection: "module"
//! nmea_type: "source"
//! nmea_scope: "code"
//! nmea_description: "Sentence codec, typed catalog and PGN framing."
//! nmea_version: "v0.1.0"
//! nmea_owner: "tbd"
//! ---
//! Wire-level building blocks shared by the simulator and the transport bridge.
//!
//! * [`sentence`] tokenises and checksums NMEA 0183 lines.
//! * [`catalog`] maps sentence ids to typed parse/generate function pairs.
//! * [`n2k`] frames NMEA 2000 PGN messages for binary transports.
#![warn(missing_docs)]

pub mod catalog;
pub mod n2k;
pub mod reading;
pub mod sentence;

/// Shared result type for framing operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Framing-level failures. Both variants are local to one sentence and never
/// fatal to the stream carrying it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Line cannot be tokenised as a sentence.
    #[error("malformed sentence: {reason}")]
    MalformedSentence {
        /// Human readable cause.
        reason: String,
    },
    /// Line tokenised but the checksum is missing or wrong.
    #[error("checksum mismatch: expected {expected}, received {actual:?}")]
    ChecksumMismatch {
        /// Checksum computed over the body.
        expected: String,
        /// Checksum carried by the line, if any.
        actual: Option<String>,
    },
}

impl CodecError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        CodecError::MalformedSentence {
            reason: reason.into(),
        }
    }
}

pub use catalog::{
    Catalog, FieldError, FieldErrorKind, GenerateError, ParseFailure, SentenceHandler,
    SentenceType, SyntheticInputs,
};
pub use n2k::{FrameError, PgnFrame};
pub use reading::{FieldValue, Measurement, ParsedReading, ReadingSource, TransportKind, Unit};
pub use sentence::{checksum, decode, decode_verified, encode, RawSentence, StartDelimiter};
