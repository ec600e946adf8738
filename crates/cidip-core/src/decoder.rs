//! Contact ID over IP line decoder
//!
//! Wire format, one message per line:
//!
//! ```text
//! <username>,<password>,<client code>,<CID>[,...ignored]
//! ```
//!
//! The CID is 11 digits laid out as `TT Q EEE GG SSS`: message type,
//! event qualifier, event code, group/partition, zone or user.

use crate::event::{CidFields, Event};
use std::fmt;
use std::ops::Range;
use thiserror::Error;

/// Number of characters in a Contact ID string
pub const CID_LENGTH: usize = 11;

/// Minimum number of comma-separated envelope fields
pub const ENVELOPE_FIELDS: usize = 4;

/// Fixed-width sub-fields of the Contact ID string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CidField {
    MessageType,
    EventQualifier,
    EventCode,
    Group,
    SensorOrUser,
}

impl CidField {
    pub const ALL: [CidField; 5] = [
        CidField::MessageType,
        CidField::EventQualifier,
        CidField::EventCode,
        CidField::Group,
        CidField::SensorOrUser,
    ];

    /// Character range of this field inside the CID
    pub fn range(&self) -> Range<usize> {
        match self {
            CidField::MessageType => 0..2,
            CidField::EventQualifier => 2..3,
            CidField::EventCode => 3..6,
            CidField::Group => 6..8,
            CidField::SensorOrUser => 8..11,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CidField::MessageType => "message type",
            CidField::EventQualifier => "event qualifier",
            CidField::EventCode => "event code",
            CidField::Group => "group",
            CidField::SensorOrUser => "sensor/user",
        }
    }
}

impl fmt::Display for CidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a line could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Malformed envelope: expected at least 4 fields, got {fields}")]
    MalformedEnvelope { fields: usize },

    #[error("Invalid CID length: expected 11 characters, got {length}")]
    InvalidCidLength { length: usize },

    #[error("Invalid CID format: {field} {value:?} is not numeric")]
    InvalidCidFormat { field: CidField, value: String },
}

/// Tag identifying the kind of decode failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeErrorKind {
    MalformedEnvelope,
    InvalidCidLength,
    InvalidCidFormat,
}

impl DecodeError {
    pub fn kind(&self) -> DecodeErrorKind {
        match self {
            DecodeError::MalformedEnvelope { .. } => DecodeErrorKind::MalformedEnvelope,
            DecodeError::InvalidCidLength { .. } => DecodeErrorKind::InvalidCidLength,
            DecodeError::InvalidCidFormat { .. } => DecodeErrorKind::InvalidCidFormat,
        }
    }
}

/// Decode one envelope line into an [`Event`]
///
/// Surrounding whitespace and line terminators are trimmed first; the
/// trimmed line becomes [`Event::raw`].
pub fn decode(line: &str) -> Result<Event, DecodeError> {
    let raw = line.trim();

    let fields: Vec<&str> = raw.split(',').collect();
    if fields.len() < ENVELOPE_FIELDS {
        return Err(DecodeError::MalformedEnvelope {
            fields: fields.len(),
        });
    }

    let (username, password, client_code, cid) = (fields[0], fields[1], fields[2], fields[3]);
    let cid_fields = parse_cid(cid)?;

    Ok(Event::new(
        raw.to_string(),
        username.to_string(),
        password.to_string(),
        client_code.to_string(),
        cid.to_string(),
        cid_fields,
    ))
}

/// Slice and validate the 11-character Contact ID
fn parse_cid(cid: &str) -> Result<CidFields, DecodeError> {
    let chars: Vec<char> = cid.chars().collect();
    if chars.len() != CID_LENGTH {
        return Err(DecodeError::InvalidCidLength {
            length: chars.len(),
        });
    }

    let mut values = [0u16; 5];
    for (slot, field) in values.iter_mut().zip(CidField::ALL) {
        *slot = parse_digits(&chars[field.range()]).ok_or_else(|| {
            DecodeError::InvalidCidFormat {
                field,
                value: chars[field.range()].iter().collect(),
            }
        })?;
    }

    // Widths cap the values: at most 2 digits for the u8 fields.
    Ok(CidFields {
        message_type: values[0] as u8,
        event_qualifier: values[1] as u8,
        event_code: values[2],
        group: values[3] as u8,
        sensor_or_user: values[4],
    })
}

fn parse_digits(digits: &[char]) -> Option<u16> {
    digits.iter().try_fold(0u16, |acc, c| {
        // to_digit(10) only accepts ASCII '0'..='9'
        Some(acc * 10 + c.to_digit(10)? as u16)
    })
}

/// Stateless decoder handle
///
/// Wraps [`decode`] for callers that prefer to hold a decoder value.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventDecoder;

impl EventDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, line: &str) -> Result<Event, DecodeError> {
        decode(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_open_close() {
        let event = decode("user,pass,AXPRO,18340101501").unwrap();
        assert_eq!(event.username(), "user");
        assert_eq!(event.password(), "pass");
        assert_eq!(event.client_code(), "AXPRO");
        assert_eq!(event.cid(), "18340101501");
        assert_eq!(event.message_type(), 18);
        assert_eq!(event.event_qualifier(), 3);
        assert_eq!(event.event_code(), 401);
        assert_eq!(event.group(), 1);
        assert_eq!(event.sensor_or_user(), 501);
        assert!(!event.is_test());
    }

    #[test]
    fn test_decode_service_test_report() {
        let event = decode("user,pass,AXPRO,18160200602").unwrap();
        assert_eq!(event.event_code(), 602);
        assert!(event.is_test());
    }

    #[test]
    fn test_raw_is_trimmed() {
        let event = decode("user,pass,AXPRO,18340101501\r\n").unwrap();
        assert_eq!(event.raw(), "user,pass,AXPRO,18340101501");
    }

    #[test]
    fn test_extra_fields_ignored() {
        let event = decode("user,pass,AXPRO,18340101501,extra,,more").unwrap();
        assert_eq!(event.cid(), "18340101501");
        assert_eq!(event.raw(), "user,pass,AXPRO,18340101501,extra,,more");
    }

    #[test]
    fn test_empty_credentials_allowed() {
        let event = decode(",,AXPRO,18340101501").unwrap();
        assert_eq!(event.username(), "");
        assert_eq!(event.password(), "");
    }

    #[test]
    fn test_malformed_envelope() {
        let err = decode("a,b,c").unwrap_err();
        assert_eq!(err, DecodeError::MalformedEnvelope { fields: 3 });
        assert_eq!(err.kind(), DecodeErrorKind::MalformedEnvelope);

        assert_eq!(
            decode("").unwrap_err().kind(),
            DecodeErrorKind::MalformedEnvelope
        );
    }

    #[test]
    fn test_cid_too_short() {
        let err = decode("a,b,c,1234").unwrap_err();
        assert_eq!(err, DecodeError::InvalidCidLength { length: 4 });
        assert_eq!(err.kind(), DecodeErrorKind::InvalidCidLength);
    }

    #[test]
    fn test_cid_too_long() {
        let err = decode("a,b,c,183401015012").unwrap_err();
        assert_eq!(err, DecodeError::InvalidCidLength { length: 12 });
    }

    #[test]
    fn test_trailing_empty_field_counts() {
        // "a,b,c," has four fields, the last one empty
        let err = decode("a,b,c,").unwrap_err();
        assert_eq!(err, DecodeError::InvalidCidLength { length: 0 });
    }

    #[test]
    fn test_non_digit_in_cid() {
        let err = decode("a,b,c,1A340101501").unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::InvalidCidFormat);
        assert_eq!(
            err,
            DecodeError::InvalidCidFormat {
                field: CidField::MessageType,
                value: "1A".to_string(),
            }
        );
    }

    #[test]
    fn test_failing_field_is_reported() {
        let cases = [
            ("18X40101501", CidField::EventQualifier),
            ("1834-101501", CidField::EventCode),
            ("183401 1501", CidField::Group),
            ("183401015+1", CidField::SensorOrUser),
        ];
        for (cid, expected) in cases {
            match decode(&format!("u,p,c,{}", cid)) {
                Err(DecodeError::InvalidCidFormat { field, .. }) => assert_eq!(field, expected),
                other => panic!("unexpected result for {}: {:?}", cid, other),
            }
        }
    }

    #[test]
    fn test_non_ascii_digits_rejected() {
        // Arabic-Indic digit: a Unicode digit, but not an ASCII one
        let err = decode("u,p,c,\u{0661}8340101501").unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::InvalidCidFormat);
    }

    #[test]
    fn test_unknown_codes_still_decode() {
        let event = decode("u,p,c,18199999999").unwrap();
        assert_eq!(event.event_code(), 999);
        assert_eq!(event.description(), "999");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            DecodeError::MalformedEnvelope { fields: 2 }.to_string(),
            "Malformed envelope: expected at least 4 fields, got 2"
        );
        assert_eq!(
            DecodeError::InvalidCidFormat {
                field: CidField::EventCode,
                value: "4x1".to_string()
            }
            .to_string(),
            "Invalid CID format: event code \"4x1\" is not numeric"
        );
    }

    #[test]
    fn test_decoder_handle() {
        let decoder = EventDecoder::new();
        assert_eq!(decoder.decode("a,b,c,18340101501").unwrap().event_code(), 401);
    }
}
