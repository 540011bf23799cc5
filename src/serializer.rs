//! Reading serializer
//!
//! Wire grammar (field order fixed, no whitespace):
//!
//! ```text
//! {"valor":<decimal, two places>,"ts":<unsigned decimal>}
//! ```
//!
//! The parser works on raw bytes bounded by [`MAX_FRAME_SIZE`](crate::MAX_FRAME_SIZE);
//! it never assumes a terminator and fails instead of reading further.

use crate::contracts::Reading;
use crate::errors::ParseError;

const VALUE_PREFIX: &str = "{\"valor\":";
const TS_SEPARATOR: &str = ",\"ts\":";
const CLOSE: char = '}';

/// Render a reading as `{"valor":%.2f,"ts":%u}`
pub fn serialize(reading: &Reading) -> String {
    format!(
        "{}{:.2}{}{}{}",
        VALUE_PREFIX, reading.value, TS_SEPARATOR, reading.timestamp, CLOSE
    )
}

/// Parse the fixed grammar back into a reading
///
/// # Errors
/// Any deviation from the grammar: oversize input, invalid UTF-8, missing
/// or reordered fields, non-numeric values, bytes after the closing brace.
pub fn deserialize(bytes: &[u8]) -> Result<Reading, ParseError> {
    if bytes.len() > crate::MAX_FRAME_SIZE {
        return Err(ParseError::FrameTooLarge {
            len: bytes.len(),
            max: crate::MAX_FRAME_SIZE,
        });
    }

    let text = std::str::from_utf8(bytes).map_err(|_| ParseError::NotUtf8)?;

    let rest = text
        .strip_prefix(VALUE_PREFIX)
        .ok_or(ParseError::UnexpectedPrefix)?;
    let (value_token, rest) = rest
        .split_once(TS_SEPARATOR)
        .ok_or(ParseError::MissingTimestamp)?;
    let (ts_token, trailer) = rest.split_once(CLOSE).ok_or(ParseError::Unterminated)?;

    if !trailer.is_empty() {
        return Err(ParseError::TrailingData);
    }

    let value = value_token
        .parse::<f32>()
        .map_err(|_| ParseError::InvalidValue(value_token.to_string()))?;

    Ok(Reading {
        value,
        timestamp: parse_timestamp(ts_token)?,
    })
}

// Digits only: `u32::from_str` would also take a leading '+'.
fn parse_timestamp(token: &str) -> Result<u32, ParseError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::InvalidTimestamp(token.to_string()));
    }

    token
        .parse::<u32>()
        .map_err(|_| ParseError::InvalidTimestamp(token.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_layout() {
        let text = serialize(&Reading::new(26.5, 1000));
        assert_eq!(text, r#"{"valor":26.50,"ts":1000}"#);
    }

    #[test]
    fn test_serialize_rounds_to_two_places() {
        assert_eq!(serialize(&Reading::new(-7.256, 0)), r#"{"valor":-7.26,"ts":0}"#);
        assert_eq!(
            serialize(&Reading::new(0.0, u32::MAX)),
            r#"{"valor":0.00,"ts":4294967295}"#
        );
    }

    #[test]
    fn test_worst_case_fits_frame() {
        let text = serialize(&Reading::new(f32::MIN, u32::MAX));
        assert!(text.len() <= crate::MAX_FRAME_SIZE);
    }

    #[test]
    fn test_deserialize_valid() {
        let reading = deserialize(br#"{"valor":26.50,"ts":1000}"#).unwrap();
        assert_eq!(reading.timestamp, 1000);
        assert!((reading.value - 26.5).abs() < 0.01);
    }

    #[test]
    fn test_deserialize_rejects_other_shapes() {
        let cases: &[(&[u8], ParseError)] = &[
            (b"not json", ParseError::UnexpectedPrefix),
            (br#"{"ts":1000,"valor":26.50}"#, ParseError::UnexpectedPrefix),
            (br#"{"valor":26.50}"#, ParseError::MissingTimestamp),
            (br#"{"valor":26.50,"ts":1000"#, ParseError::Unterminated),
            (br#"{"valor":26.50,"ts":1000}x"#, ParseError::TrailingData),
            (
                br#"{"valor":abc,"ts":1000}"#,
                ParseError::InvalidValue("abc".to_string()),
            ),
            (
                br#"{"valor":1.00,"ts":-5}"#,
                ParseError::InvalidTimestamp("-5".to_string()),
            ),
            (
                br#"{"valor":1.00,"ts":+5}"#,
                ParseError::InvalidTimestamp("+5".to_string()),
            ),
            (
                br#"{"valor":1.00,"ts":4294967296}"#,
                ParseError::InvalidTimestamp("4294967296".to_string()),
            ),
            (b"\xff\xfe", ParseError::NotUtf8),
        ];

        for (input, expected) in cases {
            assert_eq!(
                deserialize(input).as_ref(),
                Err(expected),
                "input {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn test_deserialize_bounds_input() {
        let oversized = vec![b'{'; crate::MAX_FRAME_SIZE + 1];
        assert_eq!(
            deserialize(&oversized),
            Err(ParseError::FrameTooLarge {
                len: crate::MAX_FRAME_SIZE + 1,
                max: crate::MAX_FRAME_SIZE,
            })
        );
    }
}
