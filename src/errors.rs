//! Error types for telemetry encoding, decoding and transport plumbing
//!
//! Every failure in the receive path is locally recoverable: the offending
//! message is discarded and the caller keeps going. Nothing here is fatal.
use std::io;

use thiserror::Error;

/// Result type alias for telemetry operations
pub type Result<T> = std::result::Result<T, TelemetryError>;

/// Decrypted payload does not match `{"valor":<float>,"ts":<uint>}`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Payload is longer than the fixed receive buffer
    #[error("frame too large: {len} bytes, limit {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("payload is not valid UTF-8")]
    NotUtf8,

    /// Payload does not open with the `valor` field
    #[error("payload does not start with the value field")]
    UnexpectedPrefix,

    #[error("timestamp field missing")]
    MissingTimestamp,

    #[error("closing brace missing")]
    Unterminated,

    /// Bytes follow the closing brace
    #[error("trailing data after closing brace")]
    TrailingData,

    #[error("invalid value: {0:?}")]
    InvalidValue(String),

    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
}

/// Receiver-side rejection of a single frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Frame failed the grammar match after decryption
    #[error("malformed frame: {0}")]
    Malformed(#[from] ParseError),

    /// Timestamp did not exceed the last accepted one
    #[error("replay detected (ts: {candidate} <= {last})")]
    Replay { candidate: u32, last: u32 },
}

/// Crate-level error enumeration
///
/// Covers the transport side of the pipeline on top of [`DecodeError`]:
/// - socket I/O failures
/// - channel names the broker would refuse
/// - datagrams that exceed or violate the framing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    /// I/O error (socket send/receive failure)
    #[error("I/O error: {0}")]
    Io(String),

    /// Channel name is empty or carries a forbidden character
    #[error("invalid channel name: {0:?}")]
    InvalidChannel(String),

    #[error("packet too large: {size} bytes, limit {max}")]
    PacketTooLarge { size: usize, max: usize },

    /// Datagram could not be split into channel and frame
    #[error("invalid datagram: {0}")]
    InvalidDatagram(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<io::Error> for TelemetryError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<ParseError> for TelemetryError {
    fn from(err: ParseError) -> Self {
        Self::Decode(DecodeError::Malformed(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_message_carries_both_timestamps() {
        let err = DecodeError::Replay { candidate: 1000, last: 1000 };
        assert_eq!(err.to_string(), "replay detected (ts: 1000 <= 1000)");
    }

    #[test]
    fn test_parse_error_lifts_to_malformed() {
        let err: TelemetryError = ParseError::NotUtf8.into();
        assert_eq!(
            err,
            TelemetryError::Decode(DecodeError::Malformed(ParseError::NotUtf8))
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "no datagram");
        let err = TelemetryError::from(io_err);
        assert!(matches!(err, TelemetryError::Io(msg) if msg.contains("no datagram")));
    }
}
