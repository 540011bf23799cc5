//! Core data structures for the telemetry protocol
//!
//! A `Reading` is what the sensor side produces and the receiver side
//! recovers. A `Frame` is what travels between them: the serialized reading
//! after the cipher transform has been applied byte by byte.

use std::fmt;

use crate::errors::{Result, TelemetryError};

/// Reading - One sensor measurement
///
/// Timestamps are compared as plain unsigned integers; no range check is
/// performed beyond the 32-bit width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Measured value (e.g. temperature in degrees Celsius)
    pub value: f32,

    /// Seconds since the Unix epoch, truncated to 32 bits
    pub timestamp: u32,
}

impl Reading {
    /// Create a new Reading
    pub fn new(value: f32, timestamp: u32) -> Self {
        Self { value, timestamp }
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} (ts: {})", self.value, self.timestamp)
    }
}

/// CipherKey - Single shared secret byte
///
/// Must be identical on the publishing and the receiving side. It is
/// configuration handed to the encoder/decoder at construction, never a
/// process-wide global.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CipherKey(u8);

impl CipherKey {
    pub const fn new(byte: u8) -> Self {
        Self(byte)
    }

    pub const fn byte(self) -> u8 {
        self.0
    }
}

impl From<u8> for CipherKey {
    fn from(byte: u8) -> Self {
        Self(byte)
    }
}

// Keep the secret out of logs.
impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CipherKey(..)")
    }
}

/// Frame - Ciphertext bytes exchanged over the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Space-separated upper-case hex dump, one pair per byte
    pub fn to_hex(&self) -> String {
        let digits = hex::encode_upper(&self.0);
        let mut dump = String::with_capacity(digits.len() + digits.len() / 2);

        for (i, pair) in digits.as_bytes().chunks(2).enumerate() {
            if i > 0 {
                dump.push(' ');
            }
            dump.extend(pair.iter().map(|&c| c as char));
        }
        dump
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// RejectReason - Why the replay guard refused a candidate timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Candidate was not strictly greater than the last accepted timestamp
    ReplayOrStale { candidate: u32, last: u32 },
}

/// Admission - Outcome of a replay guard check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected(RejectReason),
}

impl Admission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Build a `"<site>/<room>/<sensor-kind>"` channel name
///
/// # Errors
/// Returns `TelemetryError::InvalidChannel` if a segment is empty or
/// contains `/`, `+` or `#`.
pub fn channel_name(site: &str, room: &str, sensor_kind: &str) -> Result<String> {
    let name = format!("{}/{}/{}", site, room, sensor_kind);

    for segment in [site, room, sensor_kind] {
        if segment.is_empty() || segment.contains(['/', '+', '#']) {
            return Err(TelemetryError::InvalidChannel(name));
        }
    }

    Ok(name)
}
