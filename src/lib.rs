//! Telemetry Core - Obscured sensor readings with replay protection
//!
//! A constrained device publishes periodic readings to a pub/sub broker; a
//! receiver recovers them and drops anything replayed or stale.
//!
//! # Pipeline
//! - Publisher: `Reading` -> serializer -> XOR transform -> `Transport::publish`
//! - Subscriber: `MessageHandler::on_message` -> XOR transform -> parser -> replay guard
//!
//! The XOR transform only obscures payloads. It is not encryption and
//! offers no integrity; see [`cipher`].

pub mod errors;
pub mod contracts;
pub mod cipher;
pub mod serializer;
pub mod replay_guard;
pub mod transport;
pub mod transmitter;
pub mod receiver;

pub use contracts::{channel_name, Admission, CipherKey, Frame, Reading, RejectReason};
pub use errors::{DecodeError, ParseError, Result, TelemetryError};
pub use receiver::{decode, Subscriber, SubscriberBuilder, TelemetryDecoder};
pub use replay_guard::{GuardMode, KeyedGuard, ReplayGuard, SingleSourceGuard};
pub use transmitter::{encode, Publisher, PublisherBuilder, TelemetryEncoder};
pub use transport::{MessageHandler, PublishOptions, Transport};

/// Receive buffer size; frames longer than this are rejected
pub const MAX_FRAME_SIZE: usize = 128;

/// Maximum UDP datagram size (channel header + frame)
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Sleep between publisher cycles in milliseconds
pub const DEFAULT_PUBLISH_INTERVAL_MS: u64 = 5000;

/// Standard unencrypted MQTT broker port
pub const BROKER_PORT: u16 = 1883;

/// At-most-once delivery
pub const DEFAULT_QOS: u8 = 0;

/// `<site>/<room>/<sensor-kind>`
pub const DEFAULT_CHANNEL: &str = "escola/sala1/temperatura";
