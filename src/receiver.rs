use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::cipher::transform_in_place;
use crate::contracts::{Admission, CipherKey, Reading, RejectReason};
use crate::errors::{DecodeError, ParseError};
use crate::replay_guard::{GuardMode, ReplayGuard};
use crate::serializer::deserialize;
use crate::transport::MessageHandler;

/// Decrypt, parse and admit one frame received on `source`
///
/// The frame is copied into a fixed `MAX_FRAME_SIZE` stack buffer; anything
/// longer is rejected before the copy.
pub fn decode(
    frame: &[u8],
    key: CipherKey,
    guard: &dyn ReplayGuard,
    source: &str,
) -> Result<Reading, DecodeError> {
    if frame.len() > crate::MAX_FRAME_SIZE {
        return Err(DecodeError::Malformed(ParseError::FrameTooLarge {
            len: frame.len(),
            max: crate::MAX_FRAME_SIZE,
        }));
    }

    let mut buffer = [0u8; crate::MAX_FRAME_SIZE];
    let plaintext = &mut buffer[..frame.len()];
    plaintext.copy_from_slice(frame);
    transform_in_place(plaintext, key);

    let reading = deserialize(plaintext)?;

    match guard.admit(source, reading.timestamp) {
        Admission::Accepted => Ok(reading),
        Admission::Rejected(RejectReason::ReplayOrStale { candidate, last }) => {
            Err(DecodeError::Replay { candidate, last })
        }
    }
}

pub struct TelemetryDecoder {
    key: CipherKey,
    guard: Arc<dyn ReplayGuard>,
}

impl TelemetryDecoder {
    pub fn new(key: CipherKey, guard: Arc<dyn ReplayGuard>) -> Self {
        Self { key, guard }
    }

    pub fn decode(&self, source: &str, frame: &[u8]) -> Result<Reading, DecodeError> {
        decode(frame, self.key, self.guard.as_ref(), source)
    }

    pub fn guard(&self) -> &Arc<dyn ReplayGuard> {
        &self.guard
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    pub accepted: u64,

    pub malformed: u64,

    pub replayed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    accepted: AtomicU64,
    malformed: AtomicU64,
    replayed: AtomicU64,
}

/// A reading admitted on a given channel
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedReading {
    pub channel: String,
    pub reading: Reading,
}

/// Subscriber - Message handler that decodes, guards and logs
///
/// Rejected frames are logged and dropped; nothing here stops the
/// delivery loop.
pub struct Subscriber {
    decoder: TelemetryDecoder,
    counters: Counters,
    sink: Option<mpsc::UnboundedSender<AcceptedReading>>,
}

impl Subscriber {
    pub fn handle(&self, channel: &str, payload: &[u8]) -> Result<Reading, DecodeError> {
        let outcome = self.decoder.decode(channel, payload);

        match &outcome {
            Ok(reading) => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                let value = format!("{:.2}", reading.value);
                tracing::info!(channel, value = %value, ts = reading.timestamp, "new reading");

                if let Some(sink) = &self.sink {
                    let accepted = AcceptedReading {
                        channel: channel.to_string(),
                        reading: *reading,
                    };
                    if sink.send(accepted).is_err() {
                        tracing::debug!(channel, "reading sink closed");
                    }
                }
            }
            Err(DecodeError::Malformed(e)) => {
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(channel, len = payload.len(), error = %e, "message parse error");
            }
            Err(DecodeError::Replay { candidate, last }) => {
                self.counters.replayed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(channel, candidate, last, "replay detected");
            }
        }

        outcome
    }

    pub fn stats(&self) -> SubscriberStats {
        SubscriberStats {
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            malformed: self.counters.malformed.load(Ordering::Relaxed),
            replayed: self.counters.replayed.load(Ordering::Relaxed),
        }
    }

    pub fn decoder(&self) -> &TelemetryDecoder {
        &self.decoder
    }
}

impl MessageHandler for Subscriber {
    fn on_message(&self, channel: &str, payload: &[u8]) {
        let _ = self.handle(channel, payload);
    }
}

pub struct SubscriberBuilder {
    key: CipherKey,
    guard_mode: GuardMode,
    guard: Option<Arc<dyn ReplayGuard>>,
    sink: Option<mpsc::UnboundedSender<AcceptedReading>>,
}

impl SubscriberBuilder {
    pub fn new(key: CipherKey) -> Self {
        Self {
            key,
            guard_mode: GuardMode::default(),
            guard: None,
            sink: None,
        }
    }

    pub fn with_guard_mode(mut self, mode: GuardMode) -> Self {
        self.guard_mode = mode;
        self
    }

    /// Share an existing guard; overrides the guard mode
    pub fn with_guard(mut self, guard: Arc<dyn ReplayGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Forward every accepted reading to `sink`
    pub fn with_sink(mut self, sink: mpsc::UnboundedSender<AcceptedReading>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Subscriber {
        let guard = self.guard.unwrap_or_else(|| self.guard_mode.build());

        Subscriber {
            decoder: TelemetryDecoder::new(self.key, guard),
            counters: Counters::default(),
            sink: self.sink,
        }
    }
}
