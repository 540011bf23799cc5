//! Transport module - the pub/sub collaborator seen from the core
//!
//! The core only needs two capabilities: send bytes to a named channel, and
//! get called once per inbound message on a channel. Connection management,
//! QoS bookkeeping and retained messages belong to whatever implements
//! [`Transport`].
//!
//! Implementations shipped here:
//! - `MemoryBroker`: in-process exact-match fan-out
//! - `UdpTransport`: channel-tagged datagrams over a bound UDP socket
//! - `QueueHandler`: a handler that queues deliveries for a polling loop

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::errors::{Result, TelemetryError};

/// Delivery options attached to a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    /// 0 = at most once ("fire and forget")
    pub qos: u8,

    pub retain: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            qos: crate::DEFAULT_QOS,
            retain: false,
        }
    }
}

/// Receives one call per inbound message
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, channel: &str, payload: &[u8]);
}

/// Publish/subscribe transport
pub trait Transport: Send + Sync {
    /// Deliver `payload` to everyone subscribed to `channel`
    ///
    /// Delivery confirmation is not reported; `Ok` means the transport took
    /// the message.
    fn publish(&self, channel: &str, payload: &[u8], options: PublishOptions) -> Result<()>;

    /// Register `handler` for every future message on `channel`
    fn subscribe(&self, channel: &str, handler: Arc<dyn MessageHandler>) -> Result<()>;
}

/// Reject names a broker would refuse for publishing
///
/// Empty names, wildcards (`+`, `#`) and NUL are invalid.
pub fn validate_channel(channel: &str) -> Result<()> {
    if channel.is_empty() || channel.contains(['+', '#', '\0']) {
        return Err(TelemetryError::InvalidChannel(channel.to_string()));
    }
    Ok(())
}

type HandlerMap = Mutex<HashMap<String, Vec<Arc<dyn MessageHandler>>>>;

fn register(handlers: &HandlerMap, channel: &str, handler: Arc<dyn MessageHandler>) {
    handlers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .entry(channel.to_string())
        .or_default()
        .push(handler);
}

// Handlers run outside the lock so they may publish again.
fn dispatch(handlers: &HandlerMap, channel: &str, payload: &[u8]) -> usize {
    let targets = handlers
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(channel)
        .cloned()
        .unwrap_or_default();

    for handler in &targets {
        handler.on_message(channel, payload);
    }
    targets.len()
}

/// MemoryBroker - In-process broker with exact channel matching
///
/// Publishing calls every handler subscribed to the channel synchronously,
/// once per message, on the publisher's thread.
#[derive(Default)]
pub struct MemoryBroker {
    handlers: HandlerMap,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map_or(0, Vec::len)
    }
}

impl Transport for MemoryBroker {
    fn publish(&self, channel: &str, payload: &[u8], options: PublishOptions) -> Result<()> {
        validate_channel(channel)?;

        let delivered = dispatch(&self.handlers, channel, payload);
        tracing::trace!(channel, qos = options.qos, delivered, "memory publish");
        Ok(())
    }

    fn subscribe(&self, channel: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        validate_channel(channel)?;
        register(&self.handlers, channel, handler);
        tracing::debug!(channel, "subscribed");
        Ok(())
    }
}

/// One inbound message, as queued by [`QueueHandler`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// QueueHandler - Hands deliveries to a loop that polls a tokio channel
///
/// Messages arriving after the receiver is dropped are discarded.
#[derive(Debug, Clone)]
pub struct QueueHandler {
    tx: mpsc::UnboundedSender<Delivery>,
}

impl QueueHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl MessageHandler for QueueHandler {
    fn on_message(&self, channel: &str, payload: &[u8]) {
        let delivery = Delivery {
            channel: channel.to_string(),
            payload: payload.to_vec(),
        };
        if self.tx.send(delivery).is_err() {
            tracing::debug!(channel, "queue closed, dropping message");
        }
    }
}

/// UdpTransport - Channel-tagged datagrams between two UDP endpoints
///
/// # Datagram layout
/// - channel length: 2 bytes (u16, big-endian)
/// - channel: UTF-8 bytes
/// - payload: remaining bytes
///
/// Whole datagram is bounded by `MAX_DATAGRAM_SIZE`.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
    handlers: HandlerMap,
}

impl UdpTransport {
    /// Wrap a bound socket; publishes go to `peer`
    pub fn new(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self {
            socket,
            peer,
            handlers: HandlerMap::default(),
        }
    }

    /// Broker address on `host` at the standard `BROKER_PORT`
    pub fn broker_addr(host: IpAddr) -> SocketAddr {
        SocketAddr::new(host, crate::BROKER_PORT)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Build a datagram for `channel` carrying `payload`
    pub fn encode_datagram(channel: &str, payload: &[u8]) -> Result<Vec<u8>> {
        let size = 2 + channel.len() + payload.len();
        if size > crate::MAX_DATAGRAM_SIZE {
            return Err(TelemetryError::PacketTooLarge {
                size,
                max: crate::MAX_DATAGRAM_SIZE,
            });
        }

        let mut datagram = Vec::with_capacity(size);
        datagram.extend_from_slice(&(channel.len() as u16).to_be_bytes());
        datagram.extend_from_slice(channel.as_bytes());
        datagram.extend_from_slice(payload);
        Ok(datagram)
    }

    /// Split a datagram into channel and payload
    pub fn decode_datagram(datagram: &[u8]) -> Result<(&str, &[u8])> {
        let (len_bytes, rest) = datagram
            .split_first_chunk::<2>()
            .ok_or_else(|| TelemetryError::InvalidDatagram("missing channel length".to_string()))?;
        let channel_len = u16::from_be_bytes(*len_bytes) as usize;

        if rest.len() < channel_len {
            return Err(TelemetryError::InvalidDatagram(format!(
                "channel length {} exceeds datagram body {}",
                channel_len,
                rest.len()
            )));
        }

        let (channel, payload) = rest.split_at(channel_len);
        let channel = std::str::from_utf8(channel)
            .map_err(|_| TelemetryError::InvalidDatagram("channel is not UTF-8".to_string()))?;
        validate_channel(channel)?;

        Ok((channel, payload))
    }

    /// Block for one datagram and dispatch it to the channel's handlers
    ///
    /// Returns the number of handlers invoked. Honors the socket's read
    /// timeout, surfacing expiry as `TelemetryError::Io`.
    pub fn poll(&self, buffer: &mut [u8]) -> Result<usize> {
        let (bytes_received, sender) = self.socket.recv_from(buffer)?;

        let (channel, payload) = Self::decode_datagram(&buffer[..bytes_received])?;
        tracing::trace!(%sender, channel, len = payload.len(), "datagram received");

        Ok(dispatch(&self.handlers, channel, payload))
    }
}

impl Transport for UdpTransport {
    fn publish(&self, channel: &str, payload: &[u8], options: PublishOptions) -> Result<()> {
        validate_channel(channel)?;
        let datagram = Self::encode_datagram(channel, payload)?;

        let sent = self.socket.send_to(&datagram, self.peer)?;
        tracing::trace!(channel, peer = %self.peer, sent, qos = options.qos, "datagram sent");
        Ok(())
    }

    fn subscribe(&self, channel: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        validate_channel(channel)?;
        register(&self.handlers, channel, handler);
        Ok(())
    }
}
