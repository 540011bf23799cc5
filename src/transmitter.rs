//! Transmitter module - publisher side of the telemetry protocol
//!
//! Builds a reading from a sensor and a clock, serializes it, applies the
//! cipher transform and hands the frame to a [`Transport`]. The periodic
//! loop never stops on its own and never retries a failed publish.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::cipher::transform;
use crate::contracts::{CipherKey, Frame, Reading};
use crate::errors::Result;
use crate::serializer::serialize;
use crate::transport::{PublishOptions, Transport};

/// Serialize and obscure a reading
///
/// Pure and deterministic; a well-formed reading always encodes.
pub fn encode(reading: &Reading, key: CipherKey) -> Frame {
    Frame::from(transform(serialize(reading).as_bytes(), key))
}

/// TelemetryEncoder - Holds the key so callers only pass readings
#[derive(Debug, Clone, Copy)]
pub struct TelemetryEncoder {
    key: CipherKey,
}

impl TelemetryEncoder {
    pub fn new(key: CipherKey) -> Self {
        Self { key }
    }

    pub fn encode(&self, reading: &Reading) -> Frame {
        encode(reading, self.key)
    }

    /// Encode a batch of readings in order
    pub fn encode_batch(&self, readings: &[Reading]) -> Vec<Frame> {
        readings.iter().map(|r| self.encode(r)).collect()
    }
}

/// Source of measurement values
pub trait Sensor {
    fn sample(&mut self) -> f32;
}

/// Always reports the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedSensor(pub f32);

impl Sensor for FixedSensor {
    fn sample(&mut self) -> f32 {
        self.0
    }
}

/// Reports `base` plus uniform jitter in `[-jitter, +jitter]`
#[derive(Debug)]
pub struct SimulatedSensor {
    base: f32,
    jitter: f32,
    rng: StdRng,
}

impl SimulatedSensor {
    /// Seeded so runs are reproducible
    pub fn new(base: f32, jitter: f32, seed: u64) -> Self {
        Self {
            base,
            jitter: jitter.abs(),
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Sensor for SimulatedSensor {
    fn sample(&mut self) -> f32 {
        self.base + self.rng.gen_range(-self.jitter..=self.jitter)
    }
}

/// Source of reading timestamps
pub trait Clock {
    /// Seconds since the Unix epoch
    fn now_secs(&self) -> u32;
}

/// Wall clock, truncated to 32 bits
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u32 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as u32
    }
}

/// Publisher - Periodic sample, encode, publish
#[derive(Debug, Clone)]
pub struct Publisher {
    encoder: TelemetryEncoder,
    channel: String,
    interval: Duration,
    options: PublishOptions,
}

impl Publisher {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Encode `reading` and publish it on the configured channel
    ///
    /// # Returns
    /// The frame that was handed to the transport
    pub fn publish_reading<T>(&self, transport: &T, reading: &Reading) -> Result<Frame>
    where
        T: Transport + ?Sized,
    {
        let frame = self.encoder.encode(reading);
        transport.publish(&self.channel, frame.as_bytes(), self.options)?;

        tracing::debug!(
            channel = %self.channel,
            ts = reading.timestamp,
            frame = %frame.to_hex(),
            "published (encrypted)"
        );
        Ok(frame)
    }

    /// One cycle: sample the sensor, stamp with the clock, publish
    pub fn publish_once<T, S, C>(&self, transport: &T, sensor: &mut S, clock: &C) -> Result<Frame>
    where
        T: Transport + ?Sized,
        S: Sensor + ?Sized,
        C: Clock + ?Sized,
    {
        let reading = Reading::new(sensor.sample(), clock.now_secs());
        self.publish_reading(transport, &reading)
    }

    /// Publish forever, sleeping `interval` after each cycle
    ///
    /// A failed publish is logged and the loop moves on to the next cycle.
    pub async fn run<T, S, C>(&self, transport: &T, sensor: &mut S, clock: &C)
    where
        T: Transport + ?Sized,
        S: Sensor + ?Sized,
        C: Clock + ?Sized,
    {
        tracing::info!(
            channel = %self.channel,
            interval_ms = self.interval.as_millis() as u64,
            "publisher started"
        );

        loop {
            if let Err(e) = self.publish_once(transport, sensor, clock) {
                tracing::warn!(channel = %self.channel, error = %e, "publish failed");
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// PublisherBuilder - Fluent configuration for a [`Publisher`]
pub struct PublisherBuilder {
    key: CipherKey,
    channel: String,
    interval: Duration,
    options: PublishOptions,
}

impl PublisherBuilder {
    /// Create a new PublisherBuilder with defaults
    pub fn new(key: CipherKey) -> Self {
        Self {
            key,
            channel: crate::DEFAULT_CHANNEL.to_string(),
            interval: Duration::from_millis(crate::DEFAULT_PUBLISH_INTERVAL_MS),
            options: PublishOptions::default(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// Sleep between publish cycles
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_publish_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }

    /// Validate the channel and build the publisher
    pub fn build(self) -> Result<Publisher> {
        crate::transport::validate_channel(&self.channel)?;

        Ok(Publisher {
            encoder: TelemetryEncoder::new(self.key),
            channel: self.channel,
            interval: self.interval,
            options: self.options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryBroker;

    #[test]
    fn test_encode_is_xor_of_serialized() {
        let key = CipherKey::new(42);
        let reading = Reading::new(26.5, 1000);
        let frame = encode(&reading, key);

        let plain: Vec<u8> = frame.as_bytes().iter().map(|b| b ^ 42).collect();
        assert_eq!(plain, br#"{"valor":26.50,"ts":1000}"#.to_vec());
    }

    #[test]
    fn test_encode_is_deterministic() {
        let encoder = TelemetryEncoder::new(CipherKey::new(42));
        let reading = Reading::new(21.25, 1_700_000_000);
        assert_eq!(encoder.encode(&reading), encoder.encode(&reading));
    }

    #[test]
    fn test_batch_encoding() {
        let encoder = TelemetryEncoder::new(CipherKey::new(1));
        let frames = encoder.encode_batch(&[Reading::new(1.0, 1), Reading::new(2.0, 2)]);
        assert_eq!(frames.len(), 2);
        assert_ne!(frames[0], frames[1]);
    }

    #[test]
    fn test_simulated_sensor_stays_in_band() {
        let mut sensor = SimulatedSensor::new(26.5, 0.5, 7);
        for _ in 0..1000 {
            let v = sensor.sample();
            assert!((26.0..=27.0).contains(&v), "sample {} out of band", v);
        }
    }

    #[test]
    fn test_simulated_sensor_is_reproducible() {
        let mut a = SimulatedSensor::new(10.0, 2.0, 99);
        let mut b = SimulatedSensor::new(10.0, 2.0, 99);
        for _ in 0..10 {
            assert_eq!(a.sample(), b.sample());
        }
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }

    #[test]
    fn test_publisher_builder() {
        let publisher = PublisherBuilder::new(CipherKey::new(42))
            .with_channel("lab/bench/humidity")
            .with_interval(Duration::from_secs(1))
            .build()
            .unwrap();

        assert_eq!(publisher.channel(), "lab/bench/humidity");
        assert_eq!(publisher.interval(), Duration::from_secs(1));

        let defaults = PublisherBuilder::new(CipherKey::new(42)).build().unwrap();
        assert_eq!(defaults.channel(), crate::DEFAULT_CHANNEL);
        assert_eq!(defaults.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_publisher_builder_rejects_wildcard_channel() {
        let result = PublisherBuilder::new(CipherKey::new(42))
            .with_channel("lab/+/humidity")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_publish_once_without_subscribers() {
        let broker = MemoryBroker::new();
        let publisher = PublisherBuilder::new(CipherKey::new(42)).build().unwrap();

        let frame = publisher
            .publish_once(&broker, &mut FixedSensor(26.5), &SystemClock)
            .unwrap();
        assert!(!frame.is_empty());
    }
}
