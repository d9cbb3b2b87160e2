//! Battery statistics snapshots and the outbound publisher hook.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::types::{ChargeState, ProviderKind};

/// A decoded measurement handed over by a backend's protocol decoder.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatteryReading {
    /// State of charge as a percentage (0-100).
    pub soc_percent: f32,

    /// Pack voltage in volts.
    pub voltage_v: f32,

    /// Pack current in amps. Negative when discharging.
    pub current_a: f32,

    /// Pack temperature in Celsius, if the backend reports one.
    pub temperature_c: Option<f32>,

    /// Battery or BMS manufacturer, if the backend reports one.
    pub manufacturer: Option<String>,
}

/// Battery statistics snapshot.
///
/// A snapshot never changes after construction; backends publish a new
/// `Arc<BatteryStats>` for every new reading. Readers holding an older handle
/// keep a consistent view even if the provider is replaced.
#[derive(Debug, Default)]
pub struct BatteryStats {
    provider: Option<ProviderKind>,
    reading: BatteryReading,
    updated_at: Option<Instant>,
    published: AtomicBool,
}

impl BatteryStats {
    /// The "no data" snapshot.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_reading(provider: ProviderKind, reading: BatteryReading) -> Self {
        Self {
            provider: Some(provider),
            reading,
            updated_at: Some(Instant::now()),
            published: AtomicBool::new(false),
        }
    }

    /// An initialized provider that has not received any reading yet.
    pub fn awaiting_data(provider: ProviderKind) -> Self {
        Self {
            provider: Some(provider),
            ..Self::default()
        }
    }

    pub fn provider(&self) -> Option<ProviderKind> {
        self.provider
    }

    pub fn has_data(&self) -> bool {
        self.updated_at.is_some()
    }

    pub fn reading(&self) -> &BatteryReading {
        &self.reading
    }

    pub fn soc_percent(&self) -> f32 {
        self.reading.soc_percent
    }

    pub fn voltage_v(&self) -> f32 {
        self.reading.voltage_v
    }

    pub fn current_a(&self) -> f32 {
        self.reading.current_a
    }

    pub fn temperature_c(&self) -> Option<f32> {
        self.reading.temperature_c
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.reading.manufacturer.as_deref()
    }

    /// Instantaneous power in watts (positive = charging).
    pub fn power_w(&self) -> f32 {
        self.reading.voltage_v * self.reading.current_a
    }

    pub fn charge_state(&self) -> ChargeState {
        if self.has_data() {
            ChargeState::from_current(self.reading.current_a)
        } else {
            ChargeState::Unknown
        }
    }

    /// Time since the reading was taken.
    pub fn age(&self) -> Option<Duration> {
        self.updated_at.map(|t| t.elapsed())
    }

    pub fn is_published(&self) -> bool {
        self.published.load(Ordering::Acquire)
    }

    /// Hand this snapshot to `publisher` if it carries data, has not been
    /// published yet and the publisher's interval has elapsed.
    ///
    /// Returns true if the snapshot was published by this call.
    pub fn publish_if_due(&self, publisher: &dyn StatsPublisher) -> bool {
        if !self.has_data() || self.is_published() {
            return false;
        }
        if !publisher.is_due(Instant::now()) {
            return false;
        }
        if self.published.swap(true, Ordering::AcqRel) {
            return false;
        }
        publisher.publish(self);
        true
    }
}

/// Outbound notification hook for fresh statistics.
pub trait StatsPublisher: Send + Sync {
    /// Whether a publish would be accepted at `now`.
    fn is_due(&self, _now: Instant) -> bool {
        true
    }

    fn publish(&self, stats: &BatteryStats);
}

/// Rate limit shared by publishers: at most one publish per interval.
#[derive(Debug)]
pub struct PublishInterval {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl PublishInterval {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        let last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(t) => now.saturating_duration_since(t) >= self.interval,
            None => true,
        }
    }

    pub fn mark(&self, now: Instant) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(now);
    }
}

/// Publisher that only writes snapshots to the debug log.
#[derive(Debug)]
pub struct LogPublisher {
    interval: PublishInterval,
}

impl LogPublisher {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: PublishInterval::new(interval),
        }
    }
}

impl StatsPublisher for LogPublisher {
    fn is_due(&self, now: Instant) -> bool {
        self.interval.is_due(now)
    }

    fn publish(&self, stats: &BatteryStats) {
        self.interval.mark(Instant::now());
        debug!(
            provider = ?stats.provider(),
            soc = stats.soc_percent(),
            voltage = stats.voltage_v(),
            current = stats.current_a(),
            "Battery stats"
        );
    }
}
