use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::stats::{BatteryReading, BatteryStats};
use crate::types::ProviderKind;

const DEFAULT_CAPACITY: usize = 64;

/// Queue of decoded readings shared between protocol decoders and backends.
///
/// Decoders push, the active backend drains. When the queue is full the oldest
/// reading is dropped.
#[derive(Debug, Clone)]
pub struct ReadingFeed {
    inner: Arc<Mutex<VecDeque<BatteryReading>>>,
    capacity: usize,
}

impl Default for ReadingFeed {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl ReadingFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, reading: BatteryReading) {
        let mut queue = self.lock();
        if queue.len() == self.capacity {
            queue.pop_front();
            warn!(capacity = self.capacity, "Reading feed full, dropping oldest");
        }
        queue.push_back(reading);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove everything and return the newest reading.
    pub fn take_latest(&self) -> Option<BatteryReading> {
        let mut queue = self.lock();
        let latest = queue.pop_back();
        queue.clear();
        latest
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<BatteryReading>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Turns feed readings into stats snapshots for one backend.
#[derive(Debug)]
pub(crate) struct FeedConsumer {
    kind: ProviderKind,
    feed: ReadingFeed,
    stats: Arc<BatteryStats>,
    verbose: bool,
}

impl FeedConsumer {
    pub(crate) fn new(kind: ProviderKind, feed: ReadingFeed) -> Self {
        Self {
            kind,
            feed,
            stats: Arc::new(BatteryStats::awaiting_data(kind)),
            verbose: false,
        }
    }

    /// Drop readings left over from a previous backend.
    pub(crate) fn start(&mut self, verbose: bool) {
        self.verbose = verbose;
        self.feed.clear();
        self.stats = Arc::new(BatteryStats::awaiting_data(self.kind));
    }

    pub(crate) fn consume(&mut self) {
        if let Some(reading) = self.feed.take_latest() {
            if self.verbose {
                debug!(
                    provider = %self.kind,
                    soc = reading.soc_percent,
                    voltage = reading.voltage_v,
                    current = reading.current_a,
                    "Consumed reading"
                );
            }
            self.stats = Arc::new(BatteryStats::from_reading(self.kind, reading));
        }
    }

    pub(crate) fn stats(&self) -> Arc<BatteryStats> {
        Arc::clone(&self.stats)
    }
}
