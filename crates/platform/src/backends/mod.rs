//! Concrete battery backends.
//!
//! Protocol decoding happens outside these types: decoders push
//! [`BatteryReading`](crate::BatteryReading)s into a [`ReadingFeed`] and the
//! active backend turns the newest one into a stats snapshot on every step.

mod can;
mod feed;
mod networked;
mod serial;

use std::path::PathBuf;

pub use can::CanReceiver;
pub use feed::ReadingFeed;
pub use networked::NetworkedFeed;
pub use serial::SerialBackend;

use crate::provider::{BatteryProvider, BatterySettings, ProviderFactory};
use crate::types::{HardwarePort, ProviderKind};

const SYSFS_ROOT: &str = "/sys";

/// Factory for the real backends.
#[derive(Debug, Clone)]
pub struct BackendFactory {
    feed: ReadingFeed,
    sysfs_root: PathBuf,
}

impl BackendFactory {
    pub fn new(feed: ReadingFeed) -> Self {
        Self {
            feed,
            sysfs_root: PathBuf::from(SYSFS_ROOT),
        }
    }

    /// Look up network interfaces below `root` instead of `/sys`.
    pub fn with_sysfs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sysfs_root = root.into();
        self
    }

    pub fn feed(&self) -> &ReadingFeed {
        &self.feed
    }
}

impl ProviderFactory for BackendFactory {
    fn create(
        &self,
        kind: ProviderKind,
        settings: &BatterySettings,
    ) -> Box<dyn BatteryProvider + Send> {
        let port = HardwarePort(settings.hardware_uart);
        let feed = self.feed.clone();

        match kind {
            ProviderKind::Can => Box::new(CanReceiver::new(
                settings.can_interface.clone(),
                self.sysfs_root.clone(),
                feed,
            )),
            ProviderKind::SerialBms => Box::new(SerialBackend::bms(
                port,
                settings.serial_device.clone(),
                feed,
            )),
            ProviderKind::Networked => {
                Box::new(NetworkedFeed::new(settings.feed_topic.clone(), feed))
            }
            ProviderKind::SerialShunt => Box::new(SerialBackend::shunt(
                port,
                settings.serial_device.clone(),
                feed,
            )),
        }
    }
}
