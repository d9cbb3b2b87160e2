use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::eyre::{eyre, Result};
use tracing::info;

use super::feed::{FeedConsumer, ReadingFeed};
use crate::provider::BatteryProvider;
use crate::stats::BatteryStats;
use crate::types::{HardwarePort, ProviderKind};

/// Receiver for BMS broadcasts on a SocketCAN interface.
pub struct CanReceiver {
    interface: String,
    sysfs_root: PathBuf,
    consumer: FeedConsumer,
}

impl CanReceiver {
    pub fn new(
        interface: impl Into<String>,
        sysfs_root: impl Into<PathBuf>,
        feed: ReadingFeed,
    ) -> Self {
        Self {
            interface: interface.into(),
            sysfs_root: sysfs_root.into(),
            consumer: FeedConsumer::new(ProviderKind::Can, feed),
        }
    }

    fn interface_path(&self) -> PathBuf {
        self.sysfs_root.join("class/net").join(&self.interface)
    }
}

impl BatteryProvider for CanReceiver {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Can
    }

    fn initialize(&mut self, verbose_logging: bool) -> Result<()> {
        if self.interface.is_empty() {
            return Err(eyre!("no CAN interface configured"));
        }
        if !self.interface_path().exists() {
            return Err(eyre!("CAN interface {} not present", self.interface));
        }

        self.consumer.start(verbose_logging);
        info!(interface = %self.interface, "CAN receiver started");
        Ok(())
    }

    fn used_hardware_port(&self) -> Option<HardwarePort> {
        None
    }

    fn periodic_step(&mut self) {
        self.consumer.consume();
    }

    fn deinitialize(&mut self) {
        info!(interface = %self.interface, "CAN receiver stopped");
    }

    fn stats(&self) -> Arc<BatteryStats> {
        self.consumer.stats()
    }
}
