use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use color_eyre::eyre::{eyre, Result, WrapErr};
use tracing::{debug, info};

use super::feed::{FeedConsumer, ReadingFeed};
use crate::provider::BatteryProvider;
use crate::stats::BatteryStats;
use crate::types::{HardwarePort, ProviderKind};

/// The device node behind a hardware UART, held open while a backend runs.
#[derive(Debug)]
struct SerialLink {
    port: HardwarePort,
    device: PathBuf,
    handle: Option<File>,
}

impl SerialLink {
    fn open(&mut self) -> Result<()> {
        if !self.device.exists() {
            return Err(eyre!(
                "serial device {} for {} not found",
                self.device.display(),
                self.port
            ));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device)
            .wrap_err_with(|| format!("failed to open {}", self.device.display()))?;

        info!(port = %self.port, device = %self.device.display(), "Serial link open");
        self.handle = Some(file);
        Ok(())
    }

    fn close(&mut self) {
        if self.handle.take().is_some() {
            debug!(port = %self.port, "Serial link closed");
        }
    }
}

/// A BMS or shunt monitor wired to one hardware UART.
///
/// Both serial kinds share the link handling and differ only in the
/// [`ProviderKind`] their snapshots carry.
#[derive(Debug)]
pub struct SerialBackend {
    kind: ProviderKind,
    link: SerialLink,
    consumer: FeedConsumer,
}

impl SerialBackend {
    /// BMS polled over `device`.
    pub fn bms(port: HardwarePort, device: impl Into<PathBuf>, feed: ReadingFeed) -> Self {
        Self::new(ProviderKind::SerialBms, port, device.into(), feed)
    }

    /// Shunt monitor streaming over `device`.
    pub fn shunt(port: HardwarePort, device: impl Into<PathBuf>, feed: ReadingFeed) -> Self {
        Self::new(ProviderKind::SerialShunt, port, device.into(), feed)
    }

    fn new(kind: ProviderKind, port: HardwarePort, device: PathBuf, feed: ReadingFeed) -> Self {
        Self {
            kind,
            link: SerialLink {
                port,
                device,
                handle: None,
            },
            consumer: FeedConsumer::new(kind, feed),
        }
    }

    pub fn device(&self) -> &Path {
        &self.link.device
    }
}

impl BatteryProvider for SerialBackend {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn initialize(&mut self, verbose_logging: bool) -> Result<()> {
        self.link.open()?;
        self.consumer.start(verbose_logging);
        info!(kind = %self.kind, device = %self.device().display(), "Serial backend started");
        Ok(())
    }

    fn used_hardware_port(&self) -> Option<HardwarePort> {
        Some(self.link.port)
    }

    fn periodic_step(&mut self) {
        if self.link.handle.is_some() {
            self.consumer.consume();
        }
    }

    fn deinitialize(&mut self) {
        self.link.close();
        info!(kind = %self.kind, "Serial backend stopped");
    }

    fn stats(&self) -> Arc<BatteryStats> {
        self.consumer.stats()
    }
}
