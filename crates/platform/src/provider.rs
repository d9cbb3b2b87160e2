//! Battery provider traits and the settings they are built from.

use std::sync::Arc;

use color_eyre::eyre::Result;

use crate::stats::BatteryStats;
use crate::types::{HardwarePort, ProviderKind};

/// Capability set implemented by every battery backend.
///
/// The lifecycle manager calls `initialize` at most once, then
/// `periodic_step` repeatedly, then `deinitialize` exactly once before the
/// instance is dropped. None of the methods may block for an unbounded time.
pub trait BatteryProvider {
    /// Which backend this is.
    fn kind(&self) -> ProviderKind;

    /// Backend setup (open the port, subscribe to the feed, ...).
    fn initialize(&mut self, verbose_logging: bool) -> Result<()>;

    /// The hardware UART this backend needs exclusively, if any.
    ///
    /// Must be answerable before `initialize`.
    fn used_hardware_port(&self) -> Option<HardwarePort>;

    /// One bounded unit of backend work.
    fn periodic_step(&mut self);

    /// Release backend resources. The port claim is owned by the caller.
    fn deinitialize(&mut self);

    /// Current statistics. Never absent.
    fn stats(&self) -> Arc<BatteryStats>;
}

/// Battery section of the device configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct BatterySettings {
    pub enabled: bool,
    /// Raw provider id as stored in the configuration.
    pub provider: i32,
    pub verbose_logging: bool,
    /// UART used by the serial backends.
    pub hardware_uart: u8,
    /// Device node backing `hardware_uart`.
    pub serial_device: String,
    pub can_interface: String,
    pub feed_topic: String,
}

impl Default for BatterySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: ProviderKind::Can.id(),
            verbose_logging: false,
            hardware_uart: 2,
            serial_device: "/dev/ttyS2".to_string(),
            can_interface: "can0".to_string(),
            feed_topic: "battery/feed".to_string(),
        }
    }
}

/// Read-only view of the configuration, consulted on every reconfiguration.
pub trait SettingsSource: Send + Sync {
    fn battery_settings(&self) -> BatterySettings;
}

impl SettingsSource for BatterySettings {
    fn battery_settings(&self) -> BatterySettings {
        self.clone()
    }
}

/// Builds a fresh, uninitialized provider for a backend kind.
pub trait ProviderFactory: Send + Sync {
    fn create(
        &self,
        kind: ProviderKind,
        settings: &BatterySettings,
    ) -> Box<dyn BatteryProvider + Send>;
}
