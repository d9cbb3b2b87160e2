//! Battery provider lifecycle and hardware arbitration for voltlink.
//!
//! A device can be wired to one of several mutually exclusive battery
//! monitoring backends. This crate selects the configured backend, arbitrates
//! the hardware UART it needs, drives it from a scheduler and exposes its
//! statistics as shared snapshots.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use voltlink_platform::{
//!     BackendFactory, Battery, BatterySettings, LogPublisher, PortArbiter, ReadingFeed,
//!     TaskScheduler, DEFAULT_POLL_INTERVAL,
//! };
//!
//! let battery = Battery::new(
//!     Arc::new(BatterySettings::default()),
//!     Box::new(BackendFactory::new(ReadingFeed::new())),
//!     PortArbiter::new(),
//!     Arc::new(LogPublisher::new(std::time::Duration::from_secs(5))),
//! );
//! let scheduler = TaskScheduler::current();
//! battery.initialize(&scheduler, DEFAULT_POLL_INTERVAL)?;
//! println!("SoC: {}%", battery.stats().soc_percent());
//! ```

mod arbiter;
pub mod backends;
mod manager;
mod provider;
mod scheduler;
mod stats;
mod types;

pub use arbiter::{PortArbiter, PortClaim};
pub use backends::{BackendFactory, ReadingFeed};
pub use manager::{Battery, BatteryStatus, ReconfigureError, DEFAULT_POLL_INTERVAL, PORT_OWNER};
pub use provider::{BatteryProvider, BatterySettings, ProviderFactory, SettingsSource};
pub use scheduler::{Scheduler, Task, TaskScheduler};
pub use stats::{BatteryReading, BatteryStats, LogPublisher, PublishInterval, StatsPublisher};
pub use types::{ChargeState, HardwarePort, ProviderKind, UnknownProvider};
