use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{warn, Level};
use voltlink_platform::{BatterySettings, SettingsSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "off" | "none" => LogLevel::Off,
            "error" => LogLevel::Error,
            "warn" | "warning" => LogLevel::Warn,
            "debug" => LogLevel::Debug,
            "trace" => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    pub fn as_tracing_level(&self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// `[battery]` table of the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryConfig {
    pub enabled: bool,
    pub provider: i32,
    pub verbose_logging: bool,
    pub hardware_uart: u8,
    pub serial_device: String,
    pub can_interface: String,
    pub feed_topic: String,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self::from(&BatterySettings::default())
    }
}

impl From<&BatterySettings> for BatteryConfig {
    fn from(settings: &BatterySettings) -> Self {
        Self {
            enabled: settings.enabled,
            provider: settings.provider,
            verbose_logging: settings.verbose_logging,
            hardware_uart: settings.hardware_uart,
            serial_device: settings.serial_device.clone(),
            can_interface: settings.can_interface.clone(),
            feed_topic: settings.feed_topic.clone(),
        }
    }
}

impl From<&BatteryConfig> for BatterySettings {
    fn from(config: &BatteryConfig) -> Self {
        Self {
            enabled: config.enabled,
            provider: config.provider,
            verbose_logging: config.verbose_logging,
            hardware_uart: config.hardware_uart,
            serial_device: config.serial_device.clone(),
            can_interface: config.can_interface.clone(),
            feed_topic: config.feed_topic.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub log_level: LogLevel,
    pub poll_interval_ms: u64,
    pub publish_interval_secs: u64,
    /// UARTs held by other consumers on this device (console, modem, ...).
    /// The daemon claims them at startup so no battery backend can take them.
    pub reserved_uarts: Vec<u8>,
    pub battery: BatteryConfig,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            poll_interval_ms: 100,
            publish_interval_secs: 5,
            reserved_uarts: Vec::new(),
            battery: BatteryConfig::default(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("voltlink")
}

pub fn runtime_dir() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(|| PathBuf::from(format!("/tmp/voltlink-{}", current_uid())))
        .join("voltlink")
}

fn current_uid() -> u32 {
    // SAFETY: `getuid` has no preconditions and cannot fail.
    unsafe { libc::getuid() }
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn ensure_dirs() -> std::io::Result<()> {
    fs::create_dir_all(config_dir())?;
    fs::create_dir_all(runtime_dir())?;
    Ok(())
}

impl UserConfig {
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                warn!(path = ?path, error = %e, "Invalid config file, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        let _ = ensure_dirs();
        self.save_to(&config_path())
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        fs::write(path, content)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish_interval_secs)
    }
}

/// Config shared between the daemon and the battery manager.
///
/// The manager reads battery settings through [`SettingsSource`] on every
/// reconfiguration, so replacing the config here and then reconfiguring is
/// enough to apply an edited file.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<UserConfig>>,
}

impl SharedConfig {
    pub fn new(config: UserConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    pub fn replace(&self, config: UserConfig) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    /// Re-read the config file at `path`, returning the new contents.
    pub fn reload_from(&self, path: &Path) -> UserConfig {
        let config = UserConfig::load_from(path);
        self.replace(config.clone());
        config
    }
}

impl SettingsSource for SharedConfig {
    fn battery_settings(&self) -> BatterySettings {
        let config = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        BatterySettings::from(&config.battery)
    }
}
