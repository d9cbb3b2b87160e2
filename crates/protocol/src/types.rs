use serde::{Deserialize, Serialize};

use crate::version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChargeState {
    Charging,
    Discharging,
    Idle,
    #[default]
    Unknown,
}

impl ChargeState {
    pub fn label(&self) -> &'static str {
        match self {
            ChargeState::Charging => "Charging",
            ChargeState::Discharging => "Discharging",
            ChargeState::Idle => "Idle",
            ChargeState::Unknown => "Unknown",
        }
    }
}

/// Battery statistics as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StatsSnapshot {
    pub timestamp: i64,
    /// Label of the active provider, `None` when battery support is off.
    pub provider: Option<String>,
    pub provider_id: Option<i32>,
    pub has_data: bool,
    pub soc_percent: f32,
    pub voltage_v: f32,
    pub current_a: f32,
    pub power_w: f32,
    pub charge_state: ChargeState,
    pub temperature_c: Option<f32>,
    pub manufacturer: Option<String>,
    /// Age of the reading in milliseconds.
    pub age_ms: Option<u64>,
}

/// A reading pushed by a network publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReadingPayload {
    pub soc_percent: f32,
    pub voltage_v: f32,
    pub current_a: f32,
    #[serde(default)]
    pub temperature_c: Option<f32>,
    #[serde(default)]
    pub manufacturer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortOwner {
    pub port: u8,
    pub owner: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReconfigureResult {
    pub provider: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub uptime_secs: u64,
    pub version: String,
    pub subscriber_count: usize,
    pub battery_enabled: bool,
    pub provider: Option<String>,
    pub hardware_port: Option<u8>,
    #[serde(default)]
    pub claimed_ports: Vec<PortOwner>,
    pub last_error: Option<String>,
    pub protocol_version: u32,
    pub min_supported_version: u32,
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            running: false,
            uptime_secs: 0,
            version: String::new(),
            subscriber_count: 0,
            battery_enabled: false,
            provider: None,
            hardware_port: None,
            claimed_ports: Vec::new(),
            last_error: None,
            protocol_version: PROTOCOL_VERSION,
            min_supported_version: MIN_SUPPORTED_VERSION,
        }
    }
}

pub const MAX_SUBSCRIBERS: usize = 10;
