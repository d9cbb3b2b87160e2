//! Shared types for provider selection and battery state.

use std::fmt;

/// Battery monitoring backend selected by the `provider` setting.
///
/// The numeric ids are part of the persisted configuration and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// CAN-bus receiver (id 0)
    Can,
    /// Serial BMS protocol controller (id 1)
    SerialBms,
    /// Battery data published over the network (id 2)
    Networked,
    /// Serial shunt monitor (id 3)
    SerialShunt,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Can,
        ProviderKind::SerialBms,
        ProviderKind::Networked,
        ProviderKind::SerialShunt,
    ];

    /// Returns the configuration id of this provider.
    pub fn id(&self) -> i32 {
        match self {
            ProviderKind::Can => 0,
            ProviderKind::SerialBms => 1,
            ProviderKind::Networked => 2,
            ProviderKind::SerialShunt => 3,
        }
    }

    /// Returns a human-readable label for the provider.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Can => "CAN Receiver",
            ProviderKind::SerialBms => "Serial BMS",
            ProviderKind::Networked => "Networked",
            ProviderKind::SerialShunt => "Serial Shunt",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A configured provider id that maps to no known backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unknown battery provider id {0}")]
pub struct UnknownProvider(pub i32);

impl TryFrom<i32> for ProviderKind {
    type Error = UnknownProvider;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(ProviderKind::Can),
            1 => Ok(ProviderKind::SerialBms),
            2 => Ok(ProviderKind::Networked),
            3 => Ok(ProviderKind::SerialShunt),
            other => Err(UnknownProvider(other)),
        }
    }
}

/// Identifier of a physical hardware UART.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HardwarePort(pub u8);

impl HardwarePort {
    pub fn index(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for HardwarePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UART{}", self.0)
    }
}

/// Battery charging state derived from the measured current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChargeState {
    /// Current flowing into the battery
    Charging,
    /// Current flowing out of the battery
    Discharging,
    /// Current within the idle band around zero
    Idle,
    /// No measurement available
    #[default]
    Unknown,
}

impl ChargeState {
    /// Currents with a magnitude below this are reported as idle.
    pub const IDLE_BAND_AMPS: f32 = 0.05;

    pub fn from_current(current_a: f32) -> Self {
        if current_a.is_nan() {
            ChargeState::Unknown
        } else if current_a > Self::IDLE_BAND_AMPS {
            ChargeState::Charging
        } else if current_a < -Self::IDLE_BAND_AMPS {
            ChargeState::Discharging
        } else {
            ChargeState::Idle
        }
    }

    /// Returns a human-readable label for the charge state.
    pub fn label(&self) -> &'static str {
        match self {
            ChargeState::Charging => "Charging",
            ChargeState::Discharging => "Discharging",
            ChargeState::Idle => "Idle",
            ChargeState::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
