use std::time::Instant;

use tokio::sync::broadcast;
use tracing::debug;
use voltlink_platform::{BatteryReading, BatteryStats, ChargeState, PublishInterval, StatsPublisher};
use voltlink_protocol::{self as protocol, ReadingPayload, StatsSnapshot};

const CHANNEL_CAPACITY: usize = 16;

/// Publishes fresh battery snapshots to daemon subscribers.
///
/// Runs on the scheduler's poll task, so `publish` only converts and hands
/// the snapshot to a broadcast channel. The server loop fans it out.
pub struct BroadcastPublisher {
    gate: PublishInterval,
    tx: broadcast::Sender<StatsSnapshot>,
}

impl BroadcastPublisher {
    pub fn new(interval: std::time::Duration) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            gate: PublishInterval::new(interval),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatsSnapshot> {
        self.tx.subscribe()
    }
}

impl StatsPublisher for BroadcastPublisher {
    fn is_due(&self, now: Instant) -> bool {
        self.gate.is_due(now)
    }

    fn publish(&self, stats: &BatteryStats) {
        self.gate.mark(Instant::now());
        let snapshot = stats_snapshot(stats);
        // No receivers just means nobody is listening yet.
        let receivers = self.tx.send(snapshot).unwrap_or(0);
        debug!(
            provider = ?stats.provider(),
            soc = stats.soc_percent(),
            receivers,
            "Published battery stats"
        );
    }
}

pub fn stats_snapshot(stats: &BatteryStats) -> StatsSnapshot {
    let charge_state = match stats.charge_state() {
        ChargeState::Charging => protocol::ChargeState::Charging,
        ChargeState::Discharging => protocol::ChargeState::Discharging,
        ChargeState::Idle => protocol::ChargeState::Idle,
        ChargeState::Unknown => protocol::ChargeState::Unknown,
    };

    StatsSnapshot {
        timestamp: chrono::Utc::now().timestamp(),
        provider: stats.provider().map(|kind| kind.label().to_string()),
        provider_id: stats.provider().map(|kind| kind.id()),
        has_data: stats.has_data(),
        soc_percent: stats.soc_percent(),
        voltage_v: stats.voltage_v(),
        current_a: stats.current_a(),
        power_w: stats.power_w(),
        charge_state,
        temperature_c: stats.temperature_c(),
        manufacturer: stats.manufacturer().map(str::to_string),
        age_ms: stats.age().map(|age| age.as_millis() as u64),
    }
}

pub fn reading_from_payload(payload: ReadingPayload) -> BatteryReading {
    BatteryReading {
        soc_percent: payload.soc_percent,
        voltage_v: payload.voltage_v,
        current_a: payload.current_a,
        temperature_c: payload.temperature_c,
        manufacturer: payload.manufacturer,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use voltlink_platform::ProviderKind;

    use super::*;

    fn reading() -> BatteryReading {
        BatteryReading {
            soc_percent: 72.0,
            voltage_v: 52.0,
            current_a: -10.0,
            temperature_c: Some(21.0),
            manufacturer: Some("Daly".to_string()),
        }
    }

    #[test]
    fn test_snapshot_of_empty_stats() {
        let snapshot = stats_snapshot(&BatteryStats::empty());
        assert!(!snapshot.has_data);
        assert_eq!(snapshot.provider, None);
        assert_eq!(snapshot.provider_id, None);
        assert_eq!(snapshot.charge_state, protocol::ChargeState::Unknown);
        assert_eq!(snapshot.age_ms, None);
    }

    #[test]
    fn test_snapshot_carries_reading() {
        let stats = BatteryStats::from_reading(ProviderKind::SerialShunt, reading());
        let snapshot = stats_snapshot(&stats);
        assert!(snapshot.has_data);
        assert_eq!(snapshot.provider.as_deref(), Some("Serial Shunt"));
        assert_eq!(snapshot.provider_id, Some(3));
        assert_eq!(snapshot.power_w, -520.0);
        assert_eq!(snapshot.charge_state, protocol::ChargeState::Discharging);
        assert_eq!(snapshot.manufacturer.as_deref(), Some("Daly"));
    }

    #[test]
    fn test_payload_conversion() {
        let payload = ReadingPayload {
            soc_percent: 72.0,
            voltage_v: 52.0,
            current_a: -10.0,
            temperature_c: Some(21.0),
            manufacturer: Some("Daly".to_string()),
        };
        assert_eq!(reading_from_payload(payload), reading());
    }

    #[test]
    fn test_publisher_respects_interval() {
        let publisher = BroadcastPublisher::new(Duration::from_secs(60));
        let mut rx = publisher.subscribe();

        let first = BatteryStats::from_reading(ProviderKind::Networked, reading());
        assert!(first.publish_if_due(&publisher));

        let second = BatteryStats::from_reading(ProviderKind::Networked, reading());
        assert!(!second.publish_if_due(&publisher));

        let update = rx.try_recv().unwrap();
        assert_eq!(update.provider.as_deref(), Some("Networked"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_publish_without_subscribers_is_harmless() {
        let publisher = BroadcastPublisher::new(Duration::ZERO);
        let stats = BatteryStats::from_reading(ProviderKind::Can, reading());
        assert!(stats.publish_if_due(&publisher));
    }
}
