//! Battery provider lifecycle.
//!
//! [`Battery`] owns at most one active [`BatteryProvider`] together with the
//! hardware port claim it needs. Every entry point takes the same lock for its
//! whole duration, so a poll step, a reconfiguration and a stats read never
//! interleave: observers see either no provider or a fully initialized one.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::arbiter::{PortArbiter, PortClaim};
use crate::provider::{BatteryProvider, BatterySettings, ProviderFactory, SettingsSource};
use crate::scheduler::Scheduler;
use crate::stats::{BatteryStats, StatsPublisher};
use crate::types::{HardwarePort, ProviderKind};

/// Owner label used for battery port claims.
pub const PORT_OWNER: &str = "battery";

/// Poll period used when the host does not configure one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Why a reconfiguration left the battery subsystem without a provider.
///
/// None of these are fatal; a later [`Battery::reconfigure`] may succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconfigureError {
    #[error("unknown battery provider id {0}")]
    UnknownProvider(i32),

    #[error("{kind} needs {port}, which is in use by {}", .owner.as_deref().unwrap_or("another consumer"))]
    PortUnavailable {
        kind: ProviderKind,
        port: HardwarePort,
        owner: Option<String>,
    },

    #[error("{kind} failed to initialize: {reason}")]
    InitFailed { kind: ProviderKind, reason: String },
}

/// Point-in-time view of the manager for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatteryStatus {
    pub provider: Option<ProviderKind>,
    pub port: Option<HardwarePort>,
    pub last_error: Option<String>,
}

impl BatteryStatus {
    pub fn is_active(&self) -> bool {
        self.provider.is_some()
    }
}

struct ActiveProvider {
    kind: ProviderKind,
    provider: Box<dyn BatteryProvider + Send>,
    claim: Option<PortClaim>,
}

impl ActiveProvider {
    /// Deinitialize first, then give the port back.
    fn teardown(mut self) {
        self.provider.deinitialize();
        if let Some(claim) = self.claim.take() {
            claim.release();
        }
        info!(provider = %self.kind, "Battery provider stopped");
    }
}

#[derive(Default)]
struct State {
    active: Option<ActiveProvider>,
    last_error: Option<ReconfigureError>,
}

/// Battery provider lifecycle manager.
pub struct Battery {
    state: Mutex<State>,
    settings: Arc<dyn SettingsSource>,
    factory: Box<dyn ProviderFactory>,
    arbiter: Arc<PortArbiter>,
    publisher: Arc<dyn StatsPublisher>,
    empty: Arc<BatteryStats>,
}

impl Battery {
    pub fn new(
        settings: Arc<dyn SettingsSource>,
        factory: Box<dyn ProviderFactory>,
        arbiter: Arc<PortArbiter>,
        publisher: Arc<dyn StatsPublisher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            settings,
            factory,
            arbiter,
            publisher,
            empty: Arc::new(BatteryStats::empty()),
        })
    }

    /// Register the poll loop with `scheduler`, then apply the current settings.
    pub fn initialize(
        self: &Arc<Self>,
        scheduler: &dyn Scheduler,
        poll_interval: Duration,
    ) -> Result<Option<ProviderKind>, ReconfigureError> {
        let battery: Weak<Self> = Arc::downgrade(self);
        scheduler.add_task(
            "battery",
            poll_interval,
            Box::new(move || {
                if let Some(battery) = battery.upgrade() {
                    battery.periodic_step();
                }
            }),
        );

        self.reconfigure()
    }

    /// Tear down the current provider and start the configured one.
    ///
    /// On every error path the manager ends up without a provider and without
    /// a port claim.
    pub fn reconfigure(&self) -> Result<Option<ProviderKind>, ReconfigureError> {
        let mut state = self.lock();

        if let Some(active) = state.active.take() {
            active.teardown();
        }

        let settings = self.settings.battery_settings();
        match self.activate(&settings) {
            Ok(active) => {
                let kind = active.as_ref().map(|a| a.kind);
                state.active = active;
                state.last_error = None;
                Ok(kind)
            }
            Err(e) => {
                state.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    fn activate(
        &self,
        settings: &BatterySettings,
    ) -> Result<Option<ActiveProvider>, ReconfigureError> {
        if !settings.enabled {
            debug!("Battery support disabled");
            return Ok(None);
        }

        let kind = ProviderKind::try_from(settings.provider).map_err(|e| {
            warn!(provider = e.0, "Unknown battery provider");
            ReconfigureError::UnknownProvider(e.0)
        })?;

        let mut provider = self.factory.create(kind, settings);

        let claim = match provider.used_hardware_port() {
            Some(port) => match self.arbiter.claim(port, PORT_OWNER) {
                Some(claim) => Some(claim),
                None => {
                    let owner = self.arbiter.owner(port).map(str::to_string);
                    warn!(provider = %kind, %port, owner = ?owner, "Hardware port unavailable");
                    return Err(ReconfigureError::PortUnavailable { kind, port, owner });
                }
            },
            None => None,
        };

        if let Err(e) = provider.initialize(settings.verbose_logging) {
            error!(provider = %kind, error = %e, "Battery provider failed to initialize");
            drop(claim);
            return Err(ReconfigureError::InitFailed {
                kind,
                reason: format!("{e:#}"),
            });
        }

        info!(
            provider = %kind,
            port = ?claim.as_ref().map(PortClaim::port),
            verbose = settings.verbose_logging,
            "Battery provider active"
        );
        Ok(Some(ActiveProvider {
            kind,
            provider,
            claim,
        }))
    }

    /// One poll of the active provider, then publish its stats if due.
    pub fn periodic_step(&self) {
        let mut state = self.lock();
        let Some(active) = state.active.as_mut() else {
            return;
        };

        active.provider.periodic_step();
        active
            .provider
            .stats()
            .publish_if_due(self.publisher.as_ref());
    }

    /// Current statistics; the shared empty snapshot if no provider is active.
    pub fn stats(&self) -> Arc<BatteryStats> {
        let state = self.lock();
        match &state.active {
            Some(active) => active.provider.stats(),
            None => Arc::clone(&self.empty),
        }
    }

    pub fn status(&self) -> BatteryStatus {
        let state = self.lock();
        BatteryStatus {
            provider: state.active.as_ref().map(|a| a.kind),
            port: state
                .active
                .as_ref()
                .and_then(|a| a.claim.as_ref())
                .map(PortClaim::port),
            last_error: state.last_error.as_ref().map(ToString::to_string),
        }
    }

    pub fn arbiter(&self) -> &Arc<PortArbiter> {
        &self.arbiter
    }

    /// Stop the active provider, if any.
    pub fn shutdown(&self) {
        if let Some(active) = self.lock().active.take() {
            active.teardown();
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Battery {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(active) = state.active.take() {
            active.teardown();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use color_eyre::eyre::{eyre, Result};

    use super::*;
    use crate::stats::BatteryReading;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Created(ProviderKind),
        Initialized(ProviderKind),
        Stepped(ProviderKind),
        Deinitialized(ProviderKind),
    }

    #[derive(Default)]
    struct Journal {
        events: Mutex<Vec<Event>>,
    }

    impl Journal {
        fn record(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, event: &Event) -> usize {
            self.events.lock().unwrap().iter().filter(|e| *e == event).count()
        }
    }

    struct FakeProvider {
        kind: ProviderKind,
        port: Option<HardwarePort>,
        fail_init: bool,
        init_delay: Duration,
        initialized: bool,
        stats: Arc<BatteryStats>,
        journal: Arc<Journal>,
        violations: Arc<AtomicUsize>,
    }

    impl BatteryProvider for FakeProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn initialize(&mut self, _verbose_logging: bool) -> Result<()> {
            if !self.init_delay.is_zero() {
                thread::sleep(self.init_delay);
            }
            if self.fail_init {
                return Err(eyre!("bus did not answer"));
            }
            self.initialized = true;
            self.journal.record(Event::Initialized(self.kind));
            Ok(())
        }

        fn used_hardware_port(&self) -> Option<HardwarePort> {
            self.port
        }

        fn periodic_step(&mut self) {
            if !self.initialized {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            self.stats = Arc::new(BatteryStats::from_reading(
                self.kind,
                BatteryReading {
                    soc_percent: 50.0,
                    voltage_v: 48.0,
                    ..BatteryReading::default()
                },
            ));
            self.journal.record(Event::Stepped(self.kind));
        }

        fn deinitialize(&mut self) {
            self.initialized = false;
            self.journal.record(Event::Deinitialized(self.kind));
        }

        fn stats(&self) -> Arc<BatteryStats> {
            Arc::clone(&self.stats)
        }
    }

    struct FakeFactory {
        arbiter: Arc<PortArbiter>,
        failing: HashSet<ProviderKind>,
        init_delay: Duration,
        journal: Arc<Journal>,
        violations: Arc<AtomicUsize>,
    }

    impl ProviderFactory for FakeFactory {
        fn create(
            &self,
            kind: ProviderKind,
            settings: &BatterySettings,
        ) -> Box<dyn BatteryProvider + Send> {
            // The previous provider must be fully torn down by now.
            if self.arbiter.claimed_ports().iter().any(|p| {
                self.arbiter.owner(*p) == Some(PORT_OWNER)
            }) {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
            self.journal.record(Event::Created(kind));

            let port = match kind {
                ProviderKind::SerialBms | ProviderKind::SerialShunt => {
                    Some(HardwarePort(settings.hardware_uart))
                }
                ProviderKind::Can | ProviderKind::Networked => None,
            };
            Box::new(FakeProvider {
                kind,
                port,
                fail_init: self.failing.contains(&kind),
                init_delay: self.init_delay,
                initialized: false,
                stats: Arc::new(BatteryStats::awaiting_data(kind)),
                journal: Arc::clone(&self.journal),
                violations: Arc::clone(&self.violations),
            })
        }
    }

    #[derive(Default)]
    struct SharedSettings(Mutex<BatterySettings>);

    impl SharedSettings {
        fn set(&self, enabled: bool, provider: i32) {
            let mut settings = self.0.lock().unwrap();
            settings.enabled = enabled;
            settings.provider = provider;
        }

        fn set_uart(&self, uart: u8) {
            self.0.lock().unwrap().hardware_uart = uart;
        }
    }

    impl SettingsSource for SharedSettings {
        fn battery_settings(&self) -> BatterySettings {
            self.0.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct CountingPublisher {
        count: AtomicUsize,
    }

    impl StatsPublisher for CountingPublisher {
        fn publish(&self, _stats: &BatteryStats) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Harness {
        battery: Arc<Battery>,
        settings: Arc<SharedSettings>,
        arbiter: Arc<PortArbiter>,
        journal: Arc<Journal>,
        publisher: Arc<CountingPublisher>,
        violations: Arc<AtomicUsize>,
    }

    fn harness_with(failing: &[ProviderKind], init_delay: Duration) -> Harness {
        let settings = Arc::new(SharedSettings::default());
        let arbiter = PortArbiter::new();
        let journal = Arc::new(Journal::default());
        let publisher = Arc::new(CountingPublisher::default());
        let violations = Arc::new(AtomicUsize::new(0));

        let factory = FakeFactory {
            arbiter: Arc::clone(&arbiter),
            failing: failing.iter().copied().collect(),
            init_delay,
            journal: Arc::clone(&journal),
            violations: Arc::clone(&violations),
        };
        let battery = Battery::new(
            settings.clone(),
            Box::new(factory),
            Arc::clone(&arbiter),
            publisher.clone(),
        );

        Harness {
            battery,
            settings,
            arbiter,
            journal,
            publisher,
            violations,
        }
    }

    fn harness() -> Harness {
        harness_with(&[], Duration::ZERO)
    }

    fn battery_claims(arbiter: &PortArbiter) -> usize {
        arbiter
            .claimed_ports()
            .into_iter()
            .filter(|p| arbiter.owner(*p) == Some(PORT_OWNER))
            .count()
    }

    #[test]
    fn test_starts_empty() {
        let h = harness();
        assert!(!h.battery.status().is_active());
        assert!(!h.battery.stats().has_data());
        h.battery.periodic_step();
        assert!(h.journal.events().is_empty());
    }

    #[test]
    fn test_shunt_enable_then_disable() {
        let h = harness();
        h.settings.set(true, 3);

        assert_eq!(h.battery.reconfigure(), Ok(Some(ProviderKind::SerialShunt)));
        let status = h.battery.status();
        assert_eq!(status.provider, Some(ProviderKind::SerialShunt));
        assert_eq!(status.port, Some(HardwarePort(2)));
        assert!(h.arbiter.is_claimed(HardwarePort(2)));

        h.settings.set(false, 3);
        assert_eq!(h.battery.reconfigure(), Ok(None));
        assert_eq!(
            h.journal.count(&Event::Deinitialized(ProviderKind::SerialShunt)),
            1
        );
        assert!(!h.arbiter.is_claimed(HardwarePort(2)));
        assert!(!h.battery.status().is_active());

        let stats = h.battery.stats();
        assert!(!stats.has_data());
        assert_eq!(stats.provider(), None);
    }

    #[test]
    fn test_port_held_elsewhere() {
        let h = harness();
        let _charger = h.arbiter.claim(HardwarePort(2), "charger").unwrap();
        h.settings.set(true, 1);

        let result = h.battery.reconfigure();
        assert_eq!(
            result,
            Err(ReconfigureError::PortUnavailable {
                kind: ProviderKind::SerialBms,
                port: HardwarePort(2),
                owner: Some("charger".to_string()),
            })
        );
        assert!(!h.battery.status().is_active());
        assert_eq!(h.arbiter.owner(HardwarePort(2)), Some("charger"));
        assert_eq!(
            h.journal.count(&Event::Initialized(ProviderKind::SerialBms)),
            0
        );
        assert!(h.battery.status().last_error.unwrap().contains("charger"));
    }

    #[test]
    fn test_port_contention_recovers_after_release() {
        let h = harness();
        let charger = h.arbiter.claim(HardwarePort(2), "charger").unwrap();
        h.settings.set(true, 3);
        assert!(h.battery.reconfigure().is_err());

        charger.release();
        assert_eq!(h.battery.reconfigure(), Ok(Some(ProviderKind::SerialShunt)));
        assert_eq!(h.arbiter.owner(HardwarePort(2)), Some(PORT_OWNER));
        assert!(h.battery.status().last_error.is_none());
    }

    #[test]
    fn test_unknown_provider_id() {
        let h = harness();
        h.settings.set(true, 99);

        let result = h.battery.reconfigure();
        assert_eq!(result, Err(ReconfigureError::UnknownProvider(99)));
        assert!(result.unwrap_err().to_string().contains("99"));
        assert!(!h.battery.status().is_active());
        assert!(h.journal.events().is_empty());
        assert!(h.arbiter.claimed_ports().is_empty());
    }

    #[test]
    fn test_init_failure_releases_port() {
        let h = harness_with(&[ProviderKind::SerialBms], Duration::ZERO);
        h.settings.set(true, 1);

        let result = h.battery.reconfigure();
        assert!(matches!(
            result,
            Err(ReconfigureError::InitFailed {
                kind: ProviderKind::SerialBms,
                ..
            })
        ));
        assert!(!h.arbiter.is_claimed(HardwarePort(2)));
        assert!(!h.battery.status().is_active());
        assert!(!h.battery.stats().has_data());
    }

    #[test]
    fn test_disabled_never_claims() {
        let h = harness();
        for provider in [0, 1, 2, 3, 42, -1] {
            h.settings.set(false, provider);
            assert_eq!(h.battery.reconfigure(), Ok(None));
            assert!(h.arbiter.claimed_ports().is_empty());
        }
        assert!(h.journal.events().is_empty());
    }

    #[test]
    fn test_portless_provider_never_claims() {
        let h = harness();
        // Every UART the serial backends could use is taken by someone else.
        let _held: Vec<_> = (0..=2)
            .map(|n| h.arbiter.claim(HardwarePort(n), "inverter").unwrap())
            .collect();

        for provider in [0, 2] {
            h.settings.set(true, provider);
            assert!(h.battery.reconfigure().unwrap().is_some());
            assert_eq!(battery_claims(&h.arbiter), 0);
            assert_eq!(h.battery.status().port, None);
        }
    }

    #[test]
    fn test_at_most_one_port_across_reconfigures() {
        let h = harness();
        let sequence = [(true, 1, 2), (true, 3, 0), (true, 3, 1), (true, 2, 1), (true, 1, 0)];

        for (enabled, provider, uart) in sequence {
            h.settings.set(enabled, provider);
            h.settings.set_uart(uart);
            h.battery.reconfigure().unwrap();
            assert!(battery_claims(&h.arbiter) <= 1);
            assert!(h.arbiter.claimed_ports().len() <= 1);
        }
        assert_eq!(h.violations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_switch_tears_down_before_create() {
        let h = harness();
        h.settings.set(true, 1);
        h.battery.reconfigure().unwrap();
        h.settings.set(true, 3);
        h.battery.reconfigure().unwrap();

        assert_eq!(
            h.journal.events(),
            vec![
                Event::Created(ProviderKind::SerialBms),
                Event::Initialized(ProviderKind::SerialBms),
                Event::Deinitialized(ProviderKind::SerialBms),
                Event::Created(ProviderKind::SerialShunt),
                Event::Initialized(ProviderKind::SerialShunt),
            ]
        );
        assert_eq!(h.violations.load(Ordering::SeqCst), 0);
        assert_eq!(h.arbiter.owner(HardwarePort(2)), Some(PORT_OWNER));
    }

    #[test]
    fn test_periodic_step_publishes_stats() {
        let h = harness();
        h.settings.set(true, 0);
        h.battery.reconfigure().unwrap();

        h.battery.periodic_step();
        let stats = h.battery.stats();
        assert!(stats.has_data());
        assert_eq!(stats.provider(), Some(ProviderKind::Can));
        assert!(stats.is_published());
        assert_eq!(h.publisher.count.load(Ordering::SeqCst), 1);

        h.battery.periodic_step();
        assert_eq!(h.publisher.count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stats_handle_survives_reconfigure() {
        let h = harness();
        h.settings.set(true, 2);
        h.battery.reconfigure().unwrap();
        h.battery.periodic_step();
        let held = h.battery.stats();

        h.settings.set(false, 2);
        h.battery.reconfigure().unwrap();

        assert!(held.has_data());
        assert_eq!(held.provider(), Some(ProviderKind::Networked));
        assert!(!h.battery.stats().has_data());
    }

    #[test]
    fn test_empty_snapshot_is_shared() {
        let h = harness();
        assert!(Arc::ptr_eq(&h.battery.stats(), &h.battery.stats()));
    }

    #[test]
    fn test_shutdown_and_drop_release_port() {
        let h = harness();
        h.settings.set(true, 3);
        h.battery.reconfigure().unwrap();
        h.battery.shutdown();
        assert!(h.arbiter.claimed_ports().is_empty());

        h.battery.reconfigure().unwrap();
        assert!(h.arbiter.is_claimed(HardwarePort(2)));
        let Harness {
            battery, arbiter, ..
        } = h;
        drop(battery);
        assert!(arbiter.claimed_ports().is_empty());
    }

    #[test]
    fn test_step_never_sees_half_built_provider() {
        let h = harness_with(&[ProviderKind::SerialBms], Duration::from_millis(5));
        let stop = Arc::new(AtomicBool::new(false));

        let stepper = {
            let battery = Arc::clone(&h.battery);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    battery.periodic_step();
                    let _ = battery.stats();
                }
            })
        };

        for provider in [3, 1, 0, 2, 3, 1, 3] {
            h.settings.set(true, provider);
            let _ = h.battery.reconfigure();
            assert!(battery_claims(&h.arbiter) <= 1);
        }

        stop.store(true, Ordering::SeqCst);
        stepper.join().unwrap();
        assert_eq!(h.violations.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_initialize_registers_poll_task() {
        struct RecordingScheduler {
            tasks: Mutex<Vec<(&'static str, Duration, crate::scheduler::Task)>>,
        }

        impl Scheduler for RecordingScheduler {
            fn add_task(
                &self,
                name: &'static str,
                period: Duration,
                task: crate::scheduler::Task,
            ) {
                self.tasks.lock().unwrap().push((name, period, task));
            }
        }

        let h = harness();
        h.settings.set(true, 0);
        let scheduler = RecordingScheduler {
            tasks: Mutex::new(Vec::new()),
        };

        assert_eq!(
            h.battery.initialize(&scheduler, DEFAULT_POLL_INTERVAL),
            Ok(Some(ProviderKind::Can))
        );

        let mut tasks = scheduler.tasks.lock().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].0, "battery");
        assert_eq!(tasks[0].1, DEFAULT_POLL_INTERVAL);

        (tasks[0].2)();
        assert_eq!(h.journal.count(&Event::Stepped(ProviderKind::Can)), 1);
    }
}
