//! Exclusive ownership of shared hardware UARTs.
//!
//! Several consumers on the device (battery backends, charge controllers,
//! inverters) may want the same physical UART. The [`PortArbiter`] hands out at
//! most one [`PortClaim`] per port. A claim is released when the guard is
//! dropped or explicitly via [`PortClaim::release`], so no exit path can leak a
//! reserved port.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::types::HardwarePort;

/// Tracks which hardware ports are currently claimed and by whom.
#[derive(Debug, Default)]
pub struct PortArbiter {
    claims: Mutex<BTreeMap<HardwarePort, &'static str>>,
}

impl PortArbiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attempt to claim `port` for `owner`.
    ///
    /// Returns `None` if the port is already claimed, whoever holds it. A denied
    /// claim is ordinary contention and is not logged as an error here.
    pub fn claim(self: &Arc<Self>, port: HardwarePort, owner: &'static str) -> Option<PortClaim> {
        let mut claims = self.lock();
        if let Some(holder) = claims.get(&port) {
            debug!(%port, owner, holder = *holder, "Port claim denied");
            return None;
        }
        claims.insert(port, owner);
        debug!(%port, owner, "Port claimed");

        Some(PortClaim {
            arbiter: Arc::clone(self),
            port,
            owner,
            released: false,
        })
    }

    pub fn is_claimed(&self, port: HardwarePort) -> bool {
        self.lock().contains_key(&port)
    }

    /// Returns the owner label of a claimed port.
    pub fn owner(&self, port: HardwarePort) -> Option<&'static str> {
        self.lock().get(&port).copied()
    }

    /// All currently claimed ports, in ascending order.
    pub fn claimed_ports(&self) -> Vec<HardwarePort> {
        self.lock().keys().copied().collect()
    }

    fn release(&self, port: HardwarePort, owner: &'static str) {
        let mut claims = self.lock();
        if claims.get(&port) == Some(&owner) {
            claims.remove(&port);
            debug!(%port, owner, "Port released");
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<HardwarePort, &'static str>> {
        self.claims.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RAII guard for an exclusive port claim.
#[derive(Debug)]
pub struct PortClaim {
    arbiter: Arc<PortArbiter>,
    port: HardwarePort,
    owner: &'static str,
    released: bool,
}

impl PortClaim {
    pub fn port(&self) -> HardwarePort {
        self.port
    }

    pub fn owner(&self) -> &'static str {
        self.owner
    }

    /// Release the claim now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.arbiter.release(self.port, self.owner);
        }
    }
}

impl Drop for PortClaim {
    fn drop(&mut self) {
        self.release_inner();
    }
}
