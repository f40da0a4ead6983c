//! Per-fingerprint serialization and the set of executing jobs.
//!
//! The status store offers no compare-and-set, so every transition that
//! must not race (starting a job, recording its terminal state, evicting
//! its artifacts) runs under the fingerprint's gate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mediaflow_core::types::Fingerprint;
use tokio::sync::OwnedMutexGuard;

type GateMap = HashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>;

/// Shared between the orchestrator and the retention manager.
#[derive(Debug, Default)]
pub struct JobRegistry {
    gates: Mutex<GateMap>,
    active: Mutex<HashSet<Fingerprint>>,
}

/// Holds a fingerprint's gate; the map entry is dropped with the last user.
pub struct GateGuard<'a> {
    registry: &'a JobRegistry,
    fingerprint: Fingerprint,
    _guard: OwnedMutexGuard<()>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `fingerprint`.
    pub async fn lock(&self, fingerprint: &str) -> GateGuard<'_> {
        let gate = {
            let mut gates = lock(&self.gates);
            gates.entry(fingerprint.to_string()).or_default().clone()
        };
        GateGuard {
            registry: self,
            fingerprint: fingerprint.to_string(),
            _guard: gate.lock_owned().await,
        }
    }

    /// Mark a fingerprint as executing. Returns `false` if it already was.
    pub fn activate(&self, fingerprint: &str) -> bool {
        lock(&self.active).insert(fingerprint.to_string())
    }

    /// Clear the executing mark.
    pub fn deactivate(&self, fingerprint: &str) -> bool {
        lock(&self.active).remove(fingerprint)
    }

    pub fn is_active(&self, fingerprint: &str) -> bool {
        lock(&self.active).contains(fingerprint)
    }

    /// Snapshot of executing fingerprints.
    pub fn active(&self) -> HashSet<Fingerprint> {
        lock(&self.active).clone()
    }

    pub fn active_count(&self) -> usize {
        lock(&self.active).len()
    }

    /// Number of gates currently allocated.
    pub fn gate_count(&self) -> usize {
        lock(&self.gates).len()
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut gates = lock(&self.registry.gates);
        // One reference in the map, one held by this guard: nobody waits.
        let idle = gates
            .get(&self.fingerprint)
            .is_some_and(|gate| Arc::strong_count(gate) <= 2);
        if idle {
            gates.remove(&self.fingerprint);
        }
    }
}

/// Critical sections never panic, so a poisoned lock still holds valid data.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
