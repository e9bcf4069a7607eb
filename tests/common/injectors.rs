// Injectors with behavior the in-memory one does not script

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chaos_controller::injector::Injector;
use chaos_controller::{ChaosError, FaultKind, Result, TargetRef};
use parking_lot::Mutex;

/// Reports some targets as gone, the way the API answers a patch on a pod
/// deleted after its health check.
#[derive(Default)]
pub struct VanishingInjector {
    gone: BTreeSet<TargetRef>,
    calls: Mutex<HashMap<TargetRef, usize>>,
}

impl VanishingInjector {
    pub fn new(gone: impl IntoIterator<Item = TargetRef>) -> Self {
        Self {
            gone: gone.into_iter().collect(),
            calls: Mutex::default(),
        }
    }

    pub fn inject_calls(&self, target: &TargetRef) -> usize {
        self.calls.lock().get(target).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Injector for VanishingInjector {
    async fn inject(&self, target: &TargetRef, _kind: FaultKind) -> Result<()> {
        *self.calls.lock().entry(target.clone()).or_default() += 1;
        if self.gone.contains(target) {
            return Err(ChaosError::TargetNotFound(target.to_string()));
        }
        Ok(())
    }

    async fn remove(&self, target: &TargetRef, _kind: FaultKind) -> Result<()> {
        if self.gone.contains(target) {
            return Err(ChaosError::TargetNotFound(target.to_string()));
        }
        Ok(())
    }
}

/// Yields to the scheduler in the middle of every call and tracks how many
/// calls overlap.
#[derive(Default)]
pub struct YieldingInjector {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    injected: Mutex<Vec<TargetRef>>,
}

impl YieldingInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most calls observed in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn injected(&self) -> Vec<TargetRef> {
        self.injected.lock().clone()
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Injector for YieldingInjector {
    async fn inject(&self, target: &TargetRef, _kind: FaultKind) -> Result<()> {
        self.enter().await;
        self.injected.lock().push(target.clone());
        Ok(())
    }

    async fn remove(&self, _target: &TargetRef, _kind: FaultKind) -> Result<()> {
        self.enter().await;
        Ok(())
    }
}
