//! Fault injector interface.
//!
//! The lifecycle engine only sees [`Injector`]: how a fault is physically
//! applied to a pod or node lives behind it. [`InMemoryInjector`] keeps the
//! set of active faults in memory and can be scripted to fail, which is what
//! dry runs and tests use.

use crate::error::{ChaosError, Result};
use crate::types::{FaultKind, TargetRef};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Applies and removes faults on single targets.
///
/// Both operations must be idempotent: injecting twice leaves one fault,
/// removing an absent fault succeeds.
#[async_trait]
pub trait Injector: Send + Sync {
    async fn inject(&self, target: &TargetRef, kind: FaultKind) -> Result<()>;

    async fn remove(&self, target: &TargetRef, kind: FaultKind) -> Result<()>;
}

/// One call observed by [`InMemoryInjector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectorCall {
    Inject(TargetRef),
    Remove(TargetRef),
}

#[derive(Debug, Clone, Copy)]
enum Failures {
    Always,
    Times(u32),
}

impl Failures {
    /// Consume one scripted failure, returning whether this call fails.
    fn take(&mut self) -> bool {
        match self {
            Failures::Always => true,
            Failures::Times(0) => false,
            Failures::Times(n) => {
                *n -= 1;
                true
            }
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    inject: HashMap<TargetRef, Failures>,
    remove: HashMap<TargetRef, Failures>,
    all_removals_fail: bool,
}

/// Injector keeping active faults in memory.
#[derive(Debug, Default)]
pub struct InMemoryInjector {
    active: Arc<RwLock<HashMap<TargetRef, FaultKind>>>,
    script: Mutex<Script>,
    calls: Mutex<Vec<InjectorCall>>,
}

impl InMemoryInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` injections on `target`.
    pub fn fail_inject(&self, target: TargetRef, times: u32) {
        self.script.lock().inject.insert(target, Failures::Times(times));
    }

    /// Fail every injection on `target`.
    pub fn always_fail_inject(&self, target: TargetRef) {
        self.script.lock().inject.insert(target, Failures::Always);
    }

    /// Fail the next `times` removals on `target`.
    pub fn fail_remove(&self, target: TargetRef, times: u32) {
        self.script.lock().remove.insert(target, Failures::Times(times));
    }

    /// Fail every removal on every target until reset.
    pub fn fail_all_removals(&self, fail: bool) {
        self.script.lock().all_removals_fail = fail;
    }

    pub async fn is_active(&self, target: &TargetRef) -> bool {
        self.active.read().await.contains_key(target)
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<InjectorCall> {
        self.calls.lock().clone()
    }

    pub fn inject_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, InjectorCall::Inject(_)))
            .count()
    }

    pub fn remove_calls(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, InjectorCall::Remove(_)))
            .count()
    }

    fn should_fail_inject(&self, target: &TargetRef) -> bool {
        self.script
            .lock()
            .inject
            .get_mut(target)
            .map_or(false, Failures::take)
    }

    fn should_fail_remove(&self, target: &TargetRef) -> bool {
        let mut script = self.script.lock();
        if script.all_removals_fail {
            return true;
        }
        script.remove.get_mut(target).map_or(false, Failures::take)
    }
}

#[async_trait]
impl Injector for InMemoryInjector {
    async fn inject(&self, target: &TargetRef, kind: FaultKind) -> Result<()> {
        self.calls.lock().push(InjectorCall::Inject(target.clone()));

        if self.should_fail_inject(target) {
            return Err(ChaosError::Injection {
                target: target.to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        let previous = self.active.write().await.insert(target.clone(), kind);
        if previous.is_some() {
            debug!(target = %target, kind = %kind, "Fault already active");
        } else {
            info!(target = %target, kind = %kind, "Injected fault");
        }
        Ok(())
    }

    async fn remove(&self, target: &TargetRef, kind: FaultKind) -> Result<()> {
        self.calls.lock().push(InjectorCall::Remove(target.clone()));

        if self.should_fail_remove(target) {
            return Err(ChaosError::Cleanup {
                target: target.to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        if self.active.write().await.remove(target).is_some() {
            info!(target = %target, kind = %kind, "Removed fault");
        }
        Ok(())
    }
}
