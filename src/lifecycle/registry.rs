use super::engine::{DisruptionRun, LifecycleEngine, TickOutcome};
use super::phase::LifecyclePhase;
use super::status::DisruptionStatus;
use crate::disruption::DisruptionSpec;
use crate::error::{ChaosError, Result};
use crate::metrics::{self, report};
use crate::types::DisruptionKey;
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type RunHandle = Arc<Mutex<DisruptionRun>>;

/// Gauge values across all tracked disruptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryGauges {
    /// Disruptions in `Holding`, `CleaningUp` or `StuckOnRemoval`
    pub ongoing: usize,
    pub stuck: usize,
    /// Targets currently carrying a fault
    pub targets: usize,
}

/// All disruptions known to one controller.
///
/// Each disruption sits behind its own async mutex, so ticks for one
/// disruption are serialized while different disruptions progress
/// concurrently.
pub struct DisruptionRegistry {
    engine: Arc<LifecycleEngine>,
    runs: RwLock<BTreeMap<DisruptionKey, RunHandle>>,
}

impl DisruptionRegistry {
    pub fn new(engine: Arc<LifecycleEngine>) -> Self {
        Self {
            engine,
            runs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<LifecycleEngine> {
        &self.engine
    }

    /// Start tracking a new disruption.
    pub fn submit(&self, key: DisruptionKey, spec: DisruptionSpec) -> Result<()> {
        if let Err(e) = spec.validate() {
            report(
                metrics::METRIC_FAILED_VALIDATION,
                self.engine.sink().metric_failed_validation(),
            );
            return Err(e);
        }

        let mut runs = self.runs.write();
        if runs.contains_key(&key) {
            return Err(ChaosError::DisruptionExists(key.to_string()));
        }
        let run = DisruptionRun::new(key.clone(), spec, self.engine.clock().now());
        info!(disruption = %key, "Disruption submitted");
        runs.insert(key, Arc::new(Mutex::new(run)));
        Ok(())
    }

    /// Track a disruption unless it is already known, resuming from `status`
    /// when one was persisted.
    pub fn ensure(
        &self,
        key: DisruptionKey,
        spec: DisruptionSpec,
        status: Option<DisruptionStatus>,
    ) -> Result<()> {
        if self.runs.read().contains_key(&key) {
            return Ok(());
        }
        spec.validate().map_err(|e| {
            report(
                metrics::METRIC_FAILED_VALIDATION,
                self.engine.sink().metric_failed_validation(),
            );
            e
        })?;

        let run = match status {
            Some(status) => {
                debug!(disruption = %key, phase = %status.phase, "Resuming disruption");
                for record in status.records.iter().filter(|r| r.carries_fault() || r.is_pending()) {
                    self.engine.claims().claim(&record.target, &key);
                }
                DisruptionRun::resume(key.clone(), spec, status)
            }
            None => DisruptionRun::new(key.clone(), spec, self.engine.clock().now()),
        };
        self.runs
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(run)));
        Ok(())
    }

    /// Ask for a disruption to be cleaned up on its next tick.
    pub async fn request_delete(&self, key: &DisruptionKey) -> Result<()> {
        let handle = self.handle(key)?;
        let mut run = handle.lock().await;
        if !run.status.delete_requested {
            info!(disruption = %key, phase = %run.status.phase, "Deletion requested");
            run.status.delete_requested = true;
        }
        Ok(())
    }

    pub async fn tick(&self, key: &DisruptionKey) -> Result<TickOutcome> {
        let handle = self.handle(key)?;
        let mut run = handle.lock().await;
        Ok(self.engine.tick(&mut run).await)
    }

    /// Tick every tracked disruption concurrently.
    pub async fn tick_all(&self) -> Vec<(DisruptionKey, TickOutcome)> {
        let handles: Vec<(DisruptionKey, RunHandle)> = self
            .runs
            .read()
            .iter()
            .map(|(k, h)| (k.clone(), Arc::clone(h)))
            .collect();

        join_all(handles.into_iter().map(|(key, handle)| async move {
            let mut run = handle.lock().await;
            let outcome = self.engine.tick(&mut run).await;
            (key, outcome)
        }))
        .await
    }

    pub async fn status(&self, key: &DisruptionKey) -> Option<DisruptionStatus> {
        let handle = self.handle(key).ok()?;
        let run = handle.lock().await;
        Some(run.status.clone())
    }

    pub async fn phase(&self, key: &DisruptionKey) -> Option<LifecyclePhase> {
        self.status(key).await.map(|s| s.phase)
    }

    /// Drop a terminal disruption and its records.
    ///
    /// Returns the final status, or `None` when the disruption is unknown or
    /// still running.
    pub async fn forget(&self, key: &DisruptionKey) -> Option<DisruptionStatus> {
        let handle = self.handle(key).ok()?;
        let status = handle.lock().await.status.clone();
        if !status.is_terminal() {
            warn!(disruption = %key, phase = %status.phase, "Refusing to forget a running disruption");
            return None;
        }
        self.runs.write().remove(key);
        debug!(disruption = %key, "Disruption forgotten");
        Some(status)
    }

    /// Forget every terminal disruption. Returns how many were dropped.
    pub async fn forget_finished(&self) -> usize {
        let mut dropped = 0;
        for key in self.keys() {
            if self.forget(&key).await.is_some() {
                dropped += 1;
            }
        }
        dropped
    }

    /// Compute the registry-wide gauges and report them to the sink.
    pub async fn report_gauges(&self) -> RegistryGauges {
        let handles: Vec<RunHandle> = self.runs.read().values().cloned().collect();

        let mut gauges = RegistryGauges::default();
        for handle in handles {
            let run = handle.lock().await;
            if run.status.phase.is_ongoing() {
                gauges.ongoing += 1;
            }
            if run.status.phase == LifecyclePhase::StuckOnRemoval {
                gauges.stuck += 1;
            }
            gauges.targets += run.status.live_targets();
        }

        let sink = self.engine.sink();
        report(
            metrics::METRIC_DISRUPTIONS_GAUGE,
            sink.metric_disruptions_gauge(gauges.ongoing as f64),
        );
        report(
            metrics::METRIC_STUCK_ON_REMOVAL_TOTAL,
            sink.metric_stuck_on_removal_gauge(gauges.stuck as f64),
        );
        report(
            metrics::METRIC_TARGETS_GAUGE,
            sink.metric_targets_gauge(gauges.targets as f64),
        );
        gauges
    }

    pub fn keys(&self) -> Vec<DisruptionKey> {
        self.runs.read().keys().cloned().collect()
    }

    pub fn contains(&self, key: &DisruptionKey) -> bool {
        self.runs.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.runs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.read().is_empty()
    }

    fn handle(&self, key: &DisruptionKey) -> Result<RunHandle> {
        self.runs
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| ChaosError::DisruptionNotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EngineConfig;
    use crate::injector::InMemoryInjector;
    use crate::metrics::{MemorySink, METRIC_DISRUPTIONS_GAUGE, METRIC_FAILED_VALIDATION};
    use crate::selector::{ClusterSelector, InMemoryCluster, NodeInfo};
    use crate::types::{FaultKind, TargetKind};
    use std::time::Duration;

    fn registry() -> (DisruptionRegistry, Arc<InMemoryCluster>, Arc<MemorySink>, ManualClock) {
        let cluster = Arc::new(InMemoryCluster::new());
        let sink = Arc::new(MemorySink::new());
        let clock = ManualClock::default();
        let engine = LifecycleEngine::new(
            Arc::new(ClusterSelector::new(Arc::clone(&cluster))),
            Arc::new(InMemoryInjector::new()),
            sink.clone(),
            Arc::new(clock.clone()),
            EngineConfig::default(),
        );
        (DisruptionRegistry::new(Arc::new(engine)), cluster, sink, clock)
    }

    fn node_spec() -> DisruptionSpec {
        let selector = [("pool".to_string(), "batch".to_string())].into_iter().collect();
        let mut spec = DisruptionSpec::new(TargetKind::Node, FaultKind::NodeFailure, selector);
        spec.duration = Duration::from_secs(30);
        spec
    }

    #[tokio::test]
    async fn test_submit_rejects_duplicates_and_invalid_specs() {
        let (registry, _, sink, _) = registry();
        let key = DisruptionKey::new("chaos", "nodes");

        registry.submit(key.clone(), node_spec()).unwrap();
        assert!(matches!(
            registry.submit(key, node_spec()),
            Err(ChaosError::DisruptionExists(_))
        ));

        let mut invalid = node_spec();
        invalid.count = 0;
        assert!(registry
            .submit(DisruptionKey::new("chaos", "bad"), invalid)
            .is_err());
        assert_eq!(sink.count(METRIC_FAILED_VALIDATION), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_key() {
        let (registry, _, _, _) = registry();
        let key = DisruptionKey::new("chaos", "missing");
        assert!(matches!(
            registry.tick(&key).await,
            Err(ChaosError::DisruptionNotFound(_))
        ));
        assert!(registry.status(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_gauges_and_forget() {
        let (registry, cluster, sink, clock) = registry();
        let selector = [("pool".to_string(), "batch".to_string())].into_iter().collect();
        cluster.add_node(NodeInfo::ready("worker-1", selector));
        let key = DisruptionKey::new("chaos", "nodes");
        registry.submit(key.clone(), node_spec()).unwrap();

        registry.tick(&key).await.unwrap();
        let gauges = registry.report_gauges().await;
        assert_eq!(gauges.ongoing, 1);
        assert_eq!(gauges.targets, 1);
        assert_eq!(sink.last_value(METRIC_DISRUPTIONS_GAUGE), Some(1.0));

        assert!(registry.forget(&key).await.is_none());

        clock.advance(Duration::from_secs(30));
        let outcome = registry.tick(&key).await.unwrap();
        assert_eq!(outcome.phase, LifecyclePhase::Completed);

        assert_eq!(registry.report_gauges().await, RegistryGauges::default());
        assert_eq!(registry.forget_finished().await, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_request_delete() {
        let (registry, _, _, _) = registry();
        let key = DisruptionKey::new("chaos", "nodes");
        registry.submit(key.clone(), node_spec()).unwrap();
        registry.request_delete(&key).await.unwrap();

        let outcome = registry.tick(&key).await.unwrap();
        assert_eq!(outcome.phase, LifecyclePhase::Completed);
    }
}
