//! Common test utilities for integration tests.

pub mod fixtures;
pub mod injectors;

use std::sync::Arc;

use chaos_controller::clock::{Clock, ManualClock};
use chaos_controller::config::EngineConfig;
use chaos_controller::injector::{InMemoryInjector, Injector};
use chaos_controller::lifecycle::TickOutcome;
use chaos_controller::metrics::MemorySink;
use chaos_controller::selector::{ClusterSelector, InMemoryCluster};
use chaos_controller::{DisruptionKey, DisruptionRegistry, LifecycleEngine};

pub use fixtures::*;
pub use injectors::*;

/// A registry wired to an in-memory cluster, injector, sink and clock.
pub struct Harness {
    pub cluster: Arc<InMemoryCluster>,
    pub injector: Arc<InMemoryInjector>,
    pub sink: Arc<MemorySink>,
    pub clock: ManualClock,
    pub config: EngineConfig,
    pub registry: DisruptionRegistry,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let cluster = Arc::new(InMemoryCluster::new());
        let injector = Arc::new(InMemoryInjector::new());
        let sink = Arc::new(MemorySink::new());
        let clock = ManualClock::default();
        let registry = registry(&cluster, injector.clone(), &sink, &clock, &config);
        Self {
            cluster,
            injector,
            sink,
            clock,
            config,
            registry,
        }
    }

    /// A second registry over the same cluster, injector, sink and clock, as
    /// a restarted controller would see them.
    pub fn restarted(&self) -> DisruptionRegistry {
        self.registry_with_injector(self.injector.clone())
    }

    /// A registry over the same cluster, sink and clock that injects through
    /// `injector` instead of the in-memory one.
    pub fn registry_with_injector(&self, injector: Arc<dyn Injector>) -> DisruptionRegistry {
        registry(&self.cluster, injector, &self.sink, &self.clock, &self.config)
    }

    pub async fn tick(&self, key: &DisruptionKey) -> TickOutcome {
        self.registry
            .tick(key)
            .await
            .expect("disruption is registered")
    }

    /// Tick, then move the clock to when the engine asked to be requeued.
    pub async fn step(&self, key: &DisruptionKey) -> TickOutcome {
        let outcome = self.tick(key).await;
        if let Some(after) = outcome.requeue_after {
            self.clock.advance(after);
        }
        outcome
    }

    /// Step until terminal or `max_ticks` is reached.
    pub async fn drive(&self, key: &DisruptionKey, max_ticks: usize) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        for _ in 0..max_ticks {
            let outcome = self.step(key).await;
            let done = outcome.is_terminal();
            outcomes.push(outcome);
            if done {
                break;
            }
        }
        outcomes
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }
}

fn registry(
    cluster: &Arc<InMemoryCluster>,
    injector: Arc<dyn Injector>,
    sink: &Arc<MemorySink>,
    clock: &ManualClock,
    config: &EngineConfig,
) -> DisruptionRegistry {
    let engine = LifecycleEngine::new(
        Arc::new(ClusterSelector::new(Arc::clone(cluster))),
        injector,
        sink.clone(),
        Arc::new(clock.clone()),
        config.clone(),
    );
    DisruptionRegistry::new(Arc::new(engine))
}
