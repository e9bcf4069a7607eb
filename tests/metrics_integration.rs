//! Metrics sink integration tests.

#[allow(dead_code)]
mod common;

use std::sync::Arc;

use chaos_controller::clock::ManualClock;
use chaos_controller::config::{ControllerConfig, EngineConfig};
use chaos_controller::injector::InMemoryInjector;
use chaos_controller::metrics::{
    self, MemorySink, MetricsSink, PrometheusSink, SinkApp, SinkDriver, METRIC_COMPLETED_DURATION,
    METRIC_INJECTED, METRIC_RESTART,
};
use chaos_controller::selector::{ClusterSelector, InMemoryCluster};
use chaos_controller::{DisruptionRegistry, LifecycleEngine, LifecyclePhase};
use common::*;

fn registry_with_sink(
    cluster: &Arc<InMemoryCluster>,
    sink: Arc<dyn MetricsSink>,
    clock: &ManualClock,
) -> DisruptionRegistry {
    let engine = LifecycleEngine::new(
        Arc::new(ClusterSelector::new(Arc::clone(cluster))),
        Arc::new(InMemoryInjector::new()),
        sink,
        Arc::new(clock.clone()),
        EngineConfig::default(),
    );
    DisruptionRegistry::new(Arc::new(engine))
}

#[tokio::test]
async fn test_failing_sink_never_affects_lifecycle() {
    let cluster = Arc::new(InMemoryCluster::new());
    seed_pods(&cluster, 2);
    let sink = Arc::new(MemorySink::failing());
    let clock = ManualClock::default();
    let registry = registry_with_sink(&cluster, sink.clone(), &clock);
    let key = key("noisy");
    registry.submit(key.clone(), pod_spec(2, secs(10))).unwrap();

    let first = registry.tick(&key).await.unwrap();
    assert_eq!(first.phase, LifecyclePhase::Holding);
    clock.advance(secs(10));
    let second = registry.tick(&key).await.unwrap();
    assert_eq!(second.phase, LifecyclePhase::Completed);

    // Samples were attempted even though every call failed
    assert_eq!(sink.count(METRIC_INJECTED), 2);
    assert_eq!(sink.count(METRIC_COMPLETED_DURATION), 1);
    registry.report_gauges().await;
}

#[tokio::test]
async fn test_prometheus_sink_renders_lifecycle_metrics() {
    let cluster = Arc::new(InMemoryCluster::new());
    seed_nodes(&cluster, 1);
    let sink = Arc::new(PrometheusSink::new(SinkApp::Controller).unwrap());
    let clock = ManualClock::default();
    let registry = registry_with_sink(&cluster, sink.clone(), &clock);
    let key = key("node-down");
    registry.submit(key.clone(), node_spec(1, secs(10))).unwrap();

    registry.tick(&key).await.unwrap();
    clock.advance(secs(10));
    registry.tick(&key).await.unwrap();
    registry.report_gauges().await;

    let text = sink.render();
    assert!(text.contains("chaos_injector_injected"));
    assert!(text.contains("chaos_injector_cleaned"));
    assert!(text.contains("chaos_controller_inject_duration"));
    assert!(text.contains("chaos_controller_cleanup_duration"));
    assert!(text.contains("chaos_controller_disruption_completed_duration"));
    assert!(text.contains("disruption_kind=\"node-failure\""));
    assert!(text.contains("chaos_controller_disruptions_gauge{app=\"chaos-controller\"} 0"));
}

#[test]
fn test_new_sink_selects_driver() {
    let noop = metrics::new_sink(SinkDriver::Noop, SinkApp::Controller).unwrap();
    let memory = metrics::new_sink(SinkDriver::Memory, SinkApp::Injector).unwrap();
    let prometheus = metrics::new_sink(SinkDriver::Prometheus, SinkApp::Controller).unwrap();

    assert_ne!(noop.sink_name(), memory.sink_name());
    assert_ne!(memory.sink_name(), prometheus.sink_name());
    assert!(noop.metric_restart().is_ok());
    assert!(prometheus.flush().is_ok());
    assert!(prometheus.close().is_ok());
}

#[test]
fn test_memory_sink_lifecycle() {
    let sink = MemorySink::new();
    metrics::report(METRIC_RESTART, sink.metric_restart());
    assert_eq!(sink.count(METRIC_RESTART), 1);

    sink.flush().unwrap();
    sink.close().unwrap();
    assert!(sink.is_closed());
}

#[tokio::test]
async fn test_build_registry_from_config() {
    let mut config = ControllerConfig::development();
    config.metrics.driver = SinkDriver::Memory;
    let cluster = Arc::new(InMemoryCluster::new());
    seed_pods(&cluster, 1);

    let registry = chaos_controller::build_registry(
        &config,
        Arc::new(ClusterSelector::new(cluster)),
        Arc::new(InMemoryInjector::new()),
    )
    .unwrap();
    let key = key("wired");
    registry.submit(key.clone(), pod_spec(1, secs(600))).unwrap();

    let outcomes = registry.tick_all().await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].1.phase, LifecyclePhase::Holding);
    assert_eq!(
        outcomes[0].1.requeue_after,
        Some(config.engine.holding_recheck_interval)
    );
    assert_eq!(registry.engine().sink().sink_name(), "memory");
}
