// Fixtures shared by the integration tests

use std::collections::BTreeMap;
use std::time::Duration;

use chaos_controller::selector::{InMemoryCluster, NodeInfo, PodInfo};
use chaos_controller::{DisruptionKey, DisruptionSpec, FaultKind, TargetKind, TargetRef};

pub const NAMESPACE: &str = "shop";

pub fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn web() -> BTreeMap<String, String> {
    labels(&[("app", "web")])
}

pub fn key(name: &str) -> DisruptionKey {
    DisruptionKey::new(NAMESPACE, name)
}

/// Pod disruption over `app=web` in the test namespace.
pub fn pod_spec(count: u32, duration: Duration) -> DisruptionSpec {
    let mut spec = DisruptionSpec::new(TargetKind::Pod, FaultKind::CpuPressure, web());
    spec.namespace = Some(NAMESPACE.to_string());
    spec.count = count;
    spec.duration = duration;
    spec
}

/// Node disruption over `pool=batch`.
pub fn node_spec(count: u32, duration: Duration) -> DisruptionSpec {
    let mut spec = DisruptionSpec::new(
        TargetKind::Node,
        FaultKind::NodeFailure,
        labels(&[("pool", "batch")]),
    );
    spec.count = count;
    spec.duration = duration;
    spec
}

/// Add `web-0..web-n` to the test namespace.
pub fn seed_pods(cluster: &InMemoryCluster, n: usize) -> Vec<TargetRef> {
    (0..n)
        .map(|i| {
            let pod = PodInfo::running(NAMESPACE, format!("web-{}", i), web());
            let reference = pod.reference();
            cluster.add_pod(pod);
            reference
        })
        .collect()
}

/// Add `batch-0..batch-n` nodes.
pub fn seed_nodes(cluster: &InMemoryCluster, n: usize) -> Vec<TargetRef> {
    (0..n)
        .map(|i| {
            let node = NodeInfo::ready(format!("batch-{}", i), labels(&[("pool", "batch")]));
            let reference = node.reference();
            cluster.add_node(node);
            reference
        })
        .collect()
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}
