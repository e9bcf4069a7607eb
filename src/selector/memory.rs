use super::{ClusterReader, NodeInfo, PodInfo};
use crate::error::{ChaosError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Cluster state held in memory.
///
/// Label matching follows the API server: an object matches when it carries
/// every requested label with the same value.
#[derive(Debug, Default)]
pub struct InMemoryCluster {
    pods: RwLock<BTreeMap<(String, String), PodInfo>>,
    nodes: RwLock<BTreeMap<String, NodeInfo>>,
    unreachable: AtomicBool,
    reads: AtomicU64,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pod(&self, pod: PodInfo) {
        self.pods
            .write()
            .insert((pod.namespace.clone(), pod.name.clone()), pod);
    }

    pub fn remove_pod(&self, namespace: &str, name: &str) -> Option<PodInfo> {
        self.pods
            .write()
            .remove(&(namespace.to_string(), name.to_string()))
    }

    /// Mutate a pod in place. Returns false when the pod does not exist.
    pub fn update_pod(&self, namespace: &str, name: &str, f: impl FnOnce(&mut PodInfo)) -> bool {
        match self
            .pods
            .write()
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            Some(pod) => {
                f(pod);
                true
            }
            None => false,
        }
    }

    pub fn add_node(&self, node: NodeInfo) {
        self.nodes.write().insert(node.name.clone(), node);
    }

    pub fn remove_node(&self, name: &str) -> Option<NodeInfo> {
        self.nodes.write().remove(name)
    }

    /// Mutate a node in place. Returns false when the node does not exist.
    pub fn update_node(&self, name: &str, f: impl FnOnce(&mut NodeInfo)) -> bool {
        match self.nodes.write().get_mut(name) {
            Some(node) => {
                f(node);
                true
            }
            None => false,
        }
    }

    /// Make every read fail with [`ChaosError::ClusterUnavailable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of reads served so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ChaosError::ClusterUnavailable(
                "in-memory cluster marked unreachable".to_string(),
            ));
        }
        Ok(())
    }
}

fn labels_match(have: &BTreeMap<String, String>, want: &BTreeMap<String, String>) -> bool {
    want.iter().all(|(k, v)| have.get(k) == Some(v))
}

#[async_trait]
impl ClusterReader for InMemoryCluster {
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<PodInfo>> {
        self.check_reachable()?;
        Ok(self
            .pods
            .read()
            .values()
            .filter(|p| namespace.map_or(true, |ns| p.namespace == ns))
            .filter(|p| labels_match(&p.labels, labels))
            .cloned()
            .collect())
    }

    async fn list_nodes(&self, labels: &BTreeMap<String, String>) -> Result<Vec<NodeInfo>> {
        self.check_reachable()?;
        Ok(self
            .nodes
            .read()
            .values()
            .filter(|n| labels_match(&n.labels, labels))
            .cloned()
            .collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodInfo>> {
        self.check_reachable()?;
        Ok(self
            .pods
            .read()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_node(&self, name: &str) -> Result<Option<NodeInfo>> {
        self.check_reachable()?;
        Ok(self.nodes.read().get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_label_subset_matching() {
        let cluster = InMemoryCluster::new();
        let labels: BTreeMap<String, String> = [
            ("app".to_string(), "web".to_string()),
            ("tier".to_string(), "front".to_string()),
        ]
        .into_iter()
        .collect();
        cluster.add_pod(PodInfo::running("default", "web-0", labels));

        let want: BTreeMap<String, String> =
            [("app".to_string(), "web".to_string())].into_iter().collect();
        assert_eq!(cluster.list_pods(None, &want).await.unwrap().len(), 1);

        let wrong: BTreeMap<String, String> =
            [("app".to_string(), "db".to_string())].into_iter().collect();
        assert!(cluster.list_pods(None, &wrong).await.unwrap().is_empty());
        assert!(cluster
            .list_pods(Some("kube-system"), &want)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_and_remove() {
        let cluster = InMemoryCluster::new();
        cluster.add_node(NodeInfo::ready("worker-1", BTreeMap::new()));

        assert!(cluster.update_node("worker-1", |n| n.ready = false));
        assert!(!cluster.get_node("worker-1").await.unwrap().unwrap().ready);
        assert!(!cluster.update_node("worker-9", |n| n.ready = false));

        cluster.remove_node("worker-1");
        assert!(cluster.get_node("worker-1").await.unwrap().is_none());
        assert_eq!(cluster.reads(), 2);
    }
}
