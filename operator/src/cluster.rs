//! Cluster reads through the Kubernetes API

use async_trait::async_trait;
use chaos_controller::selector::{ClusterReader, NodeInfo, PodInfo};
use chaos_controller::{ChaosError, Result};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};
use std::collections::BTreeMap;
use tracing::debug;

/// [`ClusterReader`] backed by the API server.
#[derive(Clone)]
pub struct KubeClusterReader {
    client: Client,
}

impl KubeClusterReader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: Option<&str>) -> Api<Pod> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

/// `k=v,k2=v2` label selector.
pub fn label_selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn pod_info(pod: &Pod) -> PodInfo {
    let status = pod.status.as_ref();
    let ready = status
        .and_then(|s| s.conditions.as_ref())
        .map(|c| c.iter().any(|cond| cond.type_ == "Ready" && cond.status == "True"))
        .unwrap_or(false);

    PodInfo {
        namespace: pod.namespace().unwrap_or_default(),
        name: pod.name_any(),
        labels: pod.labels().clone(),
        phase: status
            .and_then(|s| s.phase.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
        ready,
        terminating: pod.metadata.deletion_timestamp.is_some(),
    }
}

pub fn node_info(node: &Node) -> NodeInfo {
    let ready = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .map(|c| c.iter().any(|cond| cond.type_ == "Ready" && cond.status == "True"))
        .unwrap_or(false);

    NodeInfo {
        name: node.name_any(),
        labels: node.labels().clone(),
        ready,
        unschedulable: node
            .spec
            .as_ref()
            .and_then(|s| s.unschedulable)
            .unwrap_or(false),
    }
}

fn unavailable(e: kube::Error) -> ChaosError {
    ChaosError::ClusterUnavailable(e.to_string())
}

#[async_trait]
impl ClusterReader for KubeClusterReader {
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<PodInfo>> {
        let lp = ListParams::default().labels(&label_selector(labels));
        let pods = self.pods(namespace).list(&lp).await.map_err(unavailable)?;
        debug!(namespace = ?namespace, count = pods.items.len(), "Listed pods");
        Ok(pods.items.iter().map(pod_info).collect())
    }

    async fn list_nodes(&self, labels: &BTreeMap<String, String>) -> Result<Vec<NodeInfo>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let lp = ListParams::default().labels(&label_selector(labels));
        let nodes = api.list(&lp).await.map_err(unavailable)?;
        debug!(count = nodes.items.len(), "Listed nodes");
        Ok(nodes.items.iter().map(node_info).collect())
    }

    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodInfo>> {
        let pod = self
            .pods(Some(namespace))
            .get_opt(name)
            .await
            .map_err(unavailable)?;
        Ok(pod.as_ref().map(pod_info))
    }

    async fn get_node(&self, name: &str) -> Result<Option<NodeInfo>> {
        let api: Api<Node> = Api::all(self.client.clone());
        let node = api.get_opt(name).await.map_err(unavailable)?;
        Ok(node.as_ref().map(node_info))
    }
}
