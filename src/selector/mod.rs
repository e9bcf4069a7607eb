//! Target selection.
//!
//! [`TargetSelector`] is the read-only capability the lifecycle engine uses to
//! turn a [`DisruptionSpec`] into concrete targets and to re-check a target's
//! health on later ticks. [`ClusterSelector`] implements it on top of any
//! [`ClusterReader`], delegating to a [`PodSelector`] or a [`NodeSelector`]
//! depending on the target kind.
//!
//! Health failures come in two flavours the engine treats differently:
//!
//! - [`ChaosError::TargetNotFound`]: the object is gone, drop it silently
//! - [`ChaosError::TargetUnhealthy`]: the object exists but is not eligible,
//!   retry on later ticks up to a bound

mod memory;
mod node;
mod pod;

pub use memory::InMemoryCluster;
pub use node::NodeSelector;
pub use pod::PodSelector;

use crate::disruption::DisruptionSpec;
use crate::error::{ChaosError, Result};
use crate::types::{Target, TargetKind, TargetRef};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Pod fields relevant to selection and health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodInfo {
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Pod phase as reported by the API (`Pending`, `Running`, ...)
    pub phase: String,
    pub ready: bool,
    /// Set once a deletion timestamp is present
    pub terminating: bool,
}

impl PodInfo {
    /// A running, ready pod.
    pub fn running(
        namespace: impl Into<String>,
        name: impl Into<String>,
        labels: BTreeMap<String, String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            labels,
            phase: "Running".to_string(),
            ready: true,
            terminating: false,
        }
    }

    pub fn reference(&self) -> TargetRef {
        TargetRef::pod(&self.namespace, &self.name)
    }

    /// Reason the pod cannot carry a fault, if any.
    pub fn ineligibility(&self) -> Option<String> {
        if self.terminating {
            Some("pod is terminating".to_string())
        } else if self.phase != "Running" {
            Some(format!("pod phase is {}", self.phase))
        } else if !self.ready {
            Some("pod is not ready".to_string())
        } else {
            None
        }
    }
}

/// Node fields relevant to selection and health.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub ready: bool,
    /// Cordoned nodes are unschedulable
    pub unschedulable: bool,
}

impl NodeInfo {
    /// A ready, schedulable node.
    pub fn ready(name: impl Into<String>, labels: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            labels,
            ready: true,
            unschedulable: false,
        }
    }

    pub fn reference(&self) -> TargetRef {
        TargetRef::node(&self.name)
    }

    /// Reason the node cannot carry a fault, if any.
    pub fn ineligibility(&self) -> Option<String> {
        if !self.ready {
            Some("node is not ready".to_string())
        } else if self.unschedulable {
            Some("node is cordoned".to_string())
        } else {
            None
        }
    }
}

/// Read access to cluster state.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    /// List pods carrying every label in `labels`, in one namespace or all.
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<PodInfo>>;

    /// List nodes carrying every label in `labels`.
    async fn list_nodes(&self, labels: &BTreeMap<String, String>) -> Result<Vec<NodeInfo>>;

    /// Fetch one pod, `None` when it does not exist.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodInfo>>;

    /// Fetch one node, `None` when it does not exist.
    async fn get_node(&self, name: &str) -> Result<Option<NodeInfo>>;
}

/// Resolves disruption specs to targets and checks target health.
#[async_trait]
pub trait TargetSelector: Send + Sync {
    /// Pods matching the spec, sorted by namespace then name.
    async fn get_matching_pods(&self, spec: &DisruptionSpec) -> Result<Vec<Target>>;

    /// Nodes matching the spec, sorted by name.
    async fn get_matching_nodes(&self, spec: &DisruptionSpec) -> Result<Vec<Target>>;

    /// `Ok` when the target can carry a fault.
    async fn target_is_healthy(&self, target: &TargetRef, spec: &DisruptionSpec) -> Result<()>;

    /// Targets of the kind the spec asks for.
    async fn get_matching(&self, spec: &DisruptionSpec) -> Result<Vec<Target>> {
        match spec.level {
            TargetKind::Pod => self.get_matching_pods(spec).await,
            TargetKind::Node => self.get_matching_nodes(spec).await,
        }
    }
}

/// Selector over a cluster reader, dispatching on target kind.
pub struct ClusterSelector<C> {
    pods: PodSelector<C>,
    nodes: NodeSelector<C>,
}

impl<C: ClusterReader> ClusterSelector<C> {
    pub fn new(reader: Arc<C>) -> Self {
        Self {
            pods: PodSelector::new(Arc::clone(&reader)),
            nodes: NodeSelector::new(reader),
        }
    }
}

#[async_trait]
impl<C: ClusterReader> TargetSelector for ClusterSelector<C> {
    async fn get_matching_pods(&self, spec: &DisruptionSpec) -> Result<Vec<Target>> {
        self.pods.matching(spec).await
    }

    async fn get_matching_nodes(&self, spec: &DisruptionSpec) -> Result<Vec<Target>> {
        self.nodes.matching(spec).await
    }

    async fn target_is_healthy(&self, target: &TargetRef, _spec: &DisruptionSpec) -> Result<()> {
        match target.kind {
            TargetKind::Pod => self.pods.is_healthy(target).await,
            TargetKind::Node => self.nodes.is_healthy(target).await,
        }
    }
}

/// Map an eligibility verdict to the health error contract.
pub(crate) fn verdict(target: &TargetRef, reason: Option<String>) -> Result<()> {
    match reason {
        None => Ok(()),
        Some(reason) => Err(ChaosError::TargetUnhealthy {
            target: target.to_string(),
            reason,
        }),
    }
}
