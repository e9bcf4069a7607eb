//! Core types shared by the selector, the injector and the lifecycle engine.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of cluster object a disruption targets.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Pod,
    Node,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Pod => "pod",
            TargetKind::Node => "node",
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a pod or a node.
///
/// Nodes are cluster-scoped and always carry an empty namespace. The derived
/// ordering sorts by namespace then name, which is the stable order the
/// selector returns and the engine processes records in.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    pub kind: TargetKind,
}

impl TargetRef {
    pub fn pod(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind: TargetKind::Pod,
        }
    }

    pub fn node(name: impl Into<String>) -> Self {
        Self {
            namespace: String::new(),
            name: name.into(),
            kind: TargetKind::Node,
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::Pod => write!(f, "{}/{}", self.namespace, self.name),
            TargetKind::Node => write!(f, "node/{}", self.name),
        }
    }
}

/// A selection candidate with its health resolved at selection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub reference: TargetRef,
    pub healthy: bool,
}

impl Target {
    pub fn new(reference: TargetRef, healthy: bool) -> Self {
        Self { reference, healthy }
    }
}

/// Fault families the injector knows how to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    NetworkDisruption,
    CpuPressure,
    DiskPressure,
    NodeFailure,
    ContainerFailure,
    DnsDisruption,
    GrpcDisruption,
}

impl FaultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::NetworkDisruption => "network-disruption",
            FaultKind::CpuPressure => "cpu-pressure",
            FaultKind::DiskPressure => "disk-pressure",
            FaultKind::NodeFailure => "node-failure",
            FaultKind::ContainerFailure => "container-failure",
            FaultKind::DnsDisruption => "dns-disruption",
            FaultKind::GrpcDisruption => "grpc-disruption",
        }
    }

    /// Whether the fault can be applied to the given target kind.
    ///
    /// Container and gRPC faults act on processes inside a pod and have no
    /// meaning for a bare node.
    pub fn supports(&self, kind: TargetKind) -> bool {
        match self {
            FaultKind::ContainerFailure | FaultKind::GrpcDisruption => kind == TargetKind::Pod,
            _ => true,
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one disruption resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DisruptionKey {
    pub namespace: String,
    pub name: String,
}

impl DisruptionKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for DisruptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
