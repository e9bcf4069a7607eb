//! Disruption specification and the document it is loaded from.

use crate::error::{self, ChaosError};
use crate::types::{DisruptionKey, FaultKind, TargetKind};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Declarative description of one disruption.
///
/// Immutable once handed to the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionSpec {
    /// Label equality criteria a target must carry
    #[serde(default)]
    pub selector: BTreeMap<String, String>,

    /// Namespace to search for pods (all namespaces when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Whether pods or nodes are targeted
    #[serde(default = "default_level")]
    pub level: TargetKind,

    /// Fault to inject
    pub kind: FaultKind,

    /// Number of targets to disrupt
    #[serde(default = "default_count")]
    pub count: u32,

    /// How long the fault is held before cleanup
    #[serde(with = "humantime_serde", default = "default_duration")]
    #[schemars(with = "String")]
    pub duration: Duration,

    /// Let an empty selection proceed instead of failing the disruption
    #[serde(default)]
    pub allow_empty_selection: bool,
}

fn default_level() -> TargetKind {
    TargetKind::Pod
}

fn default_count() -> u32 {
    1
}

fn default_duration() -> Duration {
    Duration::from_secs(60 * 60)
}

impl DisruptionSpec {
    /// A spec with default settings for the given selector and fault.
    pub fn new(level: TargetKind, kind: FaultKind, selector: BTreeMap<String, String>) -> Self {
        Self {
            selector,
            namespace: None,
            level,
            kind,
            count: default_count(),
            duration: default_duration(),
            allow_empty_selection: false,
        }
    }

    /// Check the semantic constraints a structurally valid document must meet.
    pub fn validate(&self) -> error::Result<()> {
        if self.count == 0 {
            return Err(ChaosError::invalid_spec("count", "must be at least 1"));
        }

        if self.selector.is_empty() {
            return Err(ChaosError::invalid_spec(
                "selector",
                "at least one label is required",
            ));
        }

        for (key, value) in &self.selector {
            if key.trim().is_empty() {
                return Err(ChaosError::invalid_spec("selector", "label keys cannot be empty"));
            }
            if key.contains([',', '=', ' ']) || value.contains([',', '=', ' ']) {
                return Err(ChaosError::invalid_spec(
                    "selector",
                    format!("invalid label {}={}", key, value),
                ));
            }
        }

        if !self.kind.supports(self.level) {
            return Err(ChaosError::invalid_spec(
                "kind",
                format!("{} cannot target {}s", self.kind, self.level),
            ));
        }

        if self.level == TargetKind::Node && self.namespace.is_some() {
            return Err(ChaosError::invalid_spec(
                "namespace",
                "node level disruptions are cluster scoped",
            ));
        }

        Ok(())
    }

    /// Render the selector in Kubernetes label-selector syntax.
    pub fn label_selector(&self) -> String {
        self.selector
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Fill the pod namespace from the owning resource when it was left unset.
    pub fn with_default_namespace(mut self, namespace: &str) -> Self {
        if self.level == TargetKind::Pod && self.namespace.is_none() {
            self.namespace = Some(namespace.to_string());
        }
        self
    }

    /// Metric tags describing this spec.
    pub fn tags(&self) -> Vec<String> {
        vec![
            format!("disruption_kind:{}", self.kind),
            format!("level:{}", self.level),
        ]
    }
}

/// Metadata block of a disruption document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// A disruption as written by a user, in the shape of the custom resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionDocument {
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    pub metadata: DocumentMeta,
    pub spec: DisruptionSpec,
}

impl DisruptionDocument {
    /// Parse a YAML (or JSON, which is a YAML subset) document.
    pub fn from_yaml(content: &str) -> error::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load a document from a file.
    pub fn from_file(path: &Path) -> error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Key of the resource this document describes.
    pub fn key(&self) -> DisruptionKey {
        DisruptionKey::new(
            self.metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            self.metadata.name.clone(),
        )
    }

    /// Validate the metadata and the spec.
    pub fn validate(&self) -> error::Result<()> {
        if self.metadata.name.trim().is_empty() {
            return Err(ChaosError::invalid_spec("metadata.name", "cannot be empty"));
        }
        if let Some(kind) = &self.kind {
            if kind != "Disruption" {
                return Err(ChaosError::invalid_spec(
                    "kind",
                    format!("expected Disruption, got {}", kind),
                ));
            }
        }
        self.spec.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
apiVersion: chaos.io/v1beta1
kind: Disruption
metadata:
  name: network-drop
  namespace: checkout
spec:
  selector:
    app: cart
  level: pod
  kind: network-disruption
  count: 2
  duration: 10m
"#;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_document() {
        let doc = DisruptionDocument::from_yaml(DOC).unwrap();
        assert_eq!(doc.key(), DisruptionKey::new("checkout", "network-drop"));
        assert_eq!(doc.spec.count, 2);
        assert_eq!(doc.spec.duration, Duration::from_secs(600));
        assert_eq!(doc.spec.kind, FaultKind::NetworkDisruption);
        assert!(!doc.spec.allow_empty_selection);
        doc.validate().unwrap();
    }

    #[test]
    fn test_zero_count_rejected() {
        let mut spec = DisruptionSpec::new(
            TargetKind::Pod,
            FaultKind::CpuPressure,
            labels(&[("app", "web")]),
        );
        spec.count = 0;
        assert!(matches!(
            spec.validate(),
            Err(ChaosError::InvalidSpec { ref field, .. }) if field == "count"
        ));
    }

    #[test]
    fn test_empty_selector_rejected() {
        let spec = DisruptionSpec::new(TargetKind::Node, FaultKind::NodeFailure, BTreeMap::new());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_container_failure_on_node_rejected() {
        let spec = DisruptionSpec::new(
            TargetKind::Node,
            FaultKind::ContainerFailure,
            labels(&[("pool", "batch")]),
        );
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_node_level_with_namespace_rejected() {
        let mut spec = DisruptionSpec::new(
            TargetKind::Node,
            FaultKind::NodeFailure,
            labels(&[("pool", "batch")]),
        );
        spec.namespace = Some("default".into());
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_label_selector_rendering() {
        let spec = DisruptionSpec::new(
            TargetKind::Pod,
            FaultKind::DnsDisruption,
            labels(&[("tier", "db"), ("app", "orders")]),
        );
        assert_eq!(spec.label_selector(), "app=orders,tier=db");
    }

    #[test]
    fn test_default_namespace_only_for_pods() {
        let pods = DisruptionSpec::new(
            TargetKind::Pod,
            FaultKind::CpuPressure,
            labels(&[("app", "web")]),
        )
        .with_default_namespace("shop");
        assert_eq!(pods.namespace.as_deref(), Some("shop"));

        let nodes = DisruptionSpec::new(
            TargetKind::Node,
            FaultKind::CpuPressure,
            labels(&[("pool", "web")]),
        )
        .with_default_namespace("shop");
        assert!(nodes.namespace.is_none());
    }

    #[test]
    fn test_schema_carries_defaults() {
        let schema = serde_json::to_value(schemars::schema_for!(DisruptionSpec)).unwrap();

        assert_eq!(schema["properties"]["count"]["default"], 1);
        assert_eq!(schema["properties"]["level"]["default"], "pod");
        assert_eq!(schema["properties"]["duration"]["type"], "string");
        assert!(schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .any(|field| field == "kind"));
    }
}
