//! Custom Resource Definition for disruptions

use chaos_controller::{DisruptionKey, DisruptionSpec, DisruptionStatus, LifecyclePhase};
use kube::{CustomResource, CustomResourceExt, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Finalizer holding deletion until every injected fault is removed.
pub const FINALIZER: &str = "chaos.io/disruption-cleanup";

/// Disruption describes a fault to inject into matching pods or nodes.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "chaos.io",
    version = "v1beta1",
    kind = "Disruption",
    plural = "disruptions",
    shortname = "dis",
    status = "DisruptionStatus",
    namespaced,
    printcolumn = r#"{"name":"Kind","type":"string","jsonPath":".spec.kind"}"#,
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Injected","type":"integer","jsonPath":".status.injectedTargets"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct DisruptionResourceSpec {
    #[serde(flatten)]
    pub disruption: DisruptionSpec,
}

impl Disruption {
    pub fn key(&self) -> DisruptionKey {
        DisruptionKey::new(
            self.namespace().unwrap_or_else(|| "default".to_string()),
            self.name_any(),
        )
    }

    /// The spec with the resource namespace filled in for pod disruptions.
    pub fn effective_spec(&self) -> DisruptionSpec {
        let namespace = self.namespace().unwrap_or_else(|| "default".to_string());
        self.spec.disruption.clone().with_default_namespace(&namespace)
    }

    pub fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.finalizers().iter().any(|f| f == FINALIZER)
    }

    pub fn phase(&self) -> Option<LifecyclePhase> {
        self.status.as_ref().map(|s| s.phase)
    }
}

/// The CRD manifest as YAML.
pub fn crd_yaml() -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&Disruption::crd())
}
