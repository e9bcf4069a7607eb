//! Fault hand-off to node agents.
//!
//! The operator does not apply faults itself. It marks each target with an
//! annotation naming the fault and the agent on the node acts on it. Removing
//! the annotation removes the fault.

use async_trait::async_trait;
use chaos_controller::injector::Injector;
use chaos_controller::{ChaosError, FaultKind, Result, TargetKind, TargetRef};
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Annotation carrying the active fault kind.
pub const FAULT_ANNOTATION: &str = "chaos.io/fault";

/// Merge patch setting the fault annotation, or clearing it with `None`.
pub fn annotation_patch(kind: Option<FaultKind>) -> Value {
    let value = match kind {
        Some(kind) => Value::String(kind.as_str().to_string()),
        None => Value::Null,
    };
    json!({ "metadata": { "annotations": { FAULT_ANNOTATION: value } } })
}

/// [`Injector`] that annotates pods and nodes.
#[derive(Clone)]
pub struct AnnotationInjector {
    client: Client,
}

impl AnnotationInjector {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn patch(&self, target: &TargetRef, patch: &Value) -> std::result::Result<(), kube::Error> {
        let pp = PatchParams::default();
        match target.kind {
            TargetKind::Pod => {
                let api: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
                api.patch(&target.name, &pp, &Patch::Merge(patch)).await?;
            }
            TargetKind::Node => {
                let api: Api<Node> = Api::all(self.client.clone());
                api.patch(&target.name, &pp, &Patch::Merge(patch)).await?;
            }
        }
        Ok(())
    }
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(ae) if ae.code == 404)
}

#[async_trait]
impl Injector for AnnotationInjector {
    async fn inject(&self, target: &TargetRef, kind: FaultKind) -> Result<()> {
        match self.patch(target, &annotation_patch(Some(kind))).await {
            Ok(()) => {
                info!(target = %target, kind = %kind, "Fault annotation set");
                Ok(())
            }
            Err(e) if is_not_found(&e) => Err(ChaosError::TargetNotFound(target.to_string())),
            Err(e) => Err(ChaosError::Injection {
                target: target.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn remove(&self, target: &TargetRef, kind: FaultKind) -> Result<()> {
        match self.patch(target, &annotation_patch(None)).await {
            Ok(()) => {
                info!(target = %target, kind = %kind, "Fault annotation cleared");
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                debug!(target = %target, "Target gone, nothing to remove");
                Ok(())
            }
            Err(e) => Err(ChaosError::Cleanup {
                target: target.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
