use super::{verdict, ClusterReader};
use crate::disruption::DisruptionSpec;
use crate::error::{ChaosError, Result};
use crate::types::{Target, TargetRef};
use std::sync::Arc;
use tracing::debug;

/// Selects pods by namespace and labels.
pub struct PodSelector<C> {
    reader: Arc<C>,
}

impl<C: ClusterReader> PodSelector<C> {
    pub fn new(reader: Arc<C>) -> Self {
        Self { reader }
    }

    /// Pods matching the spec with their health resolved, in stable order.
    pub async fn matching(&self, spec: &DisruptionSpec) -> Result<Vec<Target>> {
        let pods = self
            .reader
            .list_pods(spec.namespace.as_deref(), &spec.selector)
            .await?;

        let mut targets: Vec<Target> = pods
            .iter()
            .map(|pod| Target::new(pod.reference(), pod.ineligibility().is_none()))
            .collect();
        targets.sort_by(|a, b| a.reference.cmp(&b.reference));
        targets.dedup_by(|a, b| a.reference == b.reference);

        debug!(
            selector = %spec.label_selector(),
            namespace = ?spec.namespace,
            matched = targets.len(),
            "Listed matching pods"
        );
        Ok(targets)
    }

    pub async fn is_healthy(&self, target: &TargetRef) -> Result<()> {
        match self.reader.get_pod(&target.namespace, &target.name).await? {
            Some(pod) => verdict(target, pod.ineligibility()),
            None => Err(ChaosError::TargetNotFound(target.to_string())),
        }
    }
}
