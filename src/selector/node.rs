use super::{verdict, ClusterReader};
use crate::disruption::DisruptionSpec;
use crate::error::{ChaosError, Result};
use crate::types::{Target, TargetRef};
use std::sync::Arc;
use tracing::debug;

/// Selects nodes by labels.
pub struct NodeSelector<C> {
    reader: Arc<C>,
}

impl<C: ClusterReader> NodeSelector<C> {
    pub fn new(reader: Arc<C>) -> Self {
        Self { reader }
    }

    /// Nodes matching the spec with their health resolved, sorted by name.
    pub async fn matching(&self, spec: &DisruptionSpec) -> Result<Vec<Target>> {
        let nodes = self.reader.list_nodes(&spec.selector).await?;

        let mut targets: Vec<Target> = nodes
            .iter()
            .map(|node| Target::new(node.reference(), node.ineligibility().is_none()))
            .collect();
        targets.sort_by(|a, b| a.reference.cmp(&b.reference));
        targets.dedup_by(|a, b| a.reference == b.reference);

        debug!(selector = %spec.label_selector(), matched = targets.len(), "Listed matching nodes");
        Ok(targets)
    }

    pub async fn is_healthy(&self, target: &TargetRef) -> Result<()> {
        match self.reader.get_node(&target.name).await? {
            Some(node) => verdict(target, node.ineligibility()),
            None => Err(ChaosError::TargetNotFound(target.to_string())),
        }
    }
}
