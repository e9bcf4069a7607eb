//! Kubernetes controller for Disruption resources

use std::sync::Arc;
use std::time::Duration;

use chaos_controller::{DisruptionRegistry, DisruptionStatus, LifecyclePhase};
use futures::StreamExt;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::runtime::controller::{Action, Controller as KubeController};
use kube::runtime::watcher::Config;
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::crd::{Disruption, FINALIZER};
use crate::error::Error;

const FIELD_MANAGER: &str = "chaos-operator";

/// Shared state handed to every reconcile call
pub struct Context {
    pub client: Client,
    pub registry: Arc<DisruptionRegistry>,
}

/// Controller for Disruption resources
pub struct Controller {
    client: Client,
    namespace: String,
    registry: Arc<DisruptionRegistry>,
}

impl Controller {
    pub fn new(client: Client, namespace: String, registry: Arc<DisruptionRegistry>) -> Self {
        Self {
            client,
            namespace,
            registry,
        }
    }

    /// Run the controller until a shutdown signal arrives
    pub async fn run(&self) -> Result<(), Error> {
        info!("Starting disruption controller");

        let disruptions: Api<Disruption> = if self.namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), &self.namespace)
        };

        let lp = ListParams::default().limit(1);
        if let Err(e) = disruptions.list(&lp).await {
            error!("Failed to list Disruptions. Is the CRD installed? Error: {}", e);
            return Err(Error::CrdNotInstalled);
        }

        let ctx = Arc::new(Context {
            client: self.client.clone(),
            registry: Arc::clone(&self.registry),
        });

        KubeController::new(disruptions, Config::default())
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(|result| async move {
                match result {
                    Ok((obj, action)) => {
                        debug!(name = %obj.name, ?action, "Reconciliation successful");
                    }
                    Err(e) => {
                        error!(error = %e, "Reconciliation error");
                    }
                }
            })
            .await;

        info!("Controller stopped");
        Ok(())
    }
}

/// Reconcile one Disruption
async fn reconcile(obj: Arc<Disruption>, ctx: Arc<Context>) -> Result<Action, Error> {
    let key = obj.key();
    let api: Api<Disruption> = Api::namespaced(ctx.client.clone(), &key.namespace);
    let registry = &ctx.registry;

    if obj.is_deleting() {
        return finalize(&obj, &api, registry).await;
    }

    if !obj.has_finalizer() {
        info!(disruption = %key, "Adding finalizer");
        let mut finalizers = obj.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        api.patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
    }

    if let Err(e) = registry.ensure(key.clone(), obj.effective_spec(), obj.status.clone()) {
        warn!(disruption = %key, error = %e, "Rejecting invalid disruption");
        if obj.phase() != Some(LifecyclePhase::Failed) {
            let mut status = DisruptionStatus::new(chrono::Utc::now());
            status.phase = LifecyclePhase::Failed;
            status.message = Some(e.to_string());
            update_status(&api, &key.name, &status).await?;
        }
        return Ok(Action::await_change());
    }

    let outcome = registry.tick(&key).await?;
    if let Some(status) = registry.status(&key).await {
        if obj.status.as_ref() != Some(&status) {
            update_status(&api, &key.name, &status).await?;
        }
    }

    Ok(match outcome.requeue_after {
        Some(after) => Action::requeue(after),
        None => Action::await_change(),
    })
}

/// Clean up a deleted Disruption, then release it.
async fn finalize(
    obj: &Disruption,
    api: &Api<Disruption>,
    registry: &DisruptionRegistry,
) -> Result<Action, Error> {
    let key = obj.key();
    if !obj.has_finalizer() {
        registry.forget(&key).await;
        return Ok(Action::await_change());
    }

    let live = obj.status.as_ref().map_or(false, |s| !s.is_terminal());
    if live || registry.contains(&key) {
        match registry.ensure(key.clone(), obj.effective_spec(), obj.status.clone()) {
            Ok(()) => {
                registry.request_delete(&key).await?;
                let outcome = registry.tick(&key).await?;
                if let Some(status) = registry.status(&key).await {
                    update_status(api, &key.name, &status).await?;
                }
                if !outcome.is_terminal() {
                    return Ok(Action::requeue(
                        outcome.requeue_after.unwrap_or(Duration::from_secs(5)),
                    ));
                }
            }
            Err(e) => {
                debug!(disruption = %key, error = %e, "Invalid disruption never ran, nothing to clean up");
            }
        }
    }

    registry.forget(&key).await;
    info!(disruption = %key, "Cleanup done, removing finalizer");
    let finalizers: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != FINALIZER)
        .cloned()
        .collect();
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(Action::await_change())
}

/// Error policy for reconciliation failures
fn error_policy(obj: Arc<Disruption>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(
        name = %obj.name_any(),
        kind = error.kind(),
        error = %error,
        "Reconciliation error, will retry"
    );
    Action::requeue(Duration::from_secs(30))
}

/// Write the status subresource
async fn update_status(
    api: &Api<Disruption>,
    name: &str,
    status: &DisruptionStatus,
) -> Result<(), Error> {
    let patch = json!({ "status": status });
    let pp = PatchParams::apply(FIELD_MANAGER);
    api.patch_status(name, &pp, &Patch::Merge(&patch)).await?;

    debug!(name = %name, phase = %status.phase, "Status updated");
    Ok(())
}
