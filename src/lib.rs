//! Chaos controller - target selection and disruption lifecycle for cluster
//! fault injection.
//!
//! A disruption names a set of pods or nodes by label, a fault kind, how many
//! targets to hit and for how long. The controller resolves the targets,
//! applies the fault through an injector, holds it for the requested
//! duration and removes it again, retrying removals until they succeed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    DisruptionRegistry                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  LifecycleEngine: Selecting → Injecting → Holding → Cleanup │
//! ├──────────────────┬──────────────────┬───────────────────────┤
//! │  TargetSelector  │     Injector     │      MetricsSink      │
//! │  (pods | nodes)  │  (inject/remove) │ (noop|memory|prom)    │
//! ├──────────────────┴──────────────────┴───────────────────────┤
//! │          ClusterReader: in-memory | Kubernetes API          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use chaos_controller::config::ControllerConfig;
//! use chaos_controller::injector::InMemoryInjector;
//! use chaos_controller::selector::{ClusterSelector, InMemoryCluster};
//! use std::sync::Arc;
//!
//! # async fn example() -> chaos_controller::Result<()> {
//! let config = ControllerConfig::development();
//! let cluster = Arc::new(InMemoryCluster::new());
//! let registry = chaos_controller::build_registry(
//!     &config,
//!     Arc::new(ClusterSelector::new(cluster)),
//!     Arc::new(InMemoryInjector::new()),
//! )?;
//! registry.tick_all().await;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod disruption;
pub mod error;
pub mod injector;
pub mod lifecycle;
pub mod metrics;
pub mod observability;
pub mod selector;
pub mod types;

// Re-exports
pub use disruption::{DisruptionDocument, DisruptionSpec};
pub use error::{ChaosError, Result};
pub use lifecycle::{DisruptionRegistry, DisruptionStatus, LifecycleEngine, LifecyclePhase};
pub use types::*;

use clock::SystemClock;
use config::ControllerConfig;
use injector::Injector;
use selector::TargetSelector;
use std::sync::Arc;
use tracing::info;

/// Build a registry wired to the configured metrics sink and the system
/// clock.
pub fn build_registry(
    config: &ControllerConfig,
    selector: Arc<dyn TargetSelector>,
    injector: Arc<dyn Injector>,
) -> Result<DisruptionRegistry> {
    config.validate()?;
    let sink = metrics::new_sink(config.metrics.driver, config.metrics.app)?;
    info!(sink = sink.sink_name(), "Metrics sink initialized");

    let engine = LifecycleEngine::new(
        selector,
        injector,
        sink,
        Arc::new(SystemClock),
        config.engine.clone(),
    );
    Ok(DisruptionRegistry::new(Arc::new(engine)))
}
