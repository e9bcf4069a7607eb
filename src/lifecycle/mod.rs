//! Disruption lifecycle.
//!
//! A disruption moves through `Selecting`, `Injecting`, `Holding` and
//! `CleaningUp` to `Completed`, with `StuckOnRemoval` as a side branch of
//! cleanup and `Failed` reachable before any fault is held.
//!
//! # Example
//!
//! ```rust
//! use chaos_controller::clock::SystemClock;
//! use chaos_controller::config::EngineConfig;
//! use chaos_controller::injector::InMemoryInjector;
//! use chaos_controller::lifecycle::{DisruptionRegistry, LifecycleEngine};
//! use chaos_controller::metrics::NoopSink;
//! use chaos_controller::selector::{ClusterSelector, InMemoryCluster};
//! use std::sync::Arc;
//!
//! let cluster = Arc::new(InMemoryCluster::new());
//! let engine = LifecycleEngine::new(
//!     Arc::new(ClusterSelector::new(cluster)),
//!     Arc::new(InMemoryInjector::new()),
//!     Arc::new(NoopSink),
//!     Arc::new(SystemClock),
//!     EngineConfig::default(),
//! );
//! let registry = DisruptionRegistry::new(Arc::new(engine));
//! assert!(registry.is_empty());
//! ```

mod claims;
mod engine;
mod phase;
mod record;
mod registry;
mod status;

pub use claims::TargetClaims;
pub use engine::{DisruptionRun, LifecycleEngine, TickOutcome};
pub use phase::LifecyclePhase;
pub use record::{InjectionRecord, InjectionState};
pub use registry::{DisruptionRegistry, RegistryGauges};
pub use status::DisruptionStatus;
