//! Metrics sink interface and drivers.
//!
//! The lifecycle engine reports through a [`MetricsSink`] it is handed at
//! construction time. Sinks are fire-and-forget from the engine's point of
//! view: every call returns a `Result`, and the engine logs and drops errors
//! through [`report`] instead of propagating them.
//!
//! # Drivers
//!
//! | Driver       | Sink              | Use                               |
//! |--------------|-------------------|-----------------------------------|
//! | `noop`       | [`NoopSink`]      | Metrics disabled                  |
//! | `memory`     | [`MemorySink`]    | Tests, dry runs                   |
//! | `prometheus` | [`PrometheusSink`]| Scraped by the operator endpoint  |

mod memory;
mod noop;
mod prometheus;

pub use memory::{MemorySink, MetricSample, SampleKind};
pub use noop::NoopSink;
pub use prometheus::PrometheusSink;

use crate::error::Result;
use crate::types::FaultKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const METRIC_INJECTED: &str = "chaos.injector.injected";
pub const METRIC_CLEANED: &str = "chaos.injector.cleaned";
pub const METRIC_RECONCILE: &str = "chaos.controller.reconcile";
pub const METRIC_RECONCILE_DURATION: &str = "chaos.controller.reconcile.duration";
pub const METRIC_CLEANUP_DURATION: &str = "chaos.controller.cleanup.duration";
pub const METRIC_INJECT_DURATION: &str = "chaos.controller.inject.duration";
pub const METRIC_COMPLETED_DURATION: &str = "chaos.controller.disruption.completed_duration";
pub const METRIC_ONGOING_DURATION: &str = "chaos.controller.disruption.ongoing_duration";
pub const METRIC_STUCK_ON_REMOVAL: &str = "chaos.controller.disruptions.stuck_on_removal";
pub const METRIC_STUCK_ON_REMOVAL_TOTAL: &str =
    "chaos.controller.disruptions.stuck_on_removal_total";
pub const METRIC_DISRUPTIONS_GAUGE: &str = "chaos.controller.disruptions.gauge";
pub const METRIC_DISRUPTIONS_COUNT: &str = "chaos.controller.disruptions.count";
pub const METRIC_TARGETS_GAUGE: &str = "chaos.controller.targets.gauge";
pub const METRIC_RESTART: &str = "chaos.controller.restart";
pub const METRIC_FAILED_VALIDATION: &str = "chaos.controller.validation.failed";
pub const METRIC_EVENT: &str = "chaos.controller.event";

/// Process reporting the metrics, attached to every sample as `app:<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkApp {
    Controller,
    Injector,
}

impl SinkApp {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkApp::Controller => "chaos-controller",
            SinkApp::Injector => "chaos-injector",
        }
    }
}

/// Available sink implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkDriver {
    Noop,
    Memory,
    Prometheus,
}

impl fmt::Display for SinkDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SinkDriver::Noop => "noop",
            SinkDriver::Memory => "memory",
            SinkDriver::Prometheus => "prometheus",
        };
        f.write_str(name)
    }
}

/// Recording interface for disruption lifecycle metrics.
pub trait MetricsSink: Send + Sync {
    /// Name of the driver backing this sink
    fn sink_name(&self) -> &'static str;

    /// Push buffered samples out
    fn flush(&self) -> Result<()>;

    /// Release resources held by the sink
    fn close(&self) -> Result<()>;

    /// Record a free-form event
    fn event_with_tags(&self, title: &str, text: &str, tags: &[String]) -> Result<()>;

    /// Count one injection attempt outcome
    fn metric_injected(&self, succeed: bool, kind: FaultKind, tags: &[String]) -> Result<()>;

    /// Count one cleanup attempt outcome
    fn metric_cleaned(&self, succeed: bool, kind: FaultKind, tags: &[String]) -> Result<()>;

    /// Count one reconcile tick
    fn metric_reconcile(&self) -> Result<()>;

    fn metric_reconcile_duration(&self, duration: Duration, tags: &[String]) -> Result<()>;

    /// Time from cleanup phase entry to the last successful removal
    fn metric_cleanup_duration(&self, duration: Duration, tags: &[String]) -> Result<()>;

    /// Time from injection phase entry to the last successful injection
    fn metric_inject_duration(&self, duration: Duration, tags: &[String]) -> Result<()>;

    /// Whole disruption lifetime, sent once when it turns terminal
    fn metric_disruption_completed_duration(&self, duration: Duration, tags: &[String])
        -> Result<()>;

    /// Disruption lifetime so far
    fn metric_disruption_ongoing_duration(&self, duration: Duration, tags: &[String])
        -> Result<()>;

    /// Count one tick during which a disruption still has a stuck removal
    fn metric_stuck_on_removal(&self, tags: &[String]) -> Result<()>;

    /// Number of disruptions currently stuck on removal
    fn metric_stuck_on_removal_gauge(&self, gauge: f64) -> Result<()>;

    /// Number of disruptions currently holding or cleaning up
    fn metric_disruptions_gauge(&self, gauge: f64) -> Result<()>;

    /// Count one finished disruption
    fn metric_disruptions_count(&self, kind: FaultKind, tags: &[String]) -> Result<()>;

    /// Number of targets currently carrying a fault
    fn metric_targets_gauge(&self, gauge: f64) -> Result<()>;

    /// Count one controller start
    fn metric_restart(&self) -> Result<()>;

    /// Count one rejected disruption document
    fn metric_failed_validation(&self) -> Result<()>;
}

/// Build the sink selected by configuration.
pub fn new_sink(driver: SinkDriver, app: SinkApp) -> Result<Arc<dyn MetricsSink>> {
    let sink: Arc<dyn MetricsSink> = match driver {
        SinkDriver::Noop => Arc::new(NoopSink),
        SinkDriver::Memory => Arc::new(MemorySink::new()),
        SinkDriver::Prometheus => Arc::new(PrometheusSink::new(app)?),
    };
    Ok(sink)
}

/// Log and drop a sink failure.
pub fn report(metric: &str, result: Result<()>) {
    if let Err(e) = result {
        warn!(metric = %metric, error = %e, "Failed to record metric");
    }
}

pub(crate) fn status_tag(succeed: bool) -> &'static str {
    if succeed {
        "succeed"
    } else {
        "failed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChaosError;

    #[test]
    fn test_new_sink_drivers() {
        assert_eq!(
            new_sink(SinkDriver::Noop, SinkApp::Controller)
                .unwrap()
                .sink_name(),
            "noop"
        );
        assert_eq!(
            new_sink(SinkDriver::Memory, SinkApp::Controller)
                .unwrap()
                .sink_name(),
            "memory"
        );
        assert_eq!(
            new_sink(SinkDriver::Prometheus, SinkApp::Injector)
                .unwrap()
                .sink_name(),
            "prometheus"
        );
    }

    #[test]
    fn test_report_swallows_errors() {
        report("chaos.test", Err(ChaosError::Metrics("down".into())));
        report("chaos.test", Ok(()));
    }

    #[test]
    fn test_driver_serde() {
        let driver: SinkDriver = serde_json::from_str("\"prometheus\"").unwrap();
        assert_eq!(driver, SinkDriver::Prometheus);
        assert_eq!(driver.to_string(), "prometheus");
    }
}
