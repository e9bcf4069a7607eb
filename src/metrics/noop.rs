use super::MetricsSink;
use crate::error::Result;
use crate::types::FaultKind;
use std::time::Duration;

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl MetricsSink for NoopSink {
    fn sink_name(&self) -> &'static str {
        "noop"
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn event_with_tags(&self, _title: &str, _text: &str, _tags: &[String]) -> Result<()> {
        Ok(())
    }

    fn metric_injected(&self, _succeed: bool, _kind: FaultKind, _tags: &[String]) -> Result<()> {
        Ok(())
    }

    fn metric_cleaned(&self, _succeed: bool, _kind: FaultKind, _tags: &[String]) -> Result<()> {
        Ok(())
    }

    fn metric_reconcile(&self) -> Result<()> {
        Ok(())
    }

    fn metric_reconcile_duration(&self, _duration: Duration, _tags: &[String]) -> Result<()> {
        Ok(())
    }

    fn metric_cleanup_duration(&self, _duration: Duration, _tags: &[String]) -> Result<()> {
        Ok(())
    }

    fn metric_inject_duration(&self, _duration: Duration, _tags: &[String]) -> Result<()> {
        Ok(())
    }

    fn metric_disruption_completed_duration(
        &self,
        _duration: Duration,
        _tags: &[String],
    ) -> Result<()> {
        Ok(())
    }

    fn metric_disruption_ongoing_duration(
        &self,
        _duration: Duration,
        _tags: &[String],
    ) -> Result<()> {
        Ok(())
    }

    fn metric_stuck_on_removal(&self, _tags: &[String]) -> Result<()> {
        Ok(())
    }

    fn metric_stuck_on_removal_gauge(&self, _gauge: f64) -> Result<()> {
        Ok(())
    }

    fn metric_disruptions_gauge(&self, _gauge: f64) -> Result<()> {
        Ok(())
    }

    fn metric_disruptions_count(&self, _kind: FaultKind, _tags: &[String]) -> Result<()> {
        Ok(())
    }

    fn metric_targets_gauge(&self, _gauge: f64) -> Result<()> {
        Ok(())
    }

    fn metric_restart(&self) -> Result<()> {
        Ok(())
    }

    fn metric_failed_validation(&self) -> Result<()> {
        Ok(())
    }
}
