use super::*;
use crate::error::ChaosError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// How a sample was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Counter,
    Timing,
    Gauge,
    Event,
}

/// One recorded call.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: &'static str,
    pub kind: SampleKind,
    pub value: f64,
    pub tags: Vec<String>,
}

/// Sink that keeps every sample in memory.
///
/// A failing sink still records the sample before returning an error, so
/// tests can check both that the call happened and that the caller dropped
/// the error.
#[derive(Debug, Default)]
pub struct MemorySink {
    samples: Mutex<Vec<MetricSample>>,
    failing: AtomicBool,
    closed: AtomicBool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every call returns an error.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples.lock().clone()
    }

    /// Number of samples recorded under `name`.
    pub fn count(&self, name: &str) -> usize {
        self.samples.lock().iter().filter(|s| s.name == name).count()
    }

    /// Most recent value recorded under `name`.
    pub fn last_value(&self, name: &str) -> Option<f64> {
        self.samples
            .lock()
            .iter()
            .rev()
            .find(|s| s.name == name)
            .map(|s| s.value)
    }

    /// Samples recorded under `name` carrying `tag`.
    pub fn count_tagged(&self, name: &str, tag: &str) -> usize {
        self.samples
            .lock()
            .iter()
            .filter(|s| s.name == name && s.tags.iter().any(|t| t == tag))
            .count()
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, name: &'static str, kind: SampleKind, value: f64, tags: &[String]) -> Result<()> {
        self.samples.lock().push(MetricSample {
            name,
            kind,
            value,
            tags: tags.to_vec(),
        });

        if self.failing.load(Ordering::SeqCst) {
            return Err(ChaosError::Metrics(format!("sink rejected {}", name)));
        }
        Ok(())
    }
}

impl MetricsSink for MemorySink {
    fn sink_name(&self) -> &'static str {
        "memory"
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn event_with_tags(&self, title: &str, text: &str, tags: &[String]) -> Result<()> {
        let mut all = vec![format!("title:{}", title), format!("text:{}", text)];
        all.extend_from_slice(tags);
        self.record(METRIC_EVENT, SampleKind::Event, 1.0, &all)
    }

    fn metric_injected(&self, succeed: bool, kind: FaultKind, tags: &[String]) -> Result<()> {
        let mut all = vec![
            format!("status:{}", status_tag(succeed)),
            format!("kind:{}", kind),
        ];
        all.extend_from_slice(tags);
        self.record(METRIC_INJECTED, SampleKind::Counter, 1.0, &all)
    }

    fn metric_cleaned(&self, succeed: bool, kind: FaultKind, tags: &[String]) -> Result<()> {
        let mut all = vec![
            format!("status:{}", status_tag(succeed)),
            format!("kind:{}", kind),
        ];
        all.extend_from_slice(tags);
        self.record(METRIC_CLEANED, SampleKind::Counter, 1.0, &all)
    }

    fn metric_reconcile(&self) -> Result<()> {
        self.record(METRIC_RECONCILE, SampleKind::Counter, 1.0, &[])
    }

    fn metric_reconcile_duration(&self, duration: Duration, tags: &[String]) -> Result<()> {
        self.record(
            METRIC_RECONCILE_DURATION,
            SampleKind::Timing,
            duration.as_secs_f64(),
            tags,
        )
    }

    fn metric_cleanup_duration(&self, duration: Duration, tags: &[String]) -> Result<()> {
        self.record(
            METRIC_CLEANUP_DURATION,
            SampleKind::Timing,
            duration.as_secs_f64(),
            tags,
        )
    }

    fn metric_inject_duration(&self, duration: Duration, tags: &[String]) -> Result<()> {
        self.record(
            METRIC_INJECT_DURATION,
            SampleKind::Timing,
            duration.as_secs_f64(),
            tags,
        )
    }

    fn metric_disruption_completed_duration(
        &self,
        duration: Duration,
        tags: &[String],
    ) -> Result<()> {
        self.record(
            METRIC_COMPLETED_DURATION,
            SampleKind::Timing,
            duration.as_secs_f64(),
            tags,
        )
    }

    fn metric_disruption_ongoing_duration(
        &self,
        duration: Duration,
        tags: &[String],
    ) -> Result<()> {
        self.record(
            METRIC_ONGOING_DURATION,
            SampleKind::Timing,
            duration.as_secs_f64(),
            tags,
        )
    }

    fn metric_stuck_on_removal(&self, tags: &[String]) -> Result<()> {
        self.record(METRIC_STUCK_ON_REMOVAL, SampleKind::Counter, 1.0, tags)
    }

    fn metric_stuck_on_removal_gauge(&self, gauge: f64) -> Result<()> {
        self.record(METRIC_STUCK_ON_REMOVAL_TOTAL, SampleKind::Gauge, gauge, &[])
    }

    fn metric_disruptions_gauge(&self, gauge: f64) -> Result<()> {
        self.record(METRIC_DISRUPTIONS_GAUGE, SampleKind::Gauge, gauge, &[])
    }

    fn metric_disruptions_count(&self, kind: FaultKind, tags: &[String]) -> Result<()> {
        let mut all = tags.to_vec();
        all.push(format!("disruption_kind:{}", kind));
        self.record(METRIC_DISRUPTIONS_COUNT, SampleKind::Counter, 1.0, &all)
    }

    fn metric_targets_gauge(&self, gauge: f64) -> Result<()> {
        self.record(METRIC_TARGETS_GAUGE, SampleKind::Gauge, gauge, &[])
    }

    fn metric_restart(&self) -> Result<()> {
        self.record(METRIC_RESTART, SampleKind::Counter, 1.0, &[])
    }

    fn metric_failed_validation(&self) -> Result<()> {
        self.record(METRIC_FAILED_VALIDATION, SampleKind::Counter, 1.0, &[])
    }
}
