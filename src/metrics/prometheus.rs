//! Prometheus-backed sink.
//!
//! Metrics live in a registry owned by the sink, not in the process-wide
//! default registry, so several sinks can coexist (one per test, one per
//! controller instance). The operator serves [`PrometheusSink::render`].

use super::*;
use crate::error::ChaosError;
use ::prometheus::{
    Counter, CounterVec, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

const DURATION_BUCKETS: &[f64] = &[
    0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0,
];

/// Sink exporting lifecycle metrics in the Prometheus text format.
pub struct PrometheusSink {
    registry: Registry,
    injected: CounterVec,
    cleaned: CounterVec,
    reconcile: Counter,
    reconcile_duration: HistogramVec,
    inject_duration: HistogramVec,
    cleanup_duration: HistogramVec,
    completed_duration: HistogramVec,
    ongoing_duration: HistogramVec,
    stuck_on_removal: CounterVec,
    stuck_on_removal_total: Gauge,
    disruptions_gauge: Gauge,
    disruptions_count: CounterVec,
    targets_gauge: Gauge,
    restart: Counter,
    failed_validation: Counter,
    events: CounterVec,
}

impl PrometheusSink {
    /// Create a sink with its own registry.
    pub fn new(app: SinkApp) -> Result<Self> {
        let registry = Registry::new();
        let app = app.as_str();

        let counter_vec = |name: &str, help: &str, labels: &[&str]| -> Result<CounterVec> {
            let c = CounterVec::new(opts(name, help, app), labels).map_err(to_chaos)?;
            registry.register(Box::new(c.clone())).map_err(to_chaos)?;
            Ok(c)
        };
        let counter = |name: &str, help: &str| -> Result<Counter> {
            let c = Counter::with_opts(opts(name, help, app)).map_err(to_chaos)?;
            registry.register(Box::new(c.clone())).map_err(to_chaos)?;
            Ok(c)
        };
        let gauge = |name: &str, help: &str| -> Result<Gauge> {
            let g = Gauge::with_opts(opts(name, help, app)).map_err(to_chaos)?;
            registry.register(Box::new(g.clone())).map_err(to_chaos)?;
            Ok(g)
        };
        let histogram = |name: &str, help: &str| -> Result<HistogramVec> {
            let h = HistogramVec::new(
                HistogramOpts::new(metric_name(name), help)
                    .const_label("app", app)
                    .buckets(DURATION_BUCKETS.to_vec()),
                &["disruption_kind"],
            )
            .map_err(to_chaos)?;
            registry.register(Box::new(h.clone())).map_err(to_chaos)?;
            Ok(h)
        };

        Ok(Self {
            injected: counter_vec(METRIC_INJECTED, "Injection attempts", &["status", "kind"])?,
            cleaned: counter_vec(METRIC_CLEANED, "Cleanup attempts", &["status", "kind"])?,
            reconcile: counter(METRIC_RECONCILE, "Reconcile ticks")?,
            reconcile_duration: histogram(METRIC_RECONCILE_DURATION, "Reconcile tick duration")?,
            inject_duration: histogram(METRIC_INJECT_DURATION, "Injection phase duration")?,
            cleanup_duration: histogram(METRIC_CLEANUP_DURATION, "Cleanup phase duration")?,
            completed_duration: histogram(
                METRIC_COMPLETED_DURATION,
                "Lifetime of finished disruptions",
            )?,
            ongoing_duration: histogram(
                METRIC_ONGOING_DURATION,
                "Lifetime of running disruptions",
            )?,
            stuck_on_removal: counter_vec(
                METRIC_STUCK_ON_REMOVAL,
                "Ticks with a stuck removal",
                &["disruption_kind"],
            )?,
            stuck_on_removal_total: gauge(
                METRIC_STUCK_ON_REMOVAL_TOTAL,
                "Disruptions stuck on removal",
            )?,
            disruptions_gauge: gauge(METRIC_DISRUPTIONS_GAUGE, "Ongoing disruptions")?,
            disruptions_count: counter_vec(
                METRIC_DISRUPTIONS_COUNT,
                "Finished disruptions",
                &["disruption_kind"],
            )?,
            targets_gauge: gauge(METRIC_TARGETS_GAUGE, "Targets carrying a fault")?,
            restart: counter(METRIC_RESTART, "Controller restarts")?,
            failed_validation: counter(METRIC_FAILED_VALIDATION, "Rejected disruptions")?,
            events: counter_vec(METRIC_EVENT, "Recorded events", &["title"])?,
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encode every metric in the text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}

impl MetricsSink for PrometheusSink {
    fn sink_name(&self) -> &'static str {
        "prometheus"
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn event_with_tags(&self, title: &str, _text: &str, _tags: &[String]) -> Result<()> {
        self.events.with_label_values(&[title]).inc();
        Ok(())
    }

    fn metric_injected(&self, succeed: bool, kind: FaultKind, _tags: &[String]) -> Result<()> {
        self.injected
            .with_label_values(&[status_tag(succeed), kind.as_str()])
            .inc();
        Ok(())
    }

    fn metric_cleaned(&self, succeed: bool, kind: FaultKind, _tags: &[String]) -> Result<()> {
        self.cleaned
            .with_label_values(&[status_tag(succeed), kind.as_str()])
            .inc();
        Ok(())
    }

    fn metric_reconcile(&self) -> Result<()> {
        self.reconcile.inc();
        Ok(())
    }

    fn metric_reconcile_duration(&self, duration: Duration, tags: &[String]) -> Result<()> {
        observe(&self.reconcile_duration, duration, tags);
        Ok(())
    }

    fn metric_cleanup_duration(&self, duration: Duration, tags: &[String]) -> Result<()> {
        observe(&self.cleanup_duration, duration, tags);
        Ok(())
    }

    fn metric_inject_duration(&self, duration: Duration, tags: &[String]) -> Result<()> {
        observe(&self.inject_duration, duration, tags);
        Ok(())
    }

    fn metric_disruption_completed_duration(
        &self,
        duration: Duration,
        tags: &[String],
    ) -> Result<()> {
        observe(&self.completed_duration, duration, tags);
        Ok(())
    }

    fn metric_disruption_ongoing_duration(
        &self,
        duration: Duration,
        tags: &[String],
    ) -> Result<()> {
        observe(&self.ongoing_duration, duration, tags);
        Ok(())
    }

    fn metric_stuck_on_removal(&self, tags: &[String]) -> Result<()> {
        self.stuck_on_removal
            .with_label_values(&[tag_value(tags, "disruption_kind")])
            .inc();
        Ok(())
    }

    fn metric_stuck_on_removal_gauge(&self, gauge: f64) -> Result<()> {
        self.stuck_on_removal_total.set(gauge);
        Ok(())
    }

    fn metric_disruptions_gauge(&self, gauge: f64) -> Result<()> {
        self.disruptions_gauge.set(gauge);
        Ok(())
    }

    fn metric_disruptions_count(&self, kind: FaultKind, _tags: &[String]) -> Result<()> {
        self.disruptions_count
            .with_label_values(&[kind.as_str()])
            .inc();
        Ok(())
    }

    fn metric_targets_gauge(&self, gauge: f64) -> Result<()> {
        self.targets_gauge.set(gauge);
        Ok(())
    }

    fn metric_restart(&self) -> Result<()> {
        self.restart.inc();
        Ok(())
    }

    fn metric_failed_validation(&self) -> Result<()> {
        self.failed_validation.inc();
        Ok(())
    }
}

fn metric_name(dotted: &str) -> String {
    dotted.replace('.', "_")
}

fn opts(name: &str, help: &str, app: &str) -> Opts {
    Opts::new(metric_name(name), help).const_label("app", app)
}

fn to_chaos(e: ::prometheus::Error) -> ChaosError {
    ChaosError::Metrics(e.to_string())
}

fn observe(histogram: &HistogramVec, duration: Duration, tags: &[String]) {
    histogram
        .with_label_values(&[tag_value(tags, "disruption_kind")])
        .observe(duration.as_secs_f64());
}

/// Value of a `key:value` tag, or `unknown`.
fn tag_value<'a>(tags: &'a [String], key: &str) -> &'a str {
    tags.iter()
        .find_map(|t| t.strip_prefix(key).and_then(|rest| rest.strip_prefix(':')))
        .unwrap_or("unknown")
}
