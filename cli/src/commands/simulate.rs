//! Dry runs against an in-memory cluster.
//!
//! The real lifecycle engine drives the disruption, but targets live in an
//! [`InMemoryCluster`], faults go to an [`InMemoryInjector`] and time is a
//! [`ManualClock`] advanced by each requeue delay, so an hour-long
//! disruption finishes instantly.

use anyhow::Result;
use chaos_controller::clock::{self, Clock, ManualClock};
use chaos_controller::config::ControllerConfig;
use chaos_controller::injector::InMemoryInjector;
use chaos_controller::lifecycle::TickOutcome;
use chaos_controller::metrics::{self, MemorySink};
use chaos_controller::selector::{ClusterSelector, InMemoryCluster, NodeInfo, PodInfo};
use chaos_controller::{
    DisruptionDocument, DisruptionRegistry, DisruptionStatus, LifecycleEngine, TargetKind,
    TargetRef,
};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

use super::validate;
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct SimulateArgs {
    /// Disruption document (YAML or JSON)
    #[arg(short, long)]
    pub path: PathBuf,

    /// Matching targets to place in the simulated cluster (defaults to the
    /// disruption count)
    #[arg(short, long)]
    pub targets: Option<u32>,

    /// Targets whose injection always fails
    #[arg(long, default_value_t = 0)]
    pub fail_inject: u32,

    /// Make every fault removal fail
    #[arg(long)]
    pub fail_removals: bool,

    /// Give up after this many reconciles
    #[arg(long, default_value_t = 1000)]
    pub max_ticks: u32,

    /// Engine configuration file (YAML, TOML or JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Serialize, Tabled)]
struct StepRow {
    #[tabled(rename = "Tick")]
    tick: u32,
    #[tabled(rename = "At")]
    at: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Entered")]
    entered: String,
    #[tabled(rename = "Requeue")]
    requeue: String,
}

impl StepRow {
    fn new(tick: u32, at: std::time::Duration, outcome: &TickOutcome) -> Self {
        Self {
            tick,
            at: output::format_duration(at),
            phase: outcome.phase.to_string(),
            entered: outcome
                .transitions
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(" → "),
            requeue: outcome
                .requeue_after
                .map(output::format_duration)
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricCounts {
    injected: usize,
    cleaned: usize,
    inject_duration: usize,
    cleanup_duration: usize,
    completed_duration: usize,
    stuck_on_removal: usize,
}

impl MetricCounts {
    fn new(sink: &MemorySink) -> Self {
        Self {
            injected: sink.count(metrics::METRIC_INJECTED),
            cleaned: sink.count(metrics::METRIC_CLEANED),
            inject_duration: sink.count(metrics::METRIC_INJECT_DURATION),
            cleanup_duration: sink.count(metrics::METRIC_CLEANUP_DURATION),
            completed_duration: sink.count(metrics::METRIC_COMPLETED_DURATION),
            stuck_on_removal: sink.count(metrics::METRIC_STUCK_ON_REMOVAL),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    disruption: String,
    /// Reconciles that changed the phase
    steps: Vec<StepRow>,
    ticks: u32,
    finished: bool,
    status: DisruptionStatus,
    metrics: MetricCounts,
}

/// Simulated world a disruption runs in.
struct Sandbox {
    clock: ManualClock,
    sink: Arc<MemorySink>,
    injector: Arc<InMemoryInjector>,
    registry: DisruptionRegistry,
}

impl Sandbox {
    fn new(config: &ControllerConfig) -> (Self, Arc<InMemoryCluster>) {
        let cluster = Arc::new(InMemoryCluster::new());
        let clock = ManualClock::default();
        let sink = Arc::new(MemorySink::new());
        let injector = Arc::new(InMemoryInjector::new());

        let engine = LifecycleEngine::new(
            Arc::new(ClusterSelector::new(Arc::clone(&cluster))),
            injector.clone(),
            sink.clone(),
            Arc::new(clock.clone()),
            config.engine.clone(),
        );

        let sandbox = Self {
            clock,
            sink,
            injector,
            registry: DisruptionRegistry::new(Arc::new(engine)),
        };
        (sandbox, cluster)
    }
}

/// Place `count` matching targets in the cluster, returning their references.
fn seed(cluster: &InMemoryCluster, document: &DisruptionDocument, count: u32) -> Vec<TargetRef> {
    let key = document.key();
    let spec = &document.spec;
    (0..count)
        .map(|i| match spec.level {
            TargetKind::Pod => {
                let namespace = spec.namespace.as_deref().unwrap_or(&key.namespace);
                let pod = PodInfo::running(
                    namespace,
                    format!("{}-{}", key.name, i),
                    spec.selector.clone(),
                );
                let reference = pod.reference();
                cluster.add_pod(pod);
                reference
            }
            TargetKind::Node => {
                let node = NodeInfo::ready(format!("node-{}", i), spec.selector.clone());
                let reference = node.reference();
                cluster.add_node(node);
                reference
            }
        })
        .collect()
}

async fn run(document: &DisruptionDocument, args: &SimulateArgs) -> Result<SimulationReport> {
    let config = match &args.config {
        Some(path) => ControllerConfig::from_file(path)?,
        None => ControllerConfig::development(),
    };

    let (sandbox, cluster) = Sandbox::new(&config);
    let targets = seed(
        &cluster,
        document,
        args.targets.unwrap_or(document.spec.count),
    );
    for target in targets.iter().take(args.fail_inject as usize) {
        sandbox.injector.always_fail_inject(target.clone());
    }
    sandbox.injector.fail_all_removals(args.fail_removals);

    let key = document.key();
    let spec = document.spec.clone().with_default_namespace(&key.namespace);
    sandbox.registry.submit(key.clone(), spec)?;

    let start = sandbox.clock.now();
    let mut steps = Vec::new();
    let mut ticks = 0;
    let mut finished = false;
    while ticks < args.max_ticks {
        ticks += 1;
        let outcome = sandbox.registry.tick(&key).await?;
        if outcome.changed() {
            let at = clock::elapsed(start, sandbox.clock.now());
            steps.push(StepRow::new(ticks, at, &outcome));
        }

        match outcome.requeue_after {
            Some(after) if !outcome.is_terminal() => sandbox.clock.advance(after),
            _ => {
                finished = true;
                break;
            }
        }
    }

    let status = sandbox
        .registry
        .status(&key)
        .await
        .ok_or_else(|| anyhow::anyhow!("disruption {} vanished from the registry", key))?;

    Ok(SimulationReport {
        disruption: key.to_string(),
        steps,
        ticks,
        finished,
        status,
        metrics: MetricCounts::new(&sandbox.sink),
    })
}

pub async fn execute(args: SimulateArgs, format: OutputFormat) -> Result<()> {
    let document = validate::load(&args.path)?;
    let report = run(&document, &args).await?;

    if format.is_structured() {
        return output::print_structured(&report, format);
    }

    output::print_header(&format!("Simulating {}", report.disruption));
    output::print_table(&report.steps);

    output::print_header("Outcome");
    output::print_kv("Reconciles", report.ticks);
    output::print_kv("Phase", output::phase_indicator(report.status.phase.as_str()));
    output::print_kv("Injected", report.status.injected_targets);
    output::print_kv("Cleaned", report.status.cleaned_targets);
    output::print_kv("Skipped", report.status.skipped_targets);
    output::print_kv("Failed", report.status.failed_targets);
    output::print_kv("Stuck", report.status.stuck_targets);
    if let Some(message) = &report.status.message {
        output::print_kv("Message", message);
    }
    if let Some(duration) = report.status.completed_duration {
        output::print_kv("Completed after", output::format_duration(duration));
    }

    output::print_header("Metrics");
    output::print_kv("Injected", report.metrics.injected);
    output::print_kv("Cleaned", report.metrics.cleaned);
    output::print_kv("Stuck on removal", report.metrics.stuck_on_removal);

    if !report.finished {
        output::warning(format!(
            "still {} after {} reconciles",
            report.status.phase, args.max_ticks
        ));
    }
    Ok(())
}
