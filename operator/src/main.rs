//! Chaos Kubernetes Operator
//!
//! Drives Disruption resources through selection, injection, holding and
//! cleanup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use chaos_controller::clock::SystemClock;
use chaos_controller::config::ControllerConfig;
use chaos_controller::metrics::{self, MetricsSink, PrometheusSink, SinkDriver};
use chaos_controller::selector::ClusterSelector;
use chaos_controller::{observability, DisruptionRegistry, LifecycleEngine};
use clap::Parser;
use kube::Client;
use tracing::{error, info};

mod cluster;
mod controller;
mod crd;
mod error;
mod injector;
mod metrics_server;

use cluster::KubeClusterReader;
use controller::Controller;
use injector::AnnotationInjector;

#[derive(Parser, Debug)]
#[command(name = "chaos-operator")]
#[command(about = "Kubernetes Operator injecting and cleaning up disruptions")]
struct Args {
    /// Namespace to watch (empty for all namespaces)
    #[arg(short, long, env = "CHAOS_NAMESPACE", default_value = "")]
    namespace: String,

    /// Controller configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "CHAOS_CONFIG")]
    config: Option<PathBuf>,

    /// Metrics listen address
    #[arg(long, env = "CHAOS_METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Health probe listen address
    #[arg(long, env = "CHAOS_HEALTH_ADDR")]
    health_addr: Option<SocketAddr>,

    /// Log level
    #[arg(short, long, env = "CHAOS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long, env = "CHAOS_JSON_LOGS")]
    json_logs: bool,

    /// Print the Disruption CRD and exit
    #[arg(long)]
    print_crd: bool,
}

impl Args {
    /// Load the configuration file and apply flag overrides.
    fn config(&self) -> anyhow::Result<ControllerConfig> {
        let mut config = match &self.config {
            Some(path) => ControllerConfig::from_file(path)?,
            None => ControllerConfig::production(),
        };
        if let Some(addr) = self.metrics_addr {
            config.observability.metrics_addr = addr;
        }
        if let Some(addr) = self.health_addr {
            config.observability.health_addr = addr;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
        if self.json_logs {
            config.observability.json_logs = true;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_crd {
        print!("{}", crd::crd_yaml()?);
        return Ok(());
    }

    let config = args.config()?;
    observability::init(&config.observability)?;

    info!("Starting chaos operator");
    info!(namespace = %args.namespace, "Watching namespace");

    // Prometheus sink is served over HTTP, other drivers are not
    let prometheus = match config.metrics.driver {
        SinkDriver::Prometheus => Some(Arc::new(PrometheusSink::new(config.metrics.app)?)),
        _ => None,
    };
    let sink: Arc<dyn MetricsSink> = match &prometheus {
        Some(sink) => Arc::clone(sink) as Arc<dyn MetricsSink>,
        None => metrics::new_sink(config.metrics.driver, config.metrics.app)?,
    };
    metrics::report(metrics::METRIC_RESTART, sink.metric_restart());

    let client = Client::try_default().await?;
    let selector = ClusterSelector::new(Arc::new(KubeClusterReader::new(client.clone())));
    let engine = LifecycleEngine::new(
        Arc::new(selector),
        Arc::new(AnnotationInjector::new(client.clone())),
        Arc::clone(&sink),
        Arc::new(SystemClock),
        config.engine.clone(),
    );
    let registry = Arc::new(DisruptionRegistry::new(Arc::new(engine)));

    let metrics_handle = {
        let addr = config.observability.metrics_addr;
        let prometheus = prometheus.filter(|_| config.observability.metrics_enabled);
        tokio::spawn(async move {
            match prometheus {
                Some(sink) => metrics_server::run_metrics_server(addr, sink).await,
                None => std::future::pending().await,
            }
        })
    };
    let health_handle = tokio::spawn(metrics_server::run_health_server(
        config.observability.health_addr,
    ));
    let gauge_handle = tokio::spawn(metrics_server::run_gauge_reporter(
        Arc::clone(&registry),
        metrics_server::GAUGE_INTERVAL,
    ));

    let controller = Controller::new(client, args.namespace.clone(), Arc::clone(&registry));
    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            error!(error = %e, "Disruption controller error");
        }
    });

    info!("Operator started");

    tokio::select! {
        _ = controller_handle => info!("Disruption controller stopped"),
        result = metrics_handle => log_server_exit("metrics", result),
        result = health_handle => log_server_exit("health", result),
        _ = gauge_handle => info!("Gauge reporter stopped"),
    }

    metrics::report("flush", sink.flush());
    metrics::report("close", sink.close());
    Ok(())
}

fn log_server_exit(
    server: &str,
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => info!(server, "Server stopped"),
        Ok(Err(e)) => error!(server, error = %e, "Server failed"),
        Err(e) => error!(server, error = %e, "Server task panicked"),
    }
}
