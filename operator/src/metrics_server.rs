//! Metrics, health and gauge reporting tasks for the chaos operator

use chaos_controller::metrics::PrometheusSink;
use chaos_controller::DisruptionRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Interval between gauge reports.
pub const GAUGE_INTERVAL: Duration = Duration::from_secs(15);

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Serve the sink's registry in the Prometheus text format.
pub async fn run_metrics_server(addr: SocketAddr, sink: Arc<PrometheusSink>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Metrics server started");

    loop {
        if let Ok((mut socket, _)) = listener.accept().await {
            let sink = Arc::clone(&sink);
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;

                let body = sink.render();
                let response = http_response("text/plain; version=0.0.4; charset=utf-8", &body);
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    }
}

/// Answer every request with `OK`.
pub async fn run_health_server(addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Health server started");

    loop {
        if let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(http_response("text/plain", "OK").as_bytes())
                    .await;
            });
        }
    }
}

/// Report registry gauges until the task is dropped.
pub async fn run_gauge_reporter(registry: Arc<DisruptionRegistry>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let gauges = registry.report_gauges().await;
        debug!(
            ongoing = gauges.ongoing,
            stuck = gauges.stuck,
            targets = gauges.targets,
            "Reported gauges"
        );
    }
}
