use std::net::SocketAddr;
use tracing::{info, warn};

/// Install the Prometheus exporter on the given port
pub fn init_metrics(port: u16) {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            info!("Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            warn!("Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
}

// Metric names
pub const RUNS_TOTAL: &str = "relay_pipeline_runs_total";
pub const RUN_FAILURES_TOTAL: &str = "relay_pipeline_failures_total";
pub const RUN_DURATION_SECONDS: &str = "relay_pipeline_duration_seconds";
pub const ROWS_PER_RUN: &str = "relay_rows_per_run";
pub const MAPPING_SKIPPED_TOTAL: &str = "relay_mapping_skipped_total";
pub const QUALITY_ISSUES_TOTAL: &str = "relay_quality_issues_total";
pub const DELIVERY_ATTEMPTS_TOTAL: &str = "relay_delivery_attempts_total";
pub const DELIVERY_SUCCESS_TOTAL: &str = "relay_delivery_success_total";
pub const DELIVERY_FAILURE_TOTAL: &str = "relay_delivery_failure_total";
