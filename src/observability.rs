//! Counters for the engine's hot paths, following Prometheus naming
//! conventions. The facade records unconditionally; the exporter is only
//! installed when the binary asks for it.

use std::net::SocketAddr;

use crate::types::SliResult;

/// Installs the Prometheus exporter. Safe to call when another exporter is
/// already installed; the failure is logged and recording continues into the
/// void.
pub fn init_exporter() {
    let port: u16 = std::env::var("GATE_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            tracing::info!(%addr, "Prometheus exporter listening");
        }
        Err(error) => {
            tracing::warn!(%error, "Prometheus exporter install failed");
        }
    }
}

pub fn record_backend_query(success: bool) {
    if success {
        metrics::counter!("gate_backend_queries_success_total").increment(1);
    } else {
        metrics::counter!("gate_backend_queries_error_total").increment(1);
    }
}

pub fn record_evaluation(results: &[SliResult]) {
    metrics::counter!("gate_evaluations_total").increment(1);
    let failed = results.iter().filter(|r| !r.success).count() as u64;
    metrics::counter!("gate_indicators_failed_total").increment(failed);
    metrics::counter!("gate_indicators_resolved_total").increment(results.len() as u64 - failed);
}
