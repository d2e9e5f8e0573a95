//! Phase-organized metrics for the ingestion and reconciliation runs
//!
//! Each phase defines its metrics in a dedicated submodule so names stay unique
//! and documented in one place.

pub mod ingest;
pub mod reconcile;
pub mod registry;

pub use ingest::IngestMetrics;
pub use reconcile::ReconcileMetrics;

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Initialize the global metrics recorder.
///
/// Idempotent. Without an address nothing is installed and the metric macros
/// stay no-ops. With one, a Prometheus recorder and HTTP listener are installed
/// (this must run inside a tokio runtime) and every phase registers its metrics.
pub fn init_metrics(addr: Option<&str>) {
    let Some(addr_str) = addr else {
        return;
    };
    INIT.call_once(|| {
        let addr = match addr_str.parse::<SocketAddr>() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Invalid metrics addr '{}': {}; metrics disabled", addr_str, e);
                return;
            }
        };

        match metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
        {
            Ok(()) => {
                info!("Prometheus exporter listening at http://{}/metrics", addr);
                registry::register_all_metrics();
            }
            Err(e) => warn!("Failed to install Prometheus recorder: {}", e),
        }
    });
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Register all metrics for this phase so they are exported before first use
    fn register_metrics();

    /// Phase name used as the metric prefix
    fn phase_name() -> &'static str;

    /// Documentation for all metrics in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
}

#[derive(Debug, Clone)]
pub enum MetricType {
    Counter,
    Histogram,
    Gauge,
}

/// Builds metric names following `pnatrans_{phase}_{metric_name}[_total]`
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("pnatrans_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("pnatrans_", $phase, "_", $name)
    };
    (gauge, $phase:literal, $name:literal) => {
        concat!("pnatrans_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_naming_convention() {
        assert_eq!(
            phase_metric!(counter, "ingest", "rows_written"),
            "pnatrans_ingest_rows_written_total"
        );
        assert_eq!(
            phase_metric!(histogram, "ingest", "duration_seconds"),
            "pnatrans_ingest_duration_seconds"
        );
        assert_eq!(
            phase_metric!(gauge, "reconcile", "regions"),
            "pnatrans_reconcile_regions"
        );
    }

    #[test]
    fn test_init_without_addr_is_noop() {
        init_metrics(None);
    }
}
