//! Metrics registry: registers every phase and reports name conflicts early.

use crate::metrics::{MetricDoc, PhaseMetrics};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};

/// Register all metrics from all phases
pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<super::ingest::IngestMetrics>(&mut all_metrics);
    register_phase_metrics::<super::reconcile::ReconcileMetrics>(&mut all_metrics);

    info!(
        "Registered {} total metrics across all phases",
        all_metrics.len()
    );
    log_metrics_summary(&all_metrics);
}

/// Register metrics for a specific phase and detect conflicts
fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<String, MetricDoc>) {
    T::register_metrics();
    let phase_name = T::phase_name();

    for doc in T::metrics_documentation() {
        if let Some(existing) = all_metrics.get(doc.name) {
            warn!(
                "Metric name conflict: '{}' ({}) redefined by phase '{}'",
                doc.name, existing.help, phase_name
            );
        } else {
            all_metrics.insert(doc.name.to_string(), doc);
        }
    }
}

/// Metric count per phase, keyed by the name prefix.
fn phase_summary(all_metrics: &HashMap<String, MetricDoc>) -> BTreeMap<&str, usize> {
    let mut by_phase = BTreeMap::new();
    for doc in all_metrics.values() {
        *by_phase
            .entry(extract_phase_from_metric_name(doc.name))
            .or_insert(0) += 1;
    }
    by_phase
}

fn log_metrics_summary(all_metrics: &HashMap<String, MetricDoc>) {
    for (phase, count) in phase_summary(all_metrics) {
        info!("Phase '{}': {} metrics", phase, count);
    }
}

/// Extract phase name from metric name (e.g., "pnatrans_ingest_rows_written_total" -> "ingest")
pub fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    if let Some(stripped) = metric_name.strip_prefix("pnatrans_") {
        if let Some(next_underscore) = stripped.find('_') {
            return &stripped[..next_underscore];
        }
    }
    "unknown"
}
