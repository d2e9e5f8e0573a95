//! Reconciliation Phase Metrics

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::processing::reconcile::ReconcileOutcome;

pub struct ReconcileMetrics;

impl ReconcileMetrics {
    pub fn record_outcome(outcome: &ReconcileOutcome) {
        ::metrics::counter!(phase_metric!(counter, "reconcile", "rows_discarded"))
            .increment(outcome.stats.rows_a_discarded as u64);
        ::metrics::counter!(phase_metric!(counter, "reconcile", "names_unmapped"))
            .increment(outcome.stats.rows_b_unmapped as u64);
        ::metrics::gauge!(phase_metric!(gauge, "reconcile", "regions"))
            .set(outcome.table.len() as f64);
        if outcome.insufficient_data {
            ::metrics::counter!(phase_metric!(counter, "reconcile", "insufficient_data"))
                .increment(1);
        }
    }
}

impl PhaseMetrics for ReconcileMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge};

        let _ = counter!(phase_metric!(counter, "reconcile", "rows_discarded"));
        let _ = counter!(phase_metric!(counter, "reconcile", "names_unmapped"));
        let _ = counter!(phase_metric!(counter, "reconcile", "insufficient_data"));
        let _ = gauge!(phase_metric!(gauge, "reconcile", "regions"));
    }

    fn phase_name() -> &'static str {
        "reconcile"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "reconcile", "rows_discarded"),
                metric_type: MetricType::Counter,
                help: "Source rows with a region code outside the valid set",
            },
            MetricDoc {
                name: phase_metric!(counter, "reconcile", "names_unmapped"),
                metric_type: MetricType::Counter,
                help: "Source rows whose region name has no canonical code",
            },
            MetricDoc {
                name: phase_metric!(counter, "reconcile", "insufficient_data"),
                metric_type: MetricType::Counter,
                help: "Reconciliations where both metric totals were zero",
            },
            MetricDoc {
                name: phase_metric!(gauge, "reconcile", "regions"),
                metric_type: MetricType::Gauge,
                help: "Regions in the last reconciled table",
            },
        ]
    }
}
