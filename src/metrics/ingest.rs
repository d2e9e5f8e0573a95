//! Ingestion Phase Metrics
//!
//! Extraction and normalization counts, plus the outcome of the parallel write.

use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::storage::WriteReport;

/// Metrics collection for the ingestion run
pub struct IngestMetrics;

impl IngestMetrics {
    pub fn record_extracted(rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "rows_extracted")).increment(rows as u64);
    }

    /// Rows dropped by normalization for lacking a usable date
    pub fn record_dropped(rows: usize) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "rows_dropped")).increment(rows as u64);
    }

    pub fn record_write(report: &WriteReport) {
        ::metrics::counter!(phase_metric!(counter, "ingest", "chunks_dispatched"))
            .increment(report.chunks_dispatched as u64);
        ::metrics::counter!(phase_metric!(counter, "ingest", "chunks_failed"))
            .increment(report.chunks_failed as u64);
        ::metrics::counter!(phase_metric!(counter, "ingest", "rows_written"))
            .increment(report.rows_written as u64);
        ::metrics::gauge!(phase_metric!(gauge, "ingest", "workers")).set(report.workers as f64);
    }

    pub fn record_schema_failure() {
        ::metrics::counter!(phase_metric!(counter, "ingest", "schema_failures")).increment(1);
    }

    pub fn record_duration(duration_secs: f64) {
        ::metrics::histogram!(phase_metric!(histogram, "ingest", "duration_seconds"))
            .record(duration_secs);
    }
}

impl PhaseMetrics for IngestMetrics {
    fn register_metrics() {
        use metrics::{counter, gauge, histogram};

        let _ = counter!(phase_metric!(counter, "ingest", "rows_extracted"));
        let _ = counter!(phase_metric!(counter, "ingest", "rows_dropped"));
        let _ = counter!(phase_metric!(counter, "ingest", "chunks_dispatched"));
        let _ = counter!(phase_metric!(counter, "ingest", "chunks_failed"));
        let _ = counter!(phase_metric!(counter, "ingest", "rows_written"));
        let _ = counter!(phase_metric!(counter, "ingest", "schema_failures"));
        let _ = gauge!(phase_metric!(gauge, "ingest", "workers"));
        let _ = histogram!(phase_metric!(histogram, "ingest", "duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "ingest"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "ingest", "rows_extracted"),
                metric_type: MetricType::Counter,
                help: "Non-empty rows read from the source sheet",
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "rows_dropped"),
                metric_type: MetricType::Counter,
                help: "Rows dropped for lacking a usable date",
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "chunks_dispatched"),
                metric_type: MetricType::Counter,
                help: "Chunks handed to writer workers",
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "chunks_failed"),
                metric_type: MetricType::Counter,
                help: "Chunks whose append failed and was rolled back",
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "rows_written"),
                metric_type: MetricType::Counter,
                help: "Rows persisted to the target table",
            },
            MetricDoc {
                name: phase_metric!(counter, "ingest", "schema_failures"),
                metric_type: MetricType::Counter,
                help: "Runs aborted because the table could not be rebuilt",
            },
            MetricDoc {
                name: phase_metric!(gauge, "ingest", "workers"),
                metric_type: MetricType::Gauge,
                help: "Worker count used by the last parallel write",
            },
            MetricDoc {
                name: phase_metric!(histogram, "ingest", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Wall time of a full ingestion run",
            },
        ]
    }
}
