use crate::config::Config;
use crate::error::Result;
use crate::metrics::IngestMetrics;
use crate::pipeline::ingestion::SpreadsheetExtractor;
use crate::pipeline::processing::{NormalizeStats, RecordNormalizer};
use crate::pipeline::storage::{default_worker_count, ParallelBulkWriter, TargetTable, WriteReport};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Result of a complete ingestion run
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub source: PathBuf,
    pub table: String,
    pub rows_extracted: usize,
    pub normalize: NormalizeStats,
    pub schema_rebuilt: bool,
    pub write: WriteReport,
    pub duration_secs: f64,
}

impl PipelineResult {
    pub fn rows_written(&self) -> usize {
        self.write.rows_written
    }
}

/// Extract, normalize, rebuild the target table and append in parallel.
pub struct IngestionPipeline {
    config: Config,
}

impl IngestionPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the whole ingestion.
    ///
    /// A missing or unreadable source degrades to zero records and chunk
    /// failures are only reported; the one fatal error is a failed schema rebuild.
    #[instrument(skip(self), fields(table = %self.config.table))]
    pub async fn run(&self) -> Result<PipelineResult> {
        let started = Instant::now();
        let source = self.config.source_path();
        info!("Starting ingestion from {}", source.display());

        let extractor = SpreadsheetExtractor::new(&source);
        let (rows_extracted, normalized) = tokio::task::spawn_blocking(move || {
            let raws = extractor.extract_or_empty();
            (raws.len(), RecordNormalizer::new().normalize_all(raws))
        })
        .await?;
        IngestMetrics::record_extracted(rows_extracted);

        IngestMetrics::record_dropped(normalized.stats.dropped_missing_date);
        if normalized.stats.dropped_missing_date > 0 {
            warn!(
                "{} rows dropped for lacking a usable date",
                normalized.stats.dropped_missing_date
            );
        }

        let mut result = PipelineResult {
            source,
            table: self.config.table.clone(),
            rows_extracted,
            normalize: normalized.stats,
            schema_rebuilt: false,
            write: WriteReport::default(),
            duration_secs: 0.0,
        };

        if normalized.records.is_empty() && self.config.skip_rebuild_when_empty {
            info!("No records to load; leaving table '{}' untouched", self.config.table);
            result.duration_secs = started.elapsed().as_secs_f64();
            return Ok(result);
        }

        let table = TargetTable::new(self.config.database_path(), &self.config.table)?;
        let table = tokio::task::spawn_blocking(move || table.rebuild())
            .await?
            .inspect_err(|_| IngestMetrics::record_schema_failure())?;
        result.schema_rebuilt = true;

        let workers = self.config.workers.unwrap_or_else(default_worker_count);
        let writer = ParallelBulkWriter::for_table(&table, workers, self.config.sub_batch_size);
        result.write = writer.write(normalized.records).await;
        IngestMetrics::record_write(&result.write);

        result.duration_secs = started.elapsed().as_secs_f64();
        IngestMetrics::record_duration(result.duration_secs);

        info!(
            "Ingestion finished: {} extracted, {} clean, {} written in {:.2}s",
            result.rows_extracted,
            result.normalize.rows_out,
            result.write.rows_written,
            result.duration_secs
        );
        Ok(result)
    }
}
