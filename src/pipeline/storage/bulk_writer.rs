//! Parallel bulk writer.
//!
//! Clean records are cut into `ceil(N/W)`-sized contiguous chunks, one chunk per
//! worker. Each worker opens its own connection and appends its chunk inside a
//! single transaction built from bounded multi-row INSERTs. A failed chunk is
//! logged and counted; siblings are unaffected and the run still completes.

use crate::error::{PipelineError, Result};
use crate::pipeline::storage::open_connection;
use crate::pipeline::storage::schema::{SharedAppend, TargetTable, INSERT_COLUMNS};
use crate::types::CleanRecord;
use rusqlite::types::Value;
use rusqlite::TransactionBehavior;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Bound parameters SQLite accepts in one statement (`SQLITE_MAX_VARIABLE_NUMBER`).
const MAX_SQL_VARIABLES: usize = 32766;

/// Largest sub-batch whose multi-row INSERT stays under the variable limit.
const MAX_SUB_BATCH_SIZE: usize = MAX_SQL_VARIABLES / INSERT_COLUMNS.len();

/// Available hardware parallelism minus one, never below one.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

/// Contiguous slice of the cleaned sequence, owned by the worker it is sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub index: usize,
    /// Position of the first record in the original sequence.
    pub offset: usize,
    pub records: Vec<CleanRecord>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Split `records` into at most `workers` chunks of `ceil(N/workers)` records.
pub fn partition(records: Vec<CleanRecord>, workers: usize) -> Vec<Chunk> {
    let total = records.len();
    if total == 0 {
        return Vec::new();
    }
    let chunk_size = total.div_ceil(workers.max(1));

    let mut chunks = Vec::with_capacity(total.div_ceil(chunk_size));
    let mut rest = records.into_iter();
    let mut offset = 0;
    while offset < total {
        let records: Vec<CleanRecord> = rest.by_ref().take(chunk_size).collect();
        let len = records.len();
        chunks.push(Chunk {
            index: chunks.len(),
            offset,
            records,
        });
        offset += len;
    }
    chunks
}

/// Destination for one chunk. Implementations must use their own connection.
pub trait ChunkSink: Send + Sync + 'static {
    /// Append the whole chunk, returning the number of rows written.
    fn append(&self, chunk: &Chunk) -> Result<usize>;
}

/// Appends chunks to the SQLite target table.
#[derive(Debug, Clone)]
pub struct SqliteChunkSink {
    db_path: PathBuf,
    table: String,
    sub_batch_size: usize,
}

impl SqliteChunkSink {
    /// Only a table in the shared-append phase can be written to.
    ///
    /// `sub_batch_size` is clamped to `1..=MAX_SUB_BATCH_SIZE`.
    pub fn new(table: &TargetTable<SharedAppend>, sub_batch_size: usize) -> Self {
        if sub_batch_size > MAX_SUB_BATCH_SIZE {
            warn!(
                "Sub-batch of {} rows exceeds the SQLite variable limit; using {}",
                sub_batch_size, MAX_SUB_BATCH_SIZE
            );
        }
        Self {
            db_path: table.db_path().to_path_buf(),
            table: table.table().to_string(),
            sub_batch_size: sub_batch_size.clamp(1, MAX_SUB_BATCH_SIZE),
        }
    }

    fn insert_sql(&self, rows: usize) -> String {
        let placeholders = format!("({})", vec!["?"; INSERT_COLUMNS.len()].join(", "));
        format!(
            "INSERT INTO \"{}\" ({}) VALUES {}",
            self.table,
            INSERT_COLUMNS.join(", "),
            vec![placeholders; rows].join(", ")
        )
    }

    fn write_chunk(&self, chunk: &Chunk) -> rusqlite::Result<usize> {
        let mut conn = open_connection(&self.db_path)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut written = 0;
        for batch in chunk.records.chunks(self.sub_batch_size) {
            let values: Vec<Value> = batch.iter().flat_map(row_values).collect();
            let mut stmt = tx.prepare_cached(&self.insert_sql(batch.len()))?;
            written += stmt.execute(rusqlite::params_from_iter(values.iter()))?;
        }
        tx.commit()?;
        Ok(written)
    }
}

impl ChunkSink for SqliteChunkSink {
    fn append(&self, chunk: &Chunk) -> Result<usize> {
        self.write_chunk(chunk)
            .map_err(|source| PipelineError::ChunkWrite {
                chunk: chunk.index,
                rows: chunk.len(),
                source,
            })
    }
}

fn row_values(record: &CleanRecord) -> [Value; 6] {
    [
        Value::Integer(record.order),
        Value::Text(record.date.format("%Y-%m-%d").to_string()),
        Value::Text(record.description.clone()),
        Value::Text(record.attendance_list.clone()),
        Value::Integer(i64::from(record.participant_count)),
        Value::Text(record.kind.clone()),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub chunk: usize,
    pub rows: usize,
    pub error: String,
}

/// Aggregate outcome of a parallel write. Failures never turn into an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub workers: usize,
    pub chunks_dispatched: usize,
    pub chunks_failed: usize,
    pub rows_written: usize,
    pub rows_failed: usize,
    pub failures: Vec<ChunkFailure>,
}

impl WriteReport {
    pub fn is_complete(&self) -> bool {
        self.chunks_failed == 0
    }
}

pub struct ParallelBulkWriter<S: ChunkSink = SqliteChunkSink> {
    sink: Arc<S>,
    workers: usize,
}

impl ParallelBulkWriter<SqliteChunkSink> {
    pub fn for_table(
        table: &TargetTable<SharedAppend>,
        workers: usize,
        sub_batch_size: usize,
    ) -> Self {
        Self::with_sink(SqliteChunkSink::new(table, sub_batch_size), workers)
    }
}

impl<S: ChunkSink> ParallelBulkWriter<S> {
    pub fn with_sink(sink: S, workers: usize) -> Self {
        Self {
            sink: Arc::new(sink),
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Dispatch one chunk per worker and wait for all of them.
    ///
    /// There is no cancellation: every dispatched chunk runs to completion or
    /// fails on its own.
    #[instrument(skip(self, records), fields(records = records.len(), workers = self.workers))]
    pub async fn write(&self, records: Vec<CleanRecord>) -> WriteReport {
        let chunks = partition(records, self.workers);
        let mut report = WriteReport {
            workers: self.workers,
            chunks_dispatched: chunks.len(),
            ..WriteReport::default()
        };

        let handles: Vec<_> = chunks
            .into_iter()
            .map(|chunk| {
                let sink = Arc::clone(&self.sink);
                let (index, rows) = (chunk.index, chunk.len());
                debug!("Dispatching chunk {} ({} rows at offset {})", index, rows, chunk.offset);
                let handle = tokio::task::spawn_blocking(move || sink.append(&chunk));
                (index, rows, handle)
            })
            .collect();

        for (index, rows, handle) in handles {
            let error = match handle.await {
                Ok(Ok(written)) => {
                    debug!("Chunk {} wrote {} rows", index, written);
                    report.rows_written += written;
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(join_err) => format!("worker for chunk {} aborted: {}", index, join_err),
            };
            warn!("Chunk {} ({} rows) not persisted: {}", index, rows, error);
            report.chunks_failed += 1;
            report.rows_failed += rows;
            report.failures.push(ChunkFailure {
                chunk: index,
                rows,
                error,
            });
        }

        info!(
            "Parallel write finished: {} rows written, {} of {} chunks failed",
            report.rows_written, report.chunks_failed, report.chunks_dispatched
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn records(n: usize) -> Vec<CleanRecord> {
        (0..n)
            .map(|i| CleanRecord {
                order: i as i64,
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                description: format!("evento {i}"),
                attendance_list: String::new(),
                participant_count: i as u32,
                kind: "Curso".into(),
            })
            .collect()
    }

    #[test]
    fn test_partition_is_lossless_and_ordered() {
        for (n, workers) in [(10, 3), (7, 7), (3, 8), (100, 1), (1, 4)] {
            let original = records(n);
            let chunks = partition(original.clone(), workers);
            assert!(chunks.len() <= workers);
            let rebuilt: Vec<CleanRecord> =
                chunks.iter().flat_map(|c| c.records.clone()).collect();
            assert_eq!(rebuilt, original, "n={n} workers={workers}");
            for (i, chunk) in chunks.iter().enumerate() {
                assert_eq!(chunk.index, i);
                assert_eq!(chunk.records[0].order as usize, chunk.offset);
            }
        }
    }

    #[test]
    fn test_partition_chunk_sizes() {
        let chunks = partition(records(10), 3);
        let sizes: Vec<usize> = chunks.iter().map(Chunk::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert!(partition(Vec::new(), 4).is_empty());
    }

    #[test]
    fn test_sub_batch_size_is_clamped_to_sqlite_limit() {
        let dir = tempfile::tempdir().unwrap();
        let table = TargetTable::new(dir.path().join("store.db"), "capacitacoes")
            .unwrap()
            .rebuild()
            .unwrap();
        assert_eq!(SqliteChunkSink::new(&table, 10_000).sub_batch_size, MAX_SUB_BATCH_SIZE);
        assert_eq!(SqliteChunkSink::new(&table, 0).sub_batch_size, 1);
        assert_eq!(SqliteChunkSink::new(&table, 500).sub_batch_size, 500);
        assert!(MAX_SUB_BATCH_SIZE * INSERT_COLUMNS.len() <= MAX_SQL_VARIABLES);
    }

    #[test]
    fn test_default_worker_count_is_positive() {
        assert!(default_worker_count() >= 1);
    }

    struct CountingSink;

    impl ChunkSink for CountingSink {
        fn append(&self, chunk: &Chunk) -> Result<usize> {
            if chunk.index == 1 {
                panic!("simulated worker crash");
            }
            Ok(chunk.len())
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_is_isolated() {
        let writer = ParallelBulkWriter::with_sink(CountingSink, 3);
        let report = writer.write(records(9)).await;
        assert_eq!(report.chunks_dispatched, 3);
        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.rows_written, 6);
        assert_eq!(report.rows_failed, 3);
        assert_eq!(report.failures[0].chunk, 1);
    }
}
