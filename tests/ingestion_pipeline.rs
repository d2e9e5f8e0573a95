use anyhow::Result;
use calamine::{Data, Range};
use chrono::NaiveDate;
use pnatrans_etl::config::Config;
use pnatrans_etl::error::PipelineError;
use pnatrans_etl::pipeline::ingestion::extractor::records_from_range;
use pnatrans_etl::pipeline::processing::RecordNormalizer;
use pnatrans_etl::pipeline::storage::{
    count_rows, Chunk, ChunkSink, ParallelBulkWriter, SqliteChunkSink, TargetTable,
};
use pnatrans_etl::pipeline::IngestionPipeline;
use pnatrans_etl::types::CleanRecord;
use std::path::Path;
use tempfile::tempdir;

fn records(n: usize) -> Vec<CleanRecord> {
    (0..n)
        .map(|i| CleanRecord {
            order: i as i64 + 1,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: format!("Capacitação {}", i + 1),
            attendance_list: "Sim".into(),
            participant_count: 10,
            kind: "Palestra".into(),
        })
        .collect()
}

fn config_for(dir: &Path) -> Config {
    Config {
        database_url: format!("sqlite://{}", dir.join("store.db").display()),
        sheets_dir: dir.join("Planilhas"),
        log_dir: dir.join("logs"),
        workers: Some(4),
        ..Config::default()
    }
}

/// Fails every chunk with the given index, delegating the rest to SQLite.
struct FailingSink {
    inner: SqliteChunkSink,
    fail_index: usize,
}

impl ChunkSink for FailingSink {
    fn append(&self, chunk: &Chunk) -> pnatrans_etl::error::Result<usize> {
        if chunk.index == self.fail_index {
            return Err(PipelineError::ChunkWrite {
                chunk: chunk.index,
                rows: chunk.len(),
                source: rusqlite::Error::InvalidQuery,
            });
        }
        self.inner.append(chunk)
    }
}

#[tokio::test]
async fn test_parallel_write_persists_every_record() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("store.db");
    let table = TargetTable::new(&db, "capacitacoes")?.rebuild()?;

    let writer = ParallelBulkWriter::for_table(&table, 4, 7);
    let report = writer.write(records(103)).await;

    assert!(report.is_complete());
    assert_eq!(report.chunks_dispatched, 4);
    assert_eq!(report.rows_written, 103);
    assert_eq!(count_rows(&db, "capacitacoes")?, 103);
    Ok(())
}

#[tokio::test]
async fn test_oversized_sub_batch_still_persists_everything() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("store.db");
    let table = TargetTable::new(&db, "capacitacoes")?.rebuild()?;

    // 10 000 rows x 6 columns would not fit in one statement.
    let report = ParallelBulkWriter::for_table(&table, 1, 10_000)
        .write(records(10_000))
        .await;

    assert!(report.is_complete(), "{:?}", report.failures);
    assert_eq!(report.rows_written, 10_000);
    assert_eq!(count_rows(&db, "capacitacoes")?, 10_000);
    Ok(())
}

#[tokio::test]
async fn test_one_failed_chunk_leaves_siblings_persisted() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("store.db");
    let table = TargetTable::new(&db, "capacitacoes")?.rebuild()?;

    let sink = FailingSink {
        inner: SqliteChunkSink::new(&table, 500),
        fail_index: 2,
    };
    let report = ParallelBulkWriter::with_sink(sink, 4).write(records(100)).await;

    assert_eq!(report.chunks_dispatched, 4);
    assert_eq!(report.chunks_failed, 1);
    assert_eq!(report.rows_failed, 25);
    assert_eq!(report.rows_written, 75);
    assert_eq!(count_rows(&db, "capacitacoes")?, 75);
    Ok(())
}

#[tokio::test]
async fn test_constraint_violation_rolls_back_only_its_chunk() -> Result<()> {
    let dir = tempdir()?;
    let db = dir.path().join("store.db");
    let table = TargetTable::new(&db, "capacitacoes")?.rebuild()?;

    // Chunk 1 covers records 10..20; the bad row sits in its second sub-batch,
    // so the first sub-batch has already been inserted when the chunk fails.
    let mut batch = records(40);
    batch[17].attendance_list = "x".repeat(51);

    let writer = ParallelBulkWriter::for_table(&table, 4, 5);
    let report = writer.write(batch).await;

    assert_eq!(report.chunks_failed, 1);
    assert_eq!(report.failures[0].chunk, 1);
    assert_eq!(report.failures[0].rows, 10);
    assert_eq!(count_rows(&db, "capacitacoes")?, 30);

    let conn = rusqlite::Connection::open(&db)?;
    let leaked: i64 = conn.query_row(
        "SELECT COUNT(*) FROM capacitacoes WHERE record_order BETWEEN 11 AND 20",
        [],
        |row| row.get(0),
    )?;
    assert_eq!(leaked, 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_source_still_rebuilds_empty_table() -> Result<()> {
    let dir = tempdir()?;
    let config = config_for(dir.path());
    let db = config.database_path();

    // Leftovers from a previous run must not survive.
    let table = TargetTable::new(&db, &config.table)?.rebuild()?;
    ParallelBulkWriter::for_table(&table, 2, 500)
        .write(records(5))
        .await;
    assert_eq!(count_rows(&db, &config.table)?, 5);

    let result = IngestionPipeline::new(config.clone()).run().await?;
    assert_eq!(result.rows_extracted, 0);
    assert!(result.schema_rebuilt);
    assert_eq!(result.write.chunks_dispatched, 0);
    assert_eq!(count_rows(&db, &config.table)?, 0);
    Ok(())
}

#[tokio::test]
async fn test_skip_rebuild_when_empty_keeps_previous_rows() -> Result<()> {
    let dir = tempdir()?;
    let config = Config {
        skip_rebuild_when_empty: true,
        ..config_for(dir.path())
    };
    let db = config.database_path();
    let table = TargetTable::new(&db, &config.table)?.rebuild()?;
    ParallelBulkWriter::for_table(&table, 2, 500)
        .write(records(3))
        .await;

    let result = IngestionPipeline::new(config.clone()).run().await?;
    assert!(!result.schema_rebuilt);
    assert_eq!(count_rows(&db, &config.table)?, 3);
    Ok(())
}

#[tokio::test]
async fn test_unwritable_store_aborts_the_run() {
    let dir = tempdir().unwrap();
    let config = Config {
        // A directory is not a database file.
        database_url: dir.path().display().to_string(),
        ..config_for(dir.path())
    };
    let result = IngestionPipeline::new(config).run().await;
    assert!(matches!(result, Err(PipelineError::Schema { .. })));
}

#[test]
fn test_rebuild_twice_matches_single_rebuild() -> Result<()> {
    let dir = tempdir()?;
    let once = dir.path().join("once.db");
    let twice = dir.path().join("twice.db");

    TargetTable::new(&once, "capacitacoes")?.rebuild()?;
    TargetTable::new(&twice, "capacitacoes")?
        .rebuild()?
        .release()
        .rebuild()?;

    let schema = |db: &Path| -> rusqlite::Result<Vec<String>> {
        let conn = rusqlite::Connection::open(db)?;
        let mut stmt = conn.prepare(
            "SELECT sql FROM sqlite_master WHERE tbl_name = 'capacitacoes' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect()
    };
    assert_eq!(schema(&once)?, schema(&twice)?);
    assert_eq!(count_rows(&twice, "capacitacoes")?, 0);
    Ok(())
}

#[tokio::test]
async fn test_sheet_rows_flow_into_the_store() -> Result<()> {
    let rows: Vec<Vec<Data>> = vec![
        vec![
            Data::String("Ordem".into()),
            Data::String("Data".into()),
            Data::String("DESCRIÇÃO DA CAPACITAÇÃO".into()),
            Data::String("Lista de Presença".into()),
            Data::String("Quantidade de\nParticipantes".into()),
            Data::String("Tipo".into()),
        ],
        vec![
            Data::Float(1.0),
            Data::String("05/03/2024".into()),
            Data::String("  Direção defensiva ".into()),
            Data::String("Sim".into()),
            Data::String("1.234".into()),
            Data::String("Curso".into()),
        ],
        vec![
            Data::Float(2.0),
            Data::String("não informado".into()),
            Data::String("Sem data".into()),
            Data::Empty,
            Data::Float(3.0),
            Data::String("Curso".into()),
        ],
        vec![
            Data::String("abc".into()),
            Data::String("2024-04-10".into()),
            Data::String("nan".into()),
            Data::Empty,
            Data::Float(-4.0),
            Data::Empty,
        ],
    ];
    let mut range = Range::new((0, 0), (rows.len() as u32 - 1, 5));
    for (r, row) in rows.into_iter().enumerate() {
        for (c, value) in row.into_iter().enumerate() {
            range.set_value((r as u32, c as u32), value);
        }
    }

    let raws = records_from_range(&range);
    assert_eq!(raws.len(), 3);
    let output = RecordNormalizer::new().normalize_all(raws);
    assert_eq!(output.stats.dropped_missing_date, 1);
    assert!(output
        .records
        .iter()
        .all(|r| r.date >= NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));

    let first = &output.records[0];
    assert_eq!(first.description, "Direção defensiva");
    assert_eq!(first.participant_count, 1234);
    let second = &output.records[1];
    assert_eq!(second.order, 0);
    assert_eq!(second.description, "");
    assert_eq!(second.participant_count, 0);

    let dir = tempdir()?;
    let db = dir.path().join("store.db");
    let table = TargetTable::new(&db, "capacitacoes")?.rebuild()?;
    let report = ParallelBulkWriter::for_table(&table, 3, 500)
        .write(output.records)
        .await;
    assert_eq!(report.rows_written, 2);

    let conn = rusqlite::Connection::open(&db)?;
    let dates: Vec<String> = conn
        .prepare("SELECT training_date FROM capacitacoes ORDER BY record_order DESC")?
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    assert_eq!(dates, vec!["2024-03-05", "2024-04-10"]);
    Ok(())
}
