//! Relational store access: schema rebuild (exclusive phase) and the parallel
//! chunk writer (shared-append phase).

pub mod bulk_writer;
pub mod schema;

pub use bulk_writer::{
    default_worker_count, partition, Chunk, ChunkFailure, ChunkSink, ParallelBulkWriter,
    SqliteChunkSink, WriteReport,
};
pub use schema::{Exclusive, SharedAppend, TargetTable};

use crate::config::is_plain_identifier;
use crate::error::{PipelineError, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// Writers wait this long on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Open a read-write connection, creating the file and parent directory if needed.
pub fn open_connection(db_path: &Path) -> rusqlite::Result<Connection> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            // Surfaces as an open error below if this fails.
            let _ = std::fs::create_dir_all(parent);
        }
    }
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
    Ok(conn)
}

/// Open an existing database without creating it.
pub fn open_read_only(db_path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Row count of `table`.
pub fn count_rows(db_path: &Path, table: &str) -> Result<i64> {
    if !is_plain_identifier(table) {
        return Err(PipelineError::Config(format!(
            "table '{}' is not a plain SQL identifier",
            table
        )));
    }
    let conn = open_read_only(db_path)?;
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM \"{}\"", table), [], |row| {
        row.get(0)
    })?;
    Ok(count)
}
