//! Schema manager for the training-events table.
//!
//! The table moves through two phases. `TargetTable<Exclusive>` may drop and
//! recreate it; `rebuild` consumes that value and hands back a
//! `TargetTable<SharedAppend>`, which is the only thing writers accept. Getting
//! back to `Exclusive` requires giving up the append handle, so a rebuild can
//! never overlap the parallel append.

use crate::config::is_plain_identifier;
use crate::error::{PipelineError, Result};
use crate::pipeline::storage::open_connection;
use rusqlite::{Connection, TransactionBehavior};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tracing::{error, info, instrument};

/// Phase marker: the schema manager owns the table.
#[derive(Debug)]
pub struct Exclusive;

/// Phase marker: the table exists and writers may append disjoint rows.
#[derive(Debug)]
pub struct SharedAppend;

/// Columns written by the bulk writer, in insert order.
pub const INSERT_COLUMNS: [&str; 6] = [
    "record_order",
    "training_date",
    "description",
    "attendance_list",
    "participant_count",
    "training_type",
];

#[derive(Debug)]
pub struct TargetTable<P> {
    db_path: PathBuf,
    table: String,
    _phase: PhantomData<P>,
}

impl<P> TargetTable<P> {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl TargetTable<Exclusive> {
    pub fn new<Q: AsRef<Path>>(db_path: Q, table: &str) -> Result<Self> {
        if !is_plain_identifier(table) {
            return Err(PipelineError::Config(format!(
                "table '{}' is not a plain SQL identifier",
                table
            )));
        }
        Ok(Self {
            db_path: db_path.as_ref().to_path_buf(),
            table: table.to_string(),
            _phase: PhantomData,
        })
    }

    /// Drop and recreate the table in one transaction.
    ///
    /// Any failure is fatal for the run and leaves the previous table intact.
    #[instrument(skip(self), fields(table = %self.table))]
    pub fn rebuild(self) -> Result<TargetTable<SharedAppend>> {
        let schema_err = |source: rusqlite::Error| PipelineError::Schema {
            table: self.table.clone(),
            source,
        };

        let result = open_connection(&self.db_path)
            .and_then(|mut conn| apply_schema(&mut conn, &self.table));
        if let Err(e) = result {
            error!("Schema rebuild failed: {}", e);
            return Err(schema_err(e));
        }

        info!("Table '{}' dropped and recreated", self.table);
        Ok(TargetTable {
            db_path: self.db_path,
            table: self.table,
            _phase: PhantomData,
        })
    }
}

impl TargetTable<SharedAppend> {
    /// Give up the append phase; a further rebuild becomes possible.
    pub fn release(self) -> TargetTable<Exclusive> {
        TargetTable {
            db_path: self.db_path,
            table: self.table,
            _phase: PhantomData,
        }
    }
}

fn apply_schema(conn: &mut Connection, table: &str) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute_batch(&schema_sql(table))?;
    tx.commit()
}

/// DDL for a full replace of `table`. The CHECKs stand in for the column widths
/// SQLite does not enforce on its own.
pub fn schema_sql(table: &str) -> String {
    format!(
        r#"
        DROP TABLE IF EXISTS "{table}";
        CREATE TABLE "{table}" (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            record_order      INTEGER,
            training_date     DATE NOT NULL,
            description       TEXT,
            attendance_list   VARCHAR(50) CHECK (length(attendance_list) <= 50),
            participant_count INTEGER NOT NULL DEFAULT 0 CHECK (participant_count >= 0),
            training_type     VARCHAR(100) CHECK (length(training_type) <= 100),
            created_at        TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );
        CREATE INDEX "idx_{table}_training_date" ON "{table}" (training_date);
        "#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::storage::count_rows;

    fn table_sql(db: &Path, table: &str) -> Vec<String> {
        let conn = Connection::open(db).unwrap();
        let mut stmt = conn
            .prepare("SELECT sql FROM sqlite_master WHERE tbl_name = ?1 ORDER BY name")
            .unwrap();
        let rows = stmt
            .query_map([table], |row| row.get::<_, String>(0))
            .unwrap();
        rows.map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_rebuild_creates_table_and_index() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("store.db");
        let table = TargetTable::new(&db, "capacitacoes").unwrap();
        let table = table.rebuild().unwrap();
        assert_eq!(count_rows(table.db_path(), table.table()).unwrap(), 0);

        let ddl = table_sql(&db, "capacitacoes");
        assert_eq!(ddl.len(), 2);
        assert!(ddl.iter().any(|s| s.contains("idx_capacitacoes_training_date")));
    }

    #[test]
    fn test_rebuild_discards_previous_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("store.db");
        let appendable = TargetTable::new(&db, "capacitacoes")
            .unwrap()
            .rebuild()
            .unwrap();
        {
            let conn = Connection::open(&db).unwrap();
            conn.execute(
                "INSERT INTO capacitacoes (record_order, training_date) VALUES (1, '2024-01-01')",
                [],
            )
            .unwrap();
        }
        let schema_before = table_sql(&db, "capacitacoes");

        let again = appendable.release().rebuild().unwrap();
        assert_eq!(count_rows(again.db_path(), again.table()).unwrap(), 0);
        assert_eq!(table_sql(&db, "capacitacoes"), schema_before);
    }

    #[test]
    fn test_invalid_table_name_is_rejected() {
        assert!(TargetTable::new("x.db", "bad name").is_err());
    }

    #[test]
    fn test_unopenable_store_is_schema_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be opened as a database file.
        let result = TargetTable::new(dir.path(), "capacitacoes")
            .unwrap()
            .rebuild();
        assert!(matches!(result, Err(PipelineError::Schema { .. })));
    }
}
