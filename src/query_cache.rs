//! Cached table loads for the presentation side.
//!
//! `load(key)` returns the cached table while it is fresh, otherwise asks the
//! source again. A failed load yields an empty table and is not cached, so the
//! next call retries. `invalidate_all` is the operator's "refresh data" action.

use crate::config::is_plain_identifier;
use crate::error::{PipelineError, Result};
use crate::pipeline::storage::open_read_only;
use crate::types::{Cell, Table};
use rusqlite::types::ValueRef;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Anything that can produce a table for a query key.
pub trait TableSource: Send + Sync {
    fn fetch(&self, key: &str) -> Result<Table>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheTier {
    /// Regular tables, refreshed every few minutes.
    Standard,
    /// Reference and geo data, refreshed hourly.
    Reference,
}

struct Entry {
    table: Arc<Table>,
    loaded_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_fresh(&self) -> bool {
        self.loaded_at.elapsed() < self.ttl
    }
}

pub struct QueryCache<S: TableSource> {
    source: S,
    standard_ttl: Duration,
    reference_ttl: Duration,
    reference_keys: HashSet<String>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl<S: TableSource> QueryCache<S> {
    pub fn new(source: S, standard_ttl: Duration, reference_ttl: Duration) -> Self {
        Self {
            source,
            standard_ttl,
            reference_ttl,
            reference_keys: HashSet::new(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Serve `key` from the long-lived reference tier.
    pub fn with_reference_key(mut self, key: &str) -> Self {
        self.reference_keys.insert(key.to_string());
        self
    }

    pub fn tier_for(&self, key: &str) -> CacheTier {
        if self.reference_keys.contains(key) {
            CacheTier::Reference
        } else {
            CacheTier::Standard
        }
    }

    pub fn load(&self, key: &str) -> Arc<Table> {
        if let Some(table) = self.cached(key) {
            debug!("Cache hit for '{}'", key);
            return table;
        }

        match self.source.fetch(key) {
            Ok(table) => {
                let table = Arc::new(table);
                let ttl = match self.tier_for(key) {
                    CacheTier::Standard => self.standard_ttl,
                    CacheTier::Reference => self.reference_ttl,
                };
                self.lock().insert(
                    key.to_string(),
                    Entry {
                        table: Arc::clone(&table),
                        loaded_at: Instant::now(),
                        ttl,
                    },
                );
                table
            }
            Err(e) => {
                warn!("Could not load '{}': {}; serving an empty table", key, e);
                Arc::new(Table::empty())
            }
        }
    }

    /// First non-empty table among `keys`, in order. Empty if none has data.
    pub fn load_first_available(&self, keys: &[&str]) -> Arc<Table> {
        for key in keys {
            let table = self.load(key);
            if !table.is_empty() {
                return table;
            }
            debug!("'{}' is empty or unavailable, trying next fallback", key);
        }
        Arc::new(Table::empty())
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.lock();
        debug!("Invalidating {} cached tables", entries.len());
        entries.clear();
    }

    fn cached(&self, key: &str) -> Option<Arc<Table>> {
        let entries = self.lock();
        entries
            .get(key)
            .filter(|entry| entry.is_fresh())
            .map(|entry| Arc::clone(&entry.table))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Reads whole tables (`SELECT *`) from the SQLite store.
#[derive(Debug, Clone)]
pub struct SqliteTableSource {
    db_path: PathBuf,
}

impl SqliteTableSource {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }
}

impl TableSource for SqliteTableSource {
    fn fetch(&self, key: &str) -> Result<Table> {
        if !is_plain_identifier(key) {
            return Err(PipelineError::Config(format!(
                "query key '{}' is not a table name",
                key
            )));
        }
        let conn = open_read_only(&self.db_path)?;
        let mut stmt = conn.prepare(&format!("SELECT * FROM \"{}\"", key))?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut table = Table::new(columns);
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                cells.push(cell_from_value(row.get_ref(idx)?));
            }
            table.push_row(cells);
        }
        Ok(table)
    }
}

fn cell_from_value(value: ValueRef<'_>) -> Cell {
    match value {
        ValueRef::Null | ValueRef::Blob(_) => Cell::Empty,
        ValueRef::Integer(i) => Cell::Int(i),
        ValueRef::Real(f) => Cell::Float(f),
        ValueRef::Text(bytes) => Cell::Text(String::from_utf8_lossy(bytes).into_owned()),
    }
}
