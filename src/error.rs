use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Workbook could not be read: {0}")]
    Workbook(String),

    #[error("Schema rebuild failed for table '{table}': {source}")]
    Schema {
        table: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Chunk {chunk} ({rows} rows) failed to write: {source}")]
    ChunkWrite {
        chunk: usize,
        rows: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Region table is inconsistent: {0}")]
    RegionTable(String),

    #[error("Blocking task did not complete: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
