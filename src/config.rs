use crate::constants;
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Implicit config file, read from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "pnatrans.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub sheets_dir: PathBuf,
    pub source_file: String,
    pub table: String,
    pub workers: Option<usize>,
    pub sub_batch_size: usize,
    pub cache_ttl_secs: u64,
    pub reference_ttl_secs: u64,
    pub log_dir: PathBuf,
    /// Mirror the old behaviour of leaving the table untouched when nothing was extracted.
    pub skip_rebuild_when_empty: bool,
    pub metrics_addr: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://data/pnatrans.db".to_string(),
            sheets_dir: PathBuf::from("Planilhas"),
            source_file: constants::SOURCE_FILE_NAME.to_string(),
            table: constants::DEFAULT_TABLE.to_string(),
            workers: None,
            sub_batch_size: constants::DEFAULT_SUB_BATCH_SIZE,
            cache_ttl_secs: constants::STANDARD_TTL_SECS,
            reference_ttl_secs: constants::REFERENCE_TTL_SECS,
            log_dir: PathBuf::from("logs"),
            skip_rebuild_when_empty: false,
            metrics_addr: None,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file, then `PNATRANS_*` environment overrides.
    ///
    /// An explicitly named file must exist; the implicit `pnatrans.toml` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay environment values looked up through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("PNATRANS_DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(dir) = lookup("PNATRANS_SHEETS_DIR") {
            self.sheets_dir = PathBuf::from(dir);
        }
        if let Some(table) = lookup("PNATRANS_TABLE") {
            self.table = table;
        }
        if let Some(workers) = lookup("PNATRANS_WORKERS") {
            let n = workers.trim().parse::<usize>().map_err(|e| {
                PipelineError::Config(format!("PNATRANS_WORKERS='{}' is not a count: {}", workers, e))
            })?;
            self.workers = Some(n);
        }
        if let Some(dir) = lookup("PNATRANS_LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        if let Some(addr) = lookup("PNATRANS_METRICS_ADDR") {
            self.metrics_addr = Some(addr);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            return Err(PipelineError::Config("workers must be at least 1".into()));
        }
        if self.sub_batch_size == 0 {
            return Err(PipelineError::Config("sub_batch_size must be at least 1".into()));
        }
        if !is_plain_identifier(&self.table) {
            return Err(PipelineError::Config(format!(
                "table '{}' is not a plain SQL identifier",
                self.table
            )));
        }
        Ok(())
    }

    pub fn source_path(&self) -> PathBuf {
        self.sheets_dir.join(&self.source_file)
    }

    /// File path of the SQLite store named by `database_url`.
    pub fn database_path(&self) -> PathBuf {
        database_path_from_url(&self.database_url)
    }
}

/// Accepts `sqlite://path`, `sqlite:path` or a bare path.
pub fn database_path_from_url(url: &str) -> PathBuf {
    let trimmed = url.trim();
    let path = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    PathBuf::from(path)
}

/// ASCII letters, digits and underscores, not starting with a digit.
pub fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
