use crate::constants;
use crate::error::{PipelineError, Result};
use crate::types::{Cell, Field, RawRecord};
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Reads the training report sheet and maps its headers onto internal fields.
#[derive(Debug, Clone)]
pub struct SpreadsheetExtractor {
    path: PathBuf,
    sheet_index: usize,
}

impl SpreadsheetExtractor {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sheet_index: constants::SOURCE_SHEET_INDEX,
        }
    }

    /// Read the configured sheet. A missing file is `SourceNotFound`.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn extract(&self) -> Result<Vec<RawRecord>> {
        if !self.path.exists() {
            return Err(PipelineError::SourceNotFound(self.path.clone()));
        }

        let mut workbook = open_workbook_auto(&self.path)
            .map_err(|e| PipelineError::Workbook(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(self.sheet_index)
            .ok_or_else(|| {
                PipelineError::Workbook(format!("workbook has no sheet #{}", self.sheet_index))
            })?
            .map_err(|e| PipelineError::Workbook(e.to_string()))?;

        let (rows, cols) = range.get_size();
        debug!("Sheet size: {} rows x {} columns", rows, cols);

        let records = records_from_range(&range);
        info!("Extracted {} non-empty rows", records.len());
        Ok(records)
    }

    /// Same as [`extract`](Self::extract) but every read failure degrades to no records.
    pub fn extract_or_empty(&self) -> Vec<RawRecord> {
        match self.extract() {
            Ok(records) => records,
            Err(PipelineError::SourceNotFound(path)) => {
                warn!("Source file not found at {}; continuing with no records", path.display());
                Vec::new()
            }
            Err(e) => {
                warn!("Could not read source sheet: {}; continuing with no records", e);
                Vec::new()
            }
        }
    }
}

/// Build raw records from a sheet range whose first row holds the headers.
///
/// Unmapped columns are dropped, and so are rows empty across every mapped column.
pub fn records_from_range(range: &Range<Data>) -> Vec<RawRecord> {
    let mut rows = range.rows();
    let headers: Vec<Option<Field>> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| constants::field_for_header(&normalize_header(cell)))
            .collect(),
        None => return Vec::new(),
    };

    if headers.iter().all(Option::is_none) {
        warn!("No mapped columns found in header row");
        return Vec::new();
    }

    rows.filter_map(|row| {
        let mut record = RawRecord::new();
        for (idx, field) in headers.iter().enumerate() {
            if let Some(field) = field {
                let cell = row.get(idx).map(cell_from_data).unwrap_or_default();
                record.insert(*field, cell);
            }
        }
        (!record.is_blank()).then_some(record)
    })
    .collect()
}

/// Header text trimmed, with embedded line breaks turned into spaces.
pub fn normalize_header(cell: &Data) -> String {
    let text = match cell {
        Data::String(s) => s.clone(),
        Data::Empty => String::new(),
        other => other.to_string(),
    };
    text.trim().replace("\r\n", " ").replace('\n', " ")
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Cell::DateTime(naive),
            None => Cell::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .map(Cell::DateTime)
            .unwrap_or_else(|_| Cell::Text(s.clone())),
        Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}
