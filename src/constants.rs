//! Naming and sizing constants shared across the pipeline.

use crate::types::Field;

/// Workbook filename looked up inside the sheets directory.
pub const SOURCE_FILE_NAME: &str = "Capacitação Relatório.xlsx";

/// Only the first sheet of the workbook is read.
pub const SOURCE_SHEET_INDEX: usize = 0;

/// Target table for ingested training events.
pub const DEFAULT_TABLE: &str = "capacitacoes";

/// Rows per INSERT statement inside a worker's chunk.
pub const DEFAULT_SUB_BATCH_SIZE: usize = 500;

/// Cache lifetimes for the query layer
pub const STANDARD_TTL_SECS: u64 = 300;
pub const REFERENCE_TTL_SECS: u64 = 3600;

/// Token that spreadsheet exports write for missing text.
pub const MISSING_TEXT_TOKEN: &str = "nan";

/// External (sheet header) to internal field names.
pub const COLUMN_MAP: [(&str, Field); 6] = [
    ("Ordem", Field::Order),
    ("Data", Field::Date),
    ("DESCRIÇÃO DA CAPACITAÇÃO", Field::Description),
    ("Lista de Presença", Field::AttendanceList),
    ("Quantidade de Participantes", Field::ParticipantCount),
    ("Tipo", Field::Type),
];

// Query keys used by the reconciliation command
pub const PRODUCTS_TABLE: &str = "produtos_resultados";
pub const PRODUCTS_RAW_TABLE: &str = "produtos_raw";
pub const DEATHS_TABLE: &str = "obitos_transporte";

/// Region column of the products dataset (source A)
pub const PRODUCTS_REGION_COLUMN: &str = "UF";
/// Region-name column of the monthly deaths dataset (source B)
pub const DEATHS_REGION_NAME_COLUMN: &str = "localidade_nome";

/// Legal optional month columns of source B. Both spellings of March occur in exports.
pub const MONTH_COLUMNS: [&str; 13] = [
    "janeiro",
    "fevereiro",
    "marco",
    "março",
    "abril",
    "maio",
    "junho",
    "julho",
    "agosto",
    "setembro",
    "outubro",
    "novembro",
    "dezembro",
];

/// Map a sheet header to its internal field, if it is one of the mapped columns.
pub fn field_for_header(header: &str) -> Option<Field> {
    COLUMN_MAP
        .iter()
        .find(|(external, _)| *external == header)
        .map(|(_, field)| *field)
}
