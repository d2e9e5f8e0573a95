// Pipeline ingestion: reading the source spreadsheet into raw records

pub mod extractor;

pub use extractor::SpreadsheetExtractor;
