//! Field-level cleaning of raw sheet rows.
//!
//! Every transform here is total: a value that cannot be parsed becomes a safe
//! default and is only counted, never raised.

use crate::constants::MISSING_TEXT_TOKEN;
use crate::types::{Cell, CleanRecord, Field, RawRecord};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info};

// Two-digit years are tried first; `%Y` would otherwise accept "24" as year 24.
const DATE_FORMATS: [&str; 6] = [
    "%d/%m/%y", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d",
];

const DATETIME_FORMATS: [&str; 7] = [
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
];

/// Counters for what normalization swallowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeStats {
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped_missing_date: usize,
    /// Non-empty integer fields that fell back to 0.
    pub integer_fallbacks: usize,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizeOutput {
    pub records: Vec<CleanRecord>,
    pub stats: NormalizeStats,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize every row, dropping those whose date does not parse.
    pub fn normalize_all(&self, raws: Vec<RawRecord>) -> NormalizeOutput {
        let mut stats = NormalizeStats {
            rows_in: raws.len(),
            ..NormalizeStats::default()
        };
        let records: Vec<CleanRecord> = raws
            .iter()
            .filter_map(|raw| self.normalize_one(raw, &mut stats))
            .collect();
        stats.rows_out = records.len();

        info!(
            "Normalized {} of {} rows ({} without a usable date, {} integer fallbacks)",
            stats.rows_out, stats.rows_in, stats.dropped_missing_date, stats.integer_fallbacks
        );
        NormalizeOutput { records, stats }
    }

    pub fn normalize(&self, raw: &RawRecord) -> Option<CleanRecord> {
        self.normalize_one(raw, &mut NormalizeStats::default())
    }

    fn normalize_one(&self, raw: &RawRecord, stats: &mut NormalizeStats) -> Option<CleanRecord> {
        let date = match raw.get(Field::Date).and_then(parse_date) {
            Some(date) => date,
            None => {
                stats.dropped_missing_date += 1;
                debug!("Dropping row without a usable date");
                return None;
            }
        };

        let mut integer = |field: Field| -> i64 {
            match raw.get(field) {
                Some(cell) if !cell.is_empty() => parse_integer(cell).unwrap_or_else(|| {
                    stats.integer_fallbacks += 1;
                    0
                }),
                _ => 0,
            }
        };
        let order = integer(Field::Order);
        let participant_count = clamp_count(integer(Field::ParticipantCount));

        Some(CleanRecord {
            order,
            date,
            description: normalize_text(raw.get(Field::Description)),
            attendance_list: normalize_text(raw.get(Field::AttendanceList)),
            participant_count,
            kind: normalize_text(raw.get(Field::Type)),
        })
    }
}

/// Native date values pass through; text is read day-first. Anything else is `None`.
pub fn parse_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::DateTime(dt) => Some(dt.date()),
        Cell::Text(s) => parse_date_str(s),
        _ => None,
    }
}

pub fn parse_date_str(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Strips `.` thousands separators and reads `,` as the decimal mark, truncating.
pub fn parse_integer(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Int(i) => Some(*i),
        Cell::Float(f) if f.is_finite() => Some(f.trunc() as i64),
        Cell::Text(s) => {
            let cleaned = s.trim().replace('.', "").replace(',', ".");
            cleaned
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(|f| f.trunc() as i64)
        }
        _ => None,
    }
}

fn clamp_count(value: i64) -> u32 {
    value.clamp(0, u32::MAX as i64) as u32
}

/// Stringify, blank out the missing-value token, trim.
pub fn normalize_text(cell: Option<&Cell>) -> String {
    let text = match cell {
        None | Some(Cell::Empty) => return String::new(),
        Some(Cell::Float(f)) if f.is_nan() => return String::new(),
        Some(cell) => cell.to_string(),
    };
    let trimmed = text.trim();
    if trimmed == MISSING_TEXT_TOKEN {
        String::new()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn raw(date: Cell, count: Cell) -> RawRecord {
        RawRecord::new()
            .with(Field::Order, Cell::Int(7))
            .with(Field::Date, date)
            .with(Field::Description, text("  Oficina de trânsito "))
            .with(Field::AttendanceList, text("nan"))
            .with(Field::ParticipantCount, count)
            .with(Field::Type, text("Curso"))
    }

    #[test]
    fn test_day_first_dates() {
        assert_eq!(
            parse_date_str("05/03/2024"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(
            parse_date_str("2024-03-05"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(
            parse_date_str("31/12/2023 14:30:00"),
            NaiveDate::from_ymd_opt(2023, 12, 31)
        );
        assert_eq!(
            parse_date_str("05/03/24"),
            NaiveDate::from_ymd_opt(2024, 3, 5)
        );
        assert_eq!(parse_date_str("31/02/2024"), None);
        assert_eq!(parse_date_str("sem data"), None);
        assert_eq!(parse_date_str(""), None);
    }

    #[test]
    fn test_iso_datetimes_with_fractional_seconds() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5);
        assert_eq!(parse_date_str("2024-03-05T10:20:30.250"), expected);
        assert_eq!(parse_date_str("2024-03-05 10:20:30.5"), expected);
        assert_eq!(parse_date(&text("2024-03-05T10:20:30")), expected);
    }

    #[test]
    fn test_native_datetime_passes_through() {
        let dt = NaiveDate::from_ymd_opt(2024, 7, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert_eq!(parse_date(&Cell::DateTime(dt)), Some(dt.date()));
        assert_eq!(parse_date(&Cell::Int(45000)), None);
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(parse_integer(&text("1.234")), Some(1234));
        assert_eq!(parse_integer(&text("1.234,7")), Some(1234));
        assert_eq!(parse_integer(&text(" 42 ")), Some(42));
        assert_eq!(parse_integer(&Cell::Float(12.0)), Some(12));
        assert_eq!(parse_integer(&text("doze")), None);
        assert_eq!(parse_integer(&Cell::Empty), None);
    }

    #[test]
    fn test_text_cleaning() {
        assert_eq!(normalize_text(Some(&text("  a  "))), "a");
        assert_eq!(normalize_text(Some(&text("nan"))), "");
        assert_eq!(normalize_text(Some(&Cell::Float(f64::NAN))), "");
        assert_eq!(normalize_text(None), "");
        assert_eq!(normalize_text(Some(&Cell::Int(3))), "3");
    }

    #[test]
    fn test_record_normalization() {
        let record = RecordNormalizer::new()
            .normalize(&raw(text("10/04/2024"), text("1.500")))
            .unwrap();
        assert_eq!(record.order, 7);
        assert_eq!(record.date, NaiveDate::from_ymd_opt(2024, 4, 10).unwrap());
        assert_eq!(record.description, "Oficina de trânsito");
        assert_eq!(record.attendance_list, "");
        assert_eq!(record.participant_count, 1500);
        assert_eq!(record.kind, "Curso");
    }

    #[test]
    fn test_participant_count_never_negative() {
        let normalizer = RecordNormalizer::new();
        for count in [text("-5"), text("abc"), Cell::Empty, Cell::Float(-0.5)] {
            let record = normalizer
                .normalize(&raw(text("01/01/2024"), count))
                .unwrap();
            assert_eq!(record.participant_count, 0);
        }
    }

    #[test]
    fn test_rows_without_date_are_dropped_and_counted() {
        let output = RecordNormalizer::new().normalize_all(vec![
            raw(text("01/01/2024"), text("3")),
            raw(text("not a date"), text("x")),
            raw(Cell::Empty, text("4")),
            raw(text("02/01/2024"), text("??")),
        ]);
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.stats.rows_in, 4);
        assert_eq!(output.stats.rows_out, 2);
        assert_eq!(output.stats.dropped_missing_date, 2);
        assert_eq!(output.stats.integer_fallbacks, 1);
    }
}
