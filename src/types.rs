use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single untyped cell value, as read from a workbook or a store query.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the cell. Text is parsed after trimming; anything else is `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) if f.is_finite() => Some(*f),
            Cell::Text(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
            Cell::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            Cell::Int(i) => write!(f, "{i}"),
            Cell::Float(v) if v.is_nan() => f.write_str("nan"),
            Cell::Float(v) if v.fract() == 0.0 && v.abs() < 1e15 => write!(f, "{v:.1}"),
            Cell::Float(v) => write!(f, "{v}"),
            Cell::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Internal field names of the training-event entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Order,
    Date,
    Description,
    AttendanceList,
    ParticipantCount,
    Type,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Order,
        Field::Date,
        Field::Description,
        Field::AttendanceList,
        Field::ParticipantCount,
        Field::Type,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Order => "order",
            Field::Date => "date",
            Field::Description => "description",
            Field::AttendanceList => "attendance_list",
            Field::ParticipantCount => "participant_count",
            Field::Type => "type",
        }
    }
}

/// Row as read from the source sheet, keyed by internal field name.
///
/// Only mapped columns are present; a field missing from the sheet is simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: HashMap<Field, Cell>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, cell: Cell) -> Self {
        self.fields.insert(field, cell);
        self
    }

    pub fn insert(&mut self, field: Field, cell: Cell) {
        self.fields.insert(field, cell);
    }

    pub fn get(&self, field: Field) -> Option<&Cell> {
        self.fields.get(&field)
    }

    /// True when every mapped column of the row is empty.
    pub fn is_blank(&self) -> bool {
        self.fields.values().all(Cell::is_empty)
    }
}

/// A normalized training-event record, ready for the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub order: i64,
    pub date: NaiveDate,
    pub description: String,
    pub attendance_list: String,
    pub participant_count: u32,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Column-oriented tabular dataset returned by the query layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, row: Vec<Cell>) {
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `(row, column)`; short rows read as empty.
    pub fn cell<'a>(&'a self, row: &'a [Cell], column: usize) -> &'a Cell {
        const EMPTY: &Cell = &Cell::Empty;
        row.get(column).unwrap_or(EMPTY)
    }
}
