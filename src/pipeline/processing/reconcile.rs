//! Reconciliation of the per-item products dataset (keyed by region code) with the
//! monthly deaths dataset (keyed by full region name) into one row per region.

use crate::constants::{DEATHS_REGION_NAME_COLUMN, MONTH_COLUMNS, PRODUCTS_REGION_COLUMN};
use crate::error::Result;
use crate::regions::RegionCode;
use crate::types::Table;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use tracing::{debug, info, warn};

/// Per-region aggregate keyed by the (still untyped) region code.
pub type RegionTotals = BTreeMap<String, f64>;

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Region-code column of source A.
    pub code_column: String,
    /// Region-name column of source B.
    pub name_column: String,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            code_column: PRODUCTS_REGION_COLUMN.to_string(),
            name_column: DEATHS_REGION_NAME_COLUMN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledRow {
    pub region_code: RegionCode,
    pub metric_a: f64,
    pub metric_b: f64,
    pub derived_rate: f64,
}

impl ReconciledRow {
    pub fn new(region_code: RegionCode, metric_a: f64, metric_b: f64) -> Self {
        Self {
            region_code,
            metric_a,
            metric_b,
            derived_rate: derived_rate(metric_a, metric_b),
        }
    }
}

/// `metric_b` per unit of `metric_a`; zero when there is no `metric_a`.
pub fn derived_rate(metric_a: f64, metric_b: f64) -> f64 {
    if metric_a > 0.0 {
        metric_b / metric_a
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileStats {
    /// Source A rows whose code is outside the valid set.
    pub rows_a_discarded: usize,
    /// Source B rows whose name has no canonical code.
    pub rows_b_unmapped: usize,
    /// Month columns of source B that were actually summed.
    pub month_columns_used: Vec<String>,
    /// Merged keys dropped for not being two characters long.
    pub invalid_keys_dropped: usize,
}

/// Reconciled rows, sorted by region code.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciledTable {
    pub rows: Vec<ReconciledRow>,
}

impl ReconciledTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn total_a(&self) -> f64 {
        self.rows.iter().map(|r| r.metric_a).sum()
    }

    pub fn total_b(&self) -> f64 {
        self.rows.iter().map(|r| r.metric_b).sum()
    }

    pub fn get(&self, code: &str) -> Option<&ReconciledRow> {
        self.rows.iter().find(|r| r.region_code.as_str() == code)
    }

    /// Keep only `selected` regions. An empty selection keeps everything.
    pub fn filter_regions(&self, selected: &[RegionCode]) -> ReconciledTable {
        if selected.is_empty() {
            return self.clone();
        }
        ReconciledTable {
            rows: self
                .rows
                .iter()
                .filter(|r| selected.contains(&r.region_code))
                .cloned()
                .collect(),
        }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        for row in &self.rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub table: ReconciledTable,
    pub stats: ReconcileStats,
    /// Both metric totals are zero: callers should show an empty state.
    pub insufficient_data: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    options: ReconcileOptions,
}

impl Reconciler {
    pub fn new(options: ReconcileOptions) -> Self {
        Self { options }
    }

    pub fn reconcile(&self, source_a: &Table, source_b: &Table) -> ReconcileOutcome {
        let mut stats = ReconcileStats::default();
        let metric_a = self.aggregate_codes(source_a, &mut stats);
        let metric_b = self.aggregate_named_months(source_b, &mut stats);

        let (table, dropped) = outer_join(&metric_a, &metric_b);
        stats.invalid_keys_dropped = dropped;

        let insufficient_data = table.is_empty() || (table.total_a() == 0.0 && table.total_b() == 0.0);
        if insufficient_data {
            warn!("Not enough data to reconcile: both metric totals are zero");
        }
        info!(
            "Reconciled {} regions ({} source A rows discarded, {} source B rows unmapped)",
            table.len(),
            stats.rows_a_discarded,
            stats.rows_b_unmapped
        );
        ReconcileOutcome {
            table,
            stats,
            insufficient_data,
        }
    }

    /// Count source A rows per canonical code, discarding codes outside the valid set.
    pub fn aggregate_codes(&self, source: &Table, stats: &mut ReconcileStats) -> RegionTotals {
        let mut totals = RegionTotals::new();
        let column = match source.column_index(&self.options.code_column) {
            Some(idx) => idx,
            None => {
                if !source.is_empty() {
                    warn!("Source A has no '{}' column", self.options.code_column);
                }
                return totals;
            }
        };

        for row in &source.rows {
            let raw = source.cell(row, column).to_string();
            match RegionCode::parse(&raw) {
                Some(code) => *totals.entry(code.as_str().to_string()).or_insert(0.0) += 1.0,
                None => {
                    stats.rows_a_discarded += 1;
                    debug!("Discarding source A row with region '{}'", raw);
                }
            }
        }
        totals
    }

    /// Sum the present month columns per row of source B, then per mapped region.
    pub fn aggregate_named_months(
        &self,
        source: &Table,
        stats: &mut ReconcileStats,
    ) -> RegionTotals {
        let mut totals = RegionTotals::new();
        let name_column = match source.column_index(&self.options.name_column) {
            Some(idx) => idx,
            None => {
                if !source.is_empty() {
                    warn!("Source B has no '{}' column", self.options.name_column);
                }
                return totals;
            }
        };

        let months = present_month_columns(source);
        stats.month_columns_used = months.iter().map(|(name, _)| name.to_string()).collect();
        if months.is_empty() && !source.is_empty() {
            warn!("Source B carries none of the month columns; totals will be zero");
        }

        for row in &source.rows {
            let name = source.cell(row, name_column).to_string();
            let Some(code) = RegionCode::from_name(&name) else {
                stats.rows_b_unmapped += 1;
                debug!("No region code for name '{}'", name);
                continue;
            };
            let row_total: f64 = months
                .iter()
                .map(|(_, idx)| source.cell(row, *idx).as_f64().unwrap_or(0.0))
                .sum();
            *totals.entry(code.as_str().to_string()).or_insert(0.0) += row_total;
        }
        totals
    }
}

/// The legal month columns that `source` actually has, with their positions.
fn present_month_columns(source: &Table) -> Vec<(&'static str, usize)> {
    MONTH_COLUMNS
        .iter()
        .filter_map(|name| source.column_index(name).map(|idx| (*name, idx)))
        .collect()
}

/// Full outer join on region code, zero-filling the absent side.
///
/// Keys that are not exactly two characters (or not valid codes) are dropped;
/// their count is returned alongside the table.
pub fn outer_join(metric_a: &RegionTotals, metric_b: &RegionTotals) -> (ReconciledTable, usize) {
    let keys: BTreeSet<&String> = metric_a.keys().chain(metric_b.keys()).collect();
    let mut dropped = 0;
    let mut rows = Vec::with_capacity(keys.len());

    for key in keys {
        let code = (key.chars().count() == 2)
            .then(|| RegionCode::parse(key))
            .flatten();
        let Some(code) = code else {
            dropped += 1;
            continue;
        };
        let a = metric_a.get(key).copied().unwrap_or(0.0);
        let b = metric_b.get(key).copied().unwrap_or(0.0);
        rows.push(ReconciledRow::new(code, a, b));
    }

    rows.sort_by(|x, y| x.region_code.cmp(&y.region_code));
    (ReconciledTable { rows }, dropped)
}
