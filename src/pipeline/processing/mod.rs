// Pipeline processing: record normalization and cross-source reconciliation

pub mod normalize;
pub mod reconcile;

pub use normalize::{NormalizeOutput, NormalizeStats, RecordNormalizer};
pub use reconcile::{ReconcileOptions, ReconcileOutcome, ReconciledTable, Reconciler};
