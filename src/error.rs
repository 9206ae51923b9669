//! # Errors
//!
//! Typed failures of the analytics core, the constrained solver and the table layer.
//! Insufficient data and degenerate statistics are not errors: they resolve locally
//! to documented sentinel values.

use thiserror::Error;

/// Failures that abort a single analytics call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalyticsError {
  /// Two inputs of the same pipeline run list assets in a different order.
  #[error("asset ordering mismatch between {left} {left_assets:?} and {right} {right_assets:?}")]
  Alignment {
    left: &'static str,
    left_assets: Vec<String>,
    right: &'static str,
    right_assets: Vec<String>,
  },
  /// Return series that must share one chronological index have different lengths.
  #[error("return series for {asset} has {found} entries, expected {expected}")]
  SeriesLength {
    asset: String,
    expected: usize,
    found: usize,
  },
  /// The same asset id appears twice in an ordered map.
  #[error("duplicate asset id {0}")]
  DuplicateAsset(String),
  /// A vector or matrix does not have one entry per asset.
  #[error("{what} has {found} entries for {expected} assets")]
  Dimension {
    what: &'static str,
    expected: usize,
    found: usize,
  },
  /// A configuration value is outside its admissible range.
  #[error("invalid {name}: {value}")]
  InvalidParameter { name: &'static str, value: f64 },
}

/// Reasons the constrained solver stops without a usable optimum.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
  #[error("infeasible constraints: {0}")]
  Infeasible(String),
  #[error("iteration limit of {max_iters} reached (stationarity {residual:.3e})")]
  IterationLimit { max_iters: u64, residual: f64 },
  #[error("constraint still violated by {violation:.3e} after {rounds} augmented Lagrangian rounds")]
  OuterLimit { rounds: usize, violation: f64 },
  #[error("objective is not finite at the starting point")]
  NonFiniteObjective,
  #[error("line search stalled (stationarity {residual:.3e})")]
  Stalled { residual: f64 },
  #[error("objective evaluation failed: {0}")]
  Objective(String),
}

/// Failures reading or writing the CSV tables.
#[derive(Debug, Error)]
pub enum TableError {
  #[error("{path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },
  #[error(transparent)]
  Csv(#[from] csv::Error),
  #[error("table is empty")]
  Empty,
  #[error("required column '{0}' not found in header")]
  MissingColumn(&'static str),
  #[error("unexpected header '{found}' at column {column}, expected '{expected}'")]
  Header {
    column: usize,
    expected: String,
    found: String,
  },
  #[error("asset {0} is not listed in the table")]
  UnknownAsset(String),
  #[error("asset {0} is already listed in the table")]
  AssetExists(String),
  #[error("row {row}, column '{column}': cannot parse '{value}'")]
  Parse {
    row: usize,
    column: String,
    value: String,
  },
  #[error(transparent)]
  Analytics(#[from] AnalyticsError),
}
