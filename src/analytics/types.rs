//! # Portfolio Types
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}} \frac{\mathbb E[R_p]-r_f}{\sigma_p}
//! $$
//!
//! Asset-keyed containers shared by every pipeline stage, plus result types.

use std::fmt::Display;

use impl_new_derive::ImplNew;
use ndarray::Array2;

use crate::error::AnalyticsError;

/// Trading periods per year used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Category tag of an instrument.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AssetKind {
  Fund,
  Stock,
  /// Any other tag, kept verbatim so tables round-trip.
  Other(String),
  #[default]
  Unspecified,
}

impl AssetKind {
  /// Parse the `type` column of the watchlist/portfolio tables.
  pub fn from_tag(tag: &str) -> Self {
    match tag.trim() {
      "fund" => Self::Fund,
      "stock" => Self::Stock,
      "" => Self::Unspecified,
      other => Self::Other(other.to_string()),
    }
  }

  pub fn as_tag(&self) -> &str {
    match self {
      Self::Fund => "fund",
      Self::Stock => "stock",
      Self::Other(tag) => tag,
      Self::Unspecified => "",
    }
  }
}

impl Display for AssetKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_tag())
  }
}

/// An instrument of the watchlist.
#[derive(ImplNew, Clone, Debug, Default, PartialEq, Eq)]
pub struct Asset {
  /// Unique identifier (ticker or fund code).
  pub id: String,
  /// Display name.
  pub name: String,
  /// Category tag.
  pub kind: AssetKind,
}

/// Period-over-period percentage changes of one asset.
///
/// `None` marks a gap (missing or zero previous price). It is a "no signal" value and
/// each consumer decides explicitly how to treat it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReturnSeries(Vec<Option<f64>>);

impl ReturnSeries {
  pub fn new(values: Vec<Option<f64>>) -> Self {
    Self(values)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// All entries, gaps included, in chronological order.
  pub fn values(&self) -> &[Option<f64>] {
    &self.0
  }

  /// Entries with an actual observation.
  pub fn defined(&self) -> impl Iterator<Item = f64> + '_ {
    self.0.iter().flatten().copied()
  }

  pub fn defined_count(&self) -> usize {
    self.0.iter().filter(|v| v.is_some()).count()
  }

  /// Entries with gaps replaced by a zero return.
  pub fn zero_filled(&self) -> Vec<f64> {
    self.0.iter().map(|v| v.unwrap_or(0.0)).collect()
  }
}

impl From<Vec<Option<f64>>> for ReturnSeries {
  fn from(values: Vec<Option<f64>>) -> Self {
    Self(values)
  }
}

impl From<Vec<f64>> for ReturnSeries {
  fn from(values: Vec<f64>) -> Self {
    Self(values.into_iter().map(Some).collect())
  }
}

/// Insertion-ordered map from asset id to a per-asset value.
///
/// Ordering is part of the contract: every stage of one run must see the same order.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetMap<T> {
  ids: Vec<String>,
  values: Vec<T>,
}

impl<T> Default for AssetMap<T> {
  fn default() -> Self {
    Self {
      ids: Vec::new(),
      values: Vec::new(),
    }
  }
}

impl<T> AssetMap<T> {
  /// Build from `(id, value)` pairs, rejecting duplicate ids.
  pub fn from_pairs<I, S>(pairs: I) -> Result<Self, AnalyticsError>
  where
    I: IntoIterator<Item = (S, T)>,
    S: Into<String>,
  {
    let mut map = Self::default();
    for (id, value) in pairs {
      map.push(id, value)?;
    }
    Ok(map)
  }

  /// Append one entry, rejecting a duplicate id.
  pub fn push(&mut self, id: impl Into<String>, value: T) -> Result<(), AnalyticsError> {
    let id = id.into();
    if self.ids.contains(&id) {
      return Err(AnalyticsError::DuplicateAsset(id));
    }
    self.ids.push(id);
    self.values.push(value);
    Ok(())
  }

  pub fn ids(&self) -> &[String] {
    &self.ids
  }

  pub fn values(&self) -> &[T] {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  pub fn get(&self, id: &str) -> Option<&T> {
    self
      .ids
      .iter()
      .position(|x| x == id)
      .map(|idx| &self.values[idx])
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
    self
      .ids
      .iter()
      .map(String::as_str)
      .zip(self.values.iter())
  }

  /// Pair ids with already computed values, in the same order.
  pub(crate) fn with_values<U>(&self, values: Vec<U>) -> AssetMap<U> {
    debug_assert_eq!(values.len(), self.ids.len());
    AssetMap {
      ids: self.ids.clone(),
      values,
    }
  }
}

/// Return series per asset, all on the same chronological index.
pub type AssetReturns = AssetMap<ReturnSeries>;

/// Annualized profile per asset.
pub type AssetProfiles = AssetMap<AssetProfile>;

/// Portfolio allocation per asset, in percent (sums to ~100).
pub type PortfolioWeights = AssetMap<f64>;

/// Fail unless two asset orderings are identical.
pub fn check_alignment(
  left: &'static str,
  left_ids: &[String],
  right: &'static str,
  right_ids: &[String],
) -> Result<(), AnalyticsError> {
  if left_ids == right_ids {
    Ok(())
  } else {
    Err(AnalyticsError::Alignment {
      left,
      left_assets: left_ids.to_vec(),
      right,
      right_assets: right_ids.to_vec(),
    })
  }
}

/// Annualized return and risk of one asset, both in percent.
#[derive(ImplNew, Clone, Copy, Debug, Default, PartialEq)]
pub struct AssetProfile {
  /// Compound annual return in percent.
  pub annual_return: f64,
  /// Annualized standard deviation in percent.
  pub risk: f64,
}

/// Labeled square matrix of pairwise Pearson correlations.
#[derive(Clone, Debug, PartialEq)]
pub struct CorrelationMatrix {
  assets: Vec<String>,
  values: Array2<f64>,
}

impl CorrelationMatrix {
  /// Wrap a square matrix with its row/column labels.
  pub fn new(assets: Vec<String>, values: Array2<f64>) -> Result<Self, AnalyticsError> {
    let n = assets.len();
    if values.nrows() != n || values.ncols() != n {
      return Err(AnalyticsError::Dimension {
        what: "correlation matrix",
        expected: n,
        found: values.nrows().max(values.ncols()),
      });
    }
    Ok(Self { assets, values })
  }

  /// Row/column labels.
  pub fn assets(&self) -> &[String] {
    &self.assets
  }

  pub fn values(&self) -> &Array2<f64> {
    &self.values
  }

  pub fn len(&self) -> usize {
    self.assets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.assets.is_empty()
  }

  pub fn get(&self, i: usize, j: usize) -> f64 {
    self.values[[i, j]]
  }
}

/// Scalar summary of a weight vector under the mean-variance model.
///
/// All figures are decimals: `0.075` means 7.5%.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PortfolioSummary {
  /// Weighted sum of asset returns.
  pub expected_return: f64,
  /// Portfolio standard deviation.
  pub volatility: f64,
  /// Sharpe ratio computed as `(expected_return - risk_free) / volatility`, 0 at zero risk.
  pub sharpe: f64,
}

/// Terminal state of an optimization request.
#[derive(Clone, Debug, PartialEq)]
pub enum OptimizationStatus {
  Converged { iterations: u64 },
  Failed { reason: String },
}

/// Output of [`crate::analytics::optimize_sharpe`].
///
/// On failure `weights` holds the original allocation, untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationOutcome {
  /// Weights in percent, summing to 100 on success.
  pub weights: PortfolioWeights,
  pub status: OptimizationStatus,
  /// Achieved portfolio metrics, only on success.
  pub summary: Option<PortfolioSummary>,
}

impl OptimizationOutcome {
  pub(crate) fn failed(original: &PortfolioWeights, reason: impl Into<String>) -> Self {
    Self {
      weights: original.clone(),
      status: OptimizationStatus::Failed {
        reason: reason.into(),
      },
      summary: None,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self.status, OptimizationStatus::Converged { .. })
  }

  /// Human-readable failure reason, if any.
  pub fn failure_reason(&self) -> Option<&str> {
    match &self.status {
      OptimizationStatus::Failed { reason } => Some(reason),
      OptimizationStatus::Converged { .. } => None,
    }
  }
}
