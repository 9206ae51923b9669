//! # Portfolio Aggregation
//!
//! $$
//! \mu_p = \mathbf{w}^\top\mu,\qquad
//! \Sigma_{ij} = \sigma_i \sigma_j \rho_{ij},\qquad
//! \sigma_p = \sqrt{\mathbf{w}^\top \Sigma \mathbf{w}}
//! $$
//!
//! Mean-variance summary of a weight vector.

use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;

use super::types::check_alignment;
use super::types::AssetProfiles;
use super::types::CorrelationMatrix;
use super::types::PortfolioSummary;
use super::types::PortfolioWeights;
use crate::error::AnalyticsError;

/// Covariance matrix from per-asset volatilities and a correlation matrix.
pub fn covariance_matrix(sigmas: &Array1<f64>, corr: &Array2<f64>) -> Array2<f64> {
  let n = sigmas.len();
  Array2::from_shape_fn((n, n), |(i, j)| sigmas[i] * sigmas[j] * corr[[i, j]])
}

pub fn portfolio_return(weights: &Array1<f64>, returns: &Array1<f64>) -> f64 {
  weights.dot(returns)
}

/// Portfolio variance `w' Σ w`, floored at 0 against rounding noise.
pub fn portfolio_variance(weights: &Array1<f64>, cov: &Array2<f64>) -> f64 {
  weights.dot(&cov.dot(weights)).max(0.0)
}

pub fn portfolio_risk(weights: &Array1<f64>, cov: &Array2<f64>) -> f64 {
  portfolio_variance(weights, cov).sqrt()
}

/// Risk-adjusted return for display; 0 at zero risk.
pub fn sharpe_ratio(expected_return: f64, volatility: f64, risk_free: f64) -> f64 {
  if volatility > 0.0 {
    (expected_return - risk_free) / volatility
  } else {
    0.0
  }
}

/// Summarize decimal weights against decimal returns and a covariance matrix.
pub fn summarize_decimal(
  weights: &Array1<f64>,
  returns: &Array1<f64>,
  cov: &Array2<f64>,
  risk_free: f64,
) -> PortfolioSummary {
  let expected_return = portfolio_return(weights, returns);
  let volatility = portfolio_risk(weights, cov);

  PortfolioSummary {
    expected_return,
    volatility,
    sharpe: sharpe_ratio(expected_return, volatility, risk_free),
  }
}

/// Decimal return and volatility vectors of aligned profiles.
pub(crate) fn profile_vectors(profiles: &AssetProfiles) -> (Array1<f64>, Array1<f64>) {
  let returns = profiles
    .values()
    .iter()
    .map(|p| p.annual_return / 100.0)
    .collect();
  let sigmas = profiles.values().iter().map(|p| p.risk / 100.0).collect();
  (returns, sigmas)
}

/// Weights, profiles and correlation must list the same assets in the same order.
pub(crate) fn check_inputs(
  weights: &PortfolioWeights,
  profiles: &AssetProfiles,
  corr: &CorrelationMatrix,
) -> Result<(), AnalyticsError> {
  check_alignment("weights", weights.ids(), "profiles", profiles.ids())?;
  check_alignment("profiles", profiles.ids(), "correlation matrix", corr.assets())
}

/// Portfolio return, risk and Sharpe ratio of percent weights under the mean-variance model.
///
/// Inputs are percent figures as stored in the portfolio table; the summary is in decimals.
pub fn summarize(
  weights: &PortfolioWeights,
  profiles: &AssetProfiles,
  corr: &CorrelationMatrix,
  risk_free: f64,
) -> Result<PortfolioSummary, AnalyticsError> {
  check_inputs(weights, profiles, corr)?;

  let w: Array1<f64> = weights.values().iter().map(|w| w / 100.0).collect();
  let (returns, sigmas) = profile_vectors(profiles);
  let cov = covariance_matrix(&sigmas, corr.values());
  let summary = summarize_decimal(&w, &returns, &cov, risk_free);

  debug!(
    expected_return = summary.expected_return,
    volatility = summary.volatility,
    sharpe = summary.sharpe,
    "portfolio summary"
  );
  Ok(summary)
}
