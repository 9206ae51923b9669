//! # Annualization
//!
//! $$
//! R_{\text{ann}} = \Big(\prod_{i}(1+r_i)\Big)^{252/n} - 1,\qquad
//! \sigma_{\text{ann}} = \sqrt{252}\,\sqrt{\tfrac{1}{n-1}\textstyle\sum_i (r_i-\bar r)^2}
//! $$
//!
//! Compound annual return and annualized volatility of a daily return series.
//!
//! Gap policy: an undefined entry compounds as a flat period but is left out of the
//! exponent base `n`, which counts observed entries only. This mixes "no observation"
//! with "zero return" for compounding and is kept as a known modeling approximation.

use rayon::prelude::*;
use statrs::statistics::Statistics;
use tracing::debug;

use super::types::AssetProfile;
use super::types::AssetProfiles;
use super::types::AssetReturns;
use super::types::ReturnSeries;
use super::types::TRADING_DAYS_PER_YEAR;

/// Compound annual return in percent; 0 when the series has no observation.
pub fn annualized_return(series: &ReturnSeries) -> f64 {
  let n_defined = series.defined_count();
  if n_defined == 0 {
    return 0.0;
  }

  let growth: f64 = series
    .values()
    .iter()
    .map(|r| 1.0 + r.unwrap_or(0.0) / 100.0)
    .product();

  (growth.max(0.0).powf(TRADING_DAYS_PER_YEAR / n_defined as f64) - 1.0) * 100.0
}

/// Annualized sample standard deviation in percent; 0 below two observations.
pub fn annualized_risk(series: &ReturnSeries) -> f64 {
  let decimals: Vec<f64> = series.defined().map(|r| r / 100.0).collect();
  if decimals.len() < 2 {
    return 0.0;
  }

  decimals.iter().std_dev() * TRADING_DAYS_PER_YEAR.sqrt() * 100.0
}

/// Annual return and risk of one series.
pub fn asset_profile(series: &ReturnSeries) -> AssetProfile {
  AssetProfile::new(annualized_return(series), annualized_risk(series))
}

/// Profiles of every asset, in input order. Assets are estimated independently.
pub fn annualize(returns: &AssetReturns) -> AssetProfiles {
  let profiles: Vec<AssetProfile> = returns.values().par_iter().map(asset_profile).collect();

  for ((id, series), profile) in returns.iter().zip(profiles.iter()) {
    if series.defined_count() < 2 {
      debug!(
        asset = id,
        observations = series.defined_count(),
        "insufficient data for risk, defaulting to 0"
      );
    }
    debug!(
      asset = id,
      annual_return = profile.annual_return,
      risk = profile.risk,
      "annualized"
    );
  }

  returns.with_values(profiles)
}
