//! # Return Series
//!
//! $$
//! r_t = 100\cdot\frac{p_t - p_{t-1}}{p_{t-1}}
//! $$
//!
//! Percentage-change series from chronological price observations.

use tracing::debug;

use super::types::AssetReturns;
use super::types::ReturnSeries;
use crate::error::AnalyticsError;

/// Percentage change between consecutive prices.
///
/// An entry is `None` when either price is missing or the previous price is zero.
/// Fewer than two observations yield an empty series.
pub fn percentage_change_series(prices: &[Option<f64>]) -> ReturnSeries {
  if prices.len() < 2 {
    return ReturnSeries::default();
  }

  let changes = prices
    .windows(2)
    .map(|pair| match (pair[0], pair[1]) {
      (Some(prev), Some(curr)) if prev != 0.0 => Some((curr - prev) / prev * 100.0),
      _ => None,
    })
    .collect();

  ReturnSeries::new(changes)
}

/// Build the return series of every asset, keeping the input order.
pub fn percentage_change_table<'a, I>(prices: I) -> Result<AssetReturns, AnalyticsError>
where
  I: IntoIterator<Item = (&'a str, &'a [Option<f64>])>,
{
  let returns = AssetReturns::from_pairs(
    prices
      .into_iter()
      .map(|(id, series)| (id, percentage_change_series(series))),
  )?;

  debug!(assets = returns.len(), "built percentage change series");
  Ok(returns)
}
