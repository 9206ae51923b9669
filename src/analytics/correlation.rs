//! # Correlation
//!
//! $$
//! \rho_{XY} = \frac{\sum_i (x_i-\bar x)(y_i-\bar y)}{\sqrt{\sum_i (x_i-\bar x)^2}\sqrt{\sum_i (y_i-\bar y)^2}}
//! $$
//!
//! Pearson correlation matrix of aligned return series.

use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use super::types::AssetReturns;
use super::types::CorrelationMatrix;
use crate::error::AnalyticsError;

fn sample_mean(xs: &[f64]) -> f64 {
  if xs.is_empty() {
    0.0
  } else {
    xs.iter().sum::<f64>() / xs.len() as f64
  }
}

fn is_constant(xs: &[f64]) -> bool {
  xs.windows(2).all(|pair| pair[0] == pair[1])
}

/// Pearson correlation of two equally long series.
///
/// Returns 0.0 for empty or unequal-length input and when either series has no variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
  let n = x.len();
  if n == 0 || n != y.len() || is_constant(x) || is_constant(y) {
    return 0.0;
  }

  let mx = sample_mean(x);
  let my = sample_mean(y);

  let mut cov = 0.0;
  let mut sx = 0.0;
  let mut sy = 0.0;

  for (&xi, &yi) in x.iter().zip(y.iter()) {
    let dx = xi - mx;
    let dy = yi - my;
    cov += dx * dy;
    sx += dx * dx;
    sy += dy * dy;
  }

  let denom = sx.sqrt() * sy.sqrt();
  if denom == 0.0 {
    0.0
  } else {
    (cov / denom).clamp(-1.0, 1.0)
  }
}

/// Correlation matrix over every pair of assets, labeled in input order.
///
/// Gaps are read as a zero return here. This is a simplifying approximation local to
/// this stage. All series must have the same length.
pub fn correlation_matrix(returns: &AssetReturns) -> Result<CorrelationMatrix, AnalyticsError> {
  let n = returns.len();
  let expected = returns.values().first().map(|s| s.len()).unwrap_or(0);

  for (id, series) in returns.iter() {
    if series.len() != expected {
      return Err(AnalyticsError::SeriesLength {
        asset: id.to_string(),
        expected,
        found: series.len(),
      });
    }
  }

  let filled: Vec<Vec<f64>> = returns.values().iter().map(|s| s.zero_filled()).collect();

  let upper: Vec<Vec<f64>> = (0..n)
    .into_par_iter()
    .map(|i| {
      ((i + 1)..n)
        .map(|j| pearson(&filled[i], &filled[j]))
        .collect()
    })
    .collect();

  let mut corr = Array2::<f64>::eye(n);
  for (i, row) in upper.iter().enumerate() {
    for (offset, &r) in row.iter().enumerate() {
      let j = i + 1 + offset;
      corr[[i, j]] = r;
      corr[[j, i]] = r;
    }
  }

  debug!(assets = n, periods = expected, "computed correlation matrix");
  CorrelationMatrix::new(returns.ids().to_vec(), corr)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use rand::rngs::StdRng;
  use rand::Rng;
  use rand::SeedableRng;

  use super::*;
  use crate::analytics::types::ReturnSeries;

  fn returns(pairs: Vec<(&str, Vec<Option<f64>>)>) -> AssetReturns {
    AssetReturns::from_pairs(
      pairs
        .into_iter()
        .map(|(id, v)| (id, ReturnSeries::new(v))),
    )
    .unwrap()
  }

  #[test]
  fn degenerate_series_correlate_to_zero() {
    assert_eq!(pearson(&[], &[]), 0.0);
    assert_eq!(pearson(&[1.0], &[2.0]), 0.0);
    assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]), 0.0);
    assert_eq!(pearson(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    // mean of 0.1s is not exactly 0.1, the deviations must not leak through
    assert_eq!(pearson(&[0.1, 0.1, 0.1], &[1.0, 2.0, 3.0]), 0.0);
  }

  #[test]
  fn tiny_variance_still_correlates() {
    assert_abs_diff_eq!(pearson(&[1e-9, 2e-9, 3e-9], &[1.0, 2.0, 3.0]), 1.0, epsilon = 1e-9);
    assert_abs_diff_eq!(pearson(&[1e-9, 2e-9, 3e-9], &[3.0, 2.0, 1.0]), -1.0, epsilon = 1e-9);
  }

  #[test]
  fn identical_series_are_fully_correlated() {
    let s = vec![Some(1.0), Some(-0.5), Some(2.0), Some(0.25)];
    let corr = correlation_matrix(&returns(vec![
      ("A", s.clone()),
      ("B", s.clone()),
      ("C", s),
    ]))
    .unwrap();

    for i in 0..3 {
      for j in 0..3 {
        assert_abs_diff_eq!(corr.get(i, j), 1.0, epsilon = 1e-12);
      }
    }
  }

  #[test]
  fn opposite_series_are_negatively_correlated() {
    let corr = correlation_matrix(&returns(vec![
      ("A", vec![Some(1.0), Some(2.0), Some(3.0)]),
      ("B", vec![Some(-1.0), Some(-2.0), Some(-3.0)]),
    ]))
    .unwrap();
    assert_abs_diff_eq!(corr.get(0, 1), -1.0, epsilon = 1e-12);
  }

  #[test]
  fn single_period_series_give_identity() {
    let corr = correlation_matrix(&returns(vec![
      ("A", vec![Some(1.0)]),
      ("B", vec![Some(3.0)]),
    ]))
    .unwrap();
    assert_eq!(corr.get(0, 1), 0.0);
    assert_eq!(corr.get(1, 0), 0.0);
    assert_eq!(corr.get(0, 0), 1.0);
  }

  #[test]
  fn gaps_are_zero_filled() {
    let corr = correlation_matrix(&returns(vec![
      ("A", vec![Some(1.0), None, Some(3.0)]),
      ("B", vec![Some(1.0), Some(0.0), Some(3.0)]),
    ]))
    .unwrap();
    assert_abs_diff_eq!(corr.get(0, 1), 1.0, epsilon = 1e-12);
  }

  #[test]
  fn mismatched_lengths_are_rejected() {
    let err = correlation_matrix(&returns(vec![
      ("A", vec![Some(1.0), Some(2.0)]),
      ("B", vec![Some(1.0)]),
    ]))
    .unwrap_err();
    assert!(matches!(err, AnalyticsError::SeriesLength { .. }));
  }

  #[test]
  fn random_matrices_are_symmetric_with_unit_diagonal() {
    let mut rng = StdRng::seed_from_u64(42);
    let pairs: Vec<(String, ReturnSeries)> = (0..6)
      .map(|k| {
        let series = (0..120)
          .map(|_| {
            if rng.random_bool(0.1) {
              None
            } else {
              Some(rng.random_range(-3.0..3.0))
            }
          })
          .collect::<Vec<_>>();
        (format!("asset-{k}"), ReturnSeries::new(series))
      })
      .collect();
    let corr = correlation_matrix(&AssetReturns::from_pairs(pairs).unwrap()).unwrap();

    for i in 0..corr.len() {
      assert_eq!(corr.get(i, i), 1.0);
      for j in 0..corr.len() {
        assert_eq!(corr.get(i, j), corr.get(j, i));
        assert!(corr.get(i, j).abs() <= 1.0);
      }
    }
  }

  #[test]
  fn labels_follow_input_order() {
    let corr = correlation_matrix(&returns(vec![
      ("Z", vec![Some(1.0), Some(2.0)]),
      ("A", vec![Some(2.0), Some(1.0)]),
    ]))
    .unwrap();
    assert_eq!(corr.assets(), ["Z", "A"]);
  }
}
