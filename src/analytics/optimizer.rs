//! # Sharpe Optimizer
//!
//! $$
//! \mathbf{w}^\*=\arg\max_{\mathbf{w}\in\mathcal S}\frac{\mu^\top\mathbf{w}-r_f}{\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}}
//! \quad\text{s.t.}\quad \mu^\top\mathbf{w}\ge R_{\min}
//! $$
//!
//! Long-only maximum Sharpe allocation with a per-asset cap and an optional return floor.

use argmin::core::CostFunction;
use argmin::core::Gradient;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use tracing::info;
use tracing::warn;

use super::aggregate::check_inputs;
use super::aggregate::covariance_matrix;
use super::aggregate::profile_vectors;
use super::aggregate::summarize_decimal;
use super::solver::minimize;
use super::solver::CappedSimplex;
use super::solver::LinearConstraint;
use super::solver::SolverConfig;
use super::types::AssetProfiles;
use super::types::CorrelationMatrix;
use super::types::OptimizationOutcome;
use super::types::OptimizationStatus;
use super::types::PortfolioWeights;
use crate::error::AnalyticsError;

/// Negative Sharpe ratio of decimal weights.
///
/// Evaluates to `-inf` at zero portfolio risk so that such points are never accepted.
#[derive(Clone, Debug)]
pub struct SharpeObjective {
  returns: Array1<f64>,
  cov: Array2<f64>,
  risk_free: f64,
}

impl SharpeObjective {
  pub fn new(returns: Array1<f64>, cov: Array2<f64>, risk_free: f64) -> Self {
    Self {
      returns,
      cov,
      risk_free,
    }
  }

  fn moments(&self, w: &[f64]) -> (f64, Array1<f64>, f64) {
    let w = ArrayView1::from(w);
    let excess = w.dot(&self.returns) - self.risk_free;
    let cov_w = self.cov.dot(&w);
    let risk = w.dot(&cov_w).max(0.0).sqrt();
    (excess, cov_w, risk)
  }
}

impl CostFunction for SharpeObjective {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, w: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
    let (excess, _, risk) = self.moments(w);
    if risk == 0.0 {
      return Ok(f64::NEG_INFINITY);
    }
    Ok(-excess / risk)
  }
}

impl Gradient for SharpeObjective {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(&self, w: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
    let (excess, cov_w, risk) = self.moments(w);
    if risk == 0.0 {
      return Ok(vec![f64::NAN; w.len()]);
    }
    let risk3 = risk * risk * risk;
    Ok(
      self
        .returns
        .iter()
        .zip(cov_w.iter())
        .map(|(mu, sw)| -mu / risk + excess * sw / risk3)
        .collect(),
    )
  }
}

/// Parameters of [`optimize_sharpe`].
#[derive(Clone, Debug, PartialEq)]
pub struct SharpeConfig {
  /// Decimal risk-free rate.
  pub risk_free: f64,
  /// Decimal floor on the expected portfolio return.
  pub min_return: Option<f64>,
  /// Decimal cap on every weight, in `(0, 1]`.
  pub max_weight: f64,
  pub tolerance: f64,
  pub max_iters: u64,
}

impl Default for SharpeConfig {
  fn default() -> Self {
    Self {
      risk_free: 0.0167,
      min_return: None,
      max_weight: 1.0,
      tolerance: 1e-6,
      max_iters: 5000,
    }
  }
}

impl SharpeConfig {
  fn validate(&self) -> Result<(), AnalyticsError> {
    if !(self.max_weight > 0.0 && self.max_weight <= 1.0) {
      return Err(AnalyticsError::InvalidParameter {
        name: "max_weight",
        value: self.max_weight,
      });
    }
    if !self.risk_free.is_finite() {
      return Err(AnalyticsError::InvalidParameter {
        name: "risk_free",
        value: self.risk_free,
      });
    }
    if let Some(min_return) = self.min_return.filter(|r| !r.is_finite()) {
      return Err(AnalyticsError::InvalidParameter {
        name: "min_return",
        value: min_return,
      });
    }
    if !(self.tolerance > 0.0) {
      return Err(AnalyticsError::InvalidParameter {
        name: "tolerance",
        value: self.tolerance,
      });
    }
    Ok(())
  }
}

/// Search for the long-only, capped allocation with the highest Sharpe ratio.
///
/// `current` (percent) is the starting point. Any failure leaves it untouched in the
/// returned outcome together with a reason; this function never panics on bad input.
pub fn optimize_sharpe(
  current: &PortfolioWeights,
  profiles: &AssetProfiles,
  corr: &CorrelationMatrix,
  config: &SharpeConfig,
) -> OptimizationOutcome {
  if current.is_empty() && profiles.is_empty() {
    warn!("no assets to optimize");
    return OptimizationOutcome::failed(current, "no assets to optimize");
  }
  if let Err(err) = check_inputs(current, profiles, corr).and_then(|_| config.validate()) {
    warn!(%err, "optimization rejected, keeping original weights");
    return OptimizationOutcome::failed(current, err.to_string());
  }

  let (returns, sigmas) = profile_vectors(profiles);
  let cov = covariance_matrix(&sigmas, corr.values());
  let objective = SharpeObjective::new(returns.clone(), cov.clone(), config.risk_free);

  let start: Vec<f64> = current.values().iter().map(|w| w / 100.0).collect();
  let set = CappedSimplex::new(config.max_weight);
  let floor = config
    .min_return
    .map(|level| LinearConstraint::new(returns.to_vec(), level));
  let solver = SolverConfig {
    tolerance: config.tolerance,
    max_iters: config.max_iters,
    ..SolverConfig::default()
  };

  match minimize(&objective, &set, floor.as_ref(), &start, &solver) {
    Ok(solution) => {
      let summary = summarize_decimal(
        &Array1::from(solution.param.clone()),
        &returns,
        &cov,
        config.risk_free,
      );
      info!(
        iterations = solution.iterations,
        sharpe = summary.sharpe,
        expected_return = summary.expected_return,
        volatility = summary.volatility,
        "optimization converged"
      );

      OptimizationOutcome {
        weights: current.with_values(solution.param.iter().map(|w| w * 100.0).collect()),
        status: OptimizationStatus::Converged {
          iterations: solution.iterations,
        },
        summary: Some(summary),
      }
    }
    Err(err) => {
      warn!(%err, "optimization failed, keeping original weights");
      OptimizationOutcome::failed(current, err.to_string())
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::analytics::aggregate::summarize;
  use crate::analytics::types::AssetProfile;

  fn uncorrelated_pair() -> (PortfolioWeights, AssetProfiles, CorrelationMatrix) {
    let weights = PortfolioWeights::from_pairs([("A", 50.0), ("B", 50.0)]).unwrap();
    let profiles = AssetProfiles::from_pairs([
      ("A", AssetProfile::new(10.0, 20.0)),
      ("B", AssetProfile::new(5.0, 10.0)),
    ])
    .unwrap();
    let corr = CorrelationMatrix::new(
      vec!["A".into(), "B".into()],
      array![[1.0, 0.0], [0.0, 1.0]],
    )
    .unwrap();
    (weights, profiles, corr)
  }

  fn three_assets() -> (PortfolioWeights, AssetProfiles, CorrelationMatrix) {
    let weights = PortfolioWeights::from_pairs([("A", 20.0), ("B", 30.0), ("C", 50.0)]).unwrap();
    let profiles = AssetProfiles::from_pairs([
      ("A", AssetProfile::new(12.0, 25.0)),
      ("B", AssetProfile::new(7.0, 12.0)),
      ("C", AssetProfile::new(3.0, 4.0)),
    ])
    .unwrap();
    let corr = CorrelationMatrix::new(
      vec!["A".into(), "B".into(), "C".into()],
      array![[1.0, 0.4, -0.1], [0.4, 1.0, 0.2], [-0.1, 0.2, 1.0]],
    )
    .unwrap();
    (weights, profiles, corr)
  }

  fn config(risk_free: f64) -> SharpeConfig {
    SharpeConfig {
      risk_free,
      ..SharpeConfig::default()
    }
  }

  fn assert_feasible(outcome: &OptimizationOutcome, max_weight: f64) {
    let total: f64 = outcome.weights.values().iter().sum();
    assert_abs_diff_eq!(total, 100.0, epsilon = 1e-3);
    for &w in outcome.weights.values() {
      assert!(w >= -1e-9 && w <= max_weight * 100.0 + 1e-9, "weight {w} out of bounds");
    }
  }

  #[test]
  fn finds_the_tangency_portfolio() {
    // uncorrelated: w ∝ Σ⁻¹(μ - rf) = [0.08 / 0.04, 0.03 / 0.01] = [2, 3]
    let (weights, profiles, corr) = uncorrelated_pair();
    let outcome = optimize_sharpe(&weights, &profiles, &corr, &config(0.02));

    assert!(outcome.is_success(), "{:?}", outcome.status);
    assert_feasible(&outcome, 1.0);
    assert_abs_diff_eq!(outcome.weights.values()[0], 40.0, epsilon = 1e-2);
    assert_abs_diff_eq!(outcome.weights.values()[1], 60.0, epsilon = 1e-2);
  }

  #[test]
  fn respects_the_weight_cap() {
    let (weights, profiles, corr) = uncorrelated_pair();
    let cfg = SharpeConfig {
      max_weight: 0.55,
      ..config(0.02)
    };
    let outcome = optimize_sharpe(&weights, &profiles, &corr, &cfg);

    assert!(outcome.is_success(), "{:?}", outcome.status);
    assert_feasible(&outcome, 0.55);
    assert_abs_diff_eq!(outcome.weights.values()[1], 55.0, epsilon = 1e-2);
  }

  #[test]
  fn respects_the_return_floor() {
    let (weights, profiles, corr) = uncorrelated_pair();
    let cfg = SharpeConfig {
      min_return: Some(0.08),
      ..config(0.02)
    };
    let outcome = optimize_sharpe(&weights, &profiles, &corr, &cfg);

    assert!(outcome.is_success(), "{:?}", outcome.status);
    assert_feasible(&outcome, 1.0);
    let summary = outcome.summary.unwrap();
    assert!(summary.expected_return >= 0.08 - 1e-6);
    assert_abs_diff_eq!(outcome.weights.values()[0], 60.0, epsilon = 1e-1);
  }

  #[test]
  fn improves_on_the_starting_allocation() {
    let (weights, profiles, corr) = three_assets();
    let before = summarize(&weights, &profiles, &corr, 0.0167).unwrap();
    let cfg = SharpeConfig {
      max_weight: 0.6,
      ..config(0.0167)
    };
    let outcome = optimize_sharpe(&weights, &profiles, &corr, &cfg);

    assert!(outcome.is_success(), "{:?}", outcome.status);
    assert_feasible(&outcome, 0.6);
    let after = outcome.summary.unwrap();
    assert!(after.sharpe >= before.sharpe - 1e-9);
    assert_eq!(outcome.weights.ids(), weights.ids());
  }

  #[test]
  fn single_asset_stays_fully_allocated() {
    let weights = PortfolioWeights::from_pairs([("A", 100.0)]).unwrap();
    let profiles = AssetProfiles::from_pairs([("A", AssetProfile::new(8.0, 15.0))]).unwrap();
    let corr = CorrelationMatrix::new(vec!["A".into()], array![[1.0]]).unwrap();

    for rf in [0.0, 0.0167, 0.05, 0.2] {
      let outcome = optimize_sharpe(&weights, &profiles, &corr, &config(rf));
      assert!(outcome.is_success(), "{:?}", outcome.status);
      assert_abs_diff_eq!(outcome.weights.values()[0], 100.0, epsilon = 1e-9);
    }
  }

  #[test]
  fn infeasible_cap_keeps_original_weights() {
    let (weights, profiles, corr) = three_assets();
    let cfg = SharpeConfig {
      max_weight: 0.3,
      ..config(0.0167)
    };
    let outcome = optimize_sharpe(&weights, &profiles, &corr, &cfg);

    assert!(!outcome.is_success());
    assert_eq!(outcome.weights, weights);
    assert!(outcome.summary.is_none());
    assert!(!outcome.failure_reason().unwrap().is_empty());
  }

  #[test]
  fn unattainable_return_floor_keeps_original_weights() {
    let (weights, profiles, corr) = uncorrelated_pair();
    let cfg = SharpeConfig {
      min_return: Some(0.2),
      ..config(0.02)
    };
    let outcome = optimize_sharpe(&weights, &profiles, &corr, &cfg);

    assert!(!outcome.is_success());
    assert_eq!(outcome.weights, weights);
  }

  #[test]
  fn misaligned_inputs_keep_original_weights() {
    let (weights, profiles, _) = uncorrelated_pair();
    let swapped = CorrelationMatrix::new(
      vec!["B".into(), "A".into()],
      array![[1.0, 0.0], [0.0, 1.0]],
    )
    .unwrap();
    let outcome = optimize_sharpe(&weights, &profiles, &swapped, &config(0.02));

    assert!(!outcome.is_success());
    assert_eq!(outcome.weights, weights);
    assert!(!outcome.failure_reason().unwrap().is_empty());
  }

  #[test]
  fn empty_input_is_returned_unchanged() {
    let outcome = optimize_sharpe(
      &PortfolioWeights::default(),
      &AssetProfiles::default(),
      &CorrelationMatrix::new(Vec::new(), Array2::zeros((0, 0))).unwrap(),
      &SharpeConfig::default(),
    );
    assert!(outcome.weights.is_empty());
    assert!(outcome.failure_reason().is_some());
  }

  #[test]
  fn riskless_start_fails_softly() {
    let weights = PortfolioWeights::from_pairs([("A", 100.0), ("B", 0.0)]).unwrap();
    let profiles = AssetProfiles::from_pairs([
      ("A", AssetProfile::new(3.0, 0.0)),
      ("B", AssetProfile::new(8.0, 20.0)),
    ])
    .unwrap();
    let corr = CorrelationMatrix::new(
      vec!["A".into(), "B".into()],
      array![[1.0, 0.0], [0.0, 1.0]],
    )
    .unwrap();
    let outcome = optimize_sharpe(&weights, &profiles, &corr, &config(0.0167));

    assert!(!outcome.is_success());
    assert_eq!(outcome.weights, weights);
  }

  #[test]
  fn rejects_out_of_range_cap() {
    let (weights, profiles, corr) = uncorrelated_pair();
    for max_weight in [0.0, -0.5, 1.5, f64::NAN] {
      let cfg = SharpeConfig {
        max_weight,
        ..SharpeConfig::default()
      };
      let outcome = optimize_sharpe(&weights, &profiles, &corr, &cfg);
      assert!(!outcome.is_success());
      assert_eq!(outcome.weights, weights);
    }
  }

  #[test]
  fn gradient_matches_finite_differences() {
    let (_, profiles, corr) = three_assets();
    let (returns, sigmas) = profile_vectors(&profiles);
    let objective = SharpeObjective::new(returns, covariance_matrix(&sigmas, corr.values()), 0.01);
    let w = vec![0.2, 0.3, 0.5];
    let grad = objective.gradient(&w).unwrap();

    let h = 1e-7;
    for i in 0..3 {
      let mut up = w.clone();
      let mut down = w.clone();
      up[i] += h;
      down[i] -= h;
      let numeric = (objective.cost(&up).unwrap() - objective.cost(&down).unwrap()) / (2.0 * h);
      assert_abs_diff_eq!(grad[i], numeric, epsilon = 1e-5);
    }
  }
}
