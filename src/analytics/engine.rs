//! # Portfolio Engine
//!
//! $$
//! p \xrightarrow{\Delta\%} r \to (\rho,\ \mu,\ \sigma) \to (\mu_p,\ \sigma_p,\ \mathbf{w}^\*)
//! $$
//!
//! High-level orchestration of the analytics pipeline.

use tracing::info;
use tracing::warn;

use super::aggregate::summarize;
use super::annualize::annualize;
use super::correlation::correlation_matrix;
use super::optimizer::optimize_sharpe;
use super::optimizer::SharpeConfig;
use super::returns::percentage_change_table;
use super::types::AssetProfiles;
use super::types::AssetReturns;
use super::types::CorrelationMatrix;
use super::types::OptimizationOutcome;
use super::types::PortfolioSummary;
use super::types::PortfolioWeights;
use crate::error::AnalyticsError;

/// Runtime configuration for [`PortfolioEngine`].
#[derive(Clone, Debug, PartialEq)]
pub struct PortfolioEngineConfig {
  /// Decimal risk-free rate used for Sharpe ratios.
  pub risk_free: f64,
  /// Optional decimal floor on the optimized portfolio return.
  pub min_return: Option<f64>,
  /// Decimal cap on every optimized weight.
  pub max_weight: f64,
  /// Solver stationarity tolerance.
  pub tolerance: f64,
  /// Solver iteration budget.
  pub max_iters: u64,
}

impl Default for PortfolioEngineConfig {
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

impl PortfolioEngineConfig {
  pub fn sharpe(&self) -> SharpeConfig {
    SharpeConfig {
      risk_free: self.risk_free,
      min_return: self.min_return,
      max_weight: self.max_weight,
      tolerance: self.tolerance,
      max_iters: self.max_iters,
    }
  }
}

/// Everything one run produces. Each stage succeeds or fails on its own.
#[derive(Clone, Debug)]
pub struct PortfolioAnalysis {
  pub correlation: Result<CorrelationMatrix, AnalyticsError>,
  pub profiles: AssetProfiles,
  /// Metrics of the current weights.
  pub summary: Result<PortfolioSummary, AnalyticsError>,
  pub optimization: OptimizationOutcome,
}

/// Single entry point for the analytics pipeline.
#[derive(Clone, Debug, Default)]
pub struct PortfolioEngine {
  config: PortfolioEngineConfig,
}

impl PortfolioEngine {
  /// Construct a new engine with explicit configuration.
  pub fn new(config: PortfolioEngineConfig) -> Self {
    Self { config }
  }

  /// Borrow engine configuration.
  pub fn config(&self) -> &PortfolioEngineConfig {
    &self.config
  }

  /// Percentage-change series of chronological prices per asset.
  pub fn returns<'a, I>(&self, prices: I) -> Result<AssetReturns, AnalyticsError>
  where
    I: IntoIterator<Item = (&'a str, &'a [Option<f64>])>,
  {
    percentage_change_table(prices)
  }

  pub fn correlation(&self, returns: &AssetReturns) -> Result<CorrelationMatrix, AnalyticsError> {
    correlation_matrix(returns)
  }

  pub fn profiles(&self, returns: &AssetReturns) -> AssetProfiles {
    annualize(returns)
  }

  /// Metrics of percent weights at the configured risk-free rate.
  pub fn summarize(
    &self,
    weights: &PortfolioWeights,
    profiles: &AssetProfiles,
    corr: &CorrelationMatrix,
  ) -> Result<PortfolioSummary, AnalyticsError> {
    summarize(weights, profiles, corr, self.config.risk_free)
  }

  /// Maximum Sharpe allocation starting from `weights`; falls back to `weights` on failure.
  pub fn optimize(
    &self,
    weights: &PortfolioWeights,
    profiles: &AssetProfiles,
    corr: &CorrelationMatrix,
  ) -> OptimizationOutcome {
    optimize_sharpe(weights, profiles, corr, &self.config.sharpe())
  }

  /// Run correlation, annualization, aggregation and optimization over one snapshot.
  ///
  /// A failing stage never prevents the independent ones from reporting.
  pub fn analyze(&self, returns: &AssetReturns, weights: &PortfolioWeights) -> PortfolioAnalysis {
    let correlation = self.correlation(returns);
    let profiles = self.profiles(returns);

    let (summary, optimization) = match &correlation {
      Ok(corr) => (
        self.summarize(weights, &profiles, corr),
        self.optimize(weights, &profiles, corr),
      ),
      Err(err) => {
        warn!(%err, "correlation failed, skipping aggregation and optimization");
        (
          Err(err.clone()),
          OptimizationOutcome::failed(weights, err.to_string()),
        )
      }
    };

    if let Ok(summary) = &summary {
      info!(
        expected_return = summary.expected_return,
        volatility = summary.volatility,
        sharpe = summary.sharpe,
        "current portfolio"
      );
    }

    PortfolioAnalysis {
      correlation,
      profiles,
      summary,
      optimization,
    }
  }
}
