//! # Analytics
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Return series, correlations, annualized profiles, portfolio aggregation and
//! Sharpe optimization.

pub mod aggregate;
pub mod annualize;
pub mod correlation;
pub mod engine;
pub mod optimizer;
pub mod returns;
pub mod solver;
pub mod types;

pub use aggregate::covariance_matrix;
pub use aggregate::sharpe_ratio;
pub use aggregate::summarize;
pub use annualize::annualize;
pub use annualize::annualized_return;
pub use annualize::annualized_risk;
pub use correlation::correlation_matrix;
pub use correlation::pearson;
pub use engine::PortfolioAnalysis;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use optimizer::optimize_sharpe;
pub use optimizer::SharpeConfig;
pub use optimizer::SharpeObjective;
pub use returns::percentage_change_series;
pub use returns::percentage_change_table;
pub use types::Asset;
pub use types::AssetKind;
pub use types::AssetProfile;
pub use types::AssetProfiles;
pub use types::AssetReturns;
pub use types::CorrelationMatrix;
pub use types::OptimizationOutcome;
pub use types::OptimizationStatus;
pub use types::PortfolioSummary;
pub use types::PortfolioWeights;
pub use types::ReturnSeries;
