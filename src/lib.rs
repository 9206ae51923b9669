//! # portfolio-rs
//!
//! $$
//! \max_{\mathbf{w}} \frac{\mathbf{w}^\top\mu - r_f}{\sqrt{\mathbf{w}^\top \Sigma \mathbf{w}}}
//! \quad \text{s.t.} \quad \mathbf{1}^\top\mathbf{w}=1,\ 0\le w_i\le w_{\max}
//! $$
//!
//! Risk/return analytics for a personal portfolio kept in flat CSV tables:
//! percentage-change series, Pearson correlations, annualized return and risk,
//! mean-variance aggregation and a constrained Sharpe-ratio optimizer.
//!
//! The numerical core lives in [`analytics`]; [`table`] reads and writes the
//! watchlist/portfolio/correlation tables and [`report`] renders comparisons.

pub mod analytics;
pub mod error;
pub mod report;
pub mod table;

pub use analytics::PortfolioEngine;
pub use analytics::PortfolioEngineConfig;
pub use error::AnalyticsError;
pub use error::SolverError;
pub use error::TableError;
