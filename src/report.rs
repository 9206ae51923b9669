//! # Report
//!
//! Plain-text tables comparing the current and the optimized allocation.

use prettytable::format::consts::FORMAT_NO_LINESEP_WITH_TITLE;
use prettytable::row;
use prettytable::Table;

use crate::analytics::types::AssetProfiles;
use crate::analytics::types::OptimizationOutcome;
use crate::analytics::types::PortfolioSummary;
use crate::analytics::types::PortfolioWeights;

fn table() -> Table {
  let mut table = Table::new();
  table.set_format(*FORMAT_NO_LINESEP_WITH_TITLE);
  table
}

/// Original vs. optimized weight per asset, in percent.
pub fn weight_table(original: &PortfolioWeights, optimized: &PortfolioWeights) -> Table {
  let mut table = table();
  table.set_titles(row!["Asset", r->"Original (%)", r->"Optimized (%)"]);
  for (id, before) in original.iter() {
    let after = optimized.get(id).copied().unwrap_or(*before);
    table.add_row(row![id, r->format!("{before:.2}"), r->format!("{after:.2}")]);
  }
  table
}

/// Return, risk and Sharpe ratio of the current portfolio and, when available, of the
/// optimized one.
pub fn metrics_table(original: &PortfolioSummary, optimized: Option<&PortfolioSummary>) -> Table {
  let mut table = table();
  match optimized {
    Some(opt) => {
      table.set_titles(row!["Metric", r->"Original", r->"Optimized", r->"Change"]);
      table.add_row(row![
        "Annual return (%)",
        r->format!("{:.2}", original.expected_return * 100.0),
        r->format!("{:.2}", opt.expected_return * 100.0),
        r->format!("{:+.2}", (opt.expected_return - original.expected_return) * 100.0)
      ]);
      table.add_row(row![
        "Risk (%)",
        r->format!("{:.2}", original.volatility * 100.0),
        r->format!("{:.2}", opt.volatility * 100.0),
        r->format!("{:+.2}", (opt.volatility - original.volatility) * 100.0)
      ]);
      table.add_row(row![
        "Sharpe ratio",
        r->format!("{:.4}", original.sharpe),
        r->format!("{:.4}", opt.sharpe),
        r->format!("{:+.4}", opt.sharpe - original.sharpe)
      ]);
    }
    None => {
      table.set_titles(row!["Metric", r->"Original"]);
      table.add_row(row!["Annual return (%)", r->format!("{:.2}", original.expected_return * 100.0)]);
      table.add_row(row!["Risk (%)", r->format!("{:.2}", original.volatility * 100.0)]);
      table.add_row(row!["Sharpe ratio", r->format!("{:.4}", original.sharpe)]);
    }
  }
  table
}

/// Annualized return and risk per asset.
pub fn profile_table(profiles: &AssetProfiles) -> Table {
  let mut table = table();
  table.set_titles(row!["Asset", r->"Annual return (%)", r->"Risk (%)"]);
  for (id, profile) in profiles.iter() {
    table.add_row(row![
      id,
      r->format!("{:.2}", profile.annual_return),
      r->format!("{:.2}", profile.risk)
    ]);
  }
  table
}

/// Full optimization report: weights, metrics, and the failure reason if any.
pub fn optimization_report(
  original: &PortfolioWeights,
  current: Option<&PortfolioSummary>,
  outcome: &OptimizationOutcome,
) -> String {
  let mut out = weight_table(original, &outcome.weights).to_string();
  if let Some(current) = current {
    out.push('\n');
    out.push_str(&metrics_table(current, outcome.summary.as_ref()).to_string());
  }
  if let Some(reason) = outcome.failure_reason() {
    out.push_str(&format!("\nOptimization failed: {reason}\n"));
  }
  out
}
