use std::fs;

use approx::assert_abs_diff_eq;
use portfolio_rs::analytics::PortfolioEngine;
use portfolio_rs::analytics::PortfolioEngineConfig;
use portfolio_rs::report;
use portfolio_rs::table::read_correlation;
use portfolio_rs::table::write_correlation;
use portfolio_rs::table::PercentageChangeTable;
use portfolio_rs::table::PortfolioTable;
use portfolio_rs::table::Watchlist;
use tempfile::tempdir;

const WATCHLIST: &str = "\
name,id,type,2024-03-01,2024-03-04,2024-03-05,2024-03-06,2024-03-07,2024-03-08,2024-03-11,2024-03-12
Growth Fund,F001,fund,1.000,1.012,1.008,1.021,1.030,1.019,1.041,1.052
Value Corp,VALU,stock,25.00,25.10,25.30,25.05,25.40,25.55,25.50,25.80
Bond Fund,B002,fund,2.000,2.001,2.003,2.002,2.004,2.006,2.007,2.009
";

const PORTFOLIO: &str = "\
name,id,type,last_price,holdings,holding_price,holding_earnings,total_value,percentage,annual_return,risk
Growth Fund,F001,fund,,5000,0.98,,0,0%,0%,0%
Value Corp,VALU,stock,,200,24.00,,0,0%,0%,0%
Bond Fund,B002,fund,,2500,1.99,,0,0%,0%,0%
";

#[test]
fn csv_pipeline_end_to_end() {
  let dir = tempdir().unwrap();
  let watchlist_path = dir.path().join("watchlist.csv");
  let changes_path = dir.path().join("percentage_change.csv");
  let portfolio_path = dir.path().join("portfolio.csv");
  let correlation_path = dir.path().join("asset_correlationship.csv");
  fs::write(&watchlist_path, WATCHLIST).unwrap();
  fs::write(&portfolio_path, PORTFOLIO).unwrap();

  let watchlist = Watchlist::load(&watchlist_path).unwrap();
  let changes = PercentageChangeTable::from_watchlist(&watchlist);
  changes.save(&changes_path).unwrap();
  let changes = PercentageChangeTable::load(&changes_path).unwrap();
  assert_eq!(changes.dates().len(), 7);

  let mut portfolio = PortfolioTable::load(&portfolio_path).unwrap();
  let total = portfolio.refresh(&watchlist, &changes).unwrap();
  portfolio.save(&portfolio_path).unwrap();
  assert_abs_diff_eq!(total, 5000.0 * 1.052 + 200.0 * 25.80 + 2500.0 * 2.009, epsilon = 1e-6);

  let portfolio = PortfolioTable::load(&portfolio_path).unwrap();
  let weights = portfolio.weights().unwrap();
  let share_sum: f64 = weights.values().iter().sum();
  assert_abs_diff_eq!(share_sum, 100.0, epsilon = 0.02);

  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    max_weight: 0.7,
    ..PortfolioEngineConfig::default()
  });
  let analysis = engine.analyze(&changes.returns().unwrap(), &weights);
  let corr = analysis.correlation.unwrap();
  for i in 0..corr.len() {
    assert_eq!(corr.get(i, i), 1.0);
  }
  write_correlation(&correlation_path, &corr).unwrap();
  let stored = read_correlation(&correlation_path).unwrap();
  assert_eq!(stored.assets(), corr.assets());

  let outcome = &analysis.optimization;
  assert!(outcome.is_success(), "{:?}", outcome.status);
  let optimized_sum: f64 = outcome.weights.values().iter().sum();
  assert_abs_diff_eq!(optimized_sum, 100.0, epsilon = 1e-3);
  assert!(outcome.weights.values().iter().all(|&w| (-1e-9..=70.0 + 1e-9).contains(&w)));

  let current = analysis.summary.unwrap();
  assert!(outcome.summary.unwrap().sharpe >= current.sharpe - 1e-4);

  let rendered = report::optimization_report(&weights, Some(&current), outcome);
  assert!(rendered.contains("F001"));
  assert!(rendered.contains("Sharpe ratio"));
}

#[test]
fn optimization_from_stored_tables() {
  let dir = tempdir().unwrap();
  let portfolio_path = dir.path().join("portfolio.csv");
  let correlation_path = dir.path().join("asset_correlationship.csv");
  fs::write(
    &portfolio_path,
    "\
name,id,type,last_price,holdings,holding_price,holding_earnings,total_value,percentage,annual_return,risk
A,AAA,fund,1,1,1,0,1,50.00%,10.00%,20.00%
B,BBB,fund,1,1,1,0,1,50.00%,5.00%,10.00%
",
  )
  .unwrap();
  fs::write(&correlation_path, ",AAA,BBB\nAAA,1.0000,0.0000\nBBB,0.0000,1.0000\n").unwrap();

  let portfolio = PortfolioTable::load(&portfolio_path).unwrap();
  let corr = read_correlation(&correlation_path).unwrap();
  let engine = PortfolioEngine::new(PortfolioEngineConfig {
    risk_free: 0.02,
    ..PortfolioEngineConfig::default()
  });

  let weights = portfolio.weights().unwrap();
  let current = engine.summarize(&weights, &portfolio.profiles().unwrap(), &corr).unwrap();
  assert_abs_diff_eq!(current.expected_return, 0.075, epsilon = 1e-12);

  let outcome = engine.optimize(&weights, &portfolio.profiles().unwrap(), &corr);
  assert!(outcome.is_success(), "{:?}", outcome.status);
  assert_abs_diff_eq!(outcome.weights.values()[0], 40.0, epsilon = 1e-2);
  assert_abs_diff_eq!(outcome.weights.values()[1], 60.0, epsilon = 1e-2);
}

#[test]
fn missing_table_reports_the_path() {
  let dir = tempdir().unwrap();
  let err = Watchlist::load(dir.path().join("absent.csv")).unwrap_err();
  assert!(err.to_string().contains("absent.csv"));
}
