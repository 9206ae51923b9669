//! # portfolio-rs
//!
//! Command-line front end over the CSV tables in the working directory.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use chrono::NaiveDate;
use clap::Args;
use clap::Parser;
use clap::Subcommand;
use portfolio_rs::analytics::Asset;
use portfolio_rs::analytics::AssetKind;
use portfolio_rs::analytics::PortfolioEngine;
use portfolio_rs::analytics::PortfolioEngineConfig;
use portfolio_rs::report;
use portfolio_rs::table::read_correlation;
use portfolio_rs::table::write_correlation;
use portfolio_rs::table::PercentageChangeTable;
use portfolio_rs::table::PortfolioTable;
use portfolio_rs::table::Watchlist;
use portfolio_rs::table::DATE_FORMAT;
use tracing::info;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

/// Portfolio risk/return analytics and Sharpe-ratio optimization.
#[derive(Parser, Debug)]
#[command(name = "portfolio-rs", version, about, long_about = None)]
struct Cli {
  #[command(flatten)]
  files: Files,

  /// Also write a daily rotated analysis log into this directory.
  #[arg(long, global = true, env = "PORTFOLIO_LOG_DIR")]
  log_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Args, Debug)]
struct Files {
  #[arg(long, global = true, env = "PORTFOLIO_WATCHLIST", default_value = "watchlist.csv")]
  watchlist: PathBuf,

  #[arg(long, global = true, env = "PORTFOLIO_CHANGES", default_value = "percentage_change.csv")]
  changes: PathBuf,

  #[arg(long, global = true, env = "PORTFOLIO_TABLE", default_value = "portfolio.csv")]
  portfolio: PathBuf,

  #[arg(
    long,
    global = true,
    env = "PORTFOLIO_CORRELATION",
    default_value = "asset_correlationship.csv"
  )]
  correlation: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
  /// Decimal risk-free rate (0.0167 = 1.67%).
  #[arg(long, env = "PORTFOLIO_RISK_FREE", default_value_t = 0.0167)]
  risk_free: f64,

  /// Decimal floor on the optimized portfolio return.
  #[arg(long, env = "PORTFOLIO_MIN_RETURN")]
  min_return: Option<f64>,

  /// Decimal cap on every optimized weight.
  #[arg(long, env = "PORTFOLIO_MAX_WEIGHT", default_value_t = 1.0)]
  max_weight: f64,

  #[arg(long, default_value_t = 1e-6)]
  tolerance: f64,

  #[arg(long, default_value_t = 5000)]
  max_iters: u64,
}

impl RunArgs {
  fn engine(&self) -> PortfolioEngine {
    PortfolioEngine::new(PortfolioEngineConfig {
      risk_free: self.risk_free,
      min_return: self.min_return,
      max_weight: self.max_weight,
      tolerance: self.tolerance,
      max_iters: self.max_iters,
    })
  }
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Rebuild the percentage change table from the watchlist.
  Returns,
  /// Refresh prices, values, shares and annual return/risk in the portfolio table.
  Update,
  /// Write the correlation table and report per-asset and portfolio metrics.
  Analyze(RunArgs),
  /// Optimize the stored portfolio against the stored correlation table.
  Optimize(RunArgs),
  /// Add an asset to the watchlist and the portfolio.
  Add {
    name: String,
    id: String,
    #[arg(value_name = "TYPE")]
    kind: String,
  },
  /// Merge `date,price` observations from a CSV file into the watchlist.
  Merge {
    id: String,
    #[arg(value_name = "FILE")]
    prices: PathBuf,
  },
  /// returns, update, analyze and optimize in one pass.
  Run(RunArgs),
}

fn init_logging(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let console = fmt::layer()
    .with_target(false)
    .with_writer(std::io::stderr)
    .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

  match log_dir {
    None => {
      tracing_subscriber::registry().with(console).try_init()?;
      Ok(None)
    }
    Some(dir) => {
      let appender = RollingFileAppender::new(Rotation::DAILY, dir, "portfolio-analysis.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::registry()
        .with(console)
        .with(
          fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(EnvFilter::new("info")),
        )
        .try_init()?;
      Ok(Some(guard))
    }
  }
}

fn rebuild_returns(files: &Files) -> Result<PercentageChangeTable> {
  let watchlist = Watchlist::load(&files.watchlist)
    .with_context(|| format!("loading {}", files.watchlist.display()))?;
  let changes = PercentageChangeTable::from_watchlist(&watchlist);
  changes
    .save(&files.changes)
    .with_context(|| format!("writing {}", files.changes.display()))?;
  info!(
    path = %files.changes.display(),
    assets = changes.rows().len(),
    periods = changes.dates().len(),
    "percentage changes written"
  );
  Ok(changes)
}

fn update_portfolio(files: &Files, changes: &PercentageChangeTable) -> Result<()> {
  let watchlist = Watchlist::load(&files.watchlist)
    .with_context(|| format!("loading {}", files.watchlist.display()))?;
  let mut portfolio = PortfolioTable::load(&files.portfolio)
    .with_context(|| format!("loading {}", files.portfolio.display()))?;

  let total = portfolio
    .refresh(&watchlist, changes)
    .context("refreshing portfolio")?;
  portfolio
    .save(&files.portfolio)
    .with_context(|| format!("writing {}", files.portfolio.display()))?;

  println!("Total portfolio value: {total:.2}");
  Ok(())
}

fn analyze(files: &Files, engine: &PortfolioEngine) -> Result<()> {
  let changes = PercentageChangeTable::load(&files.changes)
    .with_context(|| format!("loading {}", files.changes.display()))?;
  let portfolio = PortfolioTable::load(&files.portfolio)
    .with_context(|| format!("loading {}", files.portfolio.display()))?;

  let returns = changes.returns()?;
  let profiles = engine.profiles(&returns);
  println!("{}", report::profile_table(&profiles));

  let corr = engine.correlation(&returns)?;
  write_correlation(&files.correlation, &corr)
    .with_context(|| format!("writing {}", files.correlation.display()))?;
  info!(path = %files.correlation.display(), "correlation table written");

  match engine.summarize(&portfolio.weights()?, &profiles, &corr) {
    Ok(summary) => println!("{}", report::metrics_table(&summary, None)),
    Err(err) => warn!(%err, "cannot aggregate portfolio metrics"),
  }
  Ok(())
}

fn optimize(files: &Files, engine: &PortfolioEngine) -> Result<()> {
  let portfolio = PortfolioTable::load(&files.portfolio)
    .with_context(|| format!("loading {}", files.portfolio.display()))?;
  let corr = read_correlation(&files.correlation)
    .with_context(|| format!("loading {}", files.correlation.display()))?;

  let weights = portfolio.weights()?;
  let profiles = portfolio.profiles()?;
  let current = engine.summarize(&weights, &profiles, &corr).ok();
  let outcome = engine.optimize(&weights, &profiles, &corr);

  print!("{}", report::optimization_report(&weights, current.as_ref(), &outcome));
  Ok(())
}

fn add_asset(files: &Files, asset: Asset) -> Result<()> {
  let mut watchlist = Watchlist::load(&files.watchlist)
    .with_context(|| format!("loading {}", files.watchlist.display()))?;
  let mut portfolio = PortfolioTable::load(&files.portfolio)
    .with_context(|| format!("loading {}", files.portfolio.display()))?;

  watchlist.add_asset(asset.clone())?;
  portfolio.add_asset(asset.clone())?;
  watchlist
    .save(&files.watchlist)
    .with_context(|| format!("writing {}", files.watchlist.display()))?;
  portfolio
    .save(&files.portfolio)
    .with_context(|| format!("writing {}", files.portfolio.display()))?;

  println!("Added {} ({}, {})", asset.name, asset.id, asset.kind);
  Ok(())
}

fn read_observations(path: &Path) -> Result<Vec<(NaiveDate, f64)>> {
  let mut reader = csv::ReaderBuilder::new()
    .trim(csv::Trim::All)
    .from_path(path)
    .with_context(|| format!("opening {}", path.display()))?;

  let mut observations = Vec::new();
  for (line, record) in reader.records().enumerate() {
    let record = record?;
    let (Some(date), Some(price)) = (record.get(0), record.get(1)) else {
      anyhow::bail!("{}:{}: expected `date,price`", path.display(), line + 2);
    };
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
      .with_context(|| format!("{}:{}: bad date '{date}'", path.display(), line + 2))?;
    let price = price
      .parse::<f64>()
      .with_context(|| format!("{}:{}: bad price '{price}'", path.display(), line + 2))?;
    observations.push((date, price));
  }
  Ok(observations)
}

fn merge_prices(files: &Files, id: &str, prices: &Path) -> Result<()> {
  let mut watchlist = Watchlist::load(&files.watchlist)
    .with_context(|| format!("loading {}", files.watchlist.display()))?;
  let observations = read_observations(prices)?;
  let added = watchlist.merge_prices(id, &observations)?;
  watchlist
    .save(&files.watchlist)
    .with_context(|| format!("writing {}", files.watchlist.display()))?;

  println!(
    "Merged {} prices for {id} ({added} new dates)",
    observations.len()
  );
  Ok(())
}

fn run(files: &Files, engine: &PortfolioEngine) -> Result<()> {
  let changes = rebuild_returns(files)?;
  if let Err(err) = update_portfolio(files, &changes) {
    warn!("portfolio refresh failed, analyzing the stored table: {err:#}");
  }

  let portfolio = PortfolioTable::load(&files.portfolio)
    .with_context(|| format!("loading {}", files.portfolio.display()))?;
  let weights = portfolio.weights()?;
  let analysis = engine.analyze(&changes.returns()?, &weights);

  println!("{}", report::profile_table(&analysis.profiles));
  match &analysis.correlation {
    Ok(corr) => {
      write_correlation(&files.correlation, corr)
        .with_context(|| format!("writing {}", files.correlation.display()))?;
      info!(path = %files.correlation.display(), "correlation table written");
    }
    Err(err) => warn!(%err, "correlation table not written"),
  }

  print!(
    "{}",
    report::optimization_report(&weights, analysis.summary.as_ref().ok(), &analysis.optimization)
  );
  Ok(())
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  let _guard = init_logging(cli.log_dir.as_deref())?;
  let files = &cli.files;

  match cli.command {
    Command::Returns => rebuild_returns(files).map(|_| ()),
    Command::Update => {
      let changes = PercentageChangeTable::load(&files.changes)
        .with_context(|| format!("loading {}", files.changes.display()))?;
      update_portfolio(files, &changes)
    }
    Command::Analyze(args) => analyze(files, &args.engine()),
    Command::Optimize(args) => optimize(files, &args.engine()),
    Command::Add { name, id, kind } => add_asset(files, Asset::new(id, name, AssetKind::from_tag(&kind))),
    Command::Merge { id, prices } => merge_prices(files, &id, &prices),
    Command::Run(args) => run(files, &args.engine()),
  }
}
