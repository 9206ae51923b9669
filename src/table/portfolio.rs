//! # Portfolio Table
//!
//! $$
//! V_i = p_i h_i,\qquad E_i = (p_i - c_i)\,h_i,\qquad w_i = 100\,\frac{V_i}{\sum_j V_j}
//! $$
//!
//! Holdings, valuation and annualized profile per asset.

use std::io::Read;
use std::io::Write;
use std::path::Path;

use tracing::debug;
use tracing::info;
use tracing::warn;

use super::cell;
use super::create;
use super::format_fixed;
use super::format_plain;
use super::is_blank;
use super::open;
use super::parse_number;
use super::percentage::PercentageChangeTable;
use super::reader;
use super::watchlist::Watchlist;
use super::Header;
use super::IdentityColumns;
use crate::analytics::annualize::annualize;
use crate::analytics::types::check_alignment;
use crate::analytics::types::Asset;
use crate::analytics::types::AssetProfile;
use crate::analytics::types::AssetProfiles;
use crate::analytics::types::PortfolioWeights;
use crate::error::AnalyticsError;
use crate::error::TableError;

/// Header of `portfolio.csv`, in write order.
pub const PORTFOLIO_COLUMNS: [&str; 11] = [
  "name",
  "id",
  "type",
  "last_price",
  "holdings",
  "holding_price",
  "holding_earnings",
  "total_value",
  "percentage",
  "annual_return",
  "risk",
];

/// One holding. Percent columns (`percentage`, `annual_return`, `risk`) are stored
/// without the `%` suffix.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioRow {
  pub asset: Asset,
  pub last_price: Option<f64>,
  pub holdings: Option<f64>,
  /// Average acquisition price.
  pub holding_price: Option<f64>,
  pub holding_earnings: Option<f64>,
  pub total_value: Option<f64>,
  /// Share of the total portfolio value, in percent.
  pub percentage: Option<f64>,
  pub annual_return: Option<f64>,
  pub risk: Option<f64>,
}

impl PortfolioRow {
  /// A freshly added position: nothing held, no price yet.
  pub fn new(asset: Asset) -> Self {
    Self {
      asset,
      holdings: Some(0.0),
      total_value: Some(0.0),
      percentage: Some(0.0),
      annual_return: Some(0.0),
      risk: Some(0.0),
      ..Self::default()
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioTable {
  rows: Vec<PortfolioRow>,
}

struct Columns {
  identity: IdentityColumns,
  last_price: usize,
  holdings: usize,
  holding_price: usize,
  holding_earnings: usize,
  total_value: usize,
  percentage: usize,
  annual_return: usize,
  risk: usize,
}

impl Columns {
  fn resolve(header: &Header) -> Result<Self, TableError> {
    Ok(Self {
      identity: IdentityColumns::resolve(header)?,
      last_price: header.require("last_price")?,
      holdings: header.require("holdings")?,
      holding_price: header.require("holding_price")?,
      holding_earnings: header.require("holding_earnings")?,
      total_value: header.require("total_value")?,
      percentage: header.require("percentage")?,
      annual_return: header.require("annual_return")?,
      risk: header.require("risk")?,
    })
  }
}

impl PortfolioTable {
  pub fn new(rows: Vec<PortfolioRow>) -> Self {
    Self { rows }
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
    let path = path.as_ref();
    let table = Self::from_reader(open(path)?)?;
    debug!(path = %path.display(), assets = table.rows.len(), "loaded portfolio");
    Ok(table)
  }

  pub fn from_reader<R: Read>(input: R) -> Result<Self, TableError> {
    let mut records = reader(input);
    let header = records.headers()?.clone();
    let columns = Columns::resolve(&Header::new(&header))?;

    let mut table = Self::default();
    for (line, record) in records.records().enumerate() {
      let record = record?;
      if is_blank(&record) {
        continue;
      }
      let row = line + 2;
      let number = |idx: usize| parse_number(row, &header[idx], cell(&record, idx));

      table.push(PortfolioRow {
        asset: columns.identity.asset(&record),
        last_price: number(columns.last_price)?,
        holdings: number(columns.holdings)?,
        holding_price: number(columns.holding_price)?,
        holding_earnings: number(columns.holding_earnings)?,
        total_value: number(columns.total_value)?,
        percentage: number(columns.percentage)?,
        annual_return: number(columns.annual_return)?,
        risk: number(columns.risk)?,
      })?;
    }

    Ok(table)
  }

  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
    self.to_writer(create(path.as_ref())?)
  }

  pub fn to_writer<W: Write>(&self, output: W) -> Result<(), TableError> {
    let mut writer = csv::Writer::from_writer(output);
    writer.write_record(PORTFOLIO_COLUMNS)?;

    for row in &self.rows {
      writer.write_record([
        row.asset.name.clone(),
        row.asset.id.clone(),
        row.asset.kind.as_tag().to_string(),
        format_plain(row.last_price),
        format_plain(row.holdings),
        format_plain(row.holding_price),
        format_fixed(row.holding_earnings, 2, ""),
        format_fixed(row.total_value, 2, ""),
        format_fixed(row.percentage, 2, "%"),
        format_fixed(row.annual_return, 2, "%"),
        format_fixed(row.risk, 2, "%"),
      ])?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
  }

  pub fn rows(&self) -> &[PortfolioRow] {
    &self.rows
  }

  pub fn ids(&self) -> Vec<String> {
    self.rows.iter().map(|row| row.asset.id.clone()).collect()
  }

  pub fn row(&self, id: &str) -> Option<&PortfolioRow> {
    self.rows.iter().find(|row| row.asset.id == id)
  }

  fn push(&mut self, row: PortfolioRow) -> Result<(), TableError> {
    if self.row(&row.asset.id).is_some() {
      return Err(TableError::AssetExists(row.asset.id));
    }
    self.rows.push(row);
    Ok(())
  }

  /// Append an empty position for `asset`.
  pub fn add_asset(&mut self, asset: Asset) -> Result<(), TableError> {
    self.push(PortfolioRow::new(asset))?;
    info!(assets = self.rows.len(), "added asset to portfolio");
    Ok(())
  }

  /// Current allocation in percent; a blank share counts as 0.
  pub fn weights(&self) -> Result<PortfolioWeights, AnalyticsError> {
    PortfolioWeights::from_pairs(
      self
        .rows
        .iter()
        .map(|row| (row.asset.id.as_str(), row.percentage.unwrap_or(0.0))),
    )
  }

  /// Stored annual return and risk; blanks count as 0.
  pub fn profiles(&self) -> Result<AssetProfiles, AnalyticsError> {
    AssetProfiles::from_pairs(self.rows.iter().map(|row| {
      (
        row.asset.id.as_str(),
        AssetProfile::new(row.annual_return.unwrap_or(0.0), row.risk.unwrap_or(0.0)),
      )
    }))
  }

  /// Total market value of all positions.
  pub fn total_value(&self) -> f64 {
    self.rows.iter().filter_map(|row| row.total_value).sum()
  }

  /// Recompute every derived column from the latest prices and the change history.
  ///
  /// `changes` must list the same assets in the same order as this table; on mismatch
  /// nothing is modified. Returns the total portfolio value.
  pub fn refresh(
    &mut self,
    watchlist: &Watchlist,
    changes: &PercentageChangeTable,
  ) -> Result<f64, TableError> {
    check_alignment(
      "portfolio",
      &self.ids(),
      "percentage change table",
      &changes.ids(),
    )?;
    let profiles = annualize(&changes.returns()?);

    let mut priced = 0;
    for row in &mut self.rows {
      if let Some(price) = watchlist.latest_price(&row.asset.id) {
        row.last_price = Some(price);
        priced += 1;
      }
      row.total_value = Some(match (row.last_price, row.holdings) {
        (Some(price), Some(held)) => price * held,
        _ => 0.0,
      });
      row.holding_earnings = Some(match (row.last_price, row.holding_price, row.holdings) {
        (Some(price), Some(cost), Some(held)) => (price - cost) * held,
        _ => 0.0,
      });
    }
    debug!(priced, assets = self.rows.len(), "updated last prices");

    let total = self.total_value();
    if total == 0.0 {
      warn!("total portfolio value is zero, keeping previous percentages");
    } else {
      for row in &mut self.rows {
        row.percentage = Some(row.total_value.unwrap_or(0.0) / total * 100.0);
      }
    }

    for (row, profile) in self.rows.iter_mut().zip(profiles.values()) {
      row.annual_return = Some(profile.annual_return);
      row.risk = Some(profile.risk);
    }

    info!(total_value = total, "portfolio refreshed");
    Ok(total)
  }
}
