//! # Percentage Change Table
//!
//! $$
//! \texttt{chg\_}t_k = 100\cdot\frac{p_{t_k}-p_{t_{k-1}}}{p_{t_{k-1}}}
//! $$
//!
//! Derived table of daily percentage changes, one `chg_<date>` column per watchlist date
//! after the first.

use std::io::Read;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use tracing::debug;

use super::cell;
use super::create;
use super::is_blank;
use super::open;
use super::parse_number;
use super::reader;
use super::watchlist::Watchlist;
use super::Header;
use super::IdentityColumns;
use super::DATE_FORMAT;
use crate::analytics::returns::percentage_change_series;
use crate::analytics::types::Asset;
use crate::analytics::types::AssetReturns;
use crate::analytics::types::ReturnSeries;
use crate::error::AnalyticsError;
use crate::error::TableError;

const CHANGE_PREFIX: &str = "chg_";

#[derive(Clone, Debug, PartialEq)]
pub struct PercentageChangeRow {
  pub asset: Asset,
  pub changes: ReturnSeries,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PercentageChangeTable {
  dates: Vec<NaiveDate>,
  rows: Vec<PercentageChangeRow>,
}

impl PercentageChangeTable {
  /// Changes between consecutive watchlist dates, labeled by the later date.
  pub fn from_watchlist(watchlist: &Watchlist) -> Self {
    let dates = watchlist.dates().iter().skip(1).copied().collect();
    let rows = watchlist
      .rows()
      .iter()
      .map(|row| PercentageChangeRow {
        asset: row.asset.clone(),
        changes: percentage_change_series(&row.prices),
      })
      .collect();
    Self { dates, rows }
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
    let path = path.as_ref();
    let table = Self::from_reader(open(path)?)?;
    debug!(path = %path.display(), assets = table.rows.len(), "loaded percentage changes");
    Ok(table)
  }

  pub fn from_reader<R: Read>(input: R) -> Result<Self, TableError> {
    let mut records = reader(input);
    let header = records.headers()?.clone();
    let identity = IdentityColumns::resolve(&Header::new(&header))?;

    let mut columns = Vec::new();
    let mut dates = Vec::new();
    for (idx, name) in header.iter().enumerate() {
      if identity.contains(idx) {
        continue;
      }
      let date = name
        .strip_prefix(CHANGE_PREFIX)
        .and_then(|d| NaiveDate::parse_from_str(d, DATE_FORMAT).ok())
        .ok_or_else(|| TableError::Header {
          column: idx,
          expected: "chg_YYYY-MM-DD".to_string(),
          found: name.to_string(),
        })?;
      columns.push(idx);
      dates.push(date);
    }

    let mut rows: Vec<PercentageChangeRow> = Vec::new();
    for (line, record) in records.records().enumerate() {
      let record = record?;
      if is_blank(&record) {
        continue;
      }
      let row = line + 2;
      let changes = columns
        .iter()
        .map(|&idx| parse_number(row, &header[idx], cell(&record, idx)))
        .collect::<Result<Vec<_>, _>>()?;
      let asset = identity.asset(&record);
      if rows.iter().any(|r| r.asset.id == asset.id) {
        return Err(TableError::AssetExists(asset.id));
      }
      rows.push(PercentageChangeRow {
        asset,
        changes: ReturnSeries::new(changes),
      });
    }

    Ok(Self { dates, rows })
  }

  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
    self.to_writer(create(path.as_ref())?)
  }

  /// Write changes with four decimals and a `%` suffix; gaps stay blank.
  pub fn to_writer<W: Write>(&self, output: W) -> Result<(), TableError> {
    let mut writer = csv::Writer::from_writer(output);

    let mut header = vec!["name".to_string(), "id".to_string(), "type".to_string()];
    header.extend(
      self
        .dates
        .iter()
        .map(|d| format!("{CHANGE_PREFIX}{}", d.format(DATE_FORMAT))),
    );
    writer.write_record(&header)?;

    for row in &self.rows {
      let mut record = vec![
        row.asset.name.clone(),
        row.asset.id.clone(),
        row.asset.kind.as_tag().to_string(),
      ];
      record.extend(
        row
          .changes
          .values()
          .iter()
          .map(|c| c.map(|v| format!("{v:.4}%")).unwrap_or_default()),
      );
      writer.write_record(&record)?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn rows(&self) -> &[PercentageChangeRow] {
    &self.rows
  }

  pub fn ids(&self) -> Vec<String> {
    self.rows.iter().map(|row| row.asset.id.clone()).collect()
  }

  /// Return series per asset in row order.
  pub fn returns(&self) -> Result<AssetReturns, AnalyticsError> {
    AssetReturns::from_pairs(
      self
        .rows
        .iter()
        .map(|row| (row.asset.id.as_str(), row.changes.clone())),
    )
  }
}
