//! # Watchlist
//!
//! $$
//! \texttt{name,id,type},\ p_{t_1},\dots,p_{t_m}
//! $$
//!
//! Daily closing prices per asset, one column per date.

use std::io::Read;
use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use tracing::debug;
use tracing::info;

use super::cell;
use super::create;
use super::format_plain;
use super::is_blank;
use super::open;
use super::parse_number;
use super::reader;
use super::Header;
use super::IdentityColumns;
use super::DATE_FORMAT;
use crate::analytics::returns::percentage_change_table;
use crate::analytics::types::Asset;
use crate::analytics::types::AssetReturns;
use crate::error::AnalyticsError;
use crate::error::TableError;

/// One asset with its prices on the watchlist dates; `None` where no price is known.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchlistRow {
  pub asset: Asset,
  pub prices: Vec<Option<f64>>,
}

/// Price table with date columns in chronological order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Watchlist {
  dates: Vec<NaiveDate>,
  rows: Vec<WatchlistRow>,
}

impl Watchlist {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
    let path = path.as_ref();
    let watchlist = Self::from_reader(open(path)?)?;
    debug!(
      path = %path.display(),
      assets = watchlist.rows.len(),
      dates = watchlist.dates.len(),
      "loaded watchlist"
    );
    Ok(watchlist)
  }

  /// Parse a watchlist; date columns may appear in any order and are sorted on load.
  pub fn from_reader<R: Read>(input: R) -> Result<Self, TableError> {
    let mut records = reader(input);
    let header = records.headers()?.clone();
    let identity = IdentityColumns::resolve(&Header::new(&header))?;

    let mut columns = Vec::new();
    for (idx, name) in header.iter().enumerate() {
      if identity.contains(idx) {
        continue;
      }
      let date = NaiveDate::parse_from_str(name, DATE_FORMAT).map_err(|_| TableError::Header {
        column: idx,
        expected: "a YYYY-MM-DD date".to_string(),
        found: name.to_string(),
      })?;
      columns.push((date, idx));
    }
    columns.sort_by_key(|(date, _)| *date);
    if let Some(pair) = columns.windows(2).find(|pair| pair[0].0 == pair[1].0) {
      return Err(TableError::Header {
        column: pair[1].1,
        expected: "a date not listed before".to_string(),
        found: pair[1].0.format(DATE_FORMAT).to_string(),
      });
    }

    let mut watchlist = Self {
      dates: columns.iter().map(|(date, _)| *date).collect(),
      rows: Vec::new(),
    };

    for (line, record) in records.records().enumerate() {
      let record = record?;
      if is_blank(&record) {
        continue;
      }
      let row = line + 2;
      let prices = columns
        .iter()
        .map(|&(_, idx)| parse_number(row, &header[idx], cell(&record, idx)))
        .collect::<Result<Vec<_>, _>>()?;
      watchlist.push(WatchlistRow {
        asset: identity.asset(&record),
        prices,
      })?;
    }

    Ok(watchlist)
  }

  pub fn save(&self, path: impl AsRef<Path>) -> Result<(), TableError> {
    self.to_writer(create(path.as_ref())?)
  }

  pub fn to_writer<W: Write>(&self, output: W) -> Result<(), TableError> {
    let mut writer = csv::Writer::from_writer(output);

    let mut header = vec!["name".to_string(), "id".to_string(), "type".to_string()];
    header.extend(self.dates.iter().map(|d| d.format(DATE_FORMAT).to_string()));
    writer.write_record(&header)?;

    for row in &self.rows {
      let mut record = vec![
        row.asset.name.clone(),
        row.asset.id.clone(),
        row.asset.kind.as_tag().to_string(),
      ];
      record.extend(row.prices.iter().map(|p| format_plain(*p)));
      writer.write_record(&record)?;
    }

    writer.flush().map_err(csv::Error::from)?;
    Ok(())
  }

  pub fn dates(&self) -> &[NaiveDate] {
    &self.dates
  }

  pub fn rows(&self) -> &[WatchlistRow] {
    &self.rows
  }

  pub fn row(&self, id: &str) -> Option<&WatchlistRow> {
    self.rows.iter().find(|row| row.asset.id == id)
  }

  /// Most recent known price of an asset.
  pub fn latest_price(&self, id: &str) -> Option<f64> {
    self
      .row(id)
      .and_then(|row| row.prices.iter().rev().flatten().next().copied())
  }

  fn push(&mut self, row: WatchlistRow) -> Result<(), TableError> {
    if self.row(&row.asset.id).is_some() {
      return Err(TableError::AssetExists(row.asset.id));
    }
    self.rows.push(row);
    Ok(())
  }

  /// Append an asset with no known prices.
  pub fn add_asset(&mut self, asset: Asset) -> Result<(), TableError> {
    let prices = vec![None; self.dates.len()];
    self.push(WatchlistRow { asset, prices })?;
    info!(assets = self.rows.len(), "added asset to watchlist");
    Ok(())
  }

  /// Merge `(date, price)` observations of one asset.
  ///
  /// Unseen dates become new columns at their chronological position (blank for every
  /// other asset); on an existing date the new price replaces the old one. Returns the
  /// number of columns added.
  pub fn merge_prices(
    &mut self,
    id: &str,
    observations: &[(NaiveDate, f64)],
  ) -> Result<usize, TableError> {
    let target = self
      .rows
      .iter()
      .position(|row| row.asset.id == id)
      .ok_or_else(|| TableError::UnknownAsset(id.to_string()))?;

    let mut added = 0;
    for &(date, price) in observations {
      let idx = match self.dates.binary_search(&date) {
        Ok(idx) => idx,
        Err(idx) => {
          self.dates.insert(idx, date);
          for row in &mut self.rows {
            row.prices.insert(idx, None);
          }
          added += 1;
          idx
        }
      };
      self.rows[target].prices[idx] = Some(price);
    }

    debug!(asset = id, observations = observations.len(), added, "merged prices");
    Ok(added)
  }

  /// Percentage-change series of every asset, in row order.
  pub fn returns(&self) -> Result<AssetReturns, AnalyticsError> {
    percentage_change_table(
      self
        .rows
        .iter()
        .map(|row| (row.asset.id.as_str(), row.prices.as_slice())),
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::analytics::types::AssetKind;

  const SAMPLE: &str = "\
name,id,type,2024-01-03,2024-01-02,2024-01-04
Alpha Fund,000001,fund,1.10,1.00,
Beta Corp,BETA,stock,20,,22
";

  fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
  }

  #[test]
  fn load_sorts_dates_and_keeps_gaps() {
    let watchlist = Watchlist::from_reader(SAMPLE.as_bytes()).unwrap();

    assert_eq!(
      watchlist.dates(),
      [date("2024-01-02"), date("2024-01-03"), date("2024-01-04")]
    );
    let alpha = watchlist.row("000001").unwrap();
    assert_eq!(alpha.asset.kind, AssetKind::Fund);
    assert_eq!(alpha.prices, vec![Some(1.0), Some(1.1), None]);
    assert_eq!(watchlist.row("BETA").unwrap().prices, vec![None, Some(20.0), Some(22.0)]);
  }

  #[test]
  fn latest_price_skips_trailing_gaps() {
    let watchlist = Watchlist::from_reader(SAMPLE.as_bytes()).unwrap();
    assert_eq!(watchlist.latest_price("000001"), Some(1.1));
    assert_eq!(watchlist.latest_price("BETA"), Some(22.0));
    assert_eq!(watchlist.latest_price("NOPE"), None);
  }

  #[test]
  fn non_date_header_is_rejected() {
    let err = Watchlist::from_reader("name,id,type,yesterday\n".as_bytes()).unwrap_err();
    assert!(matches!(err, TableError::Header { column: 3, .. }));
  }

  #[test]
  fn duplicate_ids_are_rejected() {
    let input = "name,id,type,2024-01-02\nA,X,fund,1\nB,X,fund,2\n";
    let err = Watchlist::from_reader(input.as_bytes()).unwrap_err();
    assert!(matches!(err, TableError::AssetExists(id) if id == "X"));
  }

  #[test]
  fn merge_inserts_dates_in_order_and_overwrites_collisions() {
    let mut watchlist = Watchlist::from_reader(SAMPLE.as_bytes()).unwrap();
    let added = watchlist
      .merge_prices(
        "BETA",
        &[
          (date("2024-01-02"), 19.5),
          (date("2024-01-01"), 19.0),
          (date("2024-01-05"), 23.0),
        ],
      )
      .unwrap();

    assert_eq!(added, 2);
    assert_eq!(watchlist.dates().first(), Some(&date("2024-01-01")));
    assert_eq!(watchlist.dates().last(), Some(&date("2024-01-05")));
    assert_eq!(
      watchlist.row("BETA").unwrap().prices,
      vec![Some(19.0), Some(19.5), Some(20.0), Some(22.0), Some(23.0)]
    );
    assert_eq!(
      watchlist.row("000001").unwrap().prices,
      vec![None, Some(1.0), Some(1.1), None, None]
    );
  }

  #[test]
  fn merge_into_unknown_asset_fails() {
    let mut watchlist = Watchlist::from_reader(SAMPLE.as_bytes()).unwrap();
    let err = watchlist.merge_prices("ZZZ", &[]).unwrap_err();
    assert!(matches!(err, TableError::UnknownAsset(_)));
  }

  #[test]
  fn added_asset_has_blank_prices() {
    let mut watchlist = Watchlist::from_reader(SAMPLE.as_bytes()).unwrap();
    watchlist
      .add_asset(Asset::new("NEW".into(), "New One".into(), AssetKind::Stock))
      .unwrap();

    assert_eq!(watchlist.row("NEW").unwrap().prices, vec![None; 3]);
    assert!(watchlist
      .add_asset(Asset::new("NEW".into(), "Again".into(), AssetKind::Stock))
      .is_err());
  }

  #[test]
  fn writes_chronological_columns() {
    let watchlist = Watchlist::from_reader(SAMPLE.as_bytes()).unwrap();
    let mut out = Vec::new();
    watchlist.to_writer(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(
      text.lines().next().unwrap(),
      "name,id,type,2024-01-02,2024-01-03,2024-01-04"
    );
    assert_eq!(text.lines().nth(2).unwrap(), "Beta Corp,BETA,stock,,20,22");
    assert_eq!(Watchlist::from_reader(text.as_bytes()).unwrap(), watchlist);
  }

  #[test]
  fn returns_follow_row_order() {
    let watchlist = Watchlist::from_reader(SAMPLE.as_bytes()).unwrap();
    let returns = watchlist.returns().unwrap();

    assert_eq!(returns.ids(), ["000001", "BETA"]);
    let alpha = returns.get("000001").unwrap().values();
    assert!((alpha[0].unwrap() - 10.0).abs() < 1e-9);
    assert_eq!(alpha[1], None);
  }
}
