//! # Tables
//!
//! CSV persistence of the watchlist, percentage-change, portfolio and correlation tables.
//!
//! Every table starts with a header row. Required columns are resolved by name once per
//! load; rows are then parsed into typed fields so that later stages never look cells up
//! by string.

pub mod correlation;
pub mod percentage;
pub mod portfolio;
pub mod watchlist;

pub use correlation::read_correlation;
pub use correlation::write_correlation;
pub use percentage::PercentageChangeRow;
pub use percentage::PercentageChangeTable;
pub use portfolio::PortfolioRow;
pub use portfolio::PortfolioTable;
pub use watchlist::Watchlist;
pub use watchlist::WatchlistRow;

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::ReaderBuilder;
use csv::StringRecord;

use crate::analytics::types::Asset;
use crate::analytics::types::AssetKind;
use crate::error::TableError;

/// Date format of price and change columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn open(path: &Path) -> Result<File, TableError> {
  File::open(path).map_err(|source| TableError::Io {
    path: path.display().to_string(),
    source,
  })
}

pub(crate) fn create(path: &Path) -> Result<File, TableError> {
  File::create(path).map_err(|source| TableError::Io {
    path: path.display().to_string(),
    source,
  })
}

pub(crate) fn reader<R: Read>(input: R) -> csv::Reader<R> {
  ReaderBuilder::new()
    .trim(csv::Trim::All)
    .flexible(true)
    .from_reader(input)
}

/// Column positions keyed by header name.
pub(crate) struct Header {
  columns: HashMap<String, usize>,
}

impl Header {
  pub(crate) fn new(record: &StringRecord) -> Self {
    let columns = record
      .iter()
      .enumerate()
      .map(|(idx, name)| (name.to_string(), idx))
      .collect();
    Self { columns }
  }

  pub(crate) fn require(&self, name: &'static str) -> Result<usize, TableError> {
    self
      .columns
      .get(name)
      .copied()
      .ok_or(TableError::MissingColumn(name))
  }
}

/// Positions of the `name,id,type` columns shared by the asset tables.
#[derive(Clone, Copy)]
pub(crate) struct IdentityColumns {
  name: usize,
  id: usize,
  kind: usize,
}

impl IdentityColumns {
  pub(crate) fn resolve(header: &Header) -> Result<Self, TableError> {
    Ok(Self {
      name: header.require("name")?,
      id: header.require("id")?,
      kind: header.require("type")?,
    })
  }

  pub(crate) fn contains(&self, idx: usize) -> bool {
    idx == self.name || idx == self.id || idx == self.kind
  }

  pub(crate) fn asset(&self, record: &StringRecord) -> Asset {
    Asset::new(
      cell(record, self.id).to_string(),
      cell(record, self.name).to_string(),
      AssetKind::from_tag(cell(record, self.kind)),
    )
  }
}

pub(crate) fn cell(record: &StringRecord, idx: usize) -> &str {
  record.get(idx).unwrap_or("")
}

pub(crate) fn is_blank(record: &StringRecord) -> bool {
  record.iter().all(|field| field.trim().is_empty())
}

/// Parse a numeric cell, accepting an optional `%` suffix. Blank cells are `None`.
pub(crate) fn parse_number(row: usize, column: &str, raw: &str) -> Result<Option<f64>, TableError> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    return Ok(None);
  }
  trimmed
    .trim_end_matches('%')
    .trim()
    .parse::<f64>()
    .map(Some)
    .map_err(|_| TableError::Parse {
      row,
      column: column.to_string(),
      value: raw.to_string(),
    })
}

/// Fixed-point cell; exact zero is written as a bare `0`.
pub(crate) fn format_fixed(value: Option<f64>, decimals: usize, suffix: &str) -> String {
  match value {
    None => String::new(),
    Some(v) if v == 0.0 => format!("0{suffix}"),
    Some(v) => format!("{v:.decimals$}{suffix}"),
  }
}

pub(crate) fn format_plain(value: Option<f64>) -> String {
  value.map(|v| v.to_string()).unwrap_or_default()
}
