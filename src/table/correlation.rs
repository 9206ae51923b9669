//! # Correlation Table
//!
//! Labeled square matrix: an empty corner cell, asset ids across the first row and
//! down the first column, values with four decimals.

use std::io::Read;
use std::io::Write;
use std::path::Path;

use csv::ReaderBuilder;
use ndarray::Array2;
use tracing::debug;

use super::create;
use super::is_blank;
use super::open;
use super::parse_number;
use crate::analytics::types::CorrelationMatrix;
use crate::error::AnalyticsError;
use crate::error::TableError;

pub fn write_correlation(path: impl AsRef<Path>, corr: &CorrelationMatrix) -> Result<(), TableError> {
  let path = path.as_ref();
  write_correlation_to(create(path)?, corr)?;
  debug!(path = %path.display(), assets = corr.len(), "wrote correlation table");
  Ok(())
}

pub fn write_correlation_to<W: Write>(output: W, corr: &CorrelationMatrix) -> Result<(), TableError> {
  let mut writer = csv::Writer::from_writer(output);

  let mut header = vec![String::new()];
  header.extend(corr.assets().iter().cloned());
  writer.write_record(&header)?;

  for (i, id) in corr.assets().iter().enumerate() {
    let mut record = vec![id.clone()];
    record.extend(corr.values().row(i).iter().map(|v| format!("{v:.4}")));
    writer.write_record(&record)?;
  }

  writer.flush().map_err(csv::Error::from)?;
  Ok(())
}

pub fn read_correlation(path: impl AsRef<Path>) -> Result<CorrelationMatrix, TableError> {
  read_correlation_from(open(path.as_ref())?)
}

/// Parse a labeled matrix; row labels must repeat the column labels in the same order.
pub fn read_correlation_from<R: Read>(input: R) -> Result<CorrelationMatrix, TableError> {
  let mut records = ReaderBuilder::new()
    .trim(csv::Trim::All)
    .flexible(true)
    .has_headers(false)
    .from_reader(input);

  let mut rows = records.records();
  let header = rows.next().ok_or(TableError::Empty)??;
  let assets: Vec<String> = header.iter().skip(1).map(str::to_string).collect();
  let n = assets.len();

  let mut labels = Vec::with_capacity(n);
  let mut values = Vec::with_capacity(n * n);
  for (line, record) in rows.enumerate() {
    let record = record?;
    if is_blank(&record) {
      continue;
    }
    let row = line + 2;
    if record.len() != n + 1 {
      return Err(
        AnalyticsError::Dimension {
          what: "correlation row",
          expected: n,
          found: record.len().saturating_sub(1),
        }
        .into(),
      );
    }
    labels.push(record[0].to_string());
    for (j, raw) in record.iter().skip(1).enumerate() {
      let value = parse_number(row, &assets[j], raw)?.ok_or_else(|| TableError::Parse {
        row,
        column: assets[j].clone(),
        value: String::new(),
      })?;
      values.push(value);
    }
  }

  if labels != assets {
    return Err(
      AnalyticsError::Alignment {
        left: "correlation columns",
        left_assets: assets,
        right: "correlation rows",
        right_assets: labels,
      }
      .into(),
    );
  }

  let matrix = Array2::from_shape_vec((n, n), values).map_err(|_| AnalyticsError::Dimension {
    what: "correlation matrix",
    expected: n * n,
    found: n * labels.len(),
  })?;
  Ok(CorrelationMatrix::new(assets, matrix)?)
}
