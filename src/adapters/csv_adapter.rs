//! CSV file return source.
//!
//! Reads long-format files with the header `Date,Ticker,Daily Return`.
//! Rows with an empty return are treated as missing observations.

use crate::domain::error::PortoptError;
use crate::domain::returns::ReturnRecord;
use crate::ports::data_port::{collect_ranges, DataRange, ReturnSource};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct ReturnRow {
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Ticker")]
    ticker: String,
    #[serde(rename = "Daily Return")]
    daily_return: Option<f64>,
}

pub struct CsvAdapter {
    path: PathBuf,
}

impl CsvAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<ReturnRecord>, PortoptError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| PortoptError::Data {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;

        let mut records = Vec::new();
        for (line, result) in rdr.deserialize::<ReturnRow>().enumerate() {
            let row = result.map_err(|e| PortoptError::Data {
                reason: format!("CSV parse error in {}: {}", self.path.display(), e),
            })?;
            let date = NaiveDate::parse_from_str(&row.date, "%Y-%m-%d").map_err(|e| {
                PortoptError::Data {
                    reason: format!("invalid date '{}' on row {}: {}", row.date, line + 2, e),
                }
            })?;
            if row.ticker.is_empty() {
                return Err(PortoptError::Data {
                    reason: format!("missing ticker on row {}", line + 2),
                });
            }
            let Some(value) = row.daily_return else {
                continue;
            };
            records.push(ReturnRecord::new(date, row.ticker, value));
        }

        tracing::debug!(
            path = %self.path.display(),
            rows = records.len(),
            "Loaded return rows"
        );
        Ok(records)
    }
}

impl ReturnSource for CsvAdapter {
    fn fetch_returns(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<ReturnRecord>, PortoptError> {
        let mut records: Vec<ReturnRecord> = self
            .read_all()?
            .into_iter()
            .filter(|r| start_date.is_none_or(|start| r.date >= start))
            .filter(|r| end_date.is_none_or(|end| r.date <= end))
            .collect();
        records.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.asset.cmp(&b.asset)));
        Ok(records)
    }

    fn list_assets(&self) -> Result<Vec<String>, PortoptError> {
        let assets: BTreeSet<String> = self.read_all()?.into_iter().map(|r| r.asset).collect();
        Ok(assets.into_iter().collect())
    }

    fn data_ranges(&self) -> Result<BTreeMap<String, DataRange>, PortoptError> {
        Ok(collect_ranges(&self.read_all()?))
    }
}
