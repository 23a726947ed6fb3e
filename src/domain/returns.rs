//! Daily return matrix and training windows.
//!
//! The matrix is built once from long-format records and is immutable
//! afterwards. Missing observations are stored as `None`; training windows
//! keep only assets with a complete column, playback rows fill gaps with zero.

use crate::domain::error::PortoptError;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

/// One long-format row: (date, asset, daily return).
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnRecord {
    pub date: NaiveDate,
    pub asset: String,
    pub value: f64,
}

impl ReturnRecord {
    pub fn new(date: NaiveDate, asset: impl Into<String>, value: f64) -> Self {
        Self {
            date,
            asset: asset.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnMatrix {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    /// Row-major, `dates.len() * assets.len()`.
    values: Vec<Option<f64>>,
    date_index: HashMap<NaiveDate, usize>,
}

impl ReturnMatrix {
    /// Build from long-format records in any order. Assets are ordered by
    /// identifier, dates ascending.
    pub fn from_records(records: &[ReturnRecord]) -> Result<Self, PortoptError> {
        let dates: Vec<NaiveDate> = records
            .iter()
            .map(|r| r.date)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let assets: Vec<String> = records
            .iter()
            .map(|r| r.asset.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let date_index: HashMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let asset_index: HashMap<&str, usize> = assets
            .iter()
            .enumerate()
            .map(|(i, a)| (a.as_str(), i))
            .collect();

        let width = assets.len();
        let mut values = vec![None; dates.len() * width];
        for record in records {
            if !record.value.is_finite() {
                return Err(PortoptError::InvalidValue {
                    asset: record.asset.clone(),
                    date: record.date.to_string(),
                    value: record.value,
                });
            }
            let row = date_index[&record.date];
            let col = asset_index[record.asset.as_str()];
            let slot = &mut values[row * width + col];
            if slot.is_some() {
                return Err(PortoptError::DuplicateObservation {
                    asset: record.asset.clone(),
                    date: record.date.to_string(),
                });
            }
            *slot = Some(record.value);
        }

        Ok(Self {
            dates,
            assets,
            values,
            date_index,
        })
    }

    /// Build from dense per-asset columns aligned with `dates`.
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Result<Self, PortoptError> {
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PortoptError::Data {
                reason: "dates must be strictly increasing".into(),
            });
        }
        let mut records = Vec::with_capacity(dates.len() * columns.len());
        for (asset, column) in &columns {
            if column.len() != dates.len() {
                return Err(PortoptError::MissingData {
                    asset: asset.clone(),
                    reason: format!(
                        "column has {} values for {} dates",
                        column.len(),
                        dates.len()
                    ),
                });
            }
            for (date, value) in dates.iter().zip(column) {
                records.push(ReturnRecord::new(*date, asset.clone(), *value));
            }
        }
        Self::from_records(&records)
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn date_count(&self) -> usize {
        self.dates.len()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn date_index(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.assets.binary_search_by(|a| a.as_str().cmp(asset)).ok()
    }

    pub fn get(&self, date_idx: usize, asset_idx: usize) -> Option<f64> {
        self.values[date_idx * self.assets.len() + asset_idx]
    }

    /// Row of returns in asset order, missing entries as zero.
    pub fn row_filled(&self, date_idx: usize) -> Vec<f64> {
        let width = self.assets.len();
        self.values[date_idx * width..(date_idx + 1) * width]
            .iter()
            .map(|v| v.unwrap_or(0.0))
            .collect()
    }

    /// Number of non-missing observations for one asset.
    pub fn observation_count(&self, asset_idx: usize) -> usize {
        (0..self.dates.len())
            .filter(|&row| self.get(row, asset_idx).is_some())
            .count()
    }

    /// Training window ending at `end_idx` (inclusive). `lookback` limits
    /// the number of rows; `None` uses every row up to the cutoff. Assets
    /// with any missing value inside the window are left out.
    pub fn window(&self, end_idx: usize, lookback: Option<usize>) -> ReturnWindow {
        if self.dates.is_empty() {
            return ReturnWindow::default();
        }
        let end = end_idx.min(self.dates.len() - 1);
        let start = match lookback {
            Some(n) if n > 0 => (end + 1).saturating_sub(n),
            _ => 0,
        };

        let mut assets = Vec::new();
        let mut columns = Vec::new();
        for (col, asset) in self.assets.iter().enumerate() {
            let column: Option<Vec<f64>> = (start..=end).map(|row| self.get(row, col)).collect();
            if let Some(column) = column {
                assets.push(asset.clone());
                columns.push(column);
            }
        }

        ReturnWindow {
            start: self.dates[start],
            end: self.dates[end],
            assets,
            columns,
        }
    }

    /// Window ending at the last trading date on or before `cutoff`.
    pub fn window_until(&self, cutoff: NaiveDate, lookback: Option<usize>) -> Option<ReturnWindow> {
        let end = self.dates.partition_point(|d| *d <= cutoff);
        if end == 0 {
            return None;
        }
        Some(self.window(end - 1, lookback))
    }
}

/// Dense, complete training window (one column per asset).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReturnWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub assets: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

impl ReturnWindow {
    pub fn new(assets: Vec<String>, columns: Vec<Vec<f64>>) -> Self {
        Self {
            start: NaiveDate::default(),
            end: NaiveDate::default(),
            assets,
            columns,
        }
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn observations(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}
