#![allow(dead_code)]

use chrono::NaiveDate;
use portopt::domain::backtest::RebalanceRecord;
use portopt::domain::comparison::ComparisonResult;
use portopt::domain::error::PortoptError;
use portopt::domain::optimizer::OptimizationModel;
pub use portopt::domain::returns::{ReturnMatrix, ReturnRecord};
use portopt::ports::data_port::{collect_ranges, DataRange, ReturnSource};
use portopt::ports::report_port::ReportPort;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub struct MockReturnSource {
    pub records: Vec<ReturnRecord>,
    pub error: Option<String>,
    pub range_reads: Cell<usize>,
}

impl MockReturnSource {
    pub fn new(records: Vec<ReturnRecord>) -> Self {
        Self {
            records,
            error: None,
            range_reads: Cell::new(0),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            records: Vec::new(),
            error: Some(reason.to_string()),
            range_reads: Cell::new(0),
        }
    }

    fn check(&self) -> Result<(), PortoptError> {
        match &self.error {
            Some(reason) => Err(PortoptError::Data {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl ReturnSource for MockReturnSource {
    fn fetch_returns(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<ReturnRecord>, PortoptError> {
        self.check()?;
        Ok(self
            .records
            .iter()
            .filter(|r| start_date.is_none_or(|s| r.date >= s))
            .filter(|r| end_date.is_none_or(|e| r.date <= e))
            .cloned()
            .collect())
    }

    fn list_assets(&self) -> Result<Vec<String>, PortoptError> {
        self.check()?;
        let assets: BTreeSet<String> = self.records.iter().map(|r| r.asset.clone()).collect();
        Ok(assets.into_iter().collect())
    }

    fn data_ranges(&self) -> Result<BTreeMap<String, DataRange>, PortoptError> {
        self.check()?;
        self.range_reads.set(self.range_reads.get() + 1);
        Ok(collect_ranges(&self.records))
    }
}

/// Records what was exported without touching the filesystem.
#[derive(Default)]
pub struct MockReport {
    pub weights: RefCell<Vec<(OptimizationModel, usize)>>,
    pub paths_written: RefCell<usize>,
}

impl ReportPort for MockReport {
    fn write_weights(
        &self,
        model: OptimizationModel,
        rebalances: &[RebalanceRecord],
    ) -> Result<(), PortoptError> {
        self.weights.borrow_mut().push((model, rebalances.len()));
        Ok(())
    }

    fn write_paths(&self, _result: &ComparisonResult) -> Result<(), PortoptError> {
        *self.paths_written.borrow_mut() += 1;
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Weekday calendar of `count` dates starting at `start`.
pub fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    use chrono::Datelike;
    start
        .iter_days()
        .filter(|d| d.weekday().number_from_monday() <= 5)
        .take(count)
        .collect()
}

/// Deterministic, non-degenerate daily returns for `assets` over `days`
/// business days from 2020-01-01.
pub fn synthetic_records(assets: &[&str], days: usize) -> Vec<ReturnRecord> {
    let mut records = Vec::with_capacity(assets.len() * days);
    for (t, d) in business_days(date(2020, 1, 1), days).into_iter().enumerate() {
        for (k, asset) in assets.iter().enumerate() {
            let k = k as f64;
            let phase = (t as f64 * (0.7 + 0.31 * k)).sin();
            let value = 0.0004 * (k + 1.0) + 0.009 * (1.0 + 0.35 * k) * phase;
            records.push(ReturnRecord::new(d, *asset, value));
        }
    }
    records
}

pub fn synthetic_matrix(assets: &[&str], days: usize) -> ReturnMatrix {
    ReturnMatrix::from_records(&synthetic_records(assets, days)).unwrap()
}

/// Write records in the `Date,Ticker,Daily Return` layout.
pub fn write_returns_csv(dir: &Path, name: &str, records: &[ReturnRecord]) -> PathBuf {
    let path = dir.join(name);
    let mut content = String::from("Date,Ticker,Daily Return\n");
    for r in records {
        content.push_str(&format!("{},{},{}\n", r.date, r.asset, r.value));
    }
    std::fs::write(&path, content).unwrap();
    path
}
