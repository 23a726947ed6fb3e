//! CSV export adapter implementing ReportPort.
//!
//! Writes `<dir>/<model>_weights.csv` (Date + one column per asset) and
//! `<dir>/portfolio_paths.csv` (Date + one column per model, plus Benchmark).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::backtest::{PortfolioPath, RebalanceRecord};
use crate::domain::comparison::ComparisonResult;
use crate::domain::error::PortoptError;
use crate::domain::optimizer::OptimizationModel;
use crate::ports::report_port::ReportPort;
use chrono::NaiveDate;

pub const PATHS_FILE: &str = "portfolio_paths.csv";

pub struct CsvReportAdapter {
    dir: PathBuf,
}

impl CsvReportAdapter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn weights_path(&self, model: OptimizationModel) -> PathBuf {
        self.dir.join(format!("{}_weights.csv", model.key()))
    }

    pub fn paths_path(&self) -> PathBuf {
        self.dir.join(PATHS_FILE)
    }

    fn writer(&self, path: &Path) -> Result<csv::Writer<fs::File>, PortoptError> {
        fs::create_dir_all(&self.dir)?;
        csv::Writer::from_path(path).map_err(|e| csv_error(path, e))
    }
}

fn csv_error(path: &Path, e: csv::Error) -> PortoptError {
    PortoptError::Io {
        reason: format!("failed to write {}: {}", path.display(), e),
    }
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

impl ReportPort for CsvReportAdapter {
    fn write_weights(
        &self,
        model: OptimizationModel,
        rebalances: &[RebalanceRecord],
    ) -> Result<(), PortoptError> {
        let path = self.weights_path(model);
        let assets: Vec<&str> = rebalances
            .iter()
            .flat_map(|r| r.weights.assets().iter().map(String::as_str))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut wtr = self.writer(&path)?;
        let mut header = vec!["Date"];
        header.extend(&assets);
        wtr.write_record(&header).map_err(|e| csv_error(&path, e))?;

        for record in rebalances {
            let mut row = vec![record.date.to_string()];
            row.extend(assets.iter().map(|a| cell(record.weights.get(a))));
            wtr.write_record(&row).map_err(|e| csv_error(&path, e))?;
        }
        wtr.flush()?;
        tracing::info!(model = model.key(), path = %path.display(), "Wrote weights");
        Ok(())
    }

    fn write_paths(&self, result: &ComparisonResult) -> Result<(), PortoptError> {
        let path = self.paths_path();
        let mut columns: Vec<(&str, &PortfolioPath)> = result
            .successful()
            .map(|run| (run.model.display_name(), &run.backtest.path))
            .collect();
        if let Some(bench) = result.benchmark_run() {
            columns.push(("Benchmark", &bench.path));
        }

        let mut table: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
        for (col, (_, series)) in columns.iter().enumerate() {
            for point in series.points() {
                table
                    .entry(point.date)
                    .or_insert_with(|| vec![None; columns.len()])[col] = Some(point.value);
            }
        }

        let mut wtr = self.writer(&path)?;
        let mut header = vec!["Date"];
        header.extend(columns.iter().map(|(name, _)| *name));
        wtr.write_record(&header).map_err(|e| csv_error(&path, e))?;

        for (date, values) in &table {
            let mut row = vec![date.to_string()];
            row.extend(values.iter().map(|v| cell(*v)));
            wtr.write_record(&row).map_err(|e| csv_error(&path, e))?;
        }
        wtr.flush()?;
        tracing::info!(path = %path.display(), rows = table.len(), "Wrote portfolio paths");
        Ok(())
    }
}
