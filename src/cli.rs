//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::BacktestConfig;
use crate::domain::comparison::{optimize_at, run_comparison, ComparisonRequest, ComparisonResult};
use crate::domain::config_validation::{
    parse_anchor, parse_frequency, parse_max_allocation, parse_models, parse_optional_date,
    validate_config,
};
use crate::domain::error::PortoptError;
use crate::domain::metrics::Metrics;
use crate::domain::optimizer::Constraints;
use crate::domain::returns::ReturnMatrix;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::ReturnSource;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "portopt", about = "Portfolio optimization and rebalancing backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest the configured models and export weights and paths
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Output directory, overrides [output] dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Optimize the configured models on a single cutoff date
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Cutoff date (YYYY-MM-DD)
        #[arg(long)]
        date: String,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the data range of every asset in the returns file
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_deref())
            }
        }
        Command::Optimize { config, date } => run_optimize(&config, &date),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config } => run_info(&config),
    }
}

fn report(e: &PortoptError) -> ExitCode {
    eprintln!("error: {e}");
    e.into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| report(&e))
}

/// Load and validate a config in one step.
fn load_valid_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    let adapter = load_config(path)?;
    validate_config(&adapter).map_err(|e| report(&e))?;
    Ok(adapter)
}

pub fn build_constraints(config: &dyn ConfigPort) -> Result<Constraints, PortoptError> {
    Ok(Constraints {
        max_weight: parse_max_allocation(config)?,
        no_short_selling: config.get_bool("optimizer", "no_short_selling", true),
        risk_free_rate: config.get_double("optimizer", "risk_free_rate", 0.02),
        include_risk_free: config.get_bool("backtest", "include_risk_free", false),
    })
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> BacktestConfig {
    let overlay = config
        .get_bool("backtest", "include_risk_free", false)
        .then(|| config.get_double("backtest", "risk_free_overlay", 0.02));
    BacktestConfig {
        risk_free_overlay: overlay,
    }
}

/// `[optimizer] lookback_days`; zero or unset means expanding windows.
pub fn build_lookback(config: &dyn ConfigPort) -> Option<usize> {
    match config.get_int("optimizer", "lookback_days", 0) {
        n if n > 0 => usize::try_from(n).ok(),
        _ => None,
    }
}

pub fn build_comparison_request(
    config: &dyn ConfigPort,
) -> Result<ComparisonRequest, PortoptError> {
    let min_history = config.get_int("optimizer", "min_history", 60);
    Ok(ComparisonRequest {
        models: parse_models(config)?,
        constraints: build_constraints(config)?,
        frequency: parse_frequency(config)?,
        anchor: parse_anchor(config)?,
        lookback: build_lookback(config),
        min_history: usize::try_from(min_history).map_err(|_| {
            PortoptError::invalid_config("optimizer", "min_history", "must be non-negative")
        })?,
        backtest: build_backtest_config(config),
    })
}

/// Returns from `source` within the `[data]` date filters, as a matrix.
pub fn load_matrix(
    source: &dyn ReturnSource,
    config: &dyn ConfigPort,
) -> Result<ReturnMatrix, PortoptError> {
    let start = parse_optional_date(config, "start_date")?;
    let end = parse_optional_date(config, "end_date")?;
    let records = source.fetch_returns(start, end)?;
    if records.is_empty() {
        tracing::warn!(?start, ?end, "No return rows in the requested range");
    }
    let matrix = ReturnMatrix::from_records(&records)?;
    tracing::info!(
        assets = matrix.asset_count(),
        dates = matrix.date_count(),
        rows = records.len(),
        "Loaded return matrix"
    );
    Ok(matrix)
}

fn load_benchmark(config: &dyn ConfigPort) -> Result<Option<ReturnMatrix>, PortoptError> {
    match config
        .get_string("data", "benchmark_path")
        .filter(|s| !s.trim().is_empty())
    {
        Some(path) => {
            let source = CsvAdapter::new(path.trim());
            load_matrix(&source, config).map(Some)
        }
        None => Ok(None),
    }
}

/// Load data, run every model and export the results.
pub fn run_backtest_pipeline(
    source: &dyn ReturnSource,
    benchmark: Option<&ReturnMatrix>,
    config: &dyn ConfigPort,
    reporter: &dyn ReportPort,
) -> Result<ComparisonResult, PortoptError> {
    let request = build_comparison_request(config)?;
    let matrix = load_matrix(source, config)?;
    let result = run_comparison(&matrix, &request, benchmark)?;
    reporter.write(&result)?;
    Ok(result)
}

fn output_dir(override_dir: Option<&Path>, config: &dyn ConfigPort) -> PathBuf {
    override_dir
        .map(Path::to_path_buf)
        .or_else(|| {
            config
                .get_string("output", "dir")
                .filter(|s| !s.trim().is_empty())
                .map(|s| PathBuf::from(s.trim()))
        })
        .unwrap_or_else(|| PathBuf::from("out"))
}

fn run_backtest(config_path: &Path, output: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_valid_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let Some(returns_path) = adapter.get_string("data", "returns_path") else {
        return report(&PortoptError::ConfigMissing {
            section: "data".into(),
            key: "returns_path".into(),
        });
    };
    let source = CsvAdapter::new(returns_path.trim());
    let benchmark = match load_benchmark(&adapter) {
        Ok(b) => b,
        Err(e) => return report(&e),
    };

    let dir = output_dir(output, &adapter);
    let reporter = CsvReportAdapter::new(&dir);

    let result = match run_backtest_pipeline(&source, benchmark.as_ref(), &adapter, &reporter) {
        Ok(r) => r,
        Err(e) => return report(&e),
    };

    print!("{}", format_summary(&result));
    for (model, e) in result.failures() {
        eprintln!("warning: {} failed: {e}", model.display_name());
    }
    if let Some(Err(e)) = &result.benchmark {
        eprintln!("warning: benchmark failed: {e}");
    }

    if result.successful().next().is_none() {
        if let Some((_, e)) = result.failures().next() {
            return report(e);
        }
    }
    eprintln!("\nResults written to: {}", dir.display());
    ExitCode::SUCCESS
}

fn metrics_row(name: &str, m: &Metrics) -> String {
    format!(
        "{:<26} {:>9.2}% {:>9.2}% {:>9.2}% {:>7.2} {:>7.2} {:>8.1}% {:>6}\n",
        name,
        m.total_return * 100.0,
        m.annualized_return * 100.0,
        m.annualized_volatility * 100.0,
        m.sharpe_ratio,
        m.sortino_ratio,
        m.max_drawdown * 100.0,
        m.max_drawdown_duration,
    )
}

/// Comparison table printed after a backtest.
pub fn format_summary(result: &ComparisonResult) -> String {
    let mut out = String::from("=== Model Comparison ===\n");
    out.push_str(&format!(
        "{:<26} {:>10} {:>10} {:>10} {:>7} {:>7} {:>9} {:>6}\n",
        "Model", "Total", "Annual", "Vol", "Sharpe", "Sortino", "MaxDD", "DDDays"
    ));
    for run in result.successful() {
        out.push_str(&metrics_row(run.model.display_name(), &run.metrics));
    }
    for (model, _) in result.failures() {
        out.push_str(&format!("{:<26} failed\n", model.display_name()));
    }
    match &result.benchmark {
        Some(Ok(bench)) => out.push_str(&metrics_row("Benchmark", &bench.metrics)),
        Some(Err(_)) => out.push_str(&format!("{:<26} failed\n", "Benchmark")),
        None => {}
    }
    out.push_str(&format!("Rebalance dates: {}\n", result.schedule.len()));
    out
}

pub fn run_dry_run(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_valid_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let request = match build_comparison_request(&adapter) {
        Ok(r) => r,
        Err(e) => return report(&e),
    };
    eprintln!("Config validated successfully");

    let models: Vec<&str> = request.models.iter().map(|m| m.display_name()).collect();
    eprintln!("\nModels: {}", models.join(", "));
    eprintln!("Rebalance: {} ({:?})", request.frequency, request.anchor);
    match request.lookback {
        Some(n) => eprintln!("Lookback: {n} trading days"),
        None => eprintln!("Lookback: expanding"),
    }
    eprintln!("Min history: {}", request.min_history);
    if let Some(cap) = request.constraints.max_weight {
        eprintln!("Max allocation: {:.1}%", cap * 100.0);
    }
    if let Some(rate) = request.backtest.risk_free_overlay {
        eprintln!("Risk-free overlay: {:.2}%", rate * 100.0);
    }

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_optimize(config_path: &Path, date: &str) -> ExitCode {
    let Ok(date) = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d") else {
        eprintln!("error: invalid --date '{date}', expected YYYY-MM-DD");
        return ExitCode::from(2);
    };
    let adapter = match load_valid_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let request = match build_comparison_request(&adapter) {
        Ok(r) => r,
        Err(e) => return report(&e),
    };
    let source = CsvAdapter::new(
        adapter
            .get_string("data", "returns_path")
            .unwrap_or_default()
            .trim(),
    );
    let matrix = match load_matrix(&source, &adapter) {
        Ok(m) => m,
        Err(e) => return report(&e),
    };

    let results = match optimize_at(
        &matrix,
        date,
        &request.models,
        &request.constraints,
        request.lookback,
    ) {
        Ok(r) => r,
        Err(e) => return report(&e),
    };

    let mut first_error = None;
    for (model, outcome) in &results {
        println!("=== {} ===", model.display_name());
        match outcome {
            Ok(result) => {
                for (asset, weight) in result.weights.iter() {
                    println!("  {:<12} {:>7.2}%", asset, weight * 100.0);
                }
                println!("  Expected return: {:.2}%", result.expected_return * 100.0);
                println!("  Volatility:      {:.2}%", result.volatility * 100.0);
                println!("  Sharpe ratio:    {:.2}", result.sharpe_ratio);
            }
            Err(e) => {
                println!("  failed: {e}");
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if results.values().all(Result::is_err) => e.into(),
        _ => ExitCode::SUCCESS,
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&adapter) {
        return report(&e);
    }
    match build_comparison_request(&adapter) {
        Ok(request) => {
            println!(
                "Config is valid: {} model(s), {} rebalancing",
                request.models.len(),
                request.frequency
            );
            ExitCode::SUCCESS
        }
        Err(e) => report(&e),
    }
}

fn run_info(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let Some(returns_path) = adapter.get_string("data", "returns_path") else {
        return report(&PortoptError::ConfigMissing {
            section: "data".into(),
            key: "returns_path".into(),
        });
    };
    let source = CsvAdapter::new(returns_path.trim());

    match format_info(&source) {
        Ok(Some(text)) => print!("{text}"),
        Ok(None) => eprintln!("{}: no data found", source.path().display()),
        Err(e) => return report(&e),
    }
    ExitCode::SUCCESS
}

/// One line per asset with its observation count and date range, or `None`
/// when the source holds no returns.
pub fn format_info(source: &dyn ReturnSource) -> Result<Option<String>, PortoptError> {
    let ranges = source.data_ranges()?;
    if ranges.is_empty() {
        return Ok(None);
    }
    let mut out = String::new();
    for (asset, (min_date, max_date, count)) in &ranges {
        out.push_str(&format!("{asset}: {count} returns, {min_date} to {max_date}\n"));
    }
    Ok(Some(out))
}
