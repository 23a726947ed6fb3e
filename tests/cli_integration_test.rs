//! CLI integration tests with real INI and CSV files on disk.
//!
//! Tests cover:
//! - Backtest command end to end, including exported CSV files
//! - Dry-run, validate, optimize and info commands
//! - Exit codes for config, data and optimization failures

mod common;

use clap::Parser;
use common::*;
use portopt::cli::{self, Cli};
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use tempfile::TempDir;

fn setup(dir: &Path, extra: &str) -> std::path::PathBuf {
    let returns = write_returns_csv(
        dir,
        "returns.csv",
        &synthetic_records(&["AAA", "BBB", "CCC"], 180),
    );
    let bench = write_returns_csv(dir, "bench.csv", &synthetic_records(&["IDX"], 180));
    let ini = format!(
        "[data]\nreturns_path = {}\nbenchmark_path = {}\n\
         [optimizer]\nmodels = Equal Weight, Risk Parity, Minimum Variance\n\
         min_history = 30\nrisk_free_rate = 0.02\n\
         [backtest]\nrebalance = quarterly\n\
         [output]\ndir = {}\n{extra}",
        returns.display(),
        bench.display(),
        dir.join("out").display(),
    );
    let path = dir.join("portopt.ini");
    fs::write(&path, ini).unwrap();
    path
}

fn run(args: &[&str]) -> ExitCode {
    cli::run(Cli::parse_from(std::iter::once("portopt").chain(args.iter().copied())))
}

mod backtest_command {
    use super::*;

    #[test]
    fn writes_weights_and_paths() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path(), "");

        let code = run(&["backtest", "-c", cfg.to_str().unwrap()]);
        assert_eq!(code, ExitCode::SUCCESS);

        let out = dir.path().join("out");
        for key in ["equal_weight", "risk_parity", "minimum_variance"] {
            let weights = fs::read_to_string(out.join(format!("{key}_weights.csv"))).unwrap();
            assert!(weights.starts_with("Date,AAA,BBB,CCC"));
        }
        let paths = fs::read_to_string(out.join("portfolio_paths.csv")).unwrap();
        let mut lines = paths.lines();
        assert_eq!(
            lines.next(),
            Some("Date,Minimum Variance,Equal Weight,Risk Parity,Benchmark")
        );
        assert_eq!(lines.count(), 180);
    }

    #[test]
    fn output_flag_overrides_config() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path(), "");
        let custom = dir.path().join("custom");

        let code = run(&[
            "backtest",
            "-c",
            cfg.to_str().unwrap(),
            "-o",
            custom.to_str().unwrap(),
        ]);
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(custom.join("portfolio_paths.csv").exists());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path(), "");

        let code = run(&["backtest", "-c", cfg.to_str().unwrap(), "--dry-run"]);
        assert_eq!(code, ExitCode::SUCCESS);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn missing_returns_file_is_data_error() {
        let dir = TempDir::new().unwrap();
        let cfg = dir.path().join("bad.ini");
        fs::write(
            &cfg,
            format!(
                "[data]\nreturns_path = {}\n[optimizer]\nmodels = ew\n",
                dir.path().join("missing.csv").display()
            ),
        )
        .unwrap();

        assert_eq!(run(&["backtest", "-c", cfg.to_str().unwrap()]), ExitCode::from(3));
    }

    #[test]
    fn every_model_failing_returns_optimization_code() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path(), "");
        // three assets cannot fit under a 20% cap
        let content = fs::read_to_string(&cfg)
            .unwrap()
            .replace("Equal Weight, Risk Parity, Minimum Variance", "Minimum Variance")
            .replace("min_history = 30", "min_history = 30\nmax_allocation = 0.2");
        fs::write(&cfg, content).unwrap();

        assert_eq!(run(&["backtest", "-c", cfg.to_str().unwrap()]), ExitCode::from(4));
    }
}

mod other_commands {
    use super::*;

    #[test]
    fn validate_accepts_good_config() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path(), "");
        assert_eq!(run(&["validate", "-c", cfg.to_str().unwrap()]), ExitCode::SUCCESS);
    }

    #[test]
    fn validate_rejects_unknown_model() {
        let dir = TempDir::new().unwrap();
        let cfg = dir.path().join("bad.ini");
        fs::write(&cfg, "[data]\nreturns_path = r.csv\n[optimizer]\nmodels = Black-Litterman\n")
            .unwrap();
        assert_eq!(run(&["validate", "-c", cfg.to_str().unwrap()]), ExitCode::from(2));
    }

    #[test]
    fn validate_rejects_missing_file() {
        assert_eq!(
            run(&["validate", "-c", "/nonexistent/portopt.ini"]),
            ExitCode::from(2)
        );
    }

    #[test]
    fn optimize_on_date() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path(), "");
        let code = run(&["optimize", "-c", cfg.to_str().unwrap(), "--date", "2020-05-29"]);
        assert_eq!(code, ExitCode::SUCCESS);
    }

    #[test]
    fn optimize_rejects_bad_date() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path(), "");
        let code = run(&["optimize", "-c", cfg.to_str().unwrap(), "--date", "29/05/2020"]);
        assert_eq!(code, ExitCode::from(2));
    }

    #[test]
    fn optimize_before_data_is_data_error() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path(), "");
        let code = run(&["optimize", "-c", cfg.to_str().unwrap(), "--date", "2019-01-01"]);
        assert_eq!(code, ExitCode::from(3));
    }

    #[test]
    fn info_lists_assets() {
        let dir = TempDir::new().unwrap();
        let cfg = setup(dir.path(), "");
        assert_eq!(run(&["info", "-c", cfg.to_str().unwrap()]), ExitCode::SUCCESS);
    }
}
