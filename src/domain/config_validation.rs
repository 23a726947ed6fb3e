//! Configuration validation.
//!
//! Validates all config fields before a run starts.

use crate::domain::comparison::validate_models;
use crate::domain::error::PortoptError;
use crate::domain::optimizer::OptimizationModel;
use crate::domain::schedule::{RebalanceFrequency, ScheduleAnchor};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    validate_data_config(config)?;
    validate_optimizer_config(config)?;
    validate_backtest_config(config)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    validate_returns_path(config)?;
    validate_dates(config)?;
    Ok(())
}

pub fn validate_optimizer_config(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    parse_models(config)?;
    validate_max_allocation(config)?;
    validate_risk_free_rate(config)?;
    validate_history(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    parse_frequency(config)?;
    parse_anchor(config)?;
    validate_overlay(config)?;
    Ok(())
}

fn validate_returns_path(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    match config.get_string("data", "returns_path") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(PortoptError::ConfigMissing {
            section: "data".to_string(),
            key: "returns_path".to_string(),
        }),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let start_date = parse_optional_date(config, "start_date")?;
    let end_date = parse_optional_date(config, "end_date")?;

    if let (Some(start), Some(end)) = (start_date, end_date) {
        if start >= end {
            return Err(PortoptError::ConfigInvalid {
                section: "data".to_string(),
                key: "start_date".to_string(),
                reason: "start_date must be before end_date".to_string(),
            });
        }
    }
    Ok(())
}

/// `[data]` date filter; absent or blank means no bound.
pub fn parse_optional_date(
    config: &dyn ConfigPort,
    field: &str,
) -> Result<Option<NaiveDate>, PortoptError> {
    match config.get_string("data", field) {
        Some(s) if !s.trim().is_empty() => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| PortoptError::ConfigInvalid {
                section: "data".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", field),
            }),
        _ => Ok(None),
    }
}

/// Parse and check the `[optimizer] models` list.
pub fn parse_models(config: &dyn ConfigPort) -> Result<Vec<OptimizationModel>, PortoptError> {
    let names = config.get_list("optimizer", "models");
    if names.is_empty() {
        return Err(PortoptError::ConfigMissing {
            section: "optimizer".to_string(),
            key: "models".to_string(),
        });
    }
    let models = names
        .iter()
        .map(|name| name.parse::<OptimizationModel>())
        .collect::<Result<Vec<_>, _>>()?;
    validate_models(&models)?;
    Ok(models)
}

/// Optional per-asset cap; `None` when unset.
pub fn parse_max_allocation(config: &dyn ConfigPort) -> Result<Option<f64>, PortoptError> {
    let Some(raw) = config
        .get_string("optimizer", "max_allocation")
        .filter(|s| !s.trim().is_empty())
    else {
        return Ok(None);
    };
    let value: f64 = raw.trim().parse().map_err(|_| PortoptError::ConfigInvalid {
        section: "optimizer".to_string(),
        key: "max_allocation".to_string(),
        reason: format!("'{}' is not a number", raw.trim()),
    })?;
    if !(value > 0.0 && value <= 1.0) {
        return Err(PortoptError::ConfigInvalid {
            section: "optimizer".to_string(),
            key: "max_allocation".to_string(),
            reason: "max_allocation must be in (0, 1]".to_string(),
        });
    }
    Ok(Some(value))
}

fn validate_max_allocation(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    parse_max_allocation(config).map(|_| ())
}

fn validate_risk_free_rate(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let value = config.get_double("optimizer", "risk_free_rate", 0.02);
    if !(0.0..1.0).contains(&value) {
        return Err(PortoptError::ConfigInvalid {
            section: "optimizer".to_string(),
            key: "risk_free_rate".to_string(),
            reason: "risk_free_rate must be between 0 and 1".to_string(),
        });
    }
    Ok(())
}

fn validate_history(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let lookback = config.get_int("optimizer", "lookback_days", 0);
    if lookback < 0 {
        return Err(PortoptError::ConfigInvalid {
            section: "optimizer".to_string(),
            key: "lookback_days".to_string(),
            reason: "lookback_days must be non-negative".to_string(),
        });
    }
    let min_history = config.get_int("optimizer", "min_history", 60);
    if min_history < 2 {
        return Err(PortoptError::ConfigInvalid {
            section: "optimizer".to_string(),
            key: "min_history".to_string(),
            reason: "min_history must be at least 2".to_string(),
        });
    }
    if lookback > 0 && lookback < min_history {
        return Err(PortoptError::ConfigInvalid {
            section: "optimizer".to_string(),
            key: "lookback_days".to_string(),
            reason: "lookback_days must not be shorter than min_history".to_string(),
        });
    }
    Ok(())
}

/// `[backtest] rebalance`, quarterly when unset.
pub fn parse_frequency(config: &dyn ConfigPort) -> Result<RebalanceFrequency, PortoptError> {
    match config
        .get_string("backtest", "rebalance")
        .filter(|s| !s.trim().is_empty())
    {
        Some(s) => s.parse(),
        None => Ok(RebalanceFrequency::Quarterly),
    }
}

pub fn parse_anchor(config: &dyn ConfigPort) -> Result<ScheduleAnchor, PortoptError> {
    match config
        .get_string("backtest", "anchor")
        .filter(|s| !s.trim().is_empty())
    {
        Some(s) => s.parse(),
        None => Ok(ScheduleAnchor::default()),
    }
}

fn validate_overlay(config: &dyn ConfigPort) -> Result<(), PortoptError> {
    let value = config.get_double("backtest", "risk_free_overlay", 0.02);
    if !(0.0..1.0).contains(&value) {
        return Err(PortoptError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "risk_free_overlay".to_string(),
            reason: "risk_free_overlay must be between 0 and 1".to_string(),
        });
    }
    Ok(())
}
