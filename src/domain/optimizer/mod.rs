//! Portfolio weight optimization.
//!
//! `optimize` is a pure function of a training window, a model and a set of
//! constraints. Estimates are annualized with 252 trading days:
//! - `OptimizationModel`: the supported allocation policies
//! - `Constraints`: box constraints and risk-free settings
//! - `Estimates`: annualized mean vector and sample covariance
//! - `OptimizationResult`: weights plus implied return, volatility and Sharpe

pub mod heuristic;
pub mod hrp;
pub mod mean_variance;

use crate::domain::error::PortoptError;
use crate::domain::linalg::{column_means, dot, quad_form, sample_covariance, scale, Matrix};
use crate::domain::qp::Bounds;
use crate::domain::returns::ReturnWindow;
use crate::domain::weights::WeightVector;
use std::fmt;
use std::str::FromStr;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptimizationModel {
    MeanVariance,
    MinimumVariance,
    MaxSharpe,
    EqualWeight,
    RiskParity,
    HierarchicalRiskParity,
}

impl OptimizationModel {
    pub const ALL: [OptimizationModel; 6] = [
        OptimizationModel::MeanVariance,
        OptimizationModel::MinimumVariance,
        OptimizationModel::MaxSharpe,
        OptimizationModel::EqualWeight,
        OptimizationModel::RiskParity,
        OptimizationModel::HierarchicalRiskParity,
    ];

    /// Short identifier used in file names and config keys.
    pub fn key(&self) -> &'static str {
        match self {
            OptimizationModel::MeanVariance => "mean_variance",
            OptimizationModel::MinimumVariance => "minimum_variance",
            OptimizationModel::MaxSharpe => "max_sharpe",
            OptimizationModel::EqualWeight => "equal_weight",
            OptimizationModel::RiskParity => "risk_parity",
            OptimizationModel::HierarchicalRiskParity => "hierarchical_risk_parity",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            OptimizationModel::MeanVariance => "Modern Portfolio Theory",
            OptimizationModel::MinimumVariance => "Minimum Variance",
            OptimizationModel::MaxSharpe => "Maximum Sharpe Ratio",
            OptimizationModel::EqualWeight => "Equal Weight",
            OptimizationModel::RiskParity => "Risk Parity",
            OptimizationModel::HierarchicalRiskParity => "Hierarchical Risk Parity",
        }
    }

    /// Variants that go through the covariance solver.
    pub fn is_solver_based(&self) -> bool {
        matches!(
            self,
            OptimizationModel::MeanVariance
                | OptimizationModel::MinimumVariance
                | OptimizationModel::MaxSharpe
        )
    }
}

impl fmt::Display for OptimizationModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for OptimizationModel {
    type Err = PortoptError;

    /// Accepts keys (`max_sharpe`), display names (`Maximum Sharpe Ratio`)
    /// and a few common abbreviations, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c })
            .collect();
        let model = match normalized.as_str() {
            "mean_variance" | "modern_portfolio_theory" | "mpt" => {
                OptimizationModel::MeanVariance
            }
            "minimum_variance" | "min_variance" | "mvp" => OptimizationModel::MinimumVariance,
            "max_sharpe" | "maximum_sharpe_ratio" | "msr" => OptimizationModel::MaxSharpe,
            "equal_weight" | "ew" => OptimizationModel::EqualWeight,
            "risk_parity" | "inverse_volatility" => OptimizationModel::RiskParity,
            "hierarchical_risk_parity" | "hrp" => OptimizationModel::HierarchicalRiskParity,
            _ => {
                return Err(PortoptError::UnsupportedModel {
                    name: s.trim().to_string(),
                })
            }
        };
        Ok(model)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
    /// Per-asset cap, in (0, 1].
    pub max_weight: Option<f64>,
    pub no_short_selling: bool,
    /// Annual risk-free rate for Sharpe-based variants.
    pub risk_free_rate: f64,
    /// Whether mean-variance uses `risk_free_rate` (otherwise zero).
    pub include_risk_free: bool,
}

impl Default for Constraints {
    fn default() -> Self {
        Constraints {
            max_weight: None,
            no_short_selling: true,
            risk_free_rate: 0.02,
            include_risk_free: false,
        }
    }
}

impl Constraints {
    pub fn validate(&self) -> Result<(), PortoptError> {
        if let Some(cap) = self.max_weight {
            if !(cap > 0.0 && cap <= 1.0) {
                return Err(PortoptError::input(format!(
                    "max_weight must be in (0, 1], got {cap}"
                )));
            }
        }
        if !self.risk_free_rate.is_finite() {
            return Err(PortoptError::input("risk_free_rate must be finite"));
        }
        Ok(())
    }

    pub fn bounds(&self, n: usize) -> Bounds {
        Bounds::new(n, self.no_short_selling, self.max_weight)
    }

    /// Risk-free rate used by the Sharpe objective of `model`.
    pub fn sharpe_rate(&self, model: OptimizationModel) -> f64 {
        match model {
            OptimizationModel::MeanVariance if !self.include_risk_free => 0.0,
            _ => self.risk_free_rate,
        }
    }
}

/// Annualized expected returns and covariance of a window.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimates {
    pub mu: Vec<f64>,
    pub cov: Matrix,
}

impl Estimates {
    pub fn from_window(window: &ReturnWindow) -> Self {
        let mu = column_means(&window.columns)
            .into_iter()
            .map(|m| m * TRADING_DAYS_PER_YEAR)
            .collect();
        let cov = scale(&sample_covariance(&window.columns), TRADING_DAYS_PER_YEAR);
        Self { mu, cov }
    }

    pub fn volatilities(&self) -> Vec<f64> {
        (0..self.cov.len())
            .map(|i| self.cov[i][i].max(0.0).sqrt())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub model: OptimizationModel,
    pub weights: WeightVector,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

/// Compute the weights of `model` over `window`.
pub fn optimize(
    window: &ReturnWindow,
    model: OptimizationModel,
    constraints: &Constraints,
) -> Result<OptimizationResult, PortoptError> {
    let n = window.asset_count();
    if n < 2 {
        return Err(PortoptError::input(format!(
            "window has {n} asset(s) with complete data, need at least 2"
        )));
    }
    if window.observations() < 2 {
        return Err(PortoptError::input(format!(
            "window has {} observation(s), need at least 2",
            window.observations()
        )));
    }
    constraints.validate()?;

    let estimates = Estimates::from_window(window);
    if model != OptimizationModel::EqualWeight {
        if let Some(i) = estimates.volatilities().iter().position(|v| *v <= 0.0) {
            return Err(PortoptError::input(format!(
                "{} has zero variance in the window",
                window.assets[i]
            )));
        }
    }

    let bounds = constraints.bounds(n);
    if !bounds.is_feasible() {
        return Err(PortoptError::failure(format!(
            "max_weight {:?} cannot allocate {n} assets",
            constraints.max_weight
        )));
    }
    let raw = match model {
        OptimizationModel::MeanVariance | OptimizationModel::MaxSharpe => {
            mean_variance::max_sharpe_weights(
                &estimates.mu,
                &estimates.cov,
                constraints.sharpe_rate(model),
                &bounds,
            )?
        }
        OptimizationModel::MinimumVariance => {
            mean_variance::min_variance_weights(&estimates.cov, &bounds)?
        }
        OptimizationModel::EqualWeight => {
            heuristic::apply_cap(heuristic::equal_weights(n), constraints.max_weight)?
        }
        OptimizationModel::RiskParity => heuristic::apply_cap(
            heuristic::inverse_volatility_weights(&estimates.cov)?,
            constraints.max_weight,
        )?,
        OptimizationModel::HierarchicalRiskParity => heuristic::apply_cap(
            hrp::hrp_weights(&window.assets, &estimates.cov)?,
            constraints.max_weight,
        )?,
    };

    let weights = WeightVector::new(window.assets.clone(), raw)?;
    Ok(performance(model, weights, &estimates, constraints.risk_free_rate))
}

fn performance(
    model: OptimizationModel,
    weights: WeightVector,
    estimates: &Estimates,
    risk_free_rate: f64,
) -> OptimizationResult {
    let expected_return = dot(weights.weights(), &estimates.mu);
    let volatility = quad_form(&estimates.cov, weights.weights()).max(0.0).sqrt();
    let sharpe_ratio = if volatility > 0.0 {
        (expected_return - risk_free_rate) / volatility
    } else {
        0.0
    };
    OptimizationResult {
        model,
        weights,
        expected_return,
        volatility,
        sharpe_ratio,
    }
}
