//! Core domain types and logic.

pub mod backtest;
pub mod cluster;
pub mod comparison;
pub mod config_validation;
pub mod error;
pub mod linalg;
pub mod metrics;
pub mod optimizer;
pub mod qp;
pub mod returns;
pub mod schedule;
pub mod weights;
