//! Result export port trait.

use crate::domain::backtest::RebalanceRecord;
use crate::domain::comparison::ComparisonResult;
use crate::domain::error::PortoptError;
use crate::domain::optimizer::OptimizationModel;

/// Port for exporting comparison results.
pub trait ReportPort {
    /// Weight vectors used by one model, one row per rebalance.
    fn write_weights(
        &self,
        model: OptimizationModel,
        rebalances: &[RebalanceRecord],
    ) -> Result<(), PortoptError>;

    /// Value paths of every successful model, plus the benchmark if present.
    fn write_paths(&self, result: &ComparisonResult) -> Result<(), PortoptError>;

    /// Default implementation: weights for each successful model, then paths.
    fn write(&self, result: &ComparisonResult) -> Result<(), PortoptError> {
        for run in result.successful() {
            self.write_weights(run.model, &run.backtest.rebalances)?;
        }
        self.write_paths(result)
    }
}
