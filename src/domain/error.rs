//! Domain error types.

/// Top-level error type for portopt.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PortoptError {
    #[error("invalid optimization input: {reason}")]
    OptimizationInput { reason: String },

    #[error("optimization failed: {reason}")]
    OptimizationFailure { reason: String },

    #[error("unsupported model: {name}")]
    UnsupportedModel { name: String },

    #[error("no trading dates to schedule")]
    EmptySchedule,

    #[error("missing data for {asset}: {reason}")]
    MissingData { asset: String, reason: String },

    #[error("duplicate observation for {asset} on {date}")]
    DuplicateObservation { asset: String, date: String },

    #[error("invalid value for {asset} on {date}: {value}")]
    InvalidValue {
        asset: String,
        date: String,
        value: f64,
    },

    #[error("portfolio value is no longer finite on {date}")]
    NumericalOverflow { date: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("io error: {reason}")]
    Io { reason: String },
}

impl PortoptError {
    pub fn input(reason: impl Into<String>) -> Self {
        PortoptError::OptimizationInput {
            reason: reason.into(),
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        PortoptError::OptimizationFailure {
            reason: reason.into(),
        }
    }

    pub fn invalid_config(section: &str, key: &str, reason: impl Into<String>) -> Self {
        PortoptError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for PortoptError {
    fn from(err: std::io::Error) -> Self {
        PortoptError::Io {
            reason: err.to_string(),
        }
    }
}

impl From<&PortoptError> for std::process::ExitCode {
    fn from(err: &PortoptError) -> Self {
        let code: u8 = match err {
            PortoptError::Io { .. } => 1,
            PortoptError::ConfigParse { .. }
            | PortoptError::ConfigMissing { .. }
            | PortoptError::ConfigInvalid { .. }
            | PortoptError::UnsupportedModel { .. } => 2,
            PortoptError::Data { .. }
            | PortoptError::DuplicateObservation { .. }
            | PortoptError::InvalidValue { .. }
            | PortoptError::MissingData { .. } => 3,
            PortoptError::OptimizationInput { .. } | PortoptError::OptimizationFailure { .. } => 4,
            PortoptError::EmptySchedule | PortoptError::NumericalOverflow { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
