use stockpipe_core::{LoadError, PipelineError, ValidationError, WarehouseError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("strict mode failed: warnings={warning_count}, errors={error_count}")]
    StrictModeViolation {
        warning_count: usize,
        error_count: usize,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_)
            | Self::InvalidArgument(_)
            | Self::Pipeline(PipelineError::Validation(_))
            | Self::Warehouse(WarehouseError::QueryRejected(_)) => 2,
            Self::StrictModeViolation { .. } => 5,
            Self::Load(_)
            | Self::Pipeline(_)
            | Self::Warehouse(_)
            | Self::Serialization(_)
            | Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_categories_to_exit_codes() {
        assert_eq!(CliError::Validation(ValidationError::ZeroWindow).exit_code(), 2);
        assert_eq!(
            CliError::Warehouse(WarehouseError::QueryRejected(String::from("nope"))).exit_code(),
            2
        );
        assert_eq!(
            CliError::Warehouse(WarehouseError::QueryTimeout { timeout_ms: 1 }).exit_code(),
            10
        );
        assert_eq!(
            CliError::StrictModeViolation {
                warning_count: 1,
                error_count: 0
            }
            .exit_code(),
            5
        );
        assert_eq!(CliError::Load(LoadError::MissingHeader).exit_code(), 10);
    }
}
