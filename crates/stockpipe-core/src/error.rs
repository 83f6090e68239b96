use thiserror::Error;

/// Validation and contract errors exposed by `stockpipe-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("security id cannot be empty")]
    EmptySecurityId,
    #[error("invalid security id '{value}', expected a 32-bit integer")]
    InvalidSecurityId { value: String },

    #[error("trade date must be YYYY-MM-DD: '{value}'")]
    InvalidTradeDate { value: String },

    #[error("field '{field}' is not a number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },
    #[error("field '{field}' cannot be empty")]
    EmptyField { field: &'static str },

    #[error("moving-average window must be at least 1")]
    ZeroWindow,

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },

    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}
