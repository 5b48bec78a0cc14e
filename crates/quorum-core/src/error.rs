//! Error types for quorum-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unknown trade action: {0}")]
    UnknownAction(String),

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),

    #[error("Instrument symbol is empty")]
    EmptyInstrument,

    #[error("Missing field for {action} proposal: {field}")]
    MissingField { action: String, field: String },

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
