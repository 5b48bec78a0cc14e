//! Exchange error types.
//!
//! The taxonomy separates retryable transport failures (`Timeout`,
//! `Network`) from non-retryable application outcomes (`Rejection`,
//! `MalformedResponse`, `UnknownInstrument`), so retry behavior is a
//! property of the error kind rather than of individual call sites.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Exchange API credentials are not configured")]
    MissingCredentials,

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Request timed out after {attempts} attempts: {endpoint}")]
    Timeout { endpoint: String, attempts: u32 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed exchange response: {0}")]
    MalformedResponse(String),

    #[error("Exchange rejected request (code {code}): {message}")]
    Rejection { code: i64, message: String },

    #[error("Invalid order input: {0}")]
    InvalidInput(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
