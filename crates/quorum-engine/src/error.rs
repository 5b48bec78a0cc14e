//! Engine error types.

use quorum_exchange::ExchangeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Decision failed before any network call (e.g. non-positive target
    /// entry price).
    #[error("Insufficient input: {0}")]
    InsufficientInput(String),

    /// CLOSE for an instrument with no ledger entry.
    #[error("No open position for {0}")]
    NoPosition(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

pub type EngineResult<T> = Result<T, EngineError>;
