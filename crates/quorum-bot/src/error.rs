//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] quorum_core::CoreError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] quorum_exchange::ExchangeError),

    #[error("Source client error: {0}")]
    Source(String),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] quorum_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
