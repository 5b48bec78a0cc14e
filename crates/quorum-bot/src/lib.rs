//! Consensus-gated futures trading bot.
//!
//! Wires the workspace together: configuration, recommendation-source
//! collection, consensus merging, and order execution, driven by a
//! single-cycle or continuous runner.

pub mod app;
pub mod config;
pub mod error;
pub mod sources;

pub use app::{Application, CycleOutcome};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use sources::{SourceClient, SourceConfig};
