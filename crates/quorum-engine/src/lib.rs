//! Order execution engine.
//!
//! Converts approved consensus decisions into exchange orders, manages the
//! open/closed lifecycle of positions and their protective stops, and
//! aggregates per-decision outcomes into a cycle summary. Every failure is
//! converted into a `Failed` detail record; nothing escapes `execute()`.

pub mod engine;
pub mod error;

pub use engine::ExecutionEngine;
pub use error::{EngineError, EngineResult};
