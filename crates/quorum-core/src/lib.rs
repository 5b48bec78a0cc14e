//! Core domain types for the quorum trading system.
//!
//! This crate provides the fundamental types shared across the workspace:
//! - `TradeAction`, `Direction`: closed trading enums
//! - `TradeProposal`, `ConsensusDecision`: validated signal types
//! - `ExecutionSummary`, `DecisionStatus`: per-cycle execution accounting
//! - `RetryPolicy`, `Backoff`: explicit retry/backoff configuration

pub mod error;
pub mod execution;
pub mod proposal;
pub mod retry;

pub use error::{CoreError, Result};
pub use execution::{DecisionStatus, ExecutionDetail, ExecutionSummary};
pub use proposal::{ConsensusDecision, Direction, RawTradeProposal, TradeAction, TradeProposal};
pub use retry::{Backoff, RetryPolicy};
