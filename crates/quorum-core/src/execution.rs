//! Per-cycle execution accounting.
//!
//! Every decision handed to the execution engine terminates in exactly one
//! [`DecisionStatus`]; the engine aggregates them into an
//! [`ExecutionSummary`] returned to the caller each cycle.

use crate::proposal::TradeAction;
use serde::Serialize;
use std::fmt;

// ============================================================================
// DecisionStatus
// ============================================================================

/// Terminal state of one decision within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// Orders placed (or HOLD no-op) successfully.
    Executed,
    /// Confidence below the configured threshold.
    SkippedLowConfidence,
    /// CLOSE refused because it would realize a loss.
    SkippedLossGuard,
    /// Any failure: invalid input, unknown instrument, rejected order.
    Failed,
}

impl DecisionStatus {
    /// Wire/report representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Executed => "success",
            Self::SkippedLowConfidence => "skipped_low_confidence",
            Self::SkippedLossGuard => "skipped_loss_position",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// ExecutionDetail / ExecutionSummary
// ============================================================================

/// Per-instrument outcome record.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionDetail {
    /// Instrument symbol.
    pub instrument: String,
    /// Action that was attempted.
    pub action: TradeAction,
    /// Terminal state.
    pub status: DecisionStatus,
    /// Failure reason, when status is `Failed`.
    pub reason: Option<String>,
}

/// Aggregated result of one execution cycle.
///
/// Both skip kinds share the `skipped_low_confidence` counter; the detail
/// rows carry the distinct status.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionSummary {
    /// Number of decisions processed.
    pub total: usize,
    /// Decisions that executed (including HOLD no-ops).
    pub executed: usize,
    /// Decisions skipped by the confidence gate or the loss guard.
    pub skipped_low_confidence: usize,
    /// Decisions that failed.
    pub failed: usize,
    /// Per-instrument detail records, in processing order.
    pub details: Vec<ExecutionDetail>,
}

impl ExecutionSummary {
    /// Create an empty summary sized for `total` decisions.
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    /// Record one decision outcome, updating the matching counter.
    pub fn record(&mut self, detail: ExecutionDetail) {
        match detail.status {
            DecisionStatus::Executed => self.executed += 1,
            DecisionStatus::SkippedLowConfidence | DecisionStatus::SkippedLossGuard => {
                self.skipped_low_confidence += 1;
            }
            DecisionStatus::Failed => self.failed += 1,
        }
        self.details.push(detail);
    }
}
