//! Consensus merging of trade proposals.
//!
//! Reconciles independently produced trade proposals into at most one
//! actionable decision per instrument. Disagreement always means "do
//! nothing" for that instrument; there is no majority vote.

mod merger;

pub use merger::ConsensusMerger;
