//! Unanimity merger.

use quorum_core::{ConsensusDecision, TradeProposal};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Merges per-source trade proposals into unanimous decisions.
///
/// # Consensus rule
///
/// Proposals are grouped by instrument; a group yields a decision only when
/// every member normalizes to the same (action, instrument, direction)
/// triple. A group of size 1 is unanimous by construction, so an instrument
/// mentioned by a single source — uncontradicted because the others are
/// simply silent on it — still trades. A misbehaving source can exploit
/// this to force a trade through; the behavior is intentional and kept
/// observable rather than silently requiring full source coverage.
#[derive(Debug, Clone)]
pub struct ConsensusMerger {
    /// Total number of configured sources, reported on every decision.
    source_count: usize,
}

impl ConsensusMerger {
    /// Create a merger for the given number of configured sources.
    #[must_use]
    pub fn new(source_count: usize) -> Self {
        Self { source_count }
    }

    /// Merge proposals into at most one decision per instrument.
    ///
    /// With proposals from exactly one source, trades pass through
    /// unchanged (trivial consensus, no averaging). Otherwise each
    /// instrument group must agree unanimously; the decision takes the
    /// first proposal's parameters with the arithmetic mean of the group's
    /// confidences. Disagreeing instruments are dropped entirely.
    #[must_use]
    pub fn merge(&self, proposals: &[TradeProposal]) -> Vec<ConsensusDecision> {
        if proposals.is_empty() {
            debug!("No proposals to merge");
            return Vec::new();
        }

        let responding: HashSet<&str> =
            proposals.iter().map(|p| p.source_id.as_str()).collect();
        if responding.len() == 1 {
            info!(
                source = responding.iter().next().copied().unwrap_or_default(),
                trades = proposals.len(),
                "Single source responded, passing its trades through"
            );
            return proposals
                .iter()
                .map(|p| ConsensusDecision {
                    trade: p.clone(),
                    agreement_count: 1,
                    source_count: self.source_count,
                })
                .collect();
        }

        // Group by instrument, preserving first-seen order so the merged
        // decision list is deterministic.
        let mut order: Vec<&str> = Vec::new();
        let mut groups: HashMap<&str, Vec<&TradeProposal>> = HashMap::new();
        for proposal in proposals {
            let key = proposal.instrument.as_str();
            groups
                .entry(key)
                .or_insert_with(|| {
                    order.push(key);
                    Vec::new()
                })
                .push(proposal);
        }

        let mut decisions = Vec::new();

        for instrument in order {
            let group = &groups[instrument];
            let triples: HashSet<_> = group.iter().map(|p| p.triple()).collect();

            if triples.len() == 1 {
                let first = group[0];
                let mean_confidence =
                    group.iter().map(|p| p.confidence).sum::<f64>() / group.len() as f64;

                debug!(
                    instrument,
                    action = %first.action,
                    direction = ?first.direction,
                    agreement = group.len(),
                    confidence = mean_confidence,
                    "Sources agree"
                );

                let mut trade = first.clone();
                trade.confidence = mean_confidence;
                decisions.push(ConsensusDecision {
                    trade,
                    agreement_count: group.len(),
                    source_count: self.source_count,
                });
            } else {
                for proposal in group {
                    warn!(
                        instrument,
                        source = %proposal.source_id,
                        action = %proposal.action,
                        direction = ?proposal.direction,
                        "Conflicting recommendation"
                    );
                }
                warn!(instrument, "Sources disagree, dropping instrument for this cycle");
            }
        }

        info!(
            proposals = proposals.len(),
            decisions = decisions.len(),
            "Consensus merge complete"
        );
        decisions
    }
}
