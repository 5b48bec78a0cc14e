//! Core execution engine for approved consensus decisions.
//!
//! Per-decision state machine (initial state Proposed; terminal states in
//! parentheses):
//!
//! 1. Confidence gate      → (SkippedLowConfidence)
//! 2. Loss guard (CLOSE with an open position only) → (SkippedLossGuard)
//! 3. Dispatch by action:
//!    - OPEN / BP / SP     → leverage, sizing, entry order, protective stop,
//!                           ledger put → (Executed) or (Failed)
//!    - CLOSE              → cancel stop, closing order, ledger remove
//!                           → (Executed) or (Failed)
//!    - HOLD               → no exchange call → (Executed)
//!
//! Side effects per decision per cycle are bounded: at most one
//! leverage-set call, one market order and one protective-order
//! place/cancel; the position ledger is the only mutated shared state.

use quorum_core::{
    ConsensusDecision, DecisionStatus, Direction, ExecutionDetail, ExecutionSummary, TradeAction,
    TradeProposal,
};
use quorum_exchange::{FuturesApi, OrderSide};
use quorum_position::{Position, PositionLedger};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

/// Executes merged decisions against the exchange.
///
/// Owns the position ledger for its whole lifetime and is its only writer.
pub struct ExecutionEngine {
    api: FuturesApi,
    ledger: PositionLedger,
    confidence_threshold: f64,
}

impl ExecutionEngine {
    /// Create an engine with an empty ledger.
    #[must_use]
    pub fn new(api: FuturesApi, confidence_threshold: f64) -> Self {
        Self {
            api,
            ledger: PositionLedger::new(),
            confidence_threshold,
        }
    }

    /// Configured confidence threshold.
    #[must_use]
    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// The exchange API surface (shared with read-only callers).
    #[must_use]
    pub fn api(&self) -> &FuturesApi {
        &self.api
    }

    /// The position ledger (read-only outside the engine).
    #[must_use]
    pub fn ledger(&self) -> &PositionLedger {
        &self.ledger
    }

    /// Execute a cycle's decisions strictly in order.
    ///
    /// Every decision terminates in exactly one summary detail; a failure
    /// in one decision never aborts processing of the rest.
    pub async fn execute(
        &mut self,
        decisions: &[ConsensusDecision],
        available_cash: Decimal,
    ) -> ExecutionSummary {
        let mut summary = ExecutionSummary::new(decisions.len());

        for decision in decisions {
            let trade = &decision.trade;
            info!(
                instrument = %trade.instrument,
                action = %trade.action,
                confidence = trade.confidence,
                agreement = decision.agreement_count,
                "Processing decision"
            );

            // Gate 1: confidence.
            if trade.confidence < self.confidence_threshold {
                debug!(
                    instrument = %trade.instrument,
                    confidence = trade.confidence,
                    threshold = self.confidence_threshold,
                    "Skipped: confidence below threshold"
                );
                summary.record(detail(trade, DecisionStatus::SkippedLowConfidence, None));
                continue;
            }

            // Gate 2: loss guard. A CLOSE that would realize a loss is
            // refused outright, at any confidence.
            if trade.action == TradeAction::Close && self.close_would_realize_loss(trade) {
                info!(
                    instrument = %trade.instrument,
                    "Skipped: position is under water, refusing to close at a loss"
                );
                summary.record(detail(trade, DecisionStatus::SkippedLossGuard, None));
                continue;
            }

            // Dispatch.
            let outcome = match trade.action {
                TradeAction::Open | TradeAction::BreakoutLong | TradeAction::BreakoutShort => {
                    self.open_position(trade, available_cash).await
                }
                TradeAction::Close => self.close_position(trade).await,
                TradeAction::Hold => {
                    debug!(instrument = %trade.instrument, "Holding position");
                    Ok(())
                }
            };

            match outcome {
                Ok(()) => summary.record(detail(trade, DecisionStatus::Executed, None)),
                Err(e) => {
                    warn!(
                        instrument = %trade.instrument,
                        action = %trade.action,
                        error = %e,
                        "Decision failed"
                    );
                    summary.record(detail(trade, DecisionStatus::Failed, Some(e.to_string())));
                }
            }
        }

        info!(
            total = summary.total,
            executed = summary.executed,
            skipped = summary.skipped_low_confidence,
            failed = summary.failed,
            "Cycle execution complete"
        );
        summary
    }

    /// Whether closing now would realize a loss on the recorded position.
    ///
    /// The proposal's target price stands in for the current price; when
    /// absent, the recorded entry price is used (never a loss).
    fn close_would_realize_loss(&self, trade: &TradeProposal) -> bool {
        let Some(position) = self.ledger.get(&trade.instrument) else {
            return false;
        };

        let current = trade.target_entry_price.unwrap_or(position.entry_price);
        match position.direction {
            Direction::Long => current < position.entry_price,
            Direction::Short => current > position.entry_price,
        }
    }

    /// Open a position: leverage → sizing → entry order → protective stop
    /// → ledger.
    async fn open_position(
        &mut self,
        trade: &TradeProposal,
        available_cash: Decimal,
    ) -> EngineResult<()> {
        let symbol = trade.instrument.as_str();
        let direction = trade
            .direction
            .ok_or_else(|| EngineError::InsufficientInput("missing direction".to_string()))?;
        let leverage = trade
            .leverage
            .ok_or_else(|| EngineError::InsufficientInput("missing leverage".to_string()))?;
        let stop_price = trade
            .stop_loss_price
            .ok_or_else(|| EngineError::InsufficientInput("missing stop price".to_string()))?;

        self.api.set_leverage(symbol, leverage).await?;

        let entry_price = match trade.target_entry_price {
            Some(p) if p > Decimal::ZERO => p,
            other => {
                return Err(EngineError::InsufficientInput(format!(
                    "invalid target entry price: {other:?}"
                )))
            }
        };

        let size_fraction =
            Decimal::from_f64(trade.position_size_percent).unwrap_or(Decimal::ZERO);
        let position_value = available_cash * size_fraction * Decimal::from(leverage);
        let quantity = position_value / entry_price;

        let side = match direction {
            Direction::Long => OrderSide::Buy,
            Direction::Short => OrderSide::Sell,
        };

        if let Err(e) = self.api.place_market_order(symbol, side, quantity).await {
            // Defensive cleanup: make sure no stray protective order
            // outlives a failed entry.
            let swept = self.api.cancel_protective_orders(symbol).await;
            warn!(
                instrument = symbol,
                swept, "Entry order failed, protective orders swept"
            );
            return Err(e.into());
        }

        let protective_order_id = match self
            .api
            .place_stop_market(symbol, side.opposite(), stop_price)
            .await
        {
            Ok(ack) => Some(ack.order_id),
            Err(e) => {
                // The entry is already filled; the position is recorded
                // without protection rather than rolled back.
                warn!(
                    instrument = symbol,
                    error = %e,
                    "Protective stop placement failed, position is unprotected"
                );
                None
            }
        };

        self.ledger.put(Position {
            instrument: symbol.to_string(),
            direction,
            quantity,
            entry_price,
            stop_loss_price: stop_price,
            leverage,
            protective_order_id,
        });

        info!(
            instrument = symbol,
            %direction,
            %quantity,
            %entry_price,
            protected = protective_order_id.is_some(),
            "Position opened"
        );
        Ok(())
    }

    /// Close a position: cancel its stop, send the opposite market order,
    /// drop the ledger entry.
    async fn close_position(&mut self, trade: &TradeProposal) -> EngineResult<()> {
        let symbol = trade.instrument.as_str();
        let position = self
            .ledger
            .get(symbol)
            .cloned()
            .ok_or_else(|| EngineError::NoPosition(symbol.to_string()))?;

        if let Some(order_id) = position.protective_order_id {
            if let Err(e) = self.api.cancel_order(symbol, order_id).await {
                warn!(
                    instrument = symbol,
                    order_id,
                    error = %e,
                    "Could not cancel protective order before close"
                );
            }
        }

        let side = match position.direction {
            Direction::Long => OrderSide::Sell,
            Direction::Short => OrderSide::Buy,
        };

        // Failure keeps the ledger entry: the position is still open on the
        // exchange.
        self.api
            .place_market_order(symbol, side, position.quantity)
            .await?;

        self.ledger.remove(symbol);
        info!(instrument = symbol, "Position closed");
        Ok(())
    }
}

fn detail(
    trade: &TradeProposal,
    status: DecisionStatus,
    reason: Option<String>,
) -> ExecutionDetail {
    ExecutionDetail {
        instrument: trade.instrument.clone(),
        action: trade.action,
        status,
        reason,
    }
}
