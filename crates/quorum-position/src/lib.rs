//! In-process position ledger.
//!
//! Process-lifetime record of currently open positions keyed by instrument.
//! The ledger has a single-writer contract: it is owned by the execution
//! engine, which is the only component that mutates it. Entries are
//! replaced, never edited in place — created on a successful open, removed
//! on a successful close.

use quorum_core::Direction;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;

// ============================================================================
// Position
// ============================================================================

/// An open position recorded by the execution engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    /// Instrument symbol.
    pub instrument: String,
    /// Position direction.
    pub direction: Direction,
    /// Recorded order quantity (pre-normalization; the exchange layer
    /// normalizes again when the position is closed).
    pub quantity: Decimal,
    /// Entry price used to size the position.
    pub entry_price: Decimal,
    /// Protective stop trigger price.
    pub stop_loss_price: Decimal,
    /// Leverage multiplier set at open.
    pub leverage: u32,
    /// Exchange order id of the protective stop, if placement succeeded.
    pub protective_order_id: Option<i64>,
}

// ============================================================================
// PositionLedger
// ============================================================================

/// Mapping of instrument symbol to its open position.
///
/// No interior locking: the owning engine serializes all mutation under the
/// single-threaded cycle model.
#[derive(Debug, Default)]
pub struct PositionLedger {
    positions: HashMap<String, Position>,
}

impl PositionLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the open position for an instrument.
    #[must_use]
    pub fn get(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument)
    }

    /// Record a position, replacing any previous entry for the instrument.
    pub fn put(&mut self, position: Position) {
        self.positions.insert(position.instrument.clone(), position);
    }

    /// Remove and return the position for an instrument.
    pub fn remove(&mut self, instrument: &str) -> Option<Position> {
        self.positions.remove(instrument)
    }

    /// All open positions, in no particular order.
    #[must_use]
    pub fn all(&self) -> Vec<&Position> {
        self.positions.values().collect()
    }

    /// Number of open positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Human-readable summary of all open positions for cycle reports.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.positions.is_empty() {
            return "no open positions".to_string();
        }

        let mut out = String::from("open positions:\n");
        let mut symbols: Vec<&String> = self.positions.keys().collect();
        symbols.sort();
        for symbol in symbols {
            let p = &self.positions[symbol];
            let _ = writeln!(
                out,
                "  {symbol}: {} {} @ {} (leverage {}x, stop {})",
                p.direction, p.quantity, p.entry_price, p.leverage, p.stop_loss_price
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_position(symbol: &str) -> Position {
        Position {
            instrument: symbol.to_string(),
            direction: Direction::Long,
            quantity: dec!(0.5),
            entry_price: dec!(60000),
            stop_loss_price: dec!(58000),
            leverage: 10,
            protective_order_id: Some(42),
        }
    }

    #[test]
    fn test_put_get_remove() {
        let mut ledger = PositionLedger::new();
        assert!(ledger.is_empty());

        ledger.put(sample_position("BTCUSDT"));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get("BTCUSDT").unwrap().leverage, 10);
        assert!(ledger.get("ETHUSDT").is_none());

        let removed = ledger.remove("BTCUSDT").unwrap();
        assert_eq!(removed.quantity, dec!(0.5));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_put_replaces_existing_entry() {
        let mut ledger = PositionLedger::new();
        ledger.put(sample_position("BTCUSDT"));

        let mut replacement = sample_position("BTCUSDT");
        replacement.direction = Direction::Short;
        replacement.protective_order_id = None;
        ledger.put(replacement);

        assert_eq!(ledger.len(), 1);
        let entry = ledger.get("BTCUSDT").unwrap();
        assert_eq!(entry.direction, Direction::Short);
        assert_eq!(entry.protective_order_id, None);
    }

    #[test]
    fn test_summary_lists_positions() {
        let mut ledger = PositionLedger::new();
        assert_eq!(ledger.summary(), "no open positions");

        ledger.put(sample_position("BTCUSDT"));
        let summary = ledger.summary();
        assert!(summary.contains("BTCUSDT"));
        assert!(summary.contains("LONG"));
    }
}
