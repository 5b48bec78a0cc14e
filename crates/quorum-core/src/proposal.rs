//! Trade proposals and consensus decisions.
//!
//! A `TradeProposal` is one source's recommendation for one instrument,
//! validated at construction so that action-specific required fields are
//! guaranteed present downstream. A `ConsensusDecision` is the merged,
//! unanimous outcome for one instrument within a single execution cycle.

use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// TradeAction
// ============================================================================

/// Trading action recommended by a source.
///
/// Closed set; unknown wire actions are rejected at parse time and never
/// reach the execution engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    /// Open a new leveraged position.
    Open,
    /// Close an existing position.
    Close,
    /// Keep current exposure, no exchange call.
    Hold,
    /// Breakout entry, long side. Wire form `BP`.
    BreakoutLong,
    /// Breakout entry, short side. Wire form `SP`.
    BreakoutShort,
}

impl TradeAction {
    /// Parse a wire action string (case-insensitive).
    ///
    /// Accepts both the short breakout forms (`BP`/`SP`) used on the wire
    /// and the long forms.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "CLOSE" => Ok(Self::Close),
            "HOLD" => Ok(Self::Hold),
            "BP" | "BREAKOUT_LONG" => Ok(Self::BreakoutLong),
            "SP" | "BREAKOUT_SHORT" => Ok(Self::BreakoutShort),
            other => Err(CoreError::UnknownAction(other.to_string())),
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Close => "CLOSE",
            Self::Hold => "HOLD",
            Self::BreakoutLong => "BP",
            Self::BreakoutShort => "SP",
        }
    }

    /// Whether this action opens a position (OPEN or either breakout).
    #[must_use]
    pub fn is_entry(&self) -> bool {
        matches!(self, Self::Open | Self::BreakoutLong | Self::BreakoutShort)
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Direction
// ============================================================================

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Parse a wire direction string (case-insensitive).
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "LONG" => Ok(Self::Long),
            "SHORT" => Ok(Self::Short),
            other => Err(CoreError::UnknownDirection(other.to_string())),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Long => "LONG",
            Self::Short => "SHORT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RawTradeProposal
// ============================================================================

/// Untyped proposal as produced by a recommendation source.
///
/// Field names follow the collaborator JSON shape. Converted into a
/// validated [`TradeProposal`] via [`TradeProposal::from_raw`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTradeProposal {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub leverage: Option<u32>,
    #[serde(default)]
    pub position_size_percent: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    #[serde(default)]
    pub entry_price_target: Option<Decimal>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
}

// ============================================================================
// TradeProposal
// ============================================================================

/// One source's validated recommendation for one instrument.
///
/// Immutable once produced; consumed exactly once per cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeProposal {
    /// Recommended action.
    pub action: TradeAction,
    /// Instrument symbol, uppercased (e.g. "BTCUSDT").
    pub instrument: String,
    /// Position direction. `None` for HOLD; required for entries.
    pub direction: Option<Direction>,
    /// Leverage multiplier. Required for entries.
    pub leverage: Option<u32>,
    /// Fraction of available cash to commit, 0..=1. Required for entries.
    pub position_size_percent: f64,
    /// Protective stop price. Required for entries.
    pub stop_loss_price: Option<Decimal>,
    /// Target entry price, used to size the order quantity.
    pub target_entry_price: Option<Decimal>,
    /// Source confidence, 0..=1.
    pub confidence: f64,
    /// Free-text rationale.
    pub reason: String,
    /// Identifier of the originating source.
    pub source_id: String,
}

impl TradeProposal {
    /// Validate a raw proposal into a typed one.
    ///
    /// Entry actions (OPEN/BP/SP) require direction, leverage, a positive
    /// stop price and a position size fraction in 0..=1. HOLD drops any
    /// direction the source supplied. A missing confidence defaults to 0.5.
    ///
    /// # Errors
    /// Returns a `CoreError` describing the first violated constraint.
    pub fn from_raw(raw: RawTradeProposal, source_id: impl Into<String>) -> Result<Self> {
        let action = TradeAction::parse(&raw.action)?;

        let instrument = raw.symbol.trim().to_uppercase();
        if instrument.is_empty() {
            return Err(CoreError::EmptyInstrument);
        }

        let direction = if action == TradeAction::Hold {
            None
        } else {
            raw.direction
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .map(Direction::parse)
                .transpose()?
        };

        if action.is_entry() {
            if direction.is_none() {
                return Err(missing(action, "direction"));
            }
            match raw.leverage {
                None => return Err(missing(action, "leverage")),
                Some(0) => {
                    return Err(CoreError::InvalidField {
                        field: "leverage".to_string(),
                        reason: "must be a positive integer".to_string(),
                    })
                }
                Some(_) => {}
            }
            match raw.stop_loss {
                None => return Err(missing(action, "stop_loss")),
                Some(p) if p <= Decimal::ZERO => {
                    return Err(CoreError::InvalidField {
                        field: "stop_loss".to_string(),
                        reason: format!("must be positive, got {p}"),
                    })
                }
                Some(_) => {}
            }
            match raw.position_size_percent {
                None => return Err(missing(action, "position_size_percent")),
                Some(p) if !(0.0..=1.0).contains(&p) => {
                    return Err(CoreError::InvalidField {
                        field: "position_size_percent".to_string(),
                        reason: format!("must be within 0..=1, got {p}"),
                    })
                }
                Some(_) => {}
            }
        }

        Ok(Self {
            action,
            instrument,
            direction,
            leverage: raw.leverage,
            position_size_percent: raw.position_size_percent.unwrap_or(0.0),
            stop_loss_price: raw.stop_loss,
            target_entry_price: raw.entry_price_target,
            confidence: raw.confidence.unwrap_or(0.5),
            reason: raw.reason.unwrap_or_default(),
            source_id: source_id.into(),
        })
    }

    /// Normalized comparison triple: (action, instrument, direction).
    ///
    /// Direction never participates for HOLD (it is already stripped at
    /// construction), matching the unanimity definition.
    #[must_use]
    pub fn triple(&self) -> (TradeAction, &str, Option<Direction>) {
        (self.action, self.instrument.as_str(), self.direction)
    }
}

// ============================================================================
// ConsensusDecision
// ============================================================================

/// One instrument's merged outcome for a single execution cycle.
///
/// Exists only when every proposal for the instrument agreed on the
/// (action, instrument, direction) triple.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusDecision {
    /// Merged trade parameters (the first agreeing proposal, with the
    /// confidence replaced by the group mean).
    pub trade: TradeProposal,
    /// Number of proposals that matched.
    pub agreement_count: usize,
    /// Total number of sources consulted.
    pub source_count: usize,
}

fn missing(action: TradeAction, field: &str) -> CoreError {
    CoreError::MissingField {
        action: action.to_string(),
        field: field.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw_open() -> RawTradeProposal {
        RawTradeProposal {
            action: "OPEN".to_string(),
            symbol: "btcusdt".to_string(),
            direction: Some("long".to_string()),
            leverage: Some(10),
            position_size_percent: Some(0.2),
            stop_loss: Some(dec!(58000)),
            entry_price_target: Some(dec!(60000)),
            confidence: Some(0.8),
            reason: Some("momentum".to_string()),
        }
    }

    #[test]
    fn test_parse_action_wire_forms() {
        assert_eq!(TradeAction::parse("open").unwrap(), TradeAction::Open);
        assert_eq!(TradeAction::parse("BP").unwrap(), TradeAction::BreakoutLong);
        assert_eq!(TradeAction::parse("sp").unwrap(), TradeAction::BreakoutShort);
        assert_eq!(
            TradeAction::parse("BREAKOUT_SHORT").unwrap(),
            TradeAction::BreakoutShort
        );
        assert!(matches!(
            TradeAction::parse("LIQUIDATE"),
            Err(CoreError::UnknownAction(_))
        ));
    }

    #[test]
    fn test_from_raw_uppercases_instrument() {
        let p = TradeProposal::from_raw(raw_open(), "alpha").unwrap();
        assert_eq!(p.instrument, "BTCUSDT");
        assert_eq!(p.direction, Some(Direction::Long));
        assert_eq!(p.source_id, "alpha");
    }

    #[test]
    fn test_entry_requires_direction() {
        let mut raw = raw_open();
        raw.direction = None;
        let err = TradeProposal::from_raw(raw, "alpha").unwrap_err();
        assert!(matches!(err, CoreError::MissingField { .. }));
    }

    #[test]
    fn test_entry_rejects_non_positive_stop() {
        let mut raw = raw_open();
        raw.stop_loss = Some(dec!(0));
        let err = TradeProposal::from_raw(raw, "alpha").unwrap_err();
        assert!(matches!(err, CoreError::InvalidField { .. }));
    }

    #[test]
    fn test_hold_strips_direction() {
        let raw = RawTradeProposal {
            action: "HOLD".to_string(),
            symbol: "ETHUSDT".to_string(),
            direction: Some("LONG".to_string()),
            confidence: Some(0.9),
            ..Default::default()
        };
        let p = TradeProposal::from_raw(raw, "beta").unwrap();
        assert_eq!(p.action, TradeAction::Hold);
        assert_eq!(p.direction, None);
        assert_eq!(p.triple(), (TradeAction::Hold, "ETHUSDT", None));
    }

    #[test]
    fn test_missing_confidence_defaults() {
        let mut raw = raw_open();
        raw.confidence = None;
        let p = TradeProposal::from_raw(raw, "alpha").unwrap();
        assert!((p.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_close_direction_optional() {
        let raw = RawTradeProposal {
            action: "CLOSE".to_string(),
            symbol: "BTCUSDT".to_string(),
            entry_price_target: Some(dec!(61000)),
            confidence: Some(0.7),
            ..Default::default()
        };
        let p = TradeProposal::from_raw(raw, "gamma").unwrap();
        assert_eq!(p.action, TradeAction::Close);
        assert_eq!(p.direction, None);
    }
}
