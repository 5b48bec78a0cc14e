//! Per-instrument trading constraints.
//!
//! Fetched once from the instrument-metadata endpoint and cached for the
//! process lifetime — exchange rules are assumed stable within a run, so
//! there is no TTL and no refresh. A failed fetch never populates the
//! cache and is retried on next use.

use crate::client::SignedRequestClient;
use crate::error::{ExchangeError, ExchangeResult};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// InstrumentRules
// ============================================================================

/// Quantity/price constraints for one instrument.
///
/// Market orders carry their own step/minimum filter variant when the
/// exchange defines one; otherwise the general filter applies.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentRules {
    /// Quantity step for limit-style orders.
    pub quantity_step: Decimal,
    /// Minimum quantity for limit-style orders.
    pub min_quantity: Decimal,
    /// Market-order quantity step, when the exchange defines one.
    pub market_quantity_step: Option<Decimal>,
    /// Market-order minimum quantity, when the exchange defines one.
    pub market_min_quantity: Option<Decimal>,
    /// Minimum notional (quantity × price).
    pub min_notional: Decimal,
    /// Price tick.
    pub price_tick: Decimal,
    /// Quantity decimal places, when advertised.
    pub quantity_precision: Option<u32>,
    /// Price decimal places, when advertised.
    pub price_precision: Option<u32>,
}

impl InstrumentRules {
    /// Parse rules from an instrument-metadata response.
    ///
    /// # Errors
    /// `UnknownInstrument` when the response carries no symbol entry.
    pub(crate) fn from_exchange_info(symbol: &str, value: &Value) -> ExchangeResult<Self> {
        let info = value
            .get("symbols")
            .and_then(Value::as_array)
            .and_then(|symbols| symbols.first())
            .ok_or_else(|| ExchangeError::UnknownInstrument(symbol.to_string()))?;

        let mut rules = Self {
            quantity_step: Decimal::ZERO,
            min_quantity: Decimal::ZERO,
            market_quantity_step: None,
            market_min_quantity: None,
            min_notional: Decimal::ZERO,
            price_tick: Decimal::ZERO,
            quantity_precision: precision_field(info, "quantityPrecision"),
            price_precision: precision_field(info, "pricePrecision"),
        };

        for filter in info
            .get("filters")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            match filter.get("filterType").and_then(Value::as_str) {
                Some("LOT_SIZE") => {
                    rules.quantity_step = decimal_field(filter, "stepSize");
                    rules.min_quantity = decimal_field(filter, "minQty");
                }
                Some("MARKET_LOT_SIZE") => {
                    rules.market_quantity_step = Some(decimal_field(filter, "stepSize"));
                    rules.market_min_quantity = Some(decimal_field(filter, "minQty"));
                }
                Some("PRICE_FILTER") => {
                    rules.price_tick = decimal_field(filter, "tickSize");
                }
                // Older metadata uses MIN_NOTIONAL.notional, newer uses
                // NOTIONAL.minNotional.
                Some("MIN_NOTIONAL") | Some("NOTIONAL") => {
                    let notional = decimal_field(filter, "notional");
                    rules.min_notional = if notional > Decimal::ZERO {
                        notional
                    } else {
                        decimal_field(filter, "minNotional")
                    };
                }
                _ => {}
            }
        }

        Ok(rules)
    }

    /// Normalize an order quantity against the ruleset.
    ///
    /// Floors to the applicable step (never rounding up at this stage),
    /// raises to the minimum quantity, then raises to satisfy the minimum
    /// notional at the given price (ceiling to a step multiple), and
    /// finally rounds to the advertised quantity precision.
    ///
    /// For a positive price and non-degenerate ruleset, the result is at
    /// least `min_quantity`, its notional is at least `min_notional`, and
    /// it is a step multiple up to precision rounding.
    #[must_use]
    pub fn normalize_quantity(&self, qty: Decimal, price: Decimal, is_market_order: bool) -> Decimal {
        let (step, min_qty) = if is_market_order {
            (
                self.market_quantity_step.unwrap_or(self.quantity_step),
                self.market_min_quantity.unwrap_or(self.min_quantity),
            )
        } else {
            (self.quantity_step, self.min_quantity)
        };

        let mut qty = qty;

        if step > Decimal::ZERO {
            qty = floor_to_step(qty, step);
        }

        if min_qty > Decimal::ZERO && qty < min_qty {
            qty = min_qty;
        }

        if self.min_notional > Decimal::ZERO
            && price > Decimal::ZERO
            && qty * price < self.min_notional
        {
            let mut target = self.min_notional / price;
            if step > Decimal::ZERO {
                target = ceil_to_step(target, step);
            }
            qty = qty.max(target);
        }

        match self.quantity_precision {
            Some(precision) => qty.round_dp(precision),
            None => qty,
        }
    }

    /// Normalize a price: floor to the tick, round to the advertised
    /// price precision.
    #[must_use]
    pub fn normalize_price(&self, price: Decimal) -> Decimal {
        let mut price = price;
        if self.price_tick > Decimal::ZERO {
            price = floor_to_step(price, self.price_tick);
        }
        match self.price_precision {
            Some(precision) => price.round_dp(precision),
            None => price,
        }
    }
}

fn floor_to_step(value: Decimal, step: Decimal) -> Decimal {
    (value / step).floor() * step
}

fn ceil_to_step(value: Decimal, step: Decimal) -> Decimal {
    (value / step).ceil() * step
}

fn decimal_field(value: &Value, key: &str) -> Decimal {
    value
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(Decimal::ZERO)
}

fn precision_field(value: &Value, key: &str) -> Option<u32> {
    value.get(key).and_then(Value::as_u64).map(|p| p as u32)
}

// ============================================================================
// InstrumentRuleCache
// ============================================================================

/// Read-through cache of instrument rules keyed by symbol.
pub struct InstrumentRuleCache {
    client: Arc<SignedRequestClient>,
    rules: DashMap<String, InstrumentRules>,
}

impl InstrumentRuleCache {
    /// Create an empty cache backed by the given client.
    #[must_use]
    pub fn new(client: Arc<SignedRequestClient>) -> Self {
        Self {
            client,
            rules: DashMap::new(),
        }
    }

    /// Rules for an instrument, fetching on first use.
    ///
    /// # Errors
    /// `UnknownInstrument` when the exchange knows no such symbol;
    /// transport errors propagate and leave the cache unpopulated.
    pub async fn rules(&self, symbol: &str) -> ExchangeResult<InstrumentRules> {
        if let Some(rules) = self.rules.get(symbol) {
            return Ok(rules.clone());
        }

        let response = self
            .client
            .public_get("/fapi/v1/exchangeInfo", &[("symbol", symbol.to_string())])
            .await
            .map_err(|e| match e {
                // The metadata endpoint answers an invalid symbol with an
                // error-coded body.
                ExchangeError::Rejection { .. } => {
                    ExchangeError::UnknownInstrument(symbol.to_string())
                }
                other => other,
            })?;

        let parsed = InstrumentRules::from_exchange_info(symbol, &response)?;
        debug!(symbol, ?parsed, "Cached instrument rules");
        self.rules.insert(symbol.to_string(), parsed.clone());
        Ok(parsed)
    }

    /// Whether rules for a symbol are already cached.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.rules.contains_key(symbol)
    }

    /// Number of cached instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
