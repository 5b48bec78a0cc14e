//! Exchange access layer.
//!
//! Three pieces, bottom up:
//! - [`SignedRequestClient`]: authenticated, retry-safe request primitive
//!   (HMAC-SHA256 over a canonical query string).
//! - [`InstrumentRuleCache`]: process-lifetime cache of per-instrument
//!   quantity/price constraints with pure normalization helpers.
//! - [`FuturesApi`]: the typed USDT-M futures surface the execution engine
//!   talks to (leverage, orders, account and position reads).

pub mod api;
pub mod client;
pub mod error;
pub mod rules;

pub use api::{
    AccountSnapshot, FuturesApi, OpenInterestFunding, OpenOrder, OrderAck, OrderSide, PositionRisk,
};
pub use client::{ExchangeConfig, SignedRequestClient};
pub use error::{ExchangeError, ExchangeResult};
pub use rules::{InstrumentRuleCache, InstrumentRules};
