//! Typed USDT-M futures API surface.
//!
//! Thin, typed operations over [`SignedRequestClient`] and
//! [`InstrumentRuleCache`]. Decoded payloads that carry an exchange error
//! code are converted to `ExchangeError::Rejection` here, so callers
//! branch on typed errors while the client keeps the transport/rejection
//! distinction intact.

use crate::client::SignedRequestClient;
use crate::error::{ExchangeError, ExchangeResult};
use crate::rules::InstrumentRuleCache;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Order types
// ============================================================================

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// The opposite side (used for protective and closing orders).
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Acknowledgement for a placed order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    /// Exchange-assigned order id.
    pub order_id: i64,
    /// Client order id, if echoed back.
    pub client_order_id: Option<String>,
    /// Order status as reported by the exchange.
    pub status: Option<String>,
}

impl OrderAck {
    fn from_value(value: &Value) -> ExchangeResult<Self> {
        let order_id = value
            .get("orderId")
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                ExchangeError::MalformedResponse(format!("order ack without orderId: {value}"))
            })?;

        Ok(Self {
            order_id,
            client_order_id: value
                .get("clientOrderId")
                .and_then(Value::as_str)
                .map(str::to_string),
            status: value
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// One entry of the open-orders list.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: i64,
    pub order_type: String,
}

/// One entry of the position-risk list.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRisk {
    pub symbol: String,
    pub position_amt: Decimal,
    pub entry_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub leverage: Decimal,
}

/// Account snapshot (signed read path).
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSnapshot {
    /// Balance available for new positions.
    pub available_cash: Decimal,
    pub total_wallet_balance: Decimal,
    pub total_unrealized_pnl: Decimal,
}

/// Open interest and funding rate for one instrument (public read path).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OpenInterestFunding {
    pub open_interest: Decimal,
    pub funding_rate: Decimal,
}

// ============================================================================
// FuturesApi
// ============================================================================

/// Typed operations against the futures REST API.
pub struct FuturesApi {
    client: Arc<SignedRequestClient>,
    rules: InstrumentRuleCache,
}

impl FuturesApi {
    /// Create the API surface over a shared client.
    #[must_use]
    pub fn new(client: Arc<SignedRequestClient>) -> Self {
        let rules = InstrumentRuleCache::new(client.clone());
        Self { client, rules }
    }

    /// The instrument rule cache.
    #[must_use]
    pub fn rules(&self) -> &InstrumentRuleCache {
        &self.rules
    }

    /// Convert an error-coded payload into a `Rejection`.
    fn ok_or_rejection(value: Value) -> ExchangeResult<Value> {
        if let Some((code, message)) = SignedRequestClient::error_payload(&value) {
            return Err(ExchangeError::Rejection { code, message });
        }
        Ok(value)
    }

    /// Set the leverage multiplier for an instrument.
    ///
    /// # Errors
    /// `UnknownInstrument` when the symbol has no trading rules;
    /// `Rejection` when the exchange refuses the leverage change.
    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<()> {
        self.rules.rules(symbol).await?;

        let params = [
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ];
        let value = self
            .client
            .send(Method::POST, "/fapi/v1/leverage", &params)
            .await?;
        Self::ok_or_rejection(value)?;

        info!(symbol, leverage, "Leverage set");
        Ok(())
    }

    /// Latest traded price for an instrument, `0` when unavailable.
    ///
    /// Used only for the minimum-notional check while normalizing market
    /// order quantities; a zero price disables that check rather than
    /// failing the order.
    pub async fn ticker_price(&self, symbol: &str) -> Decimal {
        match self
            .client
            .public_get("/fapi/v1/ticker/price", &[("symbol", symbol.to_string())])
            .await
        {
            Ok(value) => value
                .get("price")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
                .unwrap_or(Decimal::ZERO),
            Err(e) => {
                warn!(symbol, error = %e, "Ticker price unavailable");
                Decimal::ZERO
            }
        }
    }

    /// Place a market order for a normalized quantity.
    ///
    /// # Errors
    /// `UnknownInstrument` for a symbol without rules, `InvalidInput` when
    /// the quantity normalizes to zero, `Rejection` when the exchange
    /// refuses the order.
    pub async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> ExchangeResult<OrderAck> {
        let rules = self.rules.rules(symbol).await?;
        let price = self.ticker_price(symbol).await;

        let normalized = rules.normalize_quantity(quantity, price, true);
        if normalized <= Decimal::ZERO {
            return Err(ExchangeError::InvalidInput(format!(
                "quantity {quantity} normalized to {normalized} for {symbol}"
            )));
        }
        if normalized != quantity {
            debug!(symbol, %quantity, %normalized, "Quantity normalized for market order");
        }

        let params = [
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", normalized.normalize().to_string()),
        ];

        let value = self
            .client
            .send(Method::POST, "/fapi/v1/order", &params)
            .await?;
        let ack = OrderAck::from_value(&Self::ok_or_rejection(value)?)?;

        info!(symbol, %side, %normalized, order_id = ack.order_id, "Market order placed");
        Ok(ack)
    }

    /// Place a STOP_MARKET protective order that closes the whole position
    /// when the stop price is crossed.
    pub async fn place_stop_market(
        &self,
        symbol: &str,
        side: OrderSide,
        stop_price: Decimal,
    ) -> ExchangeResult<OrderAck> {
        // A missing ruleset leaves the price as given; the exchange is the
        // final arbiter of tick validity here.
        let stop_price = match self.rules.rules(symbol).await {
            Ok(rules) => rules.normalize_price(stop_price),
            Err(_) => stop_price,
        };

        let params = [
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "STOP_MARKET".to_string()),
            ("stopPrice", stop_price.normalize().to_string()),
            ("closePosition", "true".to_string()),
        ];

        let value = self
            .client
            .send(Method::POST, "/fapi/v1/order", &params)
            .await?;
        let ack = OrderAck::from_value(&Self::ok_or_rejection(value)?)?;

        info!(symbol, %side, %stop_price, order_id = ack.order_id, "Protective stop placed");
        Ok(ack)
    }

    /// Cancel one order by id.
    pub async fn cancel_order(&self, symbol: &str, order_id: i64) -> ExchangeResult<()> {
        let params = [
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ];
        let value = self
            .client
            .send(Method::DELETE, "/fapi/v1/order", &params)
            .await?;
        Self::ok_or_rejection(value)?;

        info!(symbol, order_id, "Order cancelled");
        Ok(())
    }

    /// Open orders for an instrument.
    pub async fn open_orders(&self, symbol: &str) -> ExchangeResult<Vec<OpenOrder>> {
        let params = [("symbol", symbol.to_string())];
        let value = self
            .client
            .send(Method::GET, "/fapi/v1/openOrders", &params)
            .await?;
        let value = Self::ok_or_rejection(value)?;

        let orders = value
            .as_array()
            .ok_or_else(|| {
                ExchangeError::MalformedResponse(format!("openOrders is not a list: {value}"))
            })?
            .iter()
            .filter_map(|o| {
                Some(OpenOrder {
                    order_id: o.get("orderId").and_then(Value::as_i64)?,
                    order_type: o.get("type").and_then(Value::as_str)?.to_string(),
                })
            })
            .collect();

        Ok(orders)
    }

    /// Cancel every open protective (stop) order for an instrument.
    ///
    /// Best effort: a failed listing is treated as nothing to cancel, and
    /// individual cancel failures are logged and skipped. Returns the
    /// number of orders cancelled.
    pub async fn cancel_protective_orders(&self, symbol: &str) -> usize {
        let orders = match self.open_orders(symbol).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(symbol, error = %e, "Could not list open orders for cleanup");
                return 0;
            }
        };

        let mut cancelled = 0;
        for order in orders
            .iter()
            .filter(|o| matches!(o.order_type.as_str(), "STOP_MARKET" | "STOP"))
        {
            match self.cancel_order(symbol, order.order_id).await {
                Ok(()) => cancelled += 1,
                Err(e) => {
                    warn!(symbol, order_id = order.order_id, error = %e, "Cancel failed");
                }
            }
        }
        cancelled
    }

    /// Position list (signed read path).
    pub async fn position_risk(&self) -> ExchangeResult<Vec<PositionRisk>> {
        let value = self
            .client
            .send(Method::GET, "/fapi/v2/positionRisk", &[])
            .await?;
        let value = Self::ok_or_rejection(value)?;

        let positions = value
            .as_array()
            .ok_or_else(|| {
                ExchangeError::MalformedResponse(format!("positionRisk is not a list: {value}"))
            })?
            .iter()
            .filter_map(|p| {
                Some(PositionRisk {
                    symbol: p.get("symbol").and_then(Value::as_str)?.to_string(),
                    position_amt: decimal_str(p, "positionAmt"),
                    entry_price: decimal_str(p, "entryPrice"),
                    unrealized_pnl: decimal_str(p, "unRealizedProfit"),
                    leverage: decimal_str(p, "leverage"),
                })
            })
            .collect();

        Ok(positions)
    }

    /// Account snapshot with the cash figure available for new positions.
    pub async fn account_snapshot(&self) -> ExchangeResult<AccountSnapshot> {
        let value = self
            .client
            .send(Method::GET, "/fapi/v2/account", &[])
            .await?;
        let value = Self::ok_or_rejection(value)?;

        Ok(AccountSnapshot {
            available_cash: decimal_str(&value, "availableBalance"),
            total_wallet_balance: decimal_str(&value, "totalWalletBalance"),
            total_unrealized_pnl: decimal_str(&value, "totalUnrealizedProfit"),
        })
    }

    /// Open interest and funding rate (unsigned read path).
    ///
    /// Zeros on failure; this is advisory context, not order input.
    pub async fn open_interest_and_funding(&self, symbol: &str) -> OpenInterestFunding {
        let params = [("symbol", symbol.to_string())];

        let open_interest = match self.client.public_get("/fapi/v1/openInterest", &params).await {
            Ok(v) => decimal_str(&v, "openInterest"),
            Err(e) => {
                warn!(symbol, error = %e, "Open interest unavailable");
                Decimal::ZERO
            }
        };

        let funding_rate = match self.client.public_get("/fapi/v1/premiumIndex", &params).await {
            Ok(v) => decimal_str(&v, "lastFundingRate"),
            Err(e) => {
                warn!(symbol, error = %e, "Funding rate unavailable");
                Decimal::ZERO
            }
        };

        OpenInterestFunding {
            open_interest,
            funding_rate,
        }
    }
}

fn decimal_str(value: &Value, key: &str) -> Decimal {
    value
        .get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ExchangeConfig;
    use mockito::Matcher;
    use quorum_core::RetryPolicy;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const EXCHANGE_INFO: &str = r#"{
        "symbols": [{
            "symbol": "BTCUSDT",
            "quantityPrecision": 3,
            "pricePrecision": 1,
            "filters": [
                {"filterType": "PRICE_FILTER", "tickSize": "0.10"},
                {"filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.001"},
                {"filterType": "MIN_NOTIONAL", "notional": "5"}
            ]
        }]
    }"#;

    async fn api_for(server: &mockito::Server) -> FuturesApi {
        let config = ExchangeConfig {
            api_key: Some("test-key".to_string()),
            api_secret: Some("test-secret".to_string()),
            base_url: Some(server.url()),
            ..ExchangeConfig::default()
        };
        let client = SignedRequestClient::new(config)
            .unwrap()
            .with_retry_policy(RetryPolicy::fixed(1, Duration::from_millis(1)));
        FuturesApi::new(Arc::new(client))
    }

    async fn mock_exchange_info(server: &mut mockito::Server) -> mockito::Mock {
        server
            .mock("GET", "/fapi/v1/exchangeInfo")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(EXCHANGE_INFO)
            .create_async()
            .await
    }

    async fn mock_ticker(server: &mut mockito::Server, price: &str) -> mockito::Mock {
        server
            .mock("GET", "/fapi/v1/ticker/price")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(format!(r#"{{"symbol":"BTCUSDT","price":"{price}"}}"#))
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_set_leverage_ok() {
        let mut server = mockito::Server::new_async().await;
        let _info = mock_exchange_info(&mut server).await;
        let leverage = server
            .mock("POST", "/fapi/v1/leverage")
            .match_query(Matcher::Regex("leverage=10".to_string()))
            .with_status(200)
            .with_body(r#"{"symbol":"BTCUSDT","leverage":10,"maxNotionalValue":"1000000"}"#)
            .create_async()
            .await;

        let api = api_for(&server).await;
        api.set_leverage("BTCUSDT", 10).await.unwrap();
        leverage.assert_async().await;
    }

    #[tokio::test]
    async fn test_set_leverage_rejection_is_typed() {
        let mut server = mockito::Server::new_async().await;
        let _info = mock_exchange_info(&mut server).await;
        let _leverage = server
            .mock("POST", "/fapi/v1/leverage")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"code":-4028,"msg":"Leverage is not valid."}"#)
            .create_async()
            .await;

        let api = api_for(&server).await;
        let err = api.set_leverage("BTCUSDT", 200).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Rejection { code: -4028, .. }));
    }

    #[tokio::test]
    async fn test_place_market_order_normalizes_quantity() {
        let mut server = mockito::Server::new_async().await;
        let _info = mock_exchange_info(&mut server).await;
        let _ticker = mock_ticker(&mut server, "50000.00").await;
        // 0.12345 floors to 0.123 on the 0.001 step.
        let order = server
            .mock("POST", "/fapi/v1/order")
            .match_query(Matcher::Regex("quantity=0.123".to_string()))
            .with_status(200)
            .with_body(r#"{"orderId":1001,"clientOrderId":"x","status":"FILLED"}"#)
            .create_async()
            .await;

        let api = api_for(&server).await;
        let ack = api
            .place_market_order("BTCUSDT", OrderSide::Buy, dec!(0.12345))
            .await
            .unwrap();

        order.assert_async().await;
        assert_eq!(ack.order_id, 1001);
        assert_eq!(ack.status.as_deref(), Some("FILLED"));
    }

    #[tokio::test]
    async fn test_place_market_order_rejects_zero_quantity() {
        let mut server = mockito::Server::new_async().await;
        // Degenerate ruleset without a minimum quantity: a dust quantity
        // floors to zero, and with no price the notional raise is disabled
        // too, so the order is refused locally.
        let _info = server
            .mock("GET", "/fapi/v1/exchangeInfo")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"symbols":[{"symbol":"BTCUSDT","quantityPrecision":3,
                    "filters":[{"filterType":"LOT_SIZE","stepSize":"0.001","minQty":"0"}]}]}"#,
            )
            .create_async()
            .await;
        let _ticker = mock_ticker(&mut server, "0").await;
        let order = server
            .mock("POST", "/fapi/v1/order")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let api = api_for(&server).await;
        let err = api
            .place_market_order("BTCUSDT", OrderSide::Buy, dec!(0.0001))
            .await
            .unwrap_err();

        order.assert_async().await;
        assert!(matches!(err, ExchangeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_place_stop_market_floors_price() {
        let mut server = mockito::Server::new_async().await;
        let _info = mock_exchange_info(&mut server).await;
        let order = server
            .mock("POST", "/fapi/v1/order")
            .match_query(Matcher::AllOf(vec![
                Matcher::Regex("type=STOP_MARKET".to_string()),
                Matcher::Regex("stopPrice=58000.1".to_string()),
                Matcher::Regex("closePosition=true".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"orderId":2002,"status":"NEW"}"#)
            .create_async()
            .await;

        let api = api_for(&server).await;
        let ack = api
            .place_stop_market("BTCUSDT", OrderSide::Sell, dec!(58000.17))
            .await
            .unwrap();

        order.assert_async().await;
        assert_eq!(ack.order_id, 2002);
    }

    #[tokio::test]
    async fn test_cancel_protective_orders_sweeps_stops_only() {
        let mut server = mockito::Server::new_async().await;
        let _open = server
            .mock("GET", "/fapi/v1/openOrders")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"[{"orderId":1,"type":"STOP_MARKET"},
                    {"orderId":2,"type":"LIMIT"},
                    {"orderId":3,"type":"STOP"}]"#,
            )
            .create_async()
            .await;
        let cancel = server
            .mock("DELETE", "/fapi/v1/order")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"orderId":1,"status":"CANCELED"}"#)
            .expect(2)
            .create_async()
            .await;

        let api = api_for(&server).await;
        let cancelled = api.cancel_protective_orders("BTCUSDT").await;

        cancel.assert_async().await;
        assert_eq!(cancelled, 2);
    }

    #[tokio::test]
    async fn test_account_snapshot_parses_balances() {
        let mut server = mockito::Server::new_async().await;
        let _account = server
            .mock("GET", "/fapi/v2/account")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"availableBalance":"1234.56",
                    "totalWalletBalance":"2000.00",
                    "totalUnrealizedProfit":"-12.34"}"#,
            )
            .create_async()
            .await;

        let api = api_for(&server).await;
        let snapshot = api.account_snapshot().await.unwrap();
        assert_eq!(snapshot.available_cash, dec!(1234.56));
        assert_eq!(snapshot.total_wallet_balance, dec!(2000.00));
        assert_eq!(snapshot.total_unrealized_pnl, dec!(-12.34));
    }

    #[tokio::test]
    async fn test_open_interest_and_funding_zeroes_on_failure() {
        let mut server = mockito::Server::new_async().await;
        let _oi = server
            .mock("GET", "/fapi/v1/openInterest")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"openInterest":"10250.5","symbol":"BTCUSDT"}"#)
            .create_async()
            .await;
        let _funding = server
            .mock("GET", "/fapi/v1/premiumIndex")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let api = api_for(&server).await;
        let data = api.open_interest_and_funding("BTCUSDT").await;
        assert_eq!(data.open_interest, dec!(10250.5));
        assert_eq!(data.funding_rate, Decimal::ZERO);
    }
}
