//! Authenticated request primitive.
//!
//! Signed calls send parameters as a canonical query string with an
//! appended epoch-millisecond `timestamp` and an HMAC-SHA256 `signature`
//! over that query string; the API key travels in the `X-MBX-APIKEY`
//! header, never in the signed payload. Transport failures are retried
//! with a fixed delay; an exchange-level rejection is returned as the
//! decoded payload for the caller to branch on.

use crate::error::{ExchangeError, ExchangeResult};
use hmac::{Hmac, Mac};
use quorum_core::RetryPolicy;
use reqwest::{Client, Method};
use serde_json::Value;
use sha2::Sha256;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// ExchangeConfig
// ============================================================================

/// Exchange connection settings.
///
/// # Security
/// The `Debug` implementation masks `api_key` and `api_secret`.
#[derive(Clone)]
pub struct ExchangeConfig {
    /// API key. Signed calls fail fast when unset.
    pub api_key: Option<String>,
    /// API secret. Signed calls fail fast when unset.
    pub api_secret: Option<String>,
    /// Use the futures testnet endpoint.
    pub testnet: bool,
    /// Receive window attached to signed calls (milliseconds).
    pub recv_window_ms: u64,
    /// Request timeout (seconds).
    pub timeout_secs: u64,
    /// Explicit base URL override (takes precedence over `testnet`).
    pub base_url: Option<String>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            testnet: true,
            recv_window_ms: 5000,
            timeout_secs: 30,
            base_url: None,
        }
    }
}

impl fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked_key = match &self.api_key {
            Some(k) if k.len() > 8 => format!("{}...{}", &k[..4], &k[k.len() - 4..]),
            Some(_) => "***REDACTED***".to_string(),
            None => "<unset>".to_string(),
        };

        f.debug_struct("ExchangeConfig")
            .field("api_key", &masked_key)
            .field("api_secret", &"***REDACTED***")
            .field("testnet", &self.testnet)
            .field("recv_window_ms", &self.recv_window_ms)
            .field("timeout_secs", &self.timeout_secs)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl ExchangeConfig {
    /// Create a config with explicit credentials.
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            api_secret: Some(api_secret.into()),
            ..Self::default()
        }
    }

    /// Read credentials from `EXCHANGE_API_KEY` / `EXCHANGE_API_SECRET`.
    ///
    /// Missing variables leave the corresponding field unset; signed calls
    /// then fail with `MissingCredentials`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var("EXCHANGE_API_KEY").ok(),
            api_secret: std::env::var("EXCHANGE_API_SECRET").ok(),
            ..Self::default()
        }
    }

    /// REST base URL (override > testnet flag).
    #[must_use]
    pub fn rest_base_url(&self) -> &str {
        if let Some(url) = &self.base_url {
            return url;
        }
        if self.testnet {
            "https://testnet.binancefuture.com"
        } else {
            "https://fapi.binance.com"
        }
    }
}

// ============================================================================
// SignedRequestClient
// ============================================================================

/// Retry-safe HTTP client for exchange REST calls.
pub struct SignedRequestClient {
    config: ExchangeConfig,
    http: Client,
    retry: RetryPolicy,
}

impl SignedRequestClient {
    /// Create a new client.
    ///
    /// # Errors
    /// Returns `ExchangeError::HttpClient` if the underlying HTTP client
    /// cannot be constructed.
    pub fn new(config: ExchangeConfig) -> ExchangeResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExchangeError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            retry: RetryPolicy::exchange_default(),
        })
    }

    /// Override the retry policy (fixed 2 s × 3 by default).
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Connection settings.
    #[must_use]
    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Current timestamp in epoch milliseconds.
    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    /// Canonical query-string encoding: `k=v` pairs joined by `&`, in
    /// parameter order.
    fn build_query(params: &[(String, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// HMAC-SHA256 hex signature over a query string.
    fn sign(secret: &str, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Whether a decoded payload carries an exchange error code.
    #[must_use]
    pub fn error_payload(value: &Value) -> Option<(i64, String)> {
        let code = value.get("code")?.as_i64()?;
        if code == 0 {
            return None;
        }
        let message = value
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Some((code, message))
    }

    /// Issue a signed request.
    ///
    /// A `recvWindow` is attached once if absent. Every attempt re-clones
    /// the original parameter set and stamps a fresh `timestamp` and
    /// `signature` — a parameter set used by a prior attempt is never
    /// reused. Timeouts and transport errors are retried with the
    /// configured fixed delay; non-2xx responses are also retried, and
    /// after the attempt budget is exhausted a JSON error body is returned
    /// as the decoded payload so the caller can inspect the embedded error
    /// code.
    ///
    /// # Errors
    /// `MissingCredentials` without any network call when no key/secret is
    /// configured; `Timeout`/`Network` after exhausting attempts;
    /// `MalformedResponse` for a 2xx body that is not valid JSON.
    pub async fn send(
        &self,
        method: Method,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<Value> {
        let (api_key, api_secret) = match (&self.config.api_key, &self.config.api_secret) {
            (Some(k), Some(s)) if !k.is_empty() && !s.is_empty() => (k.clone(), s.clone()),
            _ => {
                warn!(endpoint, "Signed request refused: credentials not configured");
                return Err(ExchangeError::MissingCredentials);
            }
        };

        let mut base_params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        if !base_params.iter().any(|(k, _)| k == "recvWindow") {
            base_params.push((
                "recvWindow".to_string(),
                self.config.recv_window_ms.to_string(),
            ));
        }

        let url = format!("{}{}", self.config.rest_base_url(), endpoint);
        let max_attempts = self.retry.max_attempts();

        for attempt in 1..=max_attempts {
            let mut attempt_params = base_params.clone();
            attempt_params.push(("timestamp".to_string(), Self::timestamp_ms().to_string()));

            let query = Self::build_query(&attempt_params);
            let signature = Self::sign(&api_secret, &query);
            let full_url = format!("{url}?{query}&signature={signature}");

            debug!(%method, endpoint, attempt, "Sending signed request");

            let response = self
                .http
                .request(method.clone(), &full_url)
                .header("X-MBX-APIKEY", &api_key)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp
                        .text()
                        .await
                        .map_err(|e| ExchangeError::Network(e.to_string()))?;

                    if status.is_success() {
                        return serde_json::from_str(&body).map_err(|e| {
                            ExchangeError::MalformedResponse(format!("{e}: {body}"))
                        });
                    }

                    warn!(
                        %method,
                        endpoint,
                        attempt,
                        max_attempts,
                        status = status.as_u16(),
                        "Exchange returned error status"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                        continue;
                    }
                    // Final attempt: pass an error-coded body through as
                    // data — exchange-level rejection is the caller's
                    // branch, not a transport failure.
                    return serde_json::from_str(&body).map_err(|_| {
                        ExchangeError::Network(format!("HTTP {status}: {body}"))
                    });
                }
                Err(e) if e.is_timeout() => {
                    warn!(%method, endpoint, attempt, max_attempts, "Request timed out");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                        continue;
                    }
                    return Err(ExchangeError::Timeout {
                        endpoint: endpoint.to_string(),
                        attempts: max_attempts,
                    });
                }
                Err(e) => {
                    warn!(%method, endpoint, attempt, max_attempts, error = %e, "Network error");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                        continue;
                    }
                    return Err(ExchangeError::Network(e.to_string()));
                }
            }
        }

        Err(ExchangeError::Network("retry budget exhausted".to_string()))
    }

    /// Issue an unsigned GET (exchange metadata, public ticker).
    ///
    /// Single attempt; a non-2xx JSON body maps to `Rejection`.
    pub async fn public_get(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ExchangeResult<Value> {
        let owned: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        let query = Self::build_query(&owned);
        let url = if query.is_empty() {
            format!("{}{}", self.config.rest_base_url(), endpoint)
        } else {
            format!("{}{}?{}", self.config.rest_base_url(), endpoint, query)
        };

        debug!(endpoint, "Sending public request");

        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                ExchangeError::Timeout {
                    endpoint: endpoint.to_string(),
                    attempts: 1,
                }
            } else {
                ExchangeError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ExchangeError::Network(e.to_string()))?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| ExchangeError::MalformedResponse(format!("{e}: {body}")));
        }

        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            if let Some((code, message)) = Self::error_payload(&value) {
                return Err(ExchangeError::Rejection { code, message });
            }
        }
        Err(ExchangeError::Network(format!("HTTP {status}: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_config(base_url: String) -> ExchangeConfig {
        ExchangeConfig {
            api_key: Some("test-key".to_string()),
            api_secret: Some("test-secret".to_string()),
            base_url: Some(base_url),
            ..ExchangeConfig::default()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::from_millis(1))
    }

    #[test]
    fn test_signature_matches_known_vector() {
        // Reference vector from the exchange API documentation.
        let query = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
        let signature = SignedRequestClient::sign(
            "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j",
            query,
        );
        assert_eq!(
            signature,
            "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71"
        );
    }

    #[test]
    fn test_build_query_preserves_order() {
        let params = vec![
            ("symbol".to_string(), "BTCUSDT".to_string()),
            ("side".to_string(), "BUY".to_string()),
            ("quantity".to_string(), "0.5".to_string()),
        ];
        assert_eq!(
            SignedRequestClient::build_query(&params),
            "symbol=BTCUSDT&side=BUY&quantity=0.5"
        );
    }

    #[test]
    fn test_error_payload_detection() {
        let err = json!({"code": -2019, "msg": "Margin is insufficient."});
        assert_eq!(
            SignedRequestClient::error_payload(&err),
            Some((-2019, "Margin is insufficient.".to_string()))
        );

        let ok = json!({"orderId": 12345, "status": "NEW"});
        assert_eq!(SignedRequestClient::error_payload(&ok), None);

        let zero = json!({"code": 0, "msg": "success"});
        assert_eq!(SignedRequestClient::error_payload(&zero), None);
    }

    #[tokio::test]
    async fn test_missing_credentials_fails_fast() {
        let config = ExchangeConfig {
            base_url: Some("http://127.0.0.1:1".to_string()),
            ..ExchangeConfig::default()
        };
        let client = SignedRequestClient::new(config).unwrap();

        let err = client
            .send(Method::GET, "/fapi/v2/account", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::MissingCredentials));
    }

    #[tokio::test]
    async fn test_error_status_retried_then_payload_passed_through() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/fapi/v1/order")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-2019,"msg":"Margin is insufficient."}"#)
            .expect(3)
            .create_async()
            .await;

        let client = SignedRequestClient::new(test_config(server.url()))
            .unwrap()
            .with_retry_policy(fast_retry());

        let payload = client
            .send(
                Method::POST,
                "/fapi/v1/order",
                &[("symbol", "BTCUSDT".to_string())],
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            SignedRequestClient::error_payload(&payload),
            Some((-2019, "Margin is insufficient.".to_string()))
        );
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_timeout() {
        // A bound listener that never responds: connections are accepted
        // into the backlog but no bytes ever come back, so each attempt
        // runs into the client timeout.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let config = ExchangeConfig {
            timeout_secs: 1,
            ..test_config(format!("http://{addr}"))
        };
        let client = SignedRequestClient::new(config)
            .unwrap()
            .with_retry_policy(RetryPolicy::fixed(3, Duration::from_millis(1)));

        let err = client
            .send(Method::GET, "/fapi/v2/account", &[])
            .await
            .unwrap_err();
        assert!(
            matches!(err, ExchangeError::Timeout { attempts: 3, .. }),
            "expected Timeout, got: {err:?}"
        );
    }

    #[tokio::test]
    async fn test_malformed_success_body_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/fapi/v2/account")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body("not json")
            .expect(1)
            .create_async()
            .await;

        let client = SignedRequestClient::new(test_config(server.url()))
            .unwrap()
            .with_retry_policy(fast_retry());

        let err = client
            .send(Method::GET, "/fapi/v2/account", &[])
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, ExchangeError::MalformedResponse(_)));
    }
}
