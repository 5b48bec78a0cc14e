//! Recommendation-source client.
//!
//! Calls each configured source's chat-completions endpoint and parses the
//! returned content into trade proposals. Source calls use a longer
//! timeout than exchange calls and an exponentially doubling retry delay;
//! one source's failure yields an empty proposal list and never blocks the
//! others.

use crate::error::{AppError, AppResult};
use quorum_core::{RawTradeProposal, RetryPolicy, TradeProposal};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for recommendation-source requests.
const SOURCE_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// SourceConfig
// ============================================================================

/// One recommendation source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Source identifier, attached to every proposal it produces.
    pub name: String,
    /// Chat-completions endpoint URL.
    pub url: String,
    /// Model identifier sent in the request.
    pub model: String,
    /// Literal API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable consulted when no literal key is set.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl SourceConfig {
    /// Resolve the API key: literal first, then environment.
    #[must_use]
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| {
                self.api_key_env
                    .as_ref()
                    .and_then(|env| std::env::var(env).ok())
            })
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// Content payload a source returns: free-text analysis plus trades.
#[derive(Debug, Deserialize)]
struct ProposalSet {
    #[serde(default)]
    analysis: Option<String>,
    #[serde(default)]
    trades: Vec<RawTradeProposal>,
}

// ============================================================================
// SourceClient
// ============================================================================

/// HTTP client shared by all recommendation sources.
pub struct SourceClient {
    http: Client,
    retry: RetryPolicy,
}

impl SourceClient {
    /// Create a client with the source timeout and exponential backoff.
    pub fn new() -> AppResult<Self> {
        let http = Client::builder()
            .timeout(SOURCE_TIMEOUT)
            .build()
            .map_err(|e| AppError::Source(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            retry: RetryPolicy::source_default(),
        })
    }

    /// Override the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch and parse one source's proposals.
    ///
    /// All failures degrade to an empty list; the caller proceeds with the
    /// remaining sources.
    pub async fn fetch_proposals(
        &self,
        source: &SourceConfig,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Vec<TradeProposal> {
        let Some(api_key) = source.resolve_api_key() else {
            warn!(source = %source.name, "No API key configured, skipping source");
            return Vec::new();
        };

        let Some(content) = self
            .query(source, &api_key, system_prompt, user_prompt)
            .await
        else {
            return Vec::new();
        };

        Self::parse_proposals(&source.name, &content)
    }

    /// One chat call with retries; returns the response content.
    async fn query(
        &self,
        source: &SourceConfig,
        api_key: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Option<String> {
        let request = ChatRequest {
            model: &source.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            stream: false,
        };

        let max_attempts = self.retry.max_attempts();

        for attempt in 1..=max_attempts {
            let response = self
                .http
                .post(&source.url)
                .bearer_auth(api_key)
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(resp) if resp.status().is_success() => resp,
                Ok(resp) => {
                    warn!(
                        source = %source.name,
                        status = resp.status().as_u16(),
                        attempt,
                        max_attempts,
                        "Source returned error status"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                        continue;
                    }
                    return None;
                }
                Err(e) => {
                    warn!(
                        source = %source.name,
                        error = %e,
                        attempt,
                        max_attempts,
                        "Source query failed"
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(self.retry.delay_after(attempt)).await;
                        continue;
                    }
                    return None;
                }
            };

            // A well-formed transport reply with an unusable body is not
            // retried.
            let parsed: ChatResponse = match response.json().await {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(source = %source.name, error = %e, "Source response not decodable");
                    return None;
                }
            };

            return match parsed.choices.into_iter().next() {
                Some(choice) => Some(choice.message.content),
                None => {
                    warn!(source = %source.name, "Source response carried no choices");
                    None
                }
            };
        }

        None
    }

    /// Strip a wrapping markdown code fence, if present.
    fn strip_code_fences(content: &str) -> &str {
        let content = content.trim();
        let content = content
            .strip_prefix("```json")
            .or_else(|| content.strip_prefix("```"))
            .unwrap_or(content);
        let content = content.strip_suffix("```").unwrap_or(content);
        content.trim()
    }

    /// Parse response content into validated proposals tagged with the
    /// source id. Invalid entries are logged and skipped.
    fn parse_proposals(source_name: &str, content: &str) -> Vec<TradeProposal> {
        let cleaned = Self::strip_code_fences(content);

        let set: ProposalSet = match serde_json::from_str(cleaned) {
            Ok(set) => set,
            Err(e) => {
                let preview: String = cleaned.chars().take(200).collect();
                warn!(
                    source = source_name,
                    error = %e,
                    preview = %preview,
                    "Failed to parse source response"
                );
                return Vec::new();
            }
        };

        if let Some(analysis) = &set.analysis {
            debug!(source = source_name, analysis = %analysis, "Source analysis");
        }

        let mut proposals = Vec::new();
        for raw in set.trades {
            match TradeProposal::from_raw(raw, source_name) {
                Ok(proposal) => proposals.push(proposal),
                Err(e) => {
                    warn!(source = source_name, error = %e, "Dropping invalid proposal");
                }
            }
        }

        debug!(
            source = source_name,
            proposals = proposals.len(),
            "Source proposals parsed"
        );
        proposals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_core::TradeAction;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(
            SourceClient::strip_code_fences("```json\n{\"a\":1}\n```"),
            "{\"a\":1}"
        );
        assert_eq!(
            SourceClient::strip_code_fences("```\n{\"a\":1}\n```"),
            "{\"a\":1}"
        );
        assert_eq!(SourceClient::strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_proposals_tags_source() {
        let content = r#"```json
        {
            "analysis": "range-bound, watch the breakout",
            "trades": [
                {"action": "OPEN", "symbol": "btcusdt", "direction": "LONG",
                 "leverage": 10, "position_size_percent": 0.1,
                 "stop_loss": 48000, "entry_price_target": 50000,
                 "confidence": 0.8, "reason": "momentum"}
            ]
        }
        ```"#;

        let proposals = SourceClient::parse_proposals("alpha", content);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].source_id, "alpha");
        assert_eq!(proposals[0].instrument, "BTCUSDT");
        assert_eq!(proposals[0].action, TradeAction::Open);
    }

    #[test]
    fn test_parse_proposals_skips_invalid_entries() {
        let content = r#"{
            "trades": [
                {"action": "OPEN", "symbol": "BTCUSDT", "direction": "LONG",
                 "leverage": 5, "position_size_percent": 0.1,
                 "stop_loss": 48000, "confidence": 0.7},
                {"action": "LIQUIDATE", "symbol": "ETHUSDT"}
            ]
        }"#;

        let proposals = SourceClient::parse_proposals("beta", content);
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].instrument, "BTCUSDT");
    }

    #[test]
    fn test_parse_proposals_garbage_is_empty() {
        assert!(SourceClient::parse_proposals("gamma", "not json at all").is_empty());
    }

    #[test]
    fn test_resolve_api_key_literal_first() {
        let source = SourceConfig {
            name: "alpha".to_string(),
            url: "https://example.com".to_string(),
            model: "m".to_string(),
            api_key: Some("literal".to_string()),
            api_key_env: Some("QUORUM_TEST_KEY_THAT_DOES_NOT_EXIST".to_string()),
        };
        assert_eq!(source.resolve_api_key().as_deref(), Some("literal"));

        let source = SourceConfig {
            api_key: None,
            ..source
        };
        assert_eq!(source.resolve_api_key(), None);
    }
}
