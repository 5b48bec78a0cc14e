//! Application configuration.
//!
//! Loaded from a TOML file; credentials resolve from environment
//! variables first, then config literals.

use crate::error::{AppError, AppResult};
use crate::sources::SourceConfig;
use quorum_exchange::ExchangeConfig;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

/// Exchange section.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeSettings {
    /// Literal API key (environment variable takes precedence).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Literal API secret (environment variable takes precedence).
    #[serde(default)]
    pub api_secret: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Environment variable holding the API secret.
    #[serde(default = "default_api_secret_env")]
    pub api_secret_env: String,
    /// Use the futures testnet.
    #[serde(default = "default_testnet")]
    pub testnet: bool,
    /// Receive window for signed calls (ms).
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    /// Exchange request timeout (s).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "EXCHANGE_API_KEY".to_string()
}

fn default_api_secret_env() -> String {
    "EXCHANGE_API_SECRET".to_string()
}

fn default_testnet() -> bool {
    true
}

fn default_recv_window_ms() -> u64 {
    5000
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ExchangeSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            api_key_env: default_api_key_env(),
            api_secret_env: default_api_secret_env(),
            testnet: default_testnet(),
            recv_window_ms: default_recv_window_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ExchangeSettings {
    /// Resolve into a client config, preferring environment credentials.
    #[must_use]
    pub fn resolve(&self) -> ExchangeConfig {
        let api_key = std::env::var(&self.api_key_env)
            .ok()
            .or_else(|| self.api_key.clone());
        let api_secret = std::env::var(&self.api_secret_env)
            .ok()
            .or_else(|| self.api_secret.clone());

        ExchangeConfig {
            api_key,
            api_secret,
            testnet: self.testnet,
            recv_window_ms: self.recv_window_ms,
            timeout_secs: self.timeout_secs,
            base_url: None,
        }
    }
}

/// Trading section.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingSettings {
    /// Decisions below this confidence are never executed.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Minutes between cycles in continuous mode.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    /// File persisting the cycle counter across restarts.
    #[serde(default = "default_cycle_count_file")]
    pub cycle_count_file: String,
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_interval_minutes() -> u64 {
    3
}

fn default_cycle_count_file() -> String {
    "cycle_count.txt".to_string()
}

impl Default for TradingSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            interval_minutes: default_interval_minutes(),
            cycle_count_file: default_cycle_count_file(),
        }
    }
}

/// Prompt template section.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptSettings {
    /// Directory containing prompt template files.
    #[serde(default = "default_prompt_dir")]
    pub dir: String,
}

fn default_prompt_dir() -> String {
    "prompts".to_string()
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self {
            dir: default_prompt_dir(),
        }
    }
}

impl PromptSettings {
    /// Load a prompt template, empty on failure.
    #[must_use]
    pub fn load(&self, filename: &str) -> String {
        let path = Path::new(&self.dir).join(filename);
        match std::fs::read_to_string(&path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Prompt template not loaded");
                String::new()
            }
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub trading: TradingSettings,
    #[serde(default)]
    pub prompts: PromptSettings,
    /// Recommendation sources consulted each cycle.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Instrument symbols this deployment watches.
    #[serde(default)]
    pub instruments: Vec<String>,
}

impl AppConfig {
    /// Load configuration from `QUORUM_CONFIG` or the default path,
    /// falling back to defaults when the file does not exist.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("QUORUM_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert!(config.exchange.testnet);
        assert_eq!(config.exchange.recv_window_ms, 5000);
        assert_eq!(config.exchange.timeout_secs, 30);
        assert!((config.trading.confidence_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(config.trading.interval_minutes, 3);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            instruments = ["BTCUSDT", "ETHUSDT"]

            [exchange]
            testnet = false
            timeout_secs = 10

            [trading]
            confidence_threshold = 0.75
            interval_minutes = 5

            [[sources]]
            name = "alpha"
            url = "https://api.example.com/v1/chat/completions"
            model = "alpha-large"
            api_key_env = "ALPHA_API_KEY"

            [[sources]]
            name = "beta"
            url = "https://api.example.org/v1/chat/completions"
            model = "beta-pro"
            api_key = "literal-key"
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.exchange.testnet);
        assert_eq!(config.exchange.timeout_secs, 10);
        // Unset fields keep their defaults.
        assert_eq!(config.exchange.recv_window_ms, 5000);
        assert!((config.trading.confidence_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].name, "alpha");
        assert_eq!(config.sources[1].api_key.as_deref(), Some("literal-key"));
        assert_eq!(config.instruments, vec!["BTCUSDT", "ETHUSDT"]);
    }
}
