//! Environment-driven engine configuration.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::amount::{asset_decimals, parse_decimal};
use crate::error::PayError;

const DEFAULT_FACILITATOR_URL: &str = "https://api.httpayer.com";
const DEFAULT_PREFERRED_NETWORK: &str = "base";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Which payment strategy the engine runs with. Secret material is held as
/// opaque strings and never logged.
#[derive(Clone)]
pub enum ModeConfig {
    Relay { private_key: String },
    Proxy { api_key: String },
}

impl std::fmt::Debug for ModeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModeConfig::Relay { .. } => f.write_str("Relay { private_key: [REDACTED] }"),
            ModeConfig::Proxy { .. } => f.write_str("Proxy { api_key: [REDACTED] }"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: ModeConfig,
    /// Per-asset daily limits in minor units.
    pub daily_limits: HashMap<String, u128>,
    /// Network preference order for multi-network challenges.
    pub preferred_networks: Vec<String>,
    pub facilitator_url: String,
    pub http_timeout: Duration,
}

impl EngineConfig {
    /// Read configuration from the environment.
    ///
    /// Recognized variables: `PAYMENT_MODE` (relay|proxy, default relay),
    /// `EVM_PRIVATE_KEY` / `HTTPAYER_API_KEY`, `DAILY_LIMIT`
    /// (comma list `ASSET=decimal`, e.g. `USDC=1.00`), `PREFERRED_NETWORK`
    /// (comma list, priority order), `FACILITATOR_URL`, `HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, PayError> {
        let mode_str = env::var("PAYMENT_MODE").unwrap_or_else(|_| "relay".to_string());
        let mode = match mode_str.to_ascii_lowercase().as_str() {
            "relay" => ModeConfig::Relay {
                private_key: env::var("EVM_PRIVATE_KEY").map_err(|_| {
                    PayError::Config("EVM_PRIVATE_KEY is required in relay mode".to_string())
                })?,
            },
            "proxy" => ModeConfig::Proxy {
                api_key: env::var("HTTPAYER_API_KEY").map_err(|_| {
                    PayError::Config("HTTPAYER_API_KEY is required in proxy mode".to_string())
                })?,
            },
            other => {
                return Err(PayError::Config(format!(
                    "PAYMENT_MODE must be 'relay' or 'proxy', got {other:?}"
                )))
            }
        };

        let daily_limits = match env::var("DAILY_LIMIT") {
            Ok(spec) => parse_limits(&spec)?,
            Err(_) => HashMap::new(),
        };

        let preferred_networks: Vec<String> = env::var("PREFERRED_NETWORK")
            .unwrap_or_else(|_| DEFAULT_PREFERRED_NETWORK.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let facilitator_url =
            env::var("FACILITATOR_URL").unwrap_or_else(|_| DEFAULT_FACILITATOR_URL.to_string());
        url::Url::parse(&facilitator_url)
            .map_err(|_| PayError::Config(format!("invalid FACILITATOR_URL: {facilitator_url}")))?;

        let http_timeout = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));

        Ok(Self {
            mode,
            daily_limits,
            preferred_networks,
            facilitator_url,
            http_timeout,
        })
    }
}

/// Parse a `DAILY_LIMIT` spec (`"USDC=1.00,DAI=5"`) into minor units.
pub fn parse_limits(spec: &str) -> Result<HashMap<String, u128>, PayError> {
    let mut limits = HashMap::new();
    for entry in spec.split(',').filter(|s| !s.trim().is_empty()) {
        let (asset, value) = entry
            .split_once('=')
            .ok_or_else(|| PayError::Config(format!("invalid DAILY_LIMIT entry: {entry:?}")))?;
        let asset = asset.trim().to_ascii_uppercase();
        let amount = parse_decimal(value, asset_decimals(&asset))?;
        limits.insert(asset, amount);
    }
    Ok(limits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_limit_spec() {
        let limits = parse_limits("USDC=1.00, dai=5").unwrap();
        assert_eq!(limits["USDC"], 1_000_000);
        assert_eq!(limits["DAI"], 5_000_000_000_000_000_000);
    }

    #[test]
    fn rejects_malformed_limit_spec() {
        assert!(parse_limits("USDC").is_err());
        assert!(parse_limits("USDC=abc").is_err());
        assert!(parse_limits("USDC=1.0000001").is_err());
    }

    #[test]
    fn empty_spec_means_no_limits() {
        assert!(parse_limits("").unwrap().is_empty());
    }

    #[test]
    fn mode_debug_is_redacted() {
        let relay = ModeConfig::Relay {
            private_key: "0xdeadbeef".into(),
        };
        let proxy = ModeConfig::Proxy {
            api_key: "sk-secret".into(),
        };
        assert!(!format!("{relay:?}").contains("deadbeef"));
        assert!(!format!("{proxy:?}").contains("sk-secret"));
    }
}
