//! Parsing 402 "Payment Required" responses into payment challenges.
//!
//! The parser is side-effect free: it decodes the JSON body, filters the
//! offered `accepts` entries down to schemes this engine can pay, and selects
//! one according to the caller's network preference order.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::amount::parse_minor_units;
use crate::error::PayError;

/// Payment scheme identifiers this engine knows how to resolve.
pub const SUPPORTED_SCHEMES: &[&str] = &["exact"];

/// A single entry in the `accepts` array of a 402 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    pub scheme: String,
    pub network: String,
    /// Required amount in minor units, as a decimal integer string.
    #[serde(alias = "amount")]
    pub max_amount_required: String,
    /// Asset symbol or token contract address.
    pub asset: String,
    pub pay_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// The 402 response body returned by a paywalled resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequiredBody {
    pub x402_version: u32,
    pub accepts: Vec<PaymentRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A structured payment challenge, decoded from one selected `accepts` entry.
///
/// Immutable once parsed; one is produced fresh per 402 response.
#[derive(Debug, Clone)]
pub struct PaymentChallenge {
    pub scheme: String,
    /// Exact amount in minor units.
    pub amount: u128,
    pub asset: String,
    pub network: String,
    pub pay_to: String,
    pub nonce: Option<String>,
    pub expires_at: Option<u64>,
    /// The raw selected requirement, kept for instruction building.
    pub requirement: PaymentRequirements,
}

impl PaymentChallenge {
    fn from_requirement(req: &PaymentRequirements) -> Result<Self, PayError> {
        let amount = parse_minor_units(&req.max_amount_required)?;
        Ok(Self {
            scheme: req.scheme.clone(),
            amount,
            asset: req.asset.clone(),
            network: req.network.clone(),
            pay_to: req.pay_to.clone(),
            nonce: req.nonce.clone(),
            expires_at: req.expires_at,
            requirement: req.clone(),
        })
    }

    /// Process-wide dedup key: the challenge nonce when the server supplied
    /// one, otherwise a content hash of the payment-relevant fields.
    pub fn dedup_key(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.scheme.as_bytes());
        hasher.update([0]);
        hasher.update(self.network.as_bytes());
        hasher.update([0]);
        hasher.update(self.asset.as_bytes());
        hasher.update([0]);
        hasher.update(self.amount.to_be_bytes());
        hasher.update([0]);
        hasher.update(self.pay_to.as_bytes());
        hasher.update([0]);
        if let Some(nonce) = &self.nonce {
            hasher.update(nonce.as_bytes());
        } else if let Some(resource) = &self.requirement.resource {
            hasher.update(resource.as_bytes());
        }
        hasher.finalize().into()
    }
}

/// Parse a 402 response body and select one challenge.
///
/// `preferred_networks` is a priority order; the first preference with a
/// recognized-scheme entry wins. When no preference matches, the first
/// recognized entry is used (the tie-break is a default, not protocol-defined).
pub fn parse_challenge(
    body: &[u8],
    preferred_networks: &[String],
) -> Result<PaymentChallenge, PayError> {
    let parsed: PaymentRequiredBody = serde_json::from_slice(body)
        .map_err(|e| PayError::ChallengeUnrecognized(format!("invalid 402 body: {e}")))?;

    let candidates: Vec<&PaymentRequirements> = parsed
        .accepts
        .iter()
        .filter(|r| SUPPORTED_SCHEMES.contains(&r.scheme.as_str()))
        .collect();

    if candidates.is_empty() {
        return Err(PayError::ChallengeUnrecognized(format!(
            "no supported scheme in {:?}",
            parsed.accepts.iter().map(|r| &r.scheme).collect::<Vec<_>>()
        )));
    }

    let selected = preferred_networks
        .iter()
        .find_map(|net| candidates.iter().find(|r| &r.network == net))
        .copied()
        .unwrap_or(candidates[0]);

    let challenge = PaymentChallenge::from_requirement(selected)?;
    tracing::debug!(
        scheme = %challenge.scheme,
        network = %challenge.network,
        asset = %challenge.asset,
        amount = challenge.amount,
        "parsed 402 challenge"
    );
    Ok(challenge)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_with(accepts: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "x402Version": 1,
            "accepts": accepts,
        }))
        .unwrap()
    }

    fn evm_entry(network: &str, amount: &str) -> serde_json::Value {
        serde_json::json!({
            "scheme": "exact",
            "network": network,
            "maxAmountRequired": amount,
            "asset": "USDC",
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
        })
    }

    #[test]
    fn parses_single_evm_challenge() {
        let body = body_with(serde_json::json!([evm_entry("base", "50000")]));
        let challenge = parse_challenge(&body, &["base".to_string()]).unwrap();
        assert_eq!(challenge.amount, 50_000);
        assert_eq!(challenge.asset, "USDC");
        assert_eq!(challenge.network, "base");
        assert_eq!(
            challenge.pay_to,
            "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
        );
    }

    #[test]
    fn preference_order_picks_matching_network() {
        let body = body_with(serde_json::json!([
            evm_entry("solana", "70000"),
            evm_entry("base", "50000"),
        ]));
        let challenge = parse_challenge(&body, &["base".to_string()]).unwrap();
        assert_eq!(challenge.network, "base");
        assert_eq!(challenge.amount, 50_000);
    }

    #[test]
    fn falls_back_to_first_recognized_entry() {
        let body = body_with(serde_json::json!([
            evm_entry("avalanche", "70000"),
            evm_entry("base", "50000"),
        ]));
        let challenge = parse_challenge(&body, &["polygon".to_string()]).unwrap();
        assert_eq!(challenge.network, "avalanche");
    }

    #[test]
    fn skips_unsupported_schemes() {
        let mut exotic = evm_entry("base", "50000");
        exotic["scheme"] = serde_json::json!("streaming");
        let body = body_with(serde_json::json!([exotic, evm_entry("base", "60000")]));
        let challenge = parse_challenge(&body, &[]).unwrap();
        assert_eq!(challenge.amount, 60_000);
    }

    #[test]
    fn rejects_all_unsupported() {
        let mut exotic = evm_entry("base", "50000");
        exotic["scheme"] = serde_json::json!("streaming");
        let body = body_with(serde_json::json!([exotic]));
        let err = parse_challenge(&body, &[]).unwrap_err();
        assert!(matches!(err, PayError::ChallengeUnrecognized(_)));
    }

    #[test]
    fn rejects_malformed_body() {
        let err = parse_challenge(b"not json", &[]).unwrap_err();
        assert!(matches!(err, PayError::ChallengeUnrecognized(_)));
    }

    #[test]
    fn rejects_fractional_wire_amount() {
        let body = body_with(serde_json::json!([evm_entry("base", "0.05")]));
        assert!(parse_challenge(&body, &[]).is_err());
    }

    #[test]
    fn accepts_amount_alias() {
        let body = serde_json::to_vec(&serde_json::json!({
            "x402Version": 1,
            "accepts": [{
                "scheme": "exact",
                "network": "base",
                "amount": "1000",
                "asset": "USDC",
                "payTo": "0xabc",
            }],
        }))
        .unwrap();
        let challenge = parse_challenge(&body, &[]).unwrap();
        assert_eq!(challenge.amount, 1000);
    }

    #[test]
    fn dedup_key_uses_nonce_when_present() {
        let mut a = evm_entry("base", "50000");
        a["nonce"] = serde_json::json!("abc123");
        let mut b = evm_entry("base", "50000");
        b["nonce"] = serde_json::json!("def456");

        let ca = parse_challenge(&body_with(serde_json::json!([a])), &[]).unwrap();
        let cb = parse_challenge(&body_with(serde_json::json!([b])), &[]).unwrap();
        assert_ne!(ca.dedup_key(), cb.dedup_key());

        // Same nonce, same terms -> same key.
        let ca2 = ca.clone();
        assert_eq!(ca.dedup_key(), ca2.dedup_key());
    }

    #[test]
    fn dedup_key_is_content_hash_without_nonce() {
        let ca =
            parse_challenge(&body_with(serde_json::json!([evm_entry("base", "50000")])), &[])
                .unwrap();
        let cb =
            parse_challenge(&body_with(serde_json::json!([evm_entry("base", "60000")])), &[])
                .unwrap();
        assert_ne!(ca.dedup_key(), cb.dedup_key());
    }
}
