//! Collaborator seams for payment resolution.
//!
//! Relay mode delegates on-chain signing and broadcast to a
//! [`SignerBroadcaster`]; proxy mode debits a prepaid account through an
//! [`AccountClient`]. Both are trait objects so callers can substitute their
//! own wallet or account infrastructure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::challenge::PaymentChallenge;
use crate::error::PayError;

/// Chain family a signer can produce signatures for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainFamily {
    Evm,
    Solana,
}

/// Map a network identifier to its chain family.
pub fn network_family(network: &str) -> ChainFamily {
    match network.to_ascii_lowercase().as_str() {
        n if n.starts_with("solana") => ChainFamily::Solana,
        _ => ChainFamily::Evm,
    }
}

/// A payment instruction for the facilitator, derived from a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInstruction {
    /// Amount in minor units, exact.
    pub amount: u128,
    pub asset: String,
    pub network: String,
    pub recipient: String,
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<u64>,
}

impl PaymentInstruction {
    /// Build an instruction from a challenge, reusing the challenge nonce
    /// when the server supplied one.
    pub fn from_challenge(challenge: &PaymentChallenge) -> Self {
        let nonce = challenge
            .nonce
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        Self {
            amount: challenge.amount,
            asset: challenge.asset.clone(),
            network: challenge.network.clone(),
            recipient: challenge.pay_to.clone(),
            nonce,
            valid_until: challenge.expires_at,
        }
    }
}

/// Receipt returned by the signer/broadcaster after the facilitator settles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayReceipt {
    /// Caller -> facilitator transaction hash.
    pub client_tx_hash: String,
    /// Facilitator -> upstream transaction hash, when already observable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facilitator_tx_hash: Option<String>,
}

/// External signer/broadcast collaborator (relay mode).
///
/// Implementations are treated as scarce, possibly rate-limited resources;
/// the resolver serializes calls per [`identity`](Self::identity).
#[async_trait]
pub trait SignerBroadcaster: Send + Sync {
    /// Chain family this signer's key material belongs to.
    fn chain_family(&self) -> ChainFamily;

    /// Stable identity of the signing key (e.g. the wallet address).
    /// Used for serialization, never for key material.
    fn identity(&self) -> String;

    /// Sign the instruction and submit it through the facilitator,
    /// returning proof of both fund movements.
    async fn sign_and_submit(
        &self,
        instruction: &PaymentInstruction,
    ) -> Result<RelayReceipt, PayError>;
}

/// Opaque bearer credential for proxy mode. Never logged, never interpreted.
#[derive(Clone)]
pub struct ApiCredential(String);

impl ApiCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw credential, for attaching to a facilitator request.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiCredential([REDACTED])")
    }
}

/// Receipt for a server-side account debit (proxy mode).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebitReceipt {
    pub receipt_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance_remaining: Option<String>,
}

/// Account/credential collaborator (proxy mode).
#[async_trait]
pub trait AccountClient: Send + Sync {
    /// Debit the account for the challenge amount.
    async fn debit(
        &self,
        credential: &ApiCredential,
        challenge: &PaymentChallenge,
    ) -> Result<DebitReceipt, PayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::challenge::parse_challenge;

    fn challenge_body(nonce: Option<&str>) -> Vec<u8> {
        let mut entry = serde_json::json!({
            "scheme": "exact",
            "network": "base",
            "maxAmountRequired": "50000",
            "asset": "USDC",
            "payTo": "0x209693Bc6afc0C5328bA36FaF03C514EF312287C",
        });
        if let Some(n) = nonce {
            entry["nonce"] = serde_json::json!(n);
        }
        serde_json::to_vec(&serde_json::json!({
            "x402Version": 1,
            "accepts": [entry],
        }))
        .unwrap()
    }

    #[test]
    fn instruction_reproduces_challenge_terms() {
        let challenge = parse_challenge(&challenge_body(Some("n-1")), &[]).unwrap();
        let instruction = PaymentInstruction::from_challenge(&challenge);
        assert_eq!(instruction.amount, 50_000);
        assert_eq!(instruction.asset, "USDC");
        assert_eq!(
            instruction.recipient,
            "0x209693Bc6afc0C5328bA36FaF03C514EF312287C"
        );
        assert_eq!(instruction.nonce, "n-1");
    }

    #[test]
    fn instruction_generates_nonce_when_absent() {
        let challenge = parse_challenge(&challenge_body(None), &[]).unwrap();
        let a = PaymentInstruction::from_challenge(&challenge);
        let b = PaymentInstruction::from_challenge(&challenge);
        assert!(!a.nonce.is_empty());
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn network_families() {
        assert_eq!(network_family("base"), ChainFamily::Evm);
        assert_eq!(network_family("polygon"), ChainFamily::Evm);
        assert_eq!(network_family("solana"), ChainFamily::Solana);
        assert_eq!(network_family("solana-devnet"), ChainFamily::Solana);
    }

    #[test]
    fn credential_debug_is_redacted() {
        let cred = ApiCredential::new("super-secret");
        assert!(!format!("{cred:?}").contains("super-secret"));
    }
}
