//! Payment proofs and their wire encoding.
//!
//! A resolved payment is attached to the retried request as the `X-Payment`
//! header, base64-encoded JSON. On the paid response, the relay exposes two
//! audit headers: `x-client-payment` (caller -> facilitator transaction) and
//! `x-payment-response` (facilitator -> upstream settlement, base64 JSON).

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::PayError;

/// Header carrying the encoded payment proof on the retried request.
pub const HEADER_PAYMENT: &str = "x-payment";
/// Response header: the caller -> facilitator transaction hash, verbatim.
pub const HEADER_CLIENT_PAYMENT: &str = "x-client-payment";
/// Response header: facilitator -> upstream settlement, base64 JSON.
pub const HEADER_PAYMENT_RESPONSE: &str = "x-payment-response";
/// Legacy alias some facilitators use for [`HEADER_PAYMENT_RESPONSE`].
pub const HEADER_PAYMENT_RESPONSE_LEGACY: &str = "payment-response";

/// Proof that a payment challenge was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentProof {
    /// Amount paid, in minor units.
    pub amount: u128,
    pub asset: String,
    pub network: String,
    #[serde(flatten)]
    pub kind: ProofKind,
}

/// Strategy-specific proof material.
///
/// The relay pattern moves funds twice — caller to facilitator, then
/// facilitator to the upstream API — so the two hashes are distinct fields,
/// never collapsed into one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum ProofKind {
    #[serde(rename_all = "camelCase")]
    Relay {
        /// Caller -> facilitator transaction hash.
        client_tx_hash: String,
        /// Facilitator -> upstream transaction hash, once observable.
        #[serde(skip_serializing_if = "Option::is_none")]
        facilitator_tx_hash: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Proxy {
        /// Server-side debit receipt identifier.
        receipt_id: String,
    },
}

/// Settlement info decoded from the `x-payment-response` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementInfo {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

/// Base64-encode a proof for the `X-Payment` header.
pub fn encode_proof(proof: &PaymentProof) -> Result<String, PayError> {
    let json = serde_json::to_vec(proof)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(json))
}

/// Decode a proof from an `X-Payment` header value.
pub fn decode_proof(encoded: &str) -> Result<PaymentProof, PayError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| PayError::ChallengeUnrecognized(format!("invalid base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| PayError::ChallengeUnrecognized(format!("invalid proof JSON: {e}")))
}

/// Decode an `x-payment-response` header value.
///
/// Tries base64-encoded JSON first, then plain JSON. Returns `None` for
/// anything else rather than failing the call — the header is audit data.
pub fn decode_settlement(header_value: &str) -> Option<SettlementInfo> {
    base64::engine::general_purpose::STANDARD
        .decode(header_value)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<SettlementInfo>(&bytes).ok())
        .or_else(|| serde_json::from_str::<SettlementInfo>(header_value).ok())
}
