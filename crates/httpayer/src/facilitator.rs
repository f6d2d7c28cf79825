//! HTTP client for the payment facilitator's settle and debit endpoints.
//!
//! Relay mode posts a signed payment instruction to `/relay/settle`; proxy
//! mode debits the caller's prepaid account via `/account/debit` with a
//! bearer credential.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::challenge::PaymentChallenge;
use crate::error::PayError;
use crate::signer::{AccountClient, ApiCredential, DebitReceipt, PaymentInstruction, RelayReceipt};

/// A payment instruction plus the signature authorizing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedInstruction {
    pub instruction: PaymentInstruction,
    pub signature: String,
    /// Address of the signing key.
    pub signer: String,
}

/// Response from the facilitator's `/relay/settle` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettleOutcome {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    facilitator_tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_reason: Option<String>,
}

/// Response from the facilitator's `/account/debit` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebitOutcome {
    receipt_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    balance_remaining: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FacilitatorErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    message: String,
}

/// Client for a remote facilitator.
#[derive(Clone)]
pub struct FacilitatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl FacilitatorClient {
    pub fn new(base_url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, PayError> {
        let base_url = base_url.into();
        url::Url::parse(&base_url)
            .map_err(|_| PayError::Config(format!("invalid facilitator URL: {base_url}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PayError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Submit a signed instruction for settlement (relay mode).
    pub async fn relay_settle(&self, signed: &SignedInstruction) -> Result<RelayReceipt, PayError> {
        let resp = self
            .http
            .post(self.endpoint("/relay/settle"))
            .json(signed)
            .send()
            .await
            .map_err(|e| PayError::Transport(format!("facilitator request failed: {e}")))?;

        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PayError::Transport(format!("facilitator response read failed: {e}")))?;

        if !status.is_success() {
            return Err(PayError::PaymentRejected(error_detail(status.as_u16(), &bytes)));
        }

        let outcome: SettleOutcome = serde_json::from_slice(&bytes)
            .map_err(|e| PayError::PaymentRejected(format!("unparseable settle response: {e}")))?;

        if !outcome.success {
            return Err(PayError::PaymentRejected(
                outcome
                    .error_reason
                    .unwrap_or_else(|| "facilitator declined".to_string()),
            ));
        }
        let client_tx_hash = outcome.client_tx_hash.ok_or_else(|| {
            PayError::PaymentRejected("settle response missing client transaction".to_string())
        })?;

        Ok(RelayReceipt {
            client_tx_hash,
            facilitator_tx_hash: outcome.facilitator_tx_hash,
        })
    }

    /// Debit a prepaid account for a challenge (proxy mode).
    pub async fn account_debit(
        &self,
        credential: &ApiCredential,
        challenge: &PaymentChallenge,
    ) -> Result<DebitReceipt, PayError> {
        let body = serde_json::json!({
            "amount": challenge.amount.to_string(),
            "asset": challenge.asset,
            "network": challenge.network,
            "payTo": challenge.pay_to,
            "nonce": challenge.nonce,
        });

        let resp = self
            .http
            .post(self.endpoint("/account/debit"))
            .bearer_auth(credential.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| PayError::Transport(format!("facilitator request failed: {e}")))?;

        let status = resp.status().as_u16();
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PayError::Transport(format!("facilitator response read failed: {e}")))?;

        match status {
            200 | 201 => {
                let outcome: DebitOutcome = serde_json::from_slice(&bytes).map_err(|e| {
                    PayError::PaymentRejected(format!("unparseable debit response: {e}"))
                })?;
                Ok(DebitReceipt {
                    receipt_id: outcome.receipt_id,
                    balance_remaining: outcome.balance_remaining,
                })
            }
            401 | 403 => Err(PayError::AuthError(error_detail(status, &bytes))),
            402 => Err(PayError::InsufficientBalance(error_detail(status, &bytes))),
            _ => Err(PayError::PaymentRejected(error_detail(status, &bytes))),
        }
    }
}

impl std::fmt::Debug for FacilitatorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacilitatorClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn error_detail(status: u16, body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<FacilitatorErrorBody>(body) {
        let detail = if !parsed.message.is_empty() {
            parsed.message
        } else {
            parsed.error
        };
        if !detail.is_empty() {
            return format!("facilitator returned {status}: {detail}");
        }
    }
    format!("facilitator returned {status}")
}

/// [`AccountClient`] backed by the facilitator's debit endpoint.
#[derive(Debug, Clone)]
pub struct HttpAccountClient {
    facilitator: FacilitatorClient,
}

impl HttpAccountClient {
    pub fn new(facilitator: FacilitatorClient) -> Self {
        Self { facilitator }
    }
}

#[async_trait]
impl AccountClient for HttpAccountClient {
    async fn debit(
        &self,
        credential: &ApiCredential,
        challenge: &PaymentChallenge,
    ) -> Result<DebitReceipt, PayError> {
        self.facilitator.account_debit(credential, challenge).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_base_url() {
        assert!(matches!(
            FacilitatorClient::new("not a url", std::time::Duration::from_secs(5)),
            Err(PayError::Config(_))
        ));
    }

    #[test]
    fn trims_trailing_slash() {
        let client =
            FacilitatorClient::new("https://api.httpayer.com/", std::time::Duration::from_secs(5))
                .unwrap();
        assert_eq!(
            client.endpoint("/relay/settle"),
            "https://api.httpayer.com/relay/settle"
        );
    }

    #[test]
    fn error_detail_prefers_message() {
        let body = br#"{"error":"insufficient_balance","message":"balance is 0.10 USDC"}"#;
        let detail = error_detail(402, body);
        assert!(detail.contains("402"));
        assert!(detail.contains("balance is 0.10 USDC"));
        assert_eq!(error_detail(500, b"<html>"), "facilitator returned 500");
    }
}
