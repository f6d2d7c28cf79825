//! Payment-aware request execution: the 402 challenge/pay/retry cycle.
//!
//! Exactly one pay/retry cycle is permitted per call. A second 402 after the
//! proof is attached is fatal (`PaymentNotAccepted`) — unbounded retry-on-402
//! would mean silent repeated spend.

use std::sync::Arc;

use crate::challenge::parse_challenge;
use crate::config::{EngineConfig, ModeConfig};
use crate::error::PayError;
use crate::facilitator::{FacilitatorClient, HttpAccountClient};
use crate::ledger::{SpendGuard, Verdict};
use crate::proof::{
    decode_settlement, encode_proof, PaymentProof, ProofKind, HEADER_CLIENT_PAYMENT,
    HEADER_PAYMENT, HEADER_PAYMENT_RESPONSE, HEADER_PAYMENT_RESPONSE_LEGACY,
};
use crate::relay::EvmRelaySigner;
use crate::resolver::{PaymentMode, PaymentResolver};
use crate::signer::ApiCredential;
use crate::transport::{HttpTransport, ReqwestTransport, WireRequest, WireResponse};

/// Final response of a payment-aware call, with the proof if one was paid.
#[derive(Debug)]
pub struct PaidResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Present iff the endpoint challenged and the payment settled.
    pub proof: Option<PaymentProof>,
    /// `true` when this call moved new funds. `false` for unchallenged
    /// responses and for proofs reused from an earlier call to the same
    /// challenge, where nothing new was spent.
    pub fresh: bool,
}

impl PaidResponse {
    fn from_wire(resp: WireResponse, proof: Option<PaymentProof>, fresh: bool) -> Self {
        Self {
            status: resp.status,
            headers: resp.headers,
            body: resp.body,
            proof,
            fresh,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<serde_json::Value, PayError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// First header value with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP client that automatically resolves 402 payment challenges.
///
/// Shares its [`SpendGuard`] and [`PaymentResolver`] across every call, so
/// concurrent pipelines built on one client uphold the spend invariant.
pub struct PayingClient {
    transport: Arc<dyn HttpTransport>,
    resolver: PaymentResolver,
    guard: Arc<SpendGuard>,
    preferred_networks: Vec<String>,
}

impl PayingClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        resolver: PaymentResolver,
        guard: Arc<SpendGuard>,
        preferred_networks: Vec<String>,
    ) -> Self {
        Self {
            transport,
            resolver,
            guard,
            preferred_networks,
        }
    }

    /// Assemble a client from configuration: reqwest transport, facilitator
    /// client, and the configured payment mode.
    pub fn from_config(config: &EngineConfig) -> Result<Self, PayError> {
        let transport = Arc::new(ReqwestTransport::new(config.http_timeout)?);
        let facilitator = FacilitatorClient::new(&config.facilitator_url, config.http_timeout)?;

        let mode = match &config.mode {
            ModeConfig::Relay { private_key } => PaymentMode::Relay {
                signer: Arc::new(EvmRelaySigner::from_key(private_key, facilitator)?),
            },
            ModeConfig::Proxy { api_key } => PaymentMode::Proxy {
                credential: ApiCredential::new(api_key.clone()),
                account: Arc::new(HttpAccountClient::new(facilitator)),
            },
        };

        Ok(Self::new(
            transport,
            PaymentResolver::new(mode),
            Arc::new(SpendGuard::new(config.daily_limits.clone())),
            config.preferred_networks.clone(),
        ))
    }

    pub fn guard(&self) -> &Arc<SpendGuard> {
        &self.guard
    }

    /// Execute a request, paying at most once if the endpoint challenges.
    pub async fn execute(&self, request: WireRequest) -> Result<PaidResponse, PayError> {
        // 1. Send unmodified.
        let first = self.transport.send(&request).await?;
        if first.status != 402 {
            return Ok(PaidResponse::from_wire(first, None, false));
        }

        // 2. Parse the challenge. Unrecognized is fatal for this call.
        let challenge = parse_challenge(&first.body, &self.preferred_networks)?;

        // 3. Gate on the spend guard before contacting anyone.
        let auth = match self
            .guard
            .authorize(&challenge.asset, &challenge.network, challenge.amount)
        {
            Verdict::Allowed(auth) => auth,
            Verdict::Denied { remaining } => {
                return Err(PayError::SpendLimitExceeded {
                    asset: challenge.asset,
                    network: challenge.network,
                    remaining,
                })
            }
        };

        // 4. Resolve payment. Any resolver error is fatal; the reservation
        // goes back to the ledger.
        let resolution = match self.resolver.resolve(&challenge).await {
            Ok(resolution) => resolution,
            Err(e) => {
                self.guard.release(auth);
                return Err(e);
            }
        };
        let fresh = resolution.fresh;
        let proof = resolution.proof;

        // A reused proof moved no new funds; it must not be ledgered twice.
        let auth = if fresh {
            Some(auth)
        } else {
            self.guard.release(auth);
            None
        };

        // 5. Attach the proof and resend exactly once.
        let token = match encode_proof(&proof) {
            Ok(token) => token,
            Err(e) => {
                // Payment settled; it must still count against the window.
                if let Some(auth) = auth {
                    self.guard.commit(auth);
                }
                return Err(e);
            }
        };
        let retry = request.clone().header(HEADER_PAYMENT, token);
        let second = match self.transport.send(&retry).await {
            Ok(resp) => resp,
            Err(e) => {
                // The payment settled even though the response was lost.
                if let Some(auth) = auth {
                    self.guard.commit(auth);
                }
                return Err(e);
            }
        };

        // 6. A second 402 means facilitator and upstream disagree. Never pay
        // again; the reservation is returned (the resolver's dedup store
        // still prevents re-paying this challenge).
        if second.status == 402 {
            if let Some(auth) = auth {
                self.guard.release(auth);
            }
            return Err(PayError::PaymentNotAccepted(format!(
                "upstream returned 402 after payment of {} {} on {}",
                challenge.amount, challenge.asset, challenge.network
            )));
        }

        if let Some(auth) = auth {
            self.guard.commit(auth);
        }
        let proof = enrich_from_headers(proof, &second);
        tracing::info!(
            status = second.status,
            asset = %challenge.asset,
            amount = challenge.amount,
            "paid request completed"
        );
        Ok(PaidResponse::from_wire(second, Some(proof), fresh))
    }
}

/// Fold the relay audit headers of the paid response into the proof:
/// `x-client-payment` carries the caller->facilitator hash verbatim, and
/// `x-payment-response` the facilitator->upstream settlement.
fn enrich_from_headers(mut proof: PaymentProof, resp: &WireResponse) -> PaymentProof {
    let ProofKind::Relay {
        client_tx_hash,
        facilitator_tx_hash,
    } = &mut proof.kind
    else {
        return proof;
    };

    if let Some(header) = resp.header(HEADER_CLIENT_PAYMENT) {
        *client_tx_hash = header.to_string();
    }
    if facilitator_tx_hash.is_none() {
        let settlement = resp
            .header(HEADER_PAYMENT_RESPONSE)
            .or_else(|| resp.header(HEADER_PAYMENT_RESPONSE_LEGACY))
            .and_then(decode_settlement);
        if let Some(settlement) = settlement {
            *facilitator_tx_hash = settlement.transaction;
        }
    }
    proof
}
