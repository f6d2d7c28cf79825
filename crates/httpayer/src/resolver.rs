//! Turning a payment challenge into a payment proof.
//!
//! The resolver owns the mode decision (relay vs proxy) and two pieces of
//! process-wide discipline: at-most-once payment per challenge, and
//! serialized signing per signer identity.

use std::sync::Arc;

use dashmap::DashMap;

use crate::challenge::PaymentChallenge;
use crate::error::PayError;
use crate::proof::{PaymentProof, ProofKind};
use crate::signer::{
    network_family, AccountClient, ApiCredential, PaymentInstruction, SignerBroadcaster,
};

/// Payment strategy. Exactly one mode is active per engine instance,
/// chosen at construction and never mixed mid-pipeline.
#[derive(Clone)]
pub enum PaymentMode {
    /// Delegate to a paying facilitator, reimbursed via an on-chain
    /// transaction signed by the wallet-held key.
    Relay { signer: Arc<dyn SignerBroadcaster> },
    /// Authenticate with a prepaid account credential; the facilitator
    /// debits the balance server-side.
    Proxy {
        credential: ApiCredential,
        account: Arc<dyn AccountClient>,
    },
}

impl std::fmt::Debug for PaymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMode::Relay { signer } => f
                .debug_struct("Relay")
                .field("signer", &signer.identity())
                .finish(),
            PaymentMode::Proxy { .. } => f.write_str("Proxy([REDACTED])"),
        }
    }
}

/// Outcome of [`PaymentResolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub proof: PaymentProof,
    /// `false` when the proof was reused from the dedup store — no new
    /// funds moved and nothing new should be ledgered.
    pub fresh: bool,
}

/// Resolves challenges into proofs. Safe to share across pipelines.
pub struct PaymentResolver {
    mode: PaymentMode,
    /// Challenge dedup: settled proofs keyed by nonce/content hash.
    settled: DashMap<[u8; 32], PaymentProof>,
    /// Per-challenge locks so concurrent resolves of one challenge pay once.
    in_flight: DashMap<[u8; 32], Arc<tokio::sync::Mutex<()>>>,
    /// Per-signer-identity locks: the signing collaborator is not assumed
    /// safe under concurrent use.
    signing: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl PaymentResolver {
    pub fn new(mode: PaymentMode) -> Self {
        Self {
            mode,
            settled: DashMap::new(),
            in_flight: DashMap::new(),
            signing: DashMap::new(),
        }
    }

    pub fn mode(&self) -> &PaymentMode {
        &self.mode
    }

    /// Resolve a challenge into a proof.
    ///
    /// At-most-once: resolving the same challenge again (same nonce or
    /// content hash) returns the already-obtained proof without paying.
    pub async fn resolve(&self, challenge: &PaymentChallenge) -> Result<Resolution, PayError> {
        let key = challenge.dedup_key();

        let lock = self
            .in_flight
            .entry(key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(existing) = self.settled.get(&key) {
            tracing::debug!(
                asset = %challenge.asset,
                amount = challenge.amount,
                "challenge already paid, reusing proof"
            );
            return Ok(Resolution {
                proof: existing.clone(),
                fresh: false,
            });
        }

        let proof = match &self.mode {
            PaymentMode::Relay { signer } => self.resolve_relay(signer, challenge).await?,
            PaymentMode::Proxy { credential, account } => {
                let receipt = account.debit(credential, challenge).await?;
                tracing::info!(
                    asset = %challenge.asset,
                    amount = challenge.amount,
                    receipt = %receipt.receipt_id,
                    "account debited for challenge"
                );
                PaymentProof {
                    amount: challenge.amount,
                    asset: challenge.asset.clone(),
                    network: challenge.network.clone(),
                    kind: ProofKind::Proxy {
                        receipt_id: receipt.receipt_id,
                    },
                }
            }
        };

        self.settled.insert(key, proof.clone());
        Ok(Resolution { proof, fresh: true })
    }

    async fn resolve_relay(
        &self,
        signer: &Arc<dyn SignerBroadcaster>,
        challenge: &PaymentChallenge,
    ) -> Result<PaymentProof, PayError> {
        if network_family(&challenge.network) != signer.chain_family() {
            return Err(PayError::SignerError(format!(
                "signer {} cannot pay on network {}",
                signer.identity(),
                challenge.network
            )));
        }

        let instruction = PaymentInstruction::from_challenge(challenge);

        let lock = self
            .signing
            .entry(signer.identity())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _serialized = lock.lock().await;

        let receipt = signer.sign_and_submit(&instruction).await?;
        tracing::info!(
            asset = %challenge.asset,
            amount = challenge.amount,
            client_tx = %receipt.client_tx_hash,
            "relay payment settled"
        );
        Ok(PaymentProof {
            amount: challenge.amount,
            asset: challenge.asset.clone(),
            network: challenge.network.clone(),
            kind: ProofKind::Relay {
                client_tx_hash: receipt.client_tx_hash,
                facilitator_tx_hash: receipt.facilitator_tx_hash,
            },
        })
    }
}
