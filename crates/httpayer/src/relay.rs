//! EVM relay signer: a [`SignerBroadcaster`] backed by an alloy local key
//! and the facilitator's settle endpoint.

use alloy::primitives::{keccak256, Address, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;

use crate::error::PayError;
use crate::facilitator::{FacilitatorClient, SignedInstruction};
use crate::signer::{ChainFamily, PaymentInstruction, RelayReceipt, SignerBroadcaster};

/// Signs payment instructions with an EVM key and submits them through
/// the facilitator.
pub struct EvmRelaySigner {
    signer: PrivateKeySigner,
    facilitator: FacilitatorClient,
}

impl EvmRelaySigner {
    pub fn new(signer: PrivateKeySigner, facilitator: FacilitatorClient) -> Self {
        Self { signer, facilitator }
    }

    /// Parse a hex private key. The key itself never appears in errors.
    pub fn from_key(key: &str, facilitator: FacilitatorClient) -> Result<Self, PayError> {
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .map_err(|_| PayError::Config("invalid EVM private key".to_string()))?;
        Ok(Self::new(signer, facilitator))
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Digest the facilitator expects signed: keccak-256 of the canonical
    /// JSON instruction.
    fn signing_hash(instruction: &PaymentInstruction) -> Result<B256, PayError> {
        let canonical = serde_json::to_vec(instruction)?;
        Ok(keccak256(&canonical))
    }
}

impl std::fmt::Debug for EvmRelaySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmRelaySigner")
            .field("address", &self.signer.address())
            .field("facilitator", &self.facilitator)
            .finish()
    }
}

#[async_trait]
impl SignerBroadcaster for EvmRelaySigner {
    fn chain_family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    fn identity(&self) -> String {
        format!("{:#x}", self.signer.address())
    }

    async fn sign_and_submit(
        &self,
        instruction: &PaymentInstruction,
    ) -> Result<RelayReceipt, PayError> {
        let digest = Self::signing_hash(instruction)?;
        let signature = self
            .signer
            .sign_hash_sync(&digest)
            .map_err(|e| PayError::SignerError(format!("signing failed: {e}")))?;

        let signed = SignedInstruction {
            instruction: instruction.clone(),
            signature: alloy::primitives::hex::encode_prefixed(signature.as_bytes()),
            signer: format!("{:#x}", self.signer.address()),
        };

        self.facilitator.relay_settle(&signed).await
    }
}
