//! Client-side engine for HTTP APIs gated by 402 "Payment Required".
//!
//! The [`PayingClient`] performs the challenge/pay/retry cycle for a single
//! call: parse the 402 challenge, gate it through the [`SpendGuard`], resolve
//! payment via the configured [`PaymentMode`] (relay or proxy), attach the
//! proof, and resend exactly once. Multi-step orchestration lives in the
//! `httpayer-pipeline` crate.

// Core types
pub mod amount;
pub mod challenge;
pub mod config;
pub mod error;
pub mod ledger;
pub mod proof;

// Payment resolution
pub mod facilitator;
pub mod relay;
pub mod resolver;
pub mod signer;

// HTTP execution
pub mod executor;
pub mod transport;

// Re-exports
pub use challenge::{
    parse_challenge, PaymentChallenge, PaymentRequiredBody, PaymentRequirements,
    SUPPORTED_SCHEMES,
};
pub use config::{parse_limits, EngineConfig, ModeConfig};
pub use error::PayError;
pub use executor::{PaidResponse, PayingClient};
pub use facilitator::{FacilitatorClient, HttpAccountClient, SignedInstruction};
pub use ledger::{Authorization, SpendGuard, Verdict};
pub use proof::{
    decode_proof, decode_settlement, encode_proof, PaymentProof, ProofKind, SettlementInfo,
    HEADER_CLIENT_PAYMENT, HEADER_PAYMENT, HEADER_PAYMENT_RESPONSE,
};
pub use relay::EvmRelaySigner;
pub use resolver::{PaymentMode, PaymentResolver, Resolution};
pub use signer::{
    network_family, AccountClient, ApiCredential, ChainFamily, DebitReceipt, PaymentInstruction,
    RelayReceipt, SignerBroadcaster,
};
pub use transport::{HttpTransport, ReqwestTransport, WireRequest, WireResponse};
