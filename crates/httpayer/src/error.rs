use thiserror::Error;

/// Errors returned by the payment engine.
///
/// Every payment-path variant is fatal for the call that raised it: the
/// executor never retries a failed payment, and the orchestrator records the
/// error verbatim in the step's result. Only [`PayError::Transport`] is a
/// candidate for retry, and only by explicit caller policy.
#[derive(Debug, Error)]
pub enum PayError {
    /// The 402 body/headers did not match any recognized payment scheme.
    #[error("unrecognized payment challenge: {0}")]
    ChallengeUnrecognized(String),

    /// The spend guard vetoed the payment. `remaining` is in minor units.
    #[error("spend limit exceeded for {asset} on {network}: {remaining} minor units remaining")]
    SpendLimitExceeded {
        asset: String,
        network: String,
        remaining: u128,
    },

    /// The signing collaborator could not produce a valid signature
    /// (key absent, chain family mismatch, signing failure).
    #[error("signer error: {0}")]
    SignerError(String),

    /// The facilitator declined to relay the payment.
    #[error("payment rejected: {0}")]
    PaymentRejected(String),

    /// Proxy-mode account lacks funds to cover the challenge.
    #[error("insufficient account balance: {0}")]
    InsufficientBalance(String),

    /// Proxy-mode credential is invalid or expired.
    #[error("authentication failed: {0}")]
    AuthError(String),

    /// The upstream returned 402 again after payment was attached.
    /// The payment is never re-attempted.
    #[error("payment not accepted by upstream: {0}")]
    PaymentNotAccepted(String),

    /// Network-level failure. Eligible for caller-level retry; never
    /// retried inside the engine (duplicate payment risk).
    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl PayError {
    /// Whether a caller may transparently retry the operation that produced
    /// this error without risking a duplicate payment.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PayError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_is_retryable() {
        assert!(PayError::Transport("timeout".into()).is_retryable());
        assert!(!PayError::PaymentRejected("declined".into()).is_retryable());
        assert!(!PayError::PaymentNotAccepted("402 after pay".into()).is_retryable());
        assert!(!PayError::ChallengeUnrecognized("bad body".into()).is_retryable());
    }

    #[test]
    fn spend_limit_display_carries_remaining() {
        let err = PayError::SpendLimitExceeded {
            asset: "USDC".into(),
            network: "base".into(),
            remaining: 400_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("USDC"));
        assert!(msg.contains("400000"));
    }
}
