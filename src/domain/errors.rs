use thiserror::Error;

use crate::persistence::DatabaseError;

/// Errors raised by the settlement state machines and the ledger store.
///
/// Every variant that reaches the caller means the enclosing transaction was
/// rolled back in full; no ledger entry is ever left half-written.
#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("insufficient funds: required {required_cents} cents, available {available_cents} cents")]
    InsufficientFunds {
        required_cents: i64,
        available_cents: i64,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("deposit {0} already processed")]
    AlreadyProcessed(String),

    #[error("withdrawal {0} is not in a state that allows this transition")]
    InvalidWithdrawalState(String),

    #[error("trade {0} already settled")]
    AlreadySettled(String),

    #[error("trade owner cannot settle their own trade")]
    OwnerCannotSettle,

    #[error("invalid payout destination: {0}")]
    InvalidPayoutDestination(String),

    #[error("payout gateway call failed: {0}")]
    PayoutFailed(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Errors raised while reconciling a gateway webhook.
///
/// Validation, authenticity and amount errors are terminal for the event:
/// the core never retries them. `ProviderUnreachable` is the only transient
/// variant; redelivery is the upstream provider's responsibility.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unrecognized status '{status}' from provider {provider}")]
    UnrecognizedStatus {
        provider: &'static str,
        status: String,
    },

    #[error("webhook signature verification failed")]
    InvalidSignature,

    #[error("no pending deposit for transaction {0}")]
    NotFoundOrProcessed(String),

    #[error("amount mismatch: provider reported {reported:.2}, expected {expected:.2}")]
    AmountMismatch { reported: f64, expected: f64 },

    #[error("provider status disagrees with webhook for transaction {0}")]
    ProviderDisagreement(String),

    #[error("provider call failed: {0}")]
    ProviderUnreachable(String),

    #[error(transparent)]
    Settlement(#[from] SettlementError),
}

impl GatewayError {
    /// Whether the upstream provider should redeliver this webhook.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::ProviderUnreachable(_)
                | GatewayError::Settlement(SettlementError::Database(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_mismatch_display() {
        let err = GatewayError::AmountMismatch {
            reported: 99.5,
            expected: 100.0,
        };
        assert_eq!(
            err.to_string(),
            "amount mismatch: provider reported 99.50, expected 100.00"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::ProviderUnreachable("timeout".into()).is_retryable());
        assert!(!GatewayError::InvalidSignature.is_retryable());
        assert!(!GatewayError::NotFoundOrProcessed("tx-1".into()).is_retryable());
        assert!(
            !GatewayError::Settlement(SettlementError::AlreadyProcessed("dep-1".into()))
                .is_retryable()
        );
    }
}
