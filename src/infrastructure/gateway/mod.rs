//! Gateway Webhook Adapters
//!
//! One adapter per external payment provider. Each adapter's sole job is to
//! turn a provider-specific payload into a normalized [`SettlementEvent`]
//! (or a validation error). Everything after that (pending-deposit lookup,
//! amount tolerance, approval) is the shared [`reconcile`] algorithm, so
//! the settlement path cannot drift between providers.

pub mod bravopay;
pub mod pixway;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::services::settlement::SettlementService;
use crate::domain::errors::GatewayError;
use crate::persistence::models::DepositRecord;
use crate::persistence::repository::DepositRepository;
use crate::persistence::DbPool;

/// Internal canonical status every provider vocabulary maps into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalStatus {
    Paid,
    Pending,
    Failed,
}

/// Normalized webhook message. Transient; never persisted.
#[derive(Debug, Clone)]
pub struct SettlementEvent {
    pub provider: &'static str,
    pub external_transaction_id: String,
    pub status: CanonicalStatus,
    /// Amount in major units as the provider reported it.
    pub reported_amount: f64,
}

#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn provider(&self) -> &'static str;

    /// Provider-specific authenticity check over the raw payload.
    fn signature_valid(&self, payload: &Value) -> bool;

    /// Parse and normalize the payload. Field or status problems surface
    /// here; nothing is mutated yet.
    fn validate(&self, payload: &Value) -> Result<SettlementEvent, GatewayError>;

    /// Second source of truth, where the provider offers one. Default
    /// implementation agrees unconditionally.
    async fn confirm_with_provider(&self, _event: &SettlementEvent) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// Drives a raw webhook payload through the shared reconciliation steps and
/// into the deposit state machine.
pub struct GatewayReconciler {
    settlement: Arc<SettlementService>,
    deposits: DepositRepository,
    /// Accepted |reported − expected| gap in major units.
    amount_tolerance: f64,
}

impl GatewayReconciler {
    pub fn new(pool: DbPool, settlement: Arc<SettlementService>, amount_tolerance: f64) -> Self {
        Self {
            settlement,
            deposits: DepositRepository::new(pool),
            amount_tolerance,
        }
    }

    /// The six reconciliation steps: authenticity, normalization, pending
    /// lookup, provider agreement, amount tolerance, approval. Fails closed
    /// at every step; the deposit is mutated only in the final one.
    pub async fn reconcile(
        &self,
        adapter: &dyn GatewayAdapter,
        payload: &Value,
    ) -> Result<DepositRecord, GatewayError> {
        if !adapter.signature_valid(payload) {
            warn!(
                "Rejected {} webhook: authenticity check failed",
                adapter.provider()
            );
            return Err(GatewayError::InvalidSignature);
        }

        let event = adapter.validate(payload)?;
        if event.status != CanonicalStatus::Paid {
            return Err(GatewayError::UnrecognizedStatus {
                provider: event.provider,
                status: format!("{:?}", event.status),
            });
        }

        // Absence covers both unknown transactions and already-processed
        // ones; a redelivered webhook lands here and mutates nothing.
        let deposit = self
            .deposits
            .find_pending_by_external_id(event.provider, &event.external_transaction_id)
            .await
            .map_err(crate::domain::errors::SettlementError::Database)?
            .ok_or_else(|| {
                info!(
                    "No pending deposit for {} transaction {}; treating as no-op",
                    event.provider, event.external_transaction_id
                );
                GatewayError::NotFoundOrProcessed(event.external_transaction_id.clone())
            })?;

        adapter.confirm_with_provider(&event).await?;

        let expected = deposit.amount_cents as f64 / 100.0;
        if (event.reported_amount - expected).abs() >= self.amount_tolerance {
            warn!(
                "Amount mismatch on {} transaction {}: reported {} expected {}",
                event.provider, event.external_transaction_id, event.reported_amount, expected
            );
            return Err(GatewayError::AmountMismatch {
                reported: event.reported_amount,
                expected,
            });
        }

        let approved = self.settlement.approve_deposit(&deposit.id).await?;
        info!(
            "Reconciled {} transaction {}: deposit {} approved",
            event.provider, event.external_transaction_id, approved.id
        );
        Ok(approved)
    }
}

/// Pulls a required string field out of a webhook payload.
pub(crate) fn require_str<'a>(
    payload: &'a Value,
    field: &'static str,
) -> Result<&'a str, GatewayError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or(GatewayError::MissingField(field))
}

/// Pulls a required amount out of a webhook payload; accepts both a JSON
/// number and a numeric string, which providers alternate between.
pub(crate) fn require_amount(payload: &Value, field: &'static str) -> Result<f64, GatewayError> {
    let value = payload.get(field).ok_or(GatewayError::MissingField(field))?;
    match value {
        Value::Number(n) => n.as_f64().ok_or(GatewayError::MissingField(field)),
        Value::String(s) => s
            .parse::<f64>()
            .map_err(|_| GatewayError::MissingField(field)),
        _ => Err(GatewayError::MissingField(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::notifier::Notifier;
    use crate::config::PlatformConfig;
    use crate::persistence::init_database;
    use crate::persistence::models::CreateDeposit;
    use crate::persistence::repository::AccountRepository;
    use serde_json::json;

    struct StaticAdapter {
        event: SettlementEvent,
        signature_ok: bool,
        confirm: Result<(), GatewayError>,
    }

    #[async_trait]
    impl GatewayAdapter for StaticAdapter {
        fn provider(&self) -> &'static str {
            "static"
        }

        fn signature_valid(&self, _payload: &Value) -> bool {
            self.signature_ok
        }

        fn validate(&self, _payload: &Value) -> Result<SettlementEvent, GatewayError> {
            Ok(self.event.clone())
        }

        async fn confirm_with_provider(
            &self,
            _event: &SettlementEvent,
        ) -> Result<(), GatewayError> {
            match &self.confirm {
                Ok(()) => Ok(()),
                Err(GatewayError::ProviderDisagreement(id)) => {
                    Err(GatewayError::ProviderDisagreement(id.clone()))
                }
                Err(_) => Err(GatewayError::ProviderUnreachable("mock".to_string())),
            }
        }
    }

    fn paid_event(amount: f64) -> SettlementEvent {
        SettlementEvent {
            provider: "static",
            external_transaction_id: "ext-1".to_string(),
            status: CanonicalStatus::Paid,
            reported_amount: amount,
        }
    }

    async fn reconciler(pool: &DbPool) -> GatewayReconciler {
        let settlement = Arc::new(SettlementService::new(
            pool.clone(),
            PlatformConfig::default(),
            Notifier::disabled(),
        ));
        GatewayReconciler::new(pool.clone(), settlement, 0.01)
    }

    async fn seed(pool: &DbPool, cents: i64) {
        AccountRepository::new(pool.clone())
            .create("acc-1", None)
            .await
            .unwrap();
        DepositRepository::new(pool.clone())
            .create(CreateDeposit {
                id: "dep-1".to_string(),
                account_id: "acc-1".to_string(),
                amount_cents: cents,
                provider: "static".to_string(),
                external_transaction_id: "ext-1".to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconcile_approves_once() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        seed(&pool, 10_000).await;
        let reconciler = reconciler(&pool).await;
        let adapter = StaticAdapter {
            event: paid_event(100.0),
            signature_ok: true,
            confirm: Ok(()),
        };

        let deposit = reconciler.reconcile(&adapter, &json!({})).await.unwrap();
        assert_eq!(deposit.status, "approved");

        // Redelivery finds no pending row and is a discard, not a credit.
        let again = reconciler.reconcile(&adapter, &json!({})).await;
        assert!(matches!(again, Err(GatewayError::NotFoundOrProcessed(_))));
    }

    #[tokio::test]
    async fn test_reconcile_rejects_bad_signature() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        seed(&pool, 10_000).await;
        let reconciler = reconciler(&pool).await;
        let adapter = StaticAdapter {
            event: paid_event(100.0),
            signature_ok: false,
            confirm: Ok(()),
        };

        let result = reconciler.reconcile(&adapter, &json!({})).await;
        assert!(matches!(result, Err(GatewayError::InvalidSignature)));
    }

    #[tokio::test]
    async fn test_reconcile_rejects_non_paid_status() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        seed(&pool, 10_000).await;
        let reconciler = reconciler(&pool).await;
        let adapter = StaticAdapter {
            event: SettlementEvent {
                status: CanonicalStatus::Pending,
                ..paid_event(100.0)
            },
            signature_ok: true,
            confirm: Ok(()),
        };

        let result = reconciler.reconcile(&adapter, &json!({})).await;
        assert!(matches!(
            result,
            Err(GatewayError::UnrecognizedStatus { .. })
        ));
    }

    #[tokio::test]
    async fn test_amount_tolerance_boundary() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        seed(&pool, 10_000).await;
        let reconciler = reconciler(&pool).await;

        // Off by a full cent: rejected, deposit untouched.
        let adapter = StaticAdapter {
            event: paid_event(100.01),
            signature_ok: true,
            confirm: Ok(()),
        };
        let result = reconciler.reconcile(&adapter, &json!({})).await;
        assert!(matches!(result, Err(GatewayError::AmountMismatch { .. })));

        // Off by 0.009: inside the tolerance, accepted.
        let adapter = StaticAdapter {
            event: paid_event(100.009),
            signature_ok: true,
            confirm: Ok(()),
        };
        let deposit = reconciler.reconcile(&adapter, &json!({})).await.unwrap();
        assert_eq!(deposit.status, "approved");
    }

    #[tokio::test]
    async fn test_provider_disagreement_blocks_approval() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        seed(&pool, 10_000).await;
        let reconciler = reconciler(&pool).await;
        let adapter = StaticAdapter {
            event: paid_event(100.0),
            signature_ok: true,
            confirm: Err(GatewayError::ProviderDisagreement("ext-1".to_string())),
        };

        let result = reconciler.reconcile(&adapter, &json!({})).await;
        assert!(matches!(
            result,
            Err(GatewayError::ProviderDisagreement(_))
        ));

        // Still pending; a later consistent delivery can settle it.
        let adapter = StaticAdapter {
            event: paid_event(100.0),
            signature_ok: true,
            confirm: Ok(()),
        };
        let deposit = reconciler.reconcile(&adapter, &json!({})).await.unwrap();
        assert_eq!(deposit.status, "approved");
    }

    #[test]
    fn test_require_amount_accepts_number_and_string() {
        assert_eq!(require_amount(&json!({"v": 10.5}), "v").unwrap(), 10.5);
        assert_eq!(require_amount(&json!({"v": "10.5"}), "v").unwrap(), 10.5);
        assert!(matches!(
            require_amount(&json!({"v": true}), "v"),
            Err(GatewayError::MissingField("v"))
        ));
        assert!(matches!(
            require_amount(&json!({}), "v"),
            Err(GatewayError::MissingField("v"))
        ));
    }
}
