//! Bravopay webhook adapter.
//!
//! Bravopay carries no cryptographic signature; its authenticity signal is
//! the status literal itself, which must belong to the provider's known
//! vocabulary. When a requery URL is configured, the provider's own
//! transaction endpoint is consulted as a second source of truth and both
//! sources must agree before the deposit is approved.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use super::{require_amount, require_str, CanonicalStatus, GatewayAdapter, SettlementEvent};
use crate::domain::errors::GatewayError;

pub const PROVIDER: &str = "bravopay";

/// Bravopay's status vocabulary. The provider mixes English and Portuguese
/// literals for the same outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BravopayStatus {
    Completed,
    Aprovado,
    PagamentoAprovado,
    Pendente,
    Cancelado,
    Failed,
}

impl BravopayStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COMPLETED" => Some(BravopayStatus::Completed),
            "APROVADO" => Some(BravopayStatus::Aprovado),
            "PAGAMENTO_APROVADO" => Some(BravopayStatus::PagamentoAprovado),
            "PENDENTE" => Some(BravopayStatus::Pendente),
            "CANCELADO" => Some(BravopayStatus::Cancelado),
            "FAILED" => Some(BravopayStatus::Failed),
            _ => None,
        }
    }

    pub fn canonical(&self) -> CanonicalStatus {
        match self {
            BravopayStatus::Completed
            | BravopayStatus::Aprovado
            | BravopayStatus::PagamentoAprovado => CanonicalStatus::Paid,
            BravopayStatus::Pendente => CanonicalStatus::Pending,
            BravopayStatus::Cancelado | BravopayStatus::Failed => CanonicalStatus::Failed,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RequeryResponse {
    status: String,
}

pub struct BravopayAdapter {
    client: reqwest::Client,
    requery_url: Option<String>,
}

impl BravopayAdapter {
    pub fn new(requery_url: Option<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::ProviderUnreachable(e.to_string()))?;

        Ok(Self {
            client,
            requery_url: requery_url.map(|url| url.trim_end_matches('/').to_string()),
        })
    }
}

#[async_trait]
impl GatewayAdapter for BravopayAdapter {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    /// Authenticity here is the literal-status match: a payload whose
    /// status is outside the known vocabulary is treated as inauthentic.
    fn signature_valid(&self, payload: &Value) -> bool {
        payload
            .get("status")
            .and_then(Value::as_str)
            .and_then(BravopayStatus::parse)
            .is_some()
    }

    fn validate(&self, payload: &Value) -> Result<SettlementEvent, GatewayError> {
        let external_id = require_str(payload, "external_id")?;
        let status_literal = require_str(payload, "status")?;
        let amount = require_amount(payload, "amount")?;

        let status = BravopayStatus::parse(status_literal).ok_or_else(|| {
            GatewayError::UnrecognizedStatus {
                provider: PROVIDER,
                status: status_literal.to_string(),
            }
        })?;

        Ok(SettlementEvent {
            provider: PROVIDER,
            external_transaction_id: external_id.to_string(),
            status: status.canonical(),
            reported_amount: amount,
        })
    }

    async fn confirm_with_provider(&self, event: &SettlementEvent) -> Result<(), GatewayError> {
        let Some(base) = &self.requery_url else {
            return Ok(());
        };

        let url = format!("{}/{}", base, event.external_transaction_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::ProviderUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::ProviderUnreachable(format!(
                "requery returned {}",
                response.status()
            )));
        }

        let body: RequeryResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::ProviderUnreachable(e.to_string()))?;

        let agrees = BravopayStatus::parse(&body.status)
            .map(|status| status.canonical() == CanonicalStatus::Paid)
            .unwrap_or(false);

        if !agrees {
            warn!(
                "Bravopay requery for {} reports '{}', webhook said paid",
                event.external_transaction_id, body.status
            );
            return Err(GatewayError::ProviderDisagreement(
                event.external_transaction_id.clone(),
            ));
        }

        Ok(())
    }
}
