//! External payout gateway client.
//!
//! Withdrawals leave the platform through this seam. The settlement core
//! only cares that `submit_payout` either definitely succeeded or failed;
//! retry policy belongs to the operator, not the core.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

use crate::domain::errors::SettlementError;
use crate::persistence::models::WithdrawalRecord;

#[async_trait]
pub trait PayoutGateway: Send + Sync {
    /// Submit an approved withdrawal for external payout. An `Err` means
    /// the funds did not leave; the withdrawal stays in `processing`.
    async fn submit_payout(&self, withdrawal: &WithdrawalRecord) -> Result<(), SettlementError>;
}

/// HTTP payout gateway with a bounded request timeout. A timed-out call is
/// a failure; the core never assumes the payout happened.
pub struct HttpPayoutGateway {
    client: Client,
    base_url: String,
}

impl HttpPayoutGateway {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SettlementError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SettlementError::PayoutFailed(format!("client build failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PayoutGateway for HttpPayoutGateway {
    async fn submit_payout(&self, withdrawal: &WithdrawalRecord) -> Result<(), SettlementError> {
        let url = format!("{}/payouts", self.base_url);
        let body = json!({
            "reference": withdrawal.id,
            "amount": withdrawal.amount_cents as f64 / 100.0,
            "pix_key": withdrawal.pix_key,
            "pix_key_type": withdrawal.pix_key_type,
            "beneficiary_name": withdrawal.beneficiary_name,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Payout submission for {} failed: {}", withdrawal.id, e);
                SettlementError::PayoutFailed(e.to_string())
            })?;

        if !response.status().is_success() {
            warn!(
                "Payout gateway returned {} for withdrawal {}",
                response.status(),
                withdrawal.id
            );
            return Err(SettlementError::PayoutFailed(format!(
                "gateway returned {}",
                response.status()
            )));
        }

        info!(
            "Payout submitted for withdrawal {} ({} cents)",
            withdrawal.id, withdrawal.amount_cents
        );
        Ok(())
    }
}
