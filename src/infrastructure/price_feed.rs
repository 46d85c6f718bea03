//! Market Price Feed
//!
//! Source of daily price snapshots for the accrual job. The HTTP
//! implementation queries a spot-price endpoint per symbol; the job treats
//! any feed failure as "skip this package today" rather than an abort.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum PriceFeedError {
    #[error("Price feed request failed: {0}")]
    Request(String),
    #[error("Price feed returned malformed data: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait PriceFeed: Send + Sync {
    /// Current price in USD for a symbol (e.g. "BTC").
    async fn spot_price(&self, symbol: &str) -> Result<f64, PriceFeedError>;
}

#[derive(Debug, Deserialize)]
struct SpotPriceResponse {
    price: f64,
}

pub struct HttpPriceFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceFeed {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, PriceFeedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PriceFeedError::Request(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn spot_price(&self, symbol: &str) -> Result<f64, PriceFeedError> {
        let url = format!("{}/prices/{}", self.base_url, symbol);
        let response = self.client.get(&url).send().await.map_err(|e| {
            error!("Price request for {} failed: {}", symbol, e);
            PriceFeedError::Request(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(PriceFeedError::Request(format!(
                "Price endpoint returned {} for {}",
                response.status(),
                symbol
            )));
        }

        let body: SpotPriceResponse = response
            .json()
            .await
            .map_err(|e| PriceFeedError::Malformed(e.to_string()))?;

        if !body.price.is_finite() || body.price <= 0.0 {
            return Err(PriceFeedError::Malformed(format!(
                "Non-positive price {} for {}",
                body.price, symbol
            )));
        }

        Ok(body.price)
    }
}
