//! Market Return Accrual Job
//!
//! Once a day, snapshot each package's market price, derive the
//! day-over-day percent change, clamp it into the package's return band and
//! apply the result to every active investment in that package. A package
//! whose price fetch fails is skipped for the day; the other packages still
//! accrue. Runs never overlap: a tick that arrives while the previous run
//! is still going is dropped.

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::services::returns::{clamp_return_rate, percent_change};
use crate::infrastructure::price_feed::PriceFeed;
use crate::persistence::repository::{InvestmentRepository, MarketPriceRepository};
use crate::persistence::{DatabaseError, DbPool};

/// What one run did, per package that accrued.
#[derive(Debug, Clone)]
pub struct PackageAccrual {
    pub package_id: String,
    pub applied_rate: f64,
    pub investments_updated: u64,
}

#[derive(Debug, Clone, Default)]
pub struct AccrualSummary {
    pub accrued: Vec<PackageAccrual>,
    pub skipped: Vec<String>,
}

pub struct AccrualJob {
    prices: MarketPriceRepository,
    investments: InvestmentRepository,
    feed: Arc<dyn PriceFeed>,
    running: Mutex<()>,
}

impl AccrualJob {
    pub fn new(pool: DbPool, feed: Arc<dyn PriceFeed>) -> Self {
        Self {
            prices: MarketPriceRepository::new(pool.clone()),
            investments: InvestmentRepository::new(pool),
            feed,
            running: Mutex::new(()),
        }
    }

    /// One accrual pass for `today`. Returns `None` when a previous pass is
    /// still in flight.
    pub async fn run_once(
        &self,
        today: NaiveDate,
    ) -> Result<Option<AccrualSummary>, DatabaseError> {
        let _guard = match self.running.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Accrual run for {} skipped: previous run still active", today);
                return Ok(None);
            }
        };

        let mut summary = AccrualSummary::default();

        for package in self.investments.list_packages().await? {
            let price = match self.feed.spot_price(&package.symbol).await {
                Ok(price) => price,
                Err(e) => {
                    warn!(
                        "Skipping package {} ({}): price fetch failed: {}",
                        package.id, package.symbol, e
                    );
                    summary.skipped.push(package.id);
                    continue;
                }
            };

            // Snapshot before reading yesterday so the first run still
            // leaves a baseline for tomorrow.
            self.prices.record(&package.symbol, today, price).await?;

            let yesterday = self
                .prices
                .latest_before(&package.symbol, today)
                .await?
                .map(|record| record.price_usd)
                .unwrap_or(price);

            let change = percent_change(price, yesterday);
            let rate = clamp_return_rate(
                change,
                package.min_return_rate,
                package.max_return_rate,
            );

            let updated = self
                .investments
                .apply_accrual(&package.id, rate, Utc::now())
                .await?;

            info!(
                "Package {} accrued at {:.4}% (raw change {:.4}%), {} investments updated",
                package.id, rate, change, updated
            );
            summary.accrued.push(PackageAccrual {
                package_id: package.id,
                applied_rate: rate,
                investments_updated: updated,
            });
        }

        Ok(Some(summary))
    }
}
