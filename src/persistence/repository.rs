//! Database Repository
//!
//! Data access layer for accounts, deposits, withdrawals, trades, referral
//! configuration and accrual state. Balance mutations never happen here;
//! they go through `ledger_store`.

use super::models::*;
use super::{DatabaseError, DbPool};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error};

use crate::domain::entities::deposit::DepositStatus;
use crate::domain::entities::referral::valid_percentage;

/// Account repository
pub struct AccountRepository {
    pool: DbPool,
}

impl AccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a new account, optionally attached to a referrer.
    pub async fn create(
        &self,
        id: &str,
        referred_by: Option<&str>,
    ) -> Result<AccountRecord, DatabaseError> {
        let record = sqlx::query_as::<_, AccountRecord>(
            r#"
            INSERT INTO accounts (id, referred_by, balance_cents, frozen_cents,
                                  total_commission_cents, created_at)
            VALUES (?1, ?2, 0, 0, 0, ?3)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(referred_by)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create account: {}", e);
            DatabaseError::QueryError(format!("Failed to create account: {}", e))
        })?;

        debug!("Created account: {}", record.id);
        Ok(record)
    }

    /// Get account by ID
    pub async fn get(&self, id: &str) -> Result<Option<AccountRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, AccountRecord>("SELECT * FROM accounts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get account {}: {}", id, e);
                DatabaseError::QueryError(format!("Failed to get account: {}", e))
            })?;

        Ok(record)
    }
}

/// Deposit repository
pub struct DepositRepository {
    pool: DbPool,
}

impl DepositRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a pending deposit when a gateway session begins. The unique
    /// constraint on (provider, external_transaction_id) surfaces duplicate
    /// sessions here instead of at webhook time.
    pub async fn create(&self, deposit: CreateDeposit) -> Result<DepositRecord, DatabaseError> {
        let record = sqlx::query_as::<_, DepositRecord>(
            r#"
            INSERT INTO deposits (id, account_id, amount_cents, provider,
                                  external_transaction_id, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            RETURNING *
            "#,
        )
        .bind(&deposit.id)
        .bind(&deposit.account_id)
        .bind(deposit.amount_cents)
        .bind(&deposit.provider)
        .bind(&deposit.external_transaction_id)
        .bind(DepositStatus::Pending.as_str())
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create deposit: {}", e);
            DatabaseError::QueryError(format!("Failed to create deposit: {}", e))
        })?;

        debug!(
            "Created deposit: {} ({} cents via {})",
            record.id, record.amount_cents, record.provider
        );
        Ok(record)
    }

    /// Get deposit by ID
    pub async fn get(&self, id: &str) -> Result<Option<DepositRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, DepositRecord>("SELECT * FROM deposits WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get deposit {}: {}", id, e);
                DatabaseError::QueryError(format!("Failed to get deposit: {}", e))
            })?;

        Ok(record)
    }

    /// Look up a still-pending deposit by its idempotency key. An
    /// already-approved deposit is not found here, which is what makes
    /// duplicate webhook delivery a no-op.
    pub async fn find_pending_by_external_id(
        &self,
        provider: &str,
        external_transaction_id: &str,
    ) -> Result<Option<DepositRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, DepositRecord>(
            "SELECT * FROM deposits \
             WHERE provider = ?1 AND external_transaction_id = ?2 AND status = ?3",
        )
        .bind(provider)
        .bind(external_transaction_id)
        .bind(DepositStatus::Pending.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!(
                "Failed to look up deposit {}/{}: {}",
                provider, external_transaction_id, e
            );
            DatabaseError::QueryError(format!("Failed to look up deposit: {}", e))
        })?;

        Ok(record)
    }

}

/// Withdrawal repository
pub struct WithdrawalRepository {
    pool: DbPool,
}

impl WithdrawalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get withdrawal by ID
    pub async fn get(&self, id: &str) -> Result<Option<WithdrawalRecord>, DatabaseError> {
        let record =
            sqlx::query_as::<_, WithdrawalRecord>("SELECT * FROM withdrawals WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to get withdrawal {}: {}", id, e);
                    DatabaseError::QueryError(format!("Failed to get withdrawal: {}", e))
                })?;

        Ok(record)
    }
}

/// Trade repository
pub struct TradeRepository {
    pool: DbPool,
}

impl TradeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get trade by ID
    pub async fn get(&self, id: &str) -> Result<Option<TradeRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, TradeRecord>("SELECT * FROM trades WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get trade {}: {}", id, e);
                DatabaseError::QueryError(format!("Failed to get trade: {}", e))
            })?;

        Ok(record)
    }
}

/// Referral level configuration repository. Read-only to the cascade; writes
/// happen through admin tooling (out of scope) or seeding.
pub struct ReferralLevelRepository {
    pool: DbPool,
}

impl ReferralLevelRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Upsert the commission percentage for one level.
    pub async fn set(
        &self,
        level: i64,
        commission_type: &str,
        percentage: f64,
    ) -> Result<(), DatabaseError> {
        if !valid_percentage(percentage) {
            return Err(DatabaseError::QueryError(format!(
                "invalid commission percentage: {}",
                percentage
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO referral_levels (level, commission_type, percentage)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (level, commission_type) DO UPDATE SET percentage = ?3
            "#,
        )
        .bind(level)
        .bind(commission_type)
        .bind(percentage)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to set referral level {}: {}", level, e);
            DatabaseError::QueryError(format!("Failed to set referral level: {}", e))
        })?;

        Ok(())
    }

    /// Get the configured edge for one level and commission type.
    pub async fn get(
        &self,
        level: i64,
        commission_type: &str,
    ) -> Result<Option<ReferralLevelRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, ReferralLevelRecord>(
            "SELECT * FROM referral_levels WHERE level = ?1 AND commission_type = ?2",
        )
        .bind(level)
        .bind(commission_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get referral level {}: {}", level, e);
            DatabaseError::QueryError(format!("Failed to get referral level: {}", e))
        })?;

        Ok(record)
    }
}

/// Market price snapshot repository. Append-only.
pub struct MarketPriceRepository {
    pool: DbPool,
}

impl MarketPriceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record today's price. Re-running the job on the same day is a no-op.
    pub async fn record(
        &self,
        symbol: &str,
        date: NaiveDate,
        price_usd: f64,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT OR IGNORE INTO market_prices (symbol, date, price_usd, created_at) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(symbol)
        .bind(date)
        .bind(price_usd)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to record price for {}: {}", symbol, e);
            DatabaseError::QueryError(format!("Failed to record price: {}", e))
        })?;

        Ok(())
    }

    /// Most recent snapshot strictly before `date`.
    pub async fn latest_before(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Option<MarketPriceRecord>, DatabaseError> {
        let record = sqlx::query_as::<_, MarketPriceRecord>(
            "SELECT * FROM market_prices WHERE symbol = ?1 AND date < ?2 \
             ORDER BY date DESC LIMIT 1",
        )
        .bind(symbol)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to get prior price for {}: {}", symbol, e);
            DatabaseError::QueryError(format!("Failed to get prior price: {}", e))
        })?;

        Ok(record)
    }
}

/// Investment package and investment repository
pub struct InvestmentRepository {
    pool: DbPool,
}

impl InvestmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create_package(
        &self,
        id: &str,
        name: &str,
        symbol: &str,
        min_return_rate: f64,
        max_return_rate: f64,
    ) -> Result<InvestmentPackageRecord, DatabaseError> {
        let record = sqlx::query_as::<_, InvestmentPackageRecord>(
            r#"
            INSERT INTO investment_packages (id, name, symbol, min_return_rate, max_return_rate)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(symbol)
        .bind(min_return_rate)
        .bind(max_return_rate)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create package {}: {}", id, e);
            DatabaseError::QueryError(format!("Failed to create package: {}", e))
        })?;

        Ok(record)
    }

    pub async fn list_packages(&self) -> Result<Vec<InvestmentPackageRecord>, DatabaseError> {
        let records =
            sqlx::query_as::<_, InvestmentPackageRecord>("SELECT * FROM investment_packages")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to list packages: {}", e);
                    DatabaseError::QueryError(format!("Failed to list packages: {}", e))
                })?;

        Ok(records)
    }

    pub async fn create_investment(
        &self,
        investment: CreateInvestment,
    ) -> Result<InvestmentRecord, DatabaseError> {
        let record = sqlx::query_as::<_, InvestmentRecord>(
            r#"
            INSERT INTO investments (id, account_id, package_id, amount_cents,
                                     accrued_cents, status, ends_at, created_at)
            VALUES (?1, ?2, ?3, ?4, 0, 'active', ?5, ?6)
            RETURNING *
            "#,
        )
        .bind(&investment.id)
        .bind(&investment.account_id)
        .bind(&investment.package_id)
        .bind(investment.amount_cents)
        .bind(investment.ends_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to create investment: {}", e);
            DatabaseError::QueryError(format!("Failed to create investment: {}", e))
        })?;

        debug!("Created investment: {}", record.id);
        Ok(record)
    }

    pub async fn get_investment(
        &self,
        id: &str,
    ) -> Result<Option<InvestmentRecord>, DatabaseError> {
        let record =
            sqlx::query_as::<_, InvestmentRecord>("SELECT * FROM investments WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to get investment {}: {}", id, e);
                    DatabaseError::QueryError(format!("Failed to get investment: {}", e))
                })?;

        Ok(record)
    }

    /// Apply one day's return rate to every active, unexpired investment in
    /// a package. The accrued counter is informational only; it never
    /// touches `accounts.balance_cents`. Returns how many investments
    /// accrued.
    pub async fn apply_accrual(
        &self,
        package_id: &str,
        rate: f64,
        now: DateTime<Utc>,
    ) -> Result<u64, DatabaseError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE investments
            SET accrued_cents = accrued_cents
                + CAST(ROUND(amount_cents * ?1 / 100.0) AS INTEGER)
            WHERE package_id = ?2 AND status = 'active' AND ends_at >= ?3
            "#,
        )
        .bind(rate)
        .bind(package_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to apply accrual for package {}: {}", package_id, e);
            DatabaseError::QueryError(format!("Failed to apply accrual: {}", e))
        })?
        .rows_affected();

        Ok(rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;
    use chrono::Duration;

    #[tokio::test]
    async fn test_account_create_and_get() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = AccountRepository::new(pool);

        let referrer = repo.create("acc-a", None).await.unwrap();
        let referred = repo.create("acc-b", Some("acc-a")).await.unwrap();

        assert_eq!(referrer.balance_cents, 0);
        assert_eq!(referred.referred_by.as_deref(), Some("acc-a"));
        assert!(repo.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deposit_pending_lookup_excludes_processed() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        AccountRepository::new(pool.clone())
            .create("acc-1", None)
            .await
            .unwrap();

        let repo = DepositRepository::new(pool.clone());
        let deposit = repo
            .create(CreateDeposit {
                id: "dep-1".to_string(),
                account_id: "acc-1".to_string(),
                amount_cents: 10_000,
                provider: "pixway".to_string(),
                external_transaction_id: "tx-1".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(deposit.status, "pending");

        let found = repo
            .find_pending_by_external_id("pixway", "tx-1")
            .await
            .unwrap();
        assert!(found.is_some());

        sqlx::query("UPDATE deposits SET status = 'approved' WHERE id = 'dep-1'")
            .execute(&pool)
            .await
            .unwrap();

        let gone = repo
            .find_pending_by_external_id("pixway", "tx-1")
            .await
            .unwrap();
        assert!(gone.is_none());
    }

    #[tokio::test]
    async fn test_referral_level_set_and_get() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = ReferralLevelRepository::new(pool);

        repo.set(1, "deposit", 5.0).await.unwrap();
        repo.set(1, "deposit", 6.0).await.unwrap();

        let edge = repo.get(1, "deposit").await.unwrap().unwrap();
        assert_eq!(edge.percentage, 6.0);
        assert!(repo.get(2, "deposit").await.unwrap().is_none());

        assert!(repo.set(1, "deposit", 150.0).await.is_err());
    }

    #[tokio::test]
    async fn test_market_price_snapshot_and_lookup() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let repo = MarketPriceRepository::new(pool);

        let yesterday = NaiveDate::from_ymd_opt(2026, 8, 29).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();

        repo.record("BTC", yesterday, 100.0).await.unwrap();
        repo.record("BTC", today, 105.0).await.unwrap();
        // Same-day re-record is ignored, not an error.
        repo.record("BTC", today, 999.0).await.unwrap();

        let prior = repo.latest_before("BTC", today).await.unwrap().unwrap();
        assert_eq!(prior.price_usd, 100.0);

        assert!(repo
            .latest_before("BTC", yesterday)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_accrual_skips_expired_and_closed() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        AccountRepository::new(pool.clone())
            .create("acc-1", None)
            .await
            .unwrap();

        let repo = InvestmentRepository::new(pool.clone());
        repo.create_package("pkg-1", "BTC Growth", "BTC", 0.0, 3.0)
            .await
            .unwrap();

        let now = Utc::now();
        repo.create_investment(CreateInvestment {
            id: "inv-live".to_string(),
            account_id: "acc-1".to_string(),
            package_id: "pkg-1".to_string(),
            amount_cents: 50_000,
            ends_at: now + Duration::days(30),
        })
        .await
        .unwrap();
        repo.create_investment(CreateInvestment {
            id: "inv-expired".to_string(),
            account_id: "acc-1".to_string(),
            package_id: "pkg-1".to_string(),
            amount_cents: 50_000,
            ends_at: now - Duration::days(1),
        })
        .await
        .unwrap();

        let touched = repo.apply_accrual("pkg-1", 3.0, now).await.unwrap();
        assert_eq!(touched, 1);

        let live = repo.get_investment("inv-live").await.unwrap().unwrap();
        assert_eq!(live.accrued_cents, 1_500);

        let expired = repo.get_investment("inv-expired").await.unwrap().unwrap();
        assert_eq!(expired.accrued_cents, 0);
    }
}
