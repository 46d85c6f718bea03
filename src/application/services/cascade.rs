//! Commission Cascade Engine
//!
//! Walks the referred-by chain upward from a depositing account, crediting
//! each configured ancestor level once. One shared engine serves every
//! gateway adapter; adapters never pay commissions themselves.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::domain::entities::ledger::{EntryReason, ReferenceType};
use crate::domain::entities::referral::commission_cents;
use crate::domain::errors::SettlementError;
use crate::domain::value_objects::amount::Amount;
use crate::persistence::ledger_store::{self, NewLedgerEntry};
use crate::persistence::models::DepositRecord;
use crate::persistence::DbPool;

/// One commission actually paid during a cascade run.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionPayment {
    pub account_id: String,
    pub level: i64,
    pub amount_cents: i64,
}

/// Commission cascade engine. Stateless between invocations; the visited
/// set lives for exactly one `distribute` call.
pub struct CommissionCascade {
    pool: DbPool,
    max_levels: i64,
    commission_type: &'static str,
}

impl CommissionCascade {
    pub fn new(pool: DbPool, max_levels: i64) -> Self {
        Self {
            pool,
            max_levels,
            commission_type: "deposit",
        }
    }

    /// Distribute commissions for an approved deposit.
    ///
    /// Each level is paid inside its own transaction: a failure at level
    /// L+2 leaves the commissions already committed at L and L+1 in place
    /// (eventually-consistent per level, never all-or-nothing). The walk
    /// stops at the first unconfigured level, the first missing ancestor,
    /// a referral cycle, or `max_levels`, whichever comes first.
    pub async fn distribute(
        &self,
        deposit: &DepositRecord,
    ) -> Result<Vec<CommissionPayment>, SettlementError> {
        let mut payments = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(deposit.account_id.clone());

        let mut current = self.referrer_of(&deposit.account_id).await?;

        for level in 1..=self.max_levels {
            let ancestor_id = match current {
                Some(id) => id,
                None => break,
            };

            let edge = self.edge_for(level).await?;
            let percentage = match edge {
                Some(p) => p,
                None => {
                    debug!(
                        "No commission configured for level {}, stopping cascade for deposit {}",
                        level, deposit.id
                    );
                    break;
                }
            };

            if !visited.insert(ancestor_id.clone()) {
                warn!(
                    "Referral cycle detected at account {} while distributing deposit {}, stopping cascade",
                    ancestor_id, deposit.id
                );
                break;
            }

            let cents = commission_cents(deposit.amount_cents, percentage);
            if let Ok(amount) = Amount::new(cents) {
                self.pay(&ancestor_id, amount, level, &deposit.id).await?;
                info!(
                    "Commission level {}: {} cents to account {} for deposit {}",
                    level, cents, ancestor_id, deposit.id
                );
                payments.push(CommissionPayment {
                    account_id: ancestor_id.clone(),
                    level,
                    amount_cents: cents,
                });
            } else {
                // A 0% edge rounds to nothing; the walk continues upward.
                debug!(
                    "Commission at level {} rounds to zero for deposit {}, nothing to pay",
                    level, deposit.id
                );
            }

            current = self.referrer_of(&ancestor_id).await?;
        }

        Ok(payments)
    }

    /// Pay one ancestor in its own transaction: ledger credit plus the
    /// commission counter, atomically.
    async fn pay(
        &self,
        account_id: &str,
        amount: Amount,
        level: i64,
        deposit_id: &str,
    ) -> Result<(), SettlementError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        ledger_store::credit(
            &mut tx,
            account_id,
            amount,
            NewLedgerEntry::completed(
                EntryReason::Commission,
                Some((ReferenceType::Deposit, deposit_id.to_string())),
            )
            .with_level(level),
        )
        .await?;

        sqlx::query(
            "UPDATE accounts SET total_commission_cents = total_commission_cents + ?1 WHERE id = ?2",
        )
        .bind(amount.cents())
        .bind(account_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        Ok(())
    }

    async fn referrer_of(&self, account_id: &str) -> Result<Option<String>, SettlementError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT referred_by FROM accounts WHERE id = ?1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        Ok(row.and_then(|(referred_by,)| referred_by))
    }

    async fn edge_for(&self, level: i64) -> Result<Option<f64>, SettlementError> {
        let row: Option<(f64,)> = sqlx::query_as(
            "SELECT percentage FROM referral_levels WHERE level = ?1 AND commission_type = ?2",
        )
        .bind(level)
        .bind(self.commission_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        Ok(row.map(|(p,)| p))
    }
}

fn map_sqlx(e: sqlx::Error) -> SettlementError {
    SettlementError::Database(crate::persistence::DatabaseError::QueryError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;
    use crate::persistence::models::CreateDeposit;
    use crate::persistence::repository::{
        AccountRepository, DepositRepository, ReferralLevelRepository,
    };

    async fn seed_chain(pool: &DbPool, chain: &[(&str, Option<&str>)]) {
        let accounts = AccountRepository::new(pool.clone());
        for (id, referrer) in chain {
            accounts.create(id, *referrer).await.unwrap();
        }
    }

    async fn seed_deposit(pool: &DbPool, account_id: &str, amount_cents: i64) -> DepositRecord {
        DepositRepository::new(pool.clone())
            .create(CreateDeposit {
                id: format!("dep-{}", account_id),
                account_id: account_id.to_string(),
                amount_cents,
                provider: "pixway".to_string(),
                external_transaction_id: format!("tx-{}", account_id),
            })
            .await
            .unwrap()
    }

    async fn balance(pool: &DbPool, account_id: &str) -> i64 {
        AccountRepository::new(pool.clone())
            .get(account_id)
            .await
            .unwrap()
            .unwrap()
            .balance_cents
    }

    #[tokio::test]
    async fn test_two_level_commission_conservation() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        seed_chain(
            &pool,
            &[("b", None), ("a", Some("b")), ("depositor", Some("a"))],
        )
        .await;

        let levels = ReferralLevelRepository::new(pool.clone());
        levels.set(1, "deposit", 5.0).await.unwrap();
        levels.set(2, "deposit", 3.0).await.unwrap();

        let deposit = seed_deposit(&pool, "depositor", 10_000).await;
        let cascade = CommissionCascade::new(pool.clone(), 5);
        let payments = cascade.distribute(&deposit).await.unwrap();

        assert_eq!(
            payments,
            vec![
                CommissionPayment {
                    account_id: "a".to_string(),
                    level: 1,
                    amount_cents: 500,
                },
                CommissionPayment {
                    account_id: "b".to_string(),
                    level: 2,
                    amount_cents: 300,
                },
            ]
        );
        assert_eq!(balance(&pool, "a").await, 500);
        assert_eq!(balance(&pool, "b").await, 300);

        let a = AccountRepository::new(pool.clone())
            .get("a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(a.total_commission_cents, 500);
    }

    #[tokio::test]
    async fn test_unconfigured_level_stops_walk_entirely() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        seed_chain(
            &pool,
            &[
                ("c", None),
                ("b", Some("c")),
                ("a", Some("b")),
                ("depositor", Some("a")),
            ],
        )
        .await;

        // Level 2 missing, level 3 configured: the walk must stop at 2,
        // never skipping ahead to 3.
        let levels = ReferralLevelRepository::new(pool.clone());
        levels.set(1, "deposit", 5.0).await.unwrap();
        levels.set(3, "deposit", 1.0).await.unwrap();

        let deposit = seed_deposit(&pool, "depositor", 10_000).await;
        let payments = CommissionCascade::new(pool.clone(), 5)
            .distribute(&deposit)
            .await
            .unwrap();

        assert_eq!(payments.len(), 1);
        assert_eq!(balance(&pool, "b").await, 0);
        assert_eq!(balance(&pool, "c").await, 0);
    }

    #[tokio::test]
    async fn test_cycle_credits_no_account_twice() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        // a -> b -> a cycle above the depositor.
        seed_chain(&pool, &[("a", None), ("b", Some("a")), ("depositor", Some("b"))]).await;
        sqlx::query("UPDATE accounts SET referred_by = 'b' WHERE id = 'a'")
            .execute(&pool)
            .await
            .unwrap();

        let levels = ReferralLevelRepository::new(pool.clone());
        for level in 1..=5 {
            levels.set(level, "deposit", 5.0).await.unwrap();
        }

        let deposit = seed_deposit(&pool, "depositor", 10_000).await;
        let payments = CommissionCascade::new(pool.clone(), 5)
            .distribute(&deposit)
            .await
            .unwrap();

        // b at level 1, a at level 2, then the walk hits b again and stops.
        assert_eq!(payments.len(), 2);
        assert_eq!(balance(&pool, "b").await, 500);
        assert_eq!(balance(&pool, "a").await, 500);
    }

    #[tokio::test]
    async fn test_max_levels_bounds_walk() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        seed_chain(
            &pool,
            &[
                ("l3", None),
                ("l2", Some("l3")),
                ("l1", Some("l2")),
                ("depositor", Some("l1")),
            ],
        )
        .await;

        let levels = ReferralLevelRepository::new(pool.clone());
        for level in 1..=5 {
            levels.set(level, "deposit", 2.0).await.unwrap();
        }

        let deposit = seed_deposit(&pool, "depositor", 10_000).await;
        let payments = CommissionCascade::new(pool.clone(), 2)
            .distribute(&deposit)
            .await
            .unwrap();

        assert_eq!(payments.len(), 2);
        assert_eq!(balance(&pool, "l3").await, 0);
    }

    #[tokio::test]
    async fn test_no_referrer_ends_walk_without_error() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        seed_chain(&pool, &[("depositor", None)]).await;
        ReferralLevelRepository::new(pool.clone())
            .set(1, "deposit", 5.0)
            .await
            .unwrap();

        let deposit = seed_deposit(&pool, "depositor", 10_000).await;
        let payments = CommissionCascade::new(pool.clone(), 5)
            .distribute(&deposit)
            .await
            .unwrap();

        assert!(payments.is_empty());
    }

    #[tokio::test]
    async fn test_commission_ledger_entries_carry_level() {
        let pool = init_database("sqlite::memory:").await.unwrap();
        seed_chain(&pool, &[("a", None), ("depositor", Some("a"))]).await;
        ReferralLevelRepository::new(pool.clone())
            .set(1, "deposit", 5.0)
            .await
            .unwrap();

        let deposit = seed_deposit(&pool, "depositor", 10_000).await;
        CommissionCascade::new(pool.clone(), 5)
            .distribute(&deposit)
            .await
            .unwrap();

        let (reason, level, reference_id): (String, i64, String) = sqlx::query_as(
            "SELECT reason, level, reference_id FROM ledger_entries WHERE account_id = 'a'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(reason, "commission");
        assert_eq!(level, 1);
        assert_eq!(reference_id, deposit.id);
    }
}
