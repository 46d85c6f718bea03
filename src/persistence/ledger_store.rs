//! Ledger Store
//!
//! The only two ways a balance changes: [`credit`] and [`debit`]. Both run
//! against a caller-scoped transaction, mutate the balance with a single
//! guarded UPDATE and append the matching ledger entry in the same
//! transaction, so the balance change and its audit record commit or roll
//! back together. SQLite's single-writer transaction model serializes
//! concurrent mutators on the same account; the guarded UPDATE makes the
//! read-modify-write atomic even across processes.

use chrono::Utc;
use sqlx::SqliteConnection;
use tracing::{debug, error};

use crate::domain::entities::ledger::{EntryReason, EntryStatus, ReferenceType};
use crate::domain::errors::SettlementError;
use crate::domain::value_objects::amount::Amount;
use crate::persistence::DatabaseError;

/// Whether a debit may push the balance negative. Authorized only for
/// trade-open pending debits, which are reserved ahead of settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overdraft {
    Deny,
    Allow,
}

/// Metadata for the ledger entry appended alongside a balance mutation.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub reason: EntryReason,
    pub status: EntryStatus,
    pub reference: Option<(ReferenceType, String)>,
    pub level: Option<i64>,
}

impl NewLedgerEntry {
    pub fn completed(reason: EntryReason, reference: Option<(ReferenceType, String)>) -> Self {
        Self {
            reason,
            status: EntryStatus::Completed,
            reference,
            level: None,
        }
    }

    pub fn pending(reason: EntryReason, reference: Option<(ReferenceType, String)>) -> Self {
        Self {
            reason,
            status: EntryStatus::Pending,
            reference,
            level: None,
        }
    }

    pub fn with_level(mut self, level: i64) -> Self {
        self.level = Some(level);
        self
    }
}

fn query_err(context: &str, e: sqlx::Error) -> SettlementError {
    error!("{}: {}", context, e);
    SettlementError::Database(DatabaseError::QueryError(format!("{}: {}", context, e)))
}

/// Credit `amount` to the account and append the ledger entry. Returns the
/// new entry's id.
pub async fn credit(
    conn: &mut SqliteConnection,
    account_id: &str,
    amount: Amount,
    entry: NewLedgerEntry,
) -> Result<i64, SettlementError> {
    let rows_affected = sqlx::query(
        "UPDATE accounts SET balance_cents = balance_cents + ?1 WHERE id = ?2",
    )
    .bind(amount.cents())
    .bind(account_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| query_err("Failed to credit account", e))?
    .rows_affected();

    if rows_affected == 0 {
        return Err(SettlementError::NotFound {
            entity: "account",
            id: account_id.to_string(),
        });
    }

    let entry_id = append_entry(conn, account_id, 0, amount.cents(), entry).await?;

    debug!(
        "Credited {} cents to account {} (entry {})",
        amount.cents(),
        account_id,
        entry_id
    );
    Ok(entry_id)
}

/// Debit `amount` from the account and append the ledger entry. Without
/// `Overdraft::Allow` the update refuses to push the balance negative and
/// fails with `InsufficientFunds`.
pub async fn debit(
    conn: &mut SqliteConnection,
    account_id: &str,
    amount: Amount,
    entry: NewLedgerEntry,
    overdraft: Overdraft,
) -> Result<i64, SettlementError> {
    let rows_affected = match overdraft {
        Overdraft::Deny => sqlx::query(
            "UPDATE accounts SET balance_cents = balance_cents - ?1 \
             WHERE id = ?2 AND balance_cents >= ?1",
        ),
        Overdraft::Allow => {
            sqlx::query("UPDATE accounts SET balance_cents = balance_cents - ?1 WHERE id = ?2")
        }
    }
    .bind(amount.cents())
    .bind(account_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| query_err("Failed to debit account", e))?
    .rows_affected();

    if rows_affected == 0 {
        // Distinguish a missing account from a refused overdraft.
        let balance: Option<(i64,)> =
            sqlx::query_as("SELECT balance_cents FROM accounts WHERE id = ?1")
                .bind(account_id)
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| query_err("Failed to read account balance", e))?;

        return match balance {
            Some((available_cents,)) => Err(SettlementError::InsufficientFunds {
                required_cents: amount.cents(),
                available_cents,
            }),
            None => Err(SettlementError::NotFound {
                entity: "account",
                id: account_id.to_string(),
            }),
        };
    }

    let entry_id = append_entry(conn, account_id, amount.cents(), 0, entry).await?;

    debug!(
        "Debited {} cents from account {} (entry {})",
        amount.cents(),
        account_id,
        entry_id
    );
    Ok(entry_id)
}

/// Finalize a pending entry's status. Amounts are immutable; only the status
/// of a trade-open or withdrawal debit flips at settlement time.
pub async fn finalize_entry(
    conn: &mut SqliteConnection,
    entry_id: i64,
    status: EntryStatus,
) -> Result<(), SettlementError> {
    let rows_affected = sqlx::query(
        "UPDATE ledger_entries SET status = ?1 WHERE id = ?2 AND status = 'pending'",
    )
    .bind(status.as_str())
    .bind(entry_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| query_err("Failed to finalize ledger entry", e))?
    .rows_affected();

    if rows_affected == 0 {
        return Err(SettlementError::NotFound {
            entity: "pending ledger entry",
            id: entry_id.to_string(),
        });
    }

    Ok(())
}

async fn append_entry(
    conn: &mut SqliteConnection,
    account_id: &str,
    debit_cents: i64,
    credit_cents: i64,
    entry: NewLedgerEntry,
) -> Result<i64, SettlementError> {
    let (reference_type, reference_id) = match &entry.reference {
        Some((rt, id)) => (Some(rt.as_str()), Some(id.as_str())),
        None => (None, None),
    };

    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO ledger_entries (
            account_id, reason, debit_cents, credit_cents,
            status, reference_type, reference_id, level, created_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        RETURNING id
        "#,
    )
    .bind(account_id)
    .bind(entry.reason.as_str())
    .bind(debit_cents)
    .bind(credit_cents)
    .bind(entry.status.as_str())
    .bind(reference_type)
    .bind(reference_id)
    .bind(entry.level)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| query_err("Failed to append ledger entry", e))?;

    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::init_database;
    use crate::persistence::repository::AccountRepository;

    async fn setup() -> (crate::persistence::DbPool, String) {
        let pool = init_database("sqlite::memory:").await.unwrap();
        let accounts = AccountRepository::new(pool.clone());
        let account = accounts.create("acc-1", None).await.unwrap();
        (pool, account.id)
    }

    #[tokio::test]
    async fn test_credit_updates_balance_and_appends_entry() {
        let (pool, account_id) = setup().await;

        let mut tx = pool.begin().await.unwrap();
        let entry_id = credit(
            &mut tx,
            &account_id,
            Amount::new(10_000).unwrap(),
            NewLedgerEntry::completed(EntryReason::Deposit, None),
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let account = AccountRepository::new(pool.clone())
            .get(&account_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.balance_cents, 10_000);

        let (credit_cents, status): (i64, String) =
            sqlx::query_as("SELECT credit_cents, status FROM ledger_entries WHERE id = ?1")
                .bind(entry_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(credit_cents, 10_000);
        assert_eq!(status, "completed");
    }

    #[tokio::test]
    async fn test_debit_refuses_overdraft() {
        let (pool, account_id) = setup().await;

        let mut tx = pool.begin().await.unwrap();
        credit(
            &mut tx,
            &account_id,
            Amount::new(500).unwrap(),
            NewLedgerEntry::completed(EntryReason::Deposit, None),
        )
        .await
        .unwrap();

        let result = debit(
            &mut tx,
            &account_id,
            Amount::new(600).unwrap(),
            NewLedgerEntry::completed(EntryReason::Withdrawal, None),
            Overdraft::Deny,
        )
        .await;

        assert!(matches!(
            result,
            Err(SettlementError::InsufficientFunds {
                required_cents: 600,
                available_cents: 500,
            })
        ));
    }

    #[tokio::test]
    async fn test_debit_with_overdraft_allowed_goes_negative() {
        let (pool, account_id) = setup().await;

        let mut tx = pool.begin().await.unwrap();
        debit(
            &mut tx,
            &account_id,
            Amount::new(300).unwrap(),
            NewLedgerEntry::pending(EntryReason::TradeSettlement, None),
            Overdraft::Allow,
        )
        .await
        .unwrap();
        tx.commit().await.unwrap();

        let account = AccountRepository::new(pool)
            .get(&account_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.balance_cents, -300);
    }

    #[tokio::test]
    async fn test_rollback_discards_balance_and_entry_together() {
        let (pool, account_id) = setup().await;

        let mut tx = pool.begin().await.unwrap();
        credit(
            &mut tx,
            &account_id,
            Amount::new(10_000).unwrap(),
            NewLedgerEntry::completed(EntryReason::Deposit, None),
        )
        .await
        .unwrap();
        tx.rollback().await.unwrap();

        let account = AccountRepository::new(pool.clone())
            .get(&account_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(account.balance_cents, 0);

        let (entries,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ledger_entries")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(entries, 0);
    }

    #[tokio::test]
    async fn test_credit_unknown_account() {
        let (pool, _) = setup().await;

        let mut tx = pool.begin().await.unwrap();
        let result = credit(
            &mut tx,
            "ghost",
            Amount::new(100).unwrap(),
            NewLedgerEntry::completed(EntryReason::Deposit, None),
        )
        .await;

        assert!(matches!(result, Err(SettlementError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_finalize_entry_only_touches_pending() {
        let (pool, account_id) = setup().await;

        let mut tx = pool.begin().await.unwrap();
        let entry_id = debit(
            &mut tx,
            &account_id,
            Amount::new(200).unwrap(),
            NewLedgerEntry::pending(EntryReason::TradeSettlement, None),
            Overdraft::Allow,
        )
        .await
        .unwrap();

        finalize_entry(&mut tx, entry_id, EntryStatus::Completed)
            .await
            .unwrap();

        // A second finalize finds no pending entry.
        let again = finalize_entry(&mut tx, entry_id, EntryStatus::Cancelled).await;
        assert!(matches!(again, Err(SettlementError::NotFound { .. })));
    }
}
