//! Settlement Service
//!
//! The deposit, withdrawal and binary-trade state machines. Every status
//! transition is a guarded UPDATE (`... WHERE status = 'pending'`), so a
//! transition out of the pending state happens exactly once no matter how
//! many callers race for it; the loser of the race observes zero affected
//! rows and gets a conflict error instead of a second mutation.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::services::cascade::CommissionCascade;
use crate::application::services::notifier::{Notification, Notifier};
use crate::config::PlatformConfig;
use crate::domain::entities::deposit::DepositStatus;
use crate::domain::entities::ledger::{EntryReason, EntryStatus, ReferenceType};
use crate::domain::entities::trade::{
    settlement_credit_cents, TradeDirection, TradeOutcome, TradeStatus,
};
use crate::domain::entities::withdrawal::{PayoutDestination, WithdrawalStatus};
use crate::domain::errors::SettlementError;
use crate::domain::value_objects::amount::Amount;
use crate::infrastructure::payout::PayoutGateway;
use crate::persistence::ledger_store::{self, NewLedgerEntry, Overdraft};
use crate::persistence::models::{DepositRecord, TradeRecord, WithdrawalRecord};
use crate::persistence::{DatabaseError, DbPool};

pub struct SettlementService {
    pool: DbPool,
    config: PlatformConfig,
    cascade: CommissionCascade,
    notifier: Notifier,
}

fn map_sqlx(e: sqlx::Error) -> SettlementError {
    SettlementError::Database(DatabaseError::QueryError(e.to_string()))
}

impl SettlementService {
    pub fn new(pool: DbPool, config: PlatformConfig, notifier: Notifier) -> Self {
        let cascade = CommissionCascade::new(pool.clone(), config.max_commission_levels);
        Self {
            pool,
            config,
            cascade,
            notifier,
        }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    // ---- deposits ----

    /// Approve a pending deposit: flip its status, credit the account and
    /// (for a first deposit) the sign-up bonus, all in one transaction.
    /// After commit, distribute referral commissions and notify.
    pub async fn approve_deposit(
        &self,
        deposit_id: &str,
    ) -> Result<DepositRecord, SettlementError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let rows_affected = sqlx::query(
            "UPDATE deposits SET status = ?1, processed_at = ?2 \
             WHERE id = ?3 AND status = ?4",
        )
        .bind(DepositStatus::Approved.as_str())
        .bind(Utc::now())
        .bind(deposit_id)
        .bind(DepositStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .rows_affected();

        if rows_affected == 0 {
            tx.rollback().await.map_err(map_sqlx)?;
            return Err(self.deposit_conflict(deposit_id).await?);
        }

        let deposit = fetch_deposit(&mut tx, deposit_id).await?;
        let amount = Amount::new(deposit.amount_cents).map_err(|e| {
            error!("Deposit {} has invalid amount: {}", deposit_id, e);
            SettlementError::Database(DatabaseError::QueryError(e))
        })?;

        ledger_store::credit(
            &mut tx,
            &deposit.account_id,
            amount,
            NewLedgerEntry::completed(
                EntryReason::Deposit,
                Some((ReferenceType::Deposit, deposit.id.clone())),
            ),
        )
        .await?;

        if self.config.first_deposit_bonus_cents > 0 {
            let prior: (i64,) = sqlx::query_as(
                "SELECT COUNT(*) FROM deposits \
                 WHERE account_id = ?1 AND status = ?2 AND id != ?3",
            )
            .bind(&deposit.account_id)
            .bind(DepositStatus::Approved.as_str())
            .bind(&deposit.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;

            if prior.0 == 0 {
                let bonus = Amount::new(self.config.first_deposit_bonus_cents)
                    .map_err(|e| SettlementError::Database(DatabaseError::QueryError(e)))?;
                ledger_store::credit(
                    &mut tx,
                    &deposit.account_id,
                    bonus,
                    NewLedgerEntry::completed(
                        EntryReason::Bonus,
                        Some((ReferenceType::Deposit, deposit.id.clone())),
                    ),
                )
                .await?;
                info!(
                    "First-deposit bonus of {} cents credited to account {}",
                    bonus.cents(),
                    deposit.account_id
                );
            }
        }

        tx.commit().await.map_err(map_sqlx)?;
        info!(
            "Deposit {} approved: {} cents credited to account {}",
            deposit.id, deposit.amount_cents, deposit.account_id
        );

        // Commissions run after the primary credit has committed; a level
        // that fails leaves earlier levels paid and must not unwind the
        // deposit itself.
        if self.config.pay_deposit_commissions {
            match self.cascade.distribute(&deposit).await {
                Ok(payments) => {
                    for payment in payments {
                        self.notifier.emit(Notification::CommissionEarned {
                            account_id: payment.account_id,
                            deposit_id: deposit.id.clone(),
                            level: payment.level,
                            amount_cents: payment.amount_cents,
                        });
                    }
                }
                Err(e) => {
                    error!(
                        "Commission cascade for deposit {} stopped early: {}",
                        deposit.id, e
                    );
                }
            }
        }

        self.notifier.emit(Notification::DepositApproved {
            account_id: deposit.account_id.clone(),
            deposit_id: deposit.id.clone(),
            amount_cents: deposit.amount_cents,
        });

        fetch_deposit_pool(&self.pool, deposit_id).await
    }

    /// Mark a pending deposit rejected. No credit was made for a pending
    /// deposit, so there is nothing to compensate.
    pub async fn reject_deposit(&self, deposit_id: &str) -> Result<DepositRecord, SettlementError> {
        self.close_deposit(deposit_id, DepositStatus::Rejected).await
    }

    /// Mark a pending deposit canceled (user abandoned the session).
    pub async fn cancel_deposit(&self, deposit_id: &str) -> Result<DepositRecord, SettlementError> {
        self.close_deposit(deposit_id, DepositStatus::Canceled).await
    }

    async fn close_deposit(
        &self,
        deposit_id: &str,
        status: DepositStatus,
    ) -> Result<DepositRecord, SettlementError> {
        let rows_affected = sqlx::query(
            "UPDATE deposits SET status = ?1, processed_at = ?2 \
             WHERE id = ?3 AND status = ?4",
        )
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(deposit_id)
        .bind(DepositStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?
        .rows_affected();

        if rows_affected == 0 {
            return Err(self.deposit_conflict(deposit_id).await?);
        }

        let deposit = fetch_deposit_pool(&self.pool, deposit_id).await?;
        info!("Deposit {} closed as {}", deposit_id, status.as_str());
        self.notifier.emit(Notification::DepositClosed {
            account_id: deposit.account_id.clone(),
            deposit_id: deposit.id.clone(),
            status: status.as_str().to_string(),
        });
        Ok(deposit)
    }

    /// A zero-row guarded update means the deposit is missing or terminal.
    async fn deposit_conflict(
        &self,
        deposit_id: &str,
    ) -> Result<SettlementError, SettlementError> {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT status FROM deposits WHERE id = ?1")
                .bind(deposit_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        Ok(match exists {
            Some(_) => SettlementError::AlreadyProcessed(deposit_id.to_string()),
            None => SettlementError::NotFound {
                entity: "deposit",
                id: deposit_id.to_string(),
            },
        })
    }

    // ---- withdrawals ----

    /// Request a withdrawal: validate the payout destination, then debit
    /// the balance into frozen funds and record the pending withdrawal and
    /// its pending ledger entry atomically.
    pub async fn request_withdrawal(
        &self,
        account_id: &str,
        amount: Amount,
        destination: PayoutDestination,
    ) -> Result<WithdrawalRecord, SettlementError> {
        let withdrawal_id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let entry_id = ledger_store::debit(
            &mut tx,
            account_id,
            amount,
            NewLedgerEntry::pending(
                EntryReason::Withdrawal,
                Some((ReferenceType::Withdrawal, withdrawal_id.clone())),
            ),
            Overdraft::Deny,
        )
        .await?;

        sqlx::query("UPDATE accounts SET frozen_cents = frozen_cents + ?1 WHERE id = ?2")
            .bind(amount.cents())
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        let record = sqlx::query_as::<_, WithdrawalRecord>(
            r#"
            INSERT INTO withdrawals (id, account_id, amount_cents, pix_key, pix_key_type,
                                     beneficiary_name, status, ledger_entry_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            RETURNING *
            "#,
        )
        .bind(&withdrawal_id)
        .bind(account_id)
        .bind(amount.cents())
        .bind(&destination.pix_key)
        .bind(destination.pix_key_type.as_str())
        .bind(&destination.beneficiary_name)
        .bind(WithdrawalStatus::Pending.as_str())
        .bind(entry_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        info!(
            "Withdrawal {} requested: {} cents frozen on account {}",
            record.id,
            amount.cents(),
            account_id
        );
        Ok(record)
    }

    /// Approve a withdrawal. The claim moves `pending` to `processing` and
    /// only one caller can win that update, so at most one payout is ever
    /// in flight. The terminal `approved` state is reached only after the
    /// payout gateway confirms; a gateway failure releases the claim back
    /// to `pending` so the payout can be retried.
    pub async fn approve_withdrawal(
        &self,
        withdrawal_id: &str,
        gateway: &dyn PayoutGateway,
    ) -> Result<WithdrawalRecord, SettlementError> {
        let rows_affected = sqlx::query(
            "UPDATE withdrawals SET status = ?1 \
             WHERE id = ?2 AND status = ?3",
        )
        .bind(WithdrawalStatus::Processing.as_str())
        .bind(withdrawal_id)
        .bind(WithdrawalStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?
        .rows_affected();

        if rows_affected == 0 {
            return Err(self.withdrawal_conflict(withdrawal_id).await?);
        }

        let withdrawal = fetch_withdrawal_pool(&self.pool, withdrawal_id).await?;
        if let Err(payout_err) = gateway.submit_payout(&withdrawal).await {
            warn!(
                "Payout for withdrawal {} failed, releasing claim: {}",
                withdrawal_id, payout_err
            );
            // The retry goes back through the same pending-to-processing
            // gate instead of re-claiming a processing row.
            if let Err(release_err) = sqlx::query(
                "UPDATE withdrawals SET status = ?1 WHERE id = ?2 AND status = ?3",
            )
            .bind(WithdrawalStatus::Pending.as_str())
            .bind(withdrawal_id)
            .bind(WithdrawalStatus::Processing.as_str())
            .execute(&self.pool)
            .await
            {
                error!(
                    "Could not release claim on withdrawal {}: {}",
                    withdrawal_id, release_err
                );
            }
            return Err(payout_err);
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let finalized = sqlx::query(
            "UPDATE withdrawals SET status = ?1, processed_at = ?2 \
             WHERE id = ?3 AND status = ?4",
        )
        .bind(WithdrawalStatus::Approved.as_str())
        .bind(Utc::now())
        .bind(withdrawal_id)
        .bind(WithdrawalStatus::Processing.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .rows_affected();

        if finalized == 0 {
            tx.rollback().await.map_err(map_sqlx)?;
            return Err(SettlementError::InvalidWithdrawalState(
                withdrawal_id.to_string(),
            ));
        }

        sqlx::query("UPDATE accounts SET frozen_cents = frozen_cents - ?1 WHERE id = ?2")
            .bind(withdrawal.amount_cents)
            .bind(&withdrawal.account_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;

        ledger_store::finalize_entry(&mut tx, withdrawal.ledger_entry_id, EntryStatus::Completed)
            .await?;

        tx.commit().await.map_err(map_sqlx)?;
        info!(
            "Withdrawal {} approved and paid out ({} cents)",
            withdrawal_id, withdrawal.amount_cents
        );

        self.notifier.emit(Notification::WithdrawalPaid {
            account_id: withdrawal.account_id.clone(),
            withdrawal_id: withdrawal_id.to_string(),
            amount_cents: withdrawal.amount_cents,
        });

        fetch_withdrawal_pool(&self.pool, withdrawal_id).await
    }

    /// Reject a withdrawal and return the frozen funds to the balance.
    /// The original pending debit entry is cancelled, so the ledger reads
    /// as if the debit never took effect.
    pub async fn reject_withdrawal(
        &self,
        withdrawal_id: &str,
    ) -> Result<WithdrawalRecord, SettlementError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let rows_affected = sqlx::query(
            "UPDATE withdrawals SET status = ?1, processed_at = ?2 \
             WHERE id = ?3 AND status IN (?4, ?5)",
        )
        .bind(WithdrawalStatus::Rejected.as_str())
        .bind(Utc::now())
        .bind(withdrawal_id)
        .bind(WithdrawalStatus::Pending.as_str())
        .bind(WithdrawalStatus::Processing.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .rows_affected();

        if rows_affected == 0 {
            tx.rollback().await.map_err(map_sqlx)?;
            return Err(self.withdrawal_conflict(withdrawal_id).await?);
        }

        let withdrawal = fetch_withdrawal(&mut tx, withdrawal_id).await?;

        sqlx::query(
            "UPDATE accounts SET frozen_cents = frozen_cents - ?1, \
             balance_cents = balance_cents + ?1 WHERE id = ?2",
        )
        .bind(withdrawal.amount_cents)
        .bind(&withdrawal.account_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        ledger_store::finalize_entry(&mut tx, withdrawal.ledger_entry_id, EntryStatus::Cancelled)
            .await?;

        tx.commit().await.map_err(map_sqlx)?;
        info!(
            "Withdrawal {} rejected: {} cents returned to account {}",
            withdrawal_id, withdrawal.amount_cents, withdrawal.account_id
        );

        self.notifier.emit(Notification::WithdrawalRejected {
            account_id: withdrawal.account_id.clone(),
            withdrawal_id: withdrawal_id.to_string(),
        });

        fetch_withdrawal_pool(&self.pool, withdrawal_id).await
    }

    async fn withdrawal_conflict(
        &self,
        withdrawal_id: &str,
    ) -> Result<SettlementError, SettlementError> {
        let exists: Option<(String,)> =
            sqlx::query_as("SELECT status FROM withdrawals WHERE id = ?1")
                .bind(withdrawal_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        Ok(match exists {
            Some(_) => SettlementError::InvalidWithdrawalState(withdrawal_id.to_string()),
            None => SettlementError::NotFound {
                entity: "withdrawal",
                id: withdrawal_id.to_string(),
            },
        })
    }

    // ---- binary trades ----

    /// Open a trade: reserve the stake immediately with a pending debit.
    /// The trade-open debit is the one place overdraft is authorized; the
    /// stake is reserved ahead of settlement.
    pub async fn open_trade(
        &self,
        account_id: &str,
        amount: Amount,
        direction: TradeDirection,
        expires_at: DateTime<Utc>,
    ) -> Result<TradeRecord, SettlementError> {
        let trade_id = Uuid::new_v4().to_string();
        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let entry_id = ledger_store::debit(
            &mut tx,
            account_id,
            amount,
            NewLedgerEntry::pending(
                EntryReason::TradeSettlement,
                Some((ReferenceType::Trade, trade_id.clone())),
            ),
            Overdraft::Allow,
        )
        .await?;

        let record = sqlx::query_as::<_, TradeRecord>(
            r#"
            INSERT INTO trades (id, account_id, amount_cents, direction, status,
                                expires_at, ledger_entry_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(&trade_id)
        .bind(account_id)
        .bind(amount.cents())
        .bind(direction.as_str())
        .bind(TradeStatus::Pending.as_str())
        .bind(expires_at)
        .bind(entry_id)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        tx.commit().await.map_err(map_sqlx)?;
        info!(
            "Trade {} opened: {} cents reserved on account {} ({})",
            record.id,
            amount.cents(),
            account_id,
            direction.as_str()
        );
        Ok(record)
    }

    /// Settle a pending trade. Only a non-owner settler may do it, and only
    /// once: a second call finds no pending row and fails with
    /// `AlreadySettled`, leaving the balance untouched.
    pub async fn settle_trade(
        &self,
        trade_id: &str,
        outcome: TradeOutcome,
        decided_by: &str,
    ) -> Result<TradeRecord, SettlementError> {
        let trade = fetch_trade_pool(&self.pool, trade_id).await?;
        if trade.account_id == decided_by {
            warn!(
                "Account {} attempted to settle its own trade {}",
                decided_by, trade_id
            );
            return Err(SettlementError::OwnerCannotSettle);
        }

        let mut tx = self.pool.begin().await.map_err(map_sqlx)?;

        let rows_affected = sqlx::query(
            "UPDATE trades SET status = ?1, settled_at = ?2, result_decided_by = ?3 \
             WHERE id = ?4 AND status = ?5",
        )
        .bind(outcome.status().as_str())
        .bind(Utc::now())
        .bind(decided_by)
        .bind(trade_id)
        .bind(TradeStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?
        .rows_affected();

        if rows_affected == 0 {
            tx.rollback().await.map_err(map_sqlx)?;
            return Err(SettlementError::AlreadySettled(trade_id.to_string()));
        }

        let credit_cents = settlement_credit_cents(
            outcome,
            trade.amount_cents,
            self.config.trade_payout_multiplier,
        );
        if credit_cents > 0 {
            let amount = Amount::new(credit_cents)
                .map_err(|e| SettlementError::Database(DatabaseError::QueryError(e)))?;
            ledger_store::credit(
                &mut tx,
                &trade.account_id,
                amount,
                NewLedgerEntry::completed(
                    EntryReason::TradeSettlement,
                    Some((ReferenceType::Trade, trade.id.clone())),
                ),
            )
            .await?;
        }

        // Won/lost consume the reserved stake; a draw hands it back, so the
        // reserving entry is cancelled rather than completed.
        let entry_status = match outcome {
            TradeOutcome::Draw => EntryStatus::Cancelled,
            TradeOutcome::Won | TradeOutcome::Lost => EntryStatus::Completed,
        };
        ledger_store::finalize_entry(&mut tx, trade.ledger_entry_id, entry_status).await?;

        tx.commit().await.map_err(map_sqlx)?;
        info!(
            "Trade {} settled as {} by {} ({} cents credited)",
            trade_id,
            outcome.status().as_str(),
            decided_by,
            credit_cents
        );

        self.notifier.emit(Notification::TradeSettled {
            account_id: trade.account_id.clone(),
            trade_id: trade_id.to_string(),
            status: outcome.status().as_str().to_string(),
        });

        fetch_trade_pool(&self.pool, trade_id).await
    }
}

async fn fetch_deposit(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<DepositRecord, SettlementError> {
    sqlx::query_as::<_, DepositRecord>("SELECT * FROM deposits WHERE id = ?1")
        .bind(id)
        .fetch_one(conn)
        .await
        .map_err(map_sqlx)
}

async fn fetch_deposit_pool(pool: &DbPool, id: &str) -> Result<DepositRecord, SettlementError> {
    sqlx::query_as::<_, DepositRecord>("SELECT * FROM deposits WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| SettlementError::NotFound {
            entity: "deposit",
            id: id.to_string(),
        })
}

async fn fetch_withdrawal(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<WithdrawalRecord, SettlementError> {
    sqlx::query_as::<_, WithdrawalRecord>("SELECT * FROM withdrawals WHERE id = ?1")
        .bind(id)
        .fetch_one(conn)
        .await
        .map_err(map_sqlx)
}

async fn fetch_withdrawal_pool(
    pool: &DbPool,
    id: &str,
) -> Result<WithdrawalRecord, SettlementError> {
    sqlx::query_as::<_, WithdrawalRecord>("SELECT * FROM withdrawals WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| SettlementError::NotFound {
            entity: "withdrawal",
            id: id.to_string(),
        })
}

async fn fetch_trade_pool(pool: &DbPool, id: &str) -> Result<TradeRecord, SettlementError> {
    sqlx::query_as::<_, TradeRecord>("SELECT * FROM trades WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx)?
        .ok_or_else(|| SettlementError::NotFound {
            entity: "trade",
            id: id.to_string(),
        })
}
