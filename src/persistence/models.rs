//! Database Models
//!
//! Persistent records for accounts, deposits, withdrawals, trades, the
//! ledger, referral configuration and accrual state. Status columns are
//! stored as text; the enums in `domain::entities` own the vocabulary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccountRecord {
    pub id: String,
    pub referred_by: Option<String>,
    pub balance_cents: i64,
    pub frozen_cents: i64,
    pub total_commission_cents: i64,
    pub created_at: DateTime<Utc>,
}

/// Ledger entry record in database. Append-only audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LedgerEntryRecord {
    pub id: i64,
    pub account_id: String,
    pub reason: String, // EntryReason vocabulary
    pub debit_cents: i64,
    pub credit_cents: i64,
    pub status: String, // EntryStatus vocabulary
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub level: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Deposit record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DepositRecord {
    pub id: String,
    pub account_id: String,
    pub amount_cents: i64,
    pub provider: String,
    pub external_transaction_id: String,
    pub status: String, // DepositStatus vocabulary
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Withdrawal record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WithdrawalRecord {
    pub id: String,
    pub account_id: String,
    pub amount_cents: i64,
    pub pix_key: String,
    pub pix_key_type: String,
    pub beneficiary_name: String,
    pub status: String, // WithdrawalStatus vocabulary
    pub ledger_entry_id: i64,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Binary trade record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TradeRecord {
    pub id: String,
    pub account_id: String,
    pub amount_cents: i64,
    pub direction: String, // TradeDirection vocabulary
    pub status: String,    // TradeStatus vocabulary
    pub expires_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
    pub result_decided_by: Option<String>,
    pub ledger_entry_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Referral commission configuration for one level
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReferralLevelRecord {
    pub level: i64,
    pub commission_type: String,
    pub percentage: f64,
}

/// Market price snapshot, one per symbol per day
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MarketPriceRecord {
    pub id: i64,
    pub symbol: String,
    pub date: NaiveDate,
    pub price_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// Investment package (market-linked product with a return band)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvestmentPackageRecord {
    pub id: String,
    pub name: String,
    pub symbol: String,
    pub min_return_rate: f64,
    pub max_return_rate: f64,
}

/// Investment record in database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvestmentRecord {
    pub id: String,
    pub account_id: String,
    pub package_id: String,
    pub amount_cents: i64,
    pub accrued_cents: i64,
    pub status: String, // "active" or "closed"
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Create deposit input
#[derive(Debug, Clone)]
pub struct CreateDeposit {
    pub id: String,
    pub account_id: String,
    pub amount_cents: i64,
    pub provider: String,
    pub external_transaction_id: String,
}

/// Create investment input
#[derive(Debug, Clone)]
pub struct CreateInvestment {
    pub id: String,
    pub account_id: String,
    pub package_id: String,
    pub amount_cents: i64,
    pub ends_at: DateTime<Utc>,
}
