//! Persistence Layer
//!
//! SQLite-backed storage for accounts, deposits, withdrawals, trades, the
//! ledger, referral configuration and market price snapshots, with async
//! access via sqlx.
//!
//! The ledger is the audit trail: `ledger_entries` rows are append-only and
//! constitute the durable contract reporting and support tooling read
//! against. Account balances are mutated only through the guarded updates in
//! [`ledger_store`].

pub mod ledger_store;
pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

/// Initialize the database connection pool and run migrations.
///
/// # Arguments
/// - `database_url`: Path to SQLite database file (e.g., "sqlite://data/saldo.db")
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    // Ensure data directory exists
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .log_statements(tracing::log::LevelFilter::Debug);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

/// Run database migrations
pub(crate) async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            referred_by TEXT,
            balance_cents INTEGER NOT NULL DEFAULT 0,
            frozen_cents INTEGER NOT NULL DEFAULT 0,
            total_commission_cents INTEGER NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (referred_by) REFERENCES accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create accounts table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ledger_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id TEXT NOT NULL,
            reason TEXT NOT NULL CHECK(reason IN (
                'deposit', 'withdrawal', 'commission',
                'trade_settlement', 'accrual', 'bonus'
            )),
            debit_cents INTEGER NOT NULL DEFAULT 0,
            credit_cents INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL CHECK(status IN ('pending', 'completed', 'cancelled')),
            reference_type TEXT,
            reference_id TEXT,
            level INTEGER,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create ledger_entries table: {}", e))
    })?;

    // UNIQUE(provider, external_transaction_id) is the idempotency guard:
    // a duplicate webhook can never insert a second deposit, and approval
    // of the first flips it out of 'pending' exactly once.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deposits (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            provider TEXT NOT NULL,
            external_transaction_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('pending', 'approved', 'rejected', 'canceled')),
            processed_at DATETIME,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(provider, external_transaction_id),
            FOREIGN KEY (account_id) REFERENCES accounts(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create deposits table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS withdrawals (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            pix_key TEXT NOT NULL,
            pix_key_type TEXT NOT NULL CHECK(pix_key_type IN ('cpf', 'email', 'phone', 'random')),
            beneficiary_name TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('pending', 'processing', 'approved', 'rejected')),
            ledger_entry_id INTEGER NOT NULL,
            processed_at DATETIME,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (account_id) REFERENCES accounts(id),
            FOREIGN KEY (ledger_entry_id) REFERENCES ledger_entries(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create withdrawals table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trades (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            direction TEXT NOT NULL CHECK(direction IN ('up', 'down')),
            status TEXT NOT NULL CHECK(status IN ('pending', 'won', 'lost', 'draw')),
            expires_at DATETIME NOT NULL,
            settled_at DATETIME,
            result_decided_by TEXT,
            ledger_entry_id INTEGER NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (account_id) REFERENCES accounts(id),
            FOREIGN KEY (ledger_entry_id) REFERENCES ledger_entries(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create trades table: {}", e)))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS referral_levels (
            level INTEGER NOT NULL,
            commission_type TEXT NOT NULL,
            percentage REAL NOT NULL,
            PRIMARY KEY (level, commission_type)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create referral_levels table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS market_prices (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            date TEXT NOT NULL,
            price_usd REAL NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE(symbol, date)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create market_prices table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS investment_packages (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            symbol TEXT NOT NULL,
            min_return_rate REAL NOT NULL,
            max_return_rate REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create investment_packages table: {}", e))
    })?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS investments (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            package_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            accrued_cents INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL CHECK(status IN ('active', 'closed')),
            ends_at DATETIME NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (account_id) REFERENCES accounts(id),
            FOREIGN KEY (package_id) REFERENCES investment_packages(id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| {
        DatabaseError::MigrationError(format!("Failed to create investments table: {}", e))
    })?;

    // Indexes for the hot paths: webhook lookup, ledger audit reads,
    // cascade ancestor walk.
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deposits_status ON deposits(status)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ledger_account ON ledger_entries(account_id)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ledger_reference ON ledger_entries(reference_type, reference_id)",
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_accounts_referred_by ON accounts(referred_by)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_investments_package ON investments(package_id, status)",
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/saldo.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/saldo.db".to_string(),
            max_connections: 5,
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://data/saldo.db".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        Self {
            url,
            max_connections,
        }
    }
}
