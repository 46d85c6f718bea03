/// Platform configuration snapshot.
///
/// Loaded once at startup and injected into the services as an immutable
/// value; nothing mutates it mid-operation. Commission toggles, bonus
/// amounts and gateway secrets all live here instead of a mutable settings
/// row.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    /// Pay referral commissions when a deposit is approved
    pub pay_deposit_commissions: bool,
    /// Fixed depth bound for the commission cascade
    pub max_commission_levels: i64,
    /// Payout multiplier applied to a won binary trade (e.g. 2.0 = x2)
    pub trade_payout_multiplier: f64,
    /// Accepted absolute difference between the gateway-reported amount and
    /// the expected amount, in major units (absorbs rounding)
    pub amount_tolerance: f64,
    /// One-off bonus credited on an account's first approved deposit
    /// (0 disables it)
    pub first_deposit_bonus_cents: i64,
    /// Shared secret for the pixway IPN HMAC digest
    pub pixway_ipn_secret: String,
    /// Base URL for re-querying bravopay transaction status; None disables
    /// the second-source check
    pub bravopay_requery_url: Option<String>,
    /// Seconds between accrual job runs
    pub accrual_interval_seconds: u64,
    /// Timeout for outbound calls (payout, requery, price feed)
    pub outbound_timeout_seconds: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            pay_deposit_commissions: true,
            max_commission_levels: 5,
            trade_payout_multiplier: 2.0,
            amount_tolerance: 0.01,
            first_deposit_bonus_cents: 0,
            pixway_ipn_secret: String::new(),
            bravopay_requery_url: None,
            accrual_interval_seconds: 86_400,
            outbound_timeout_seconds: 10,
        }
    }
}

impl PlatformConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults on missing or out-of-range values.
    pub fn from_env() -> PlatformConfig {
        let mut config = PlatformConfig::default();

        if let Ok(enabled) = std::env::var("PAY_DEPOSIT_COMMISSIONS") {
            config.pay_deposit_commissions = enabled.to_lowercase() == "true" || enabled == "1";
        }

        if let Ok(levels) = std::env::var("MAX_COMMISSION_LEVELS") {
            match levels.parse::<i64>() {
                Ok(value) if (1..=10).contains(&value) => {
                    config.max_commission_levels = value;
                }
                Ok(value) => {
                    tracing::warn!(
                        "Invalid MAX_COMMISSION_LEVELS value: {} (must be between 1 and 10), using default: {}",
                        value, config.max_commission_levels
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse MAX_COMMISSION_LEVELS '{}': {}, using default: {}",
                        levels,
                        e,
                        config.max_commission_levels
                    );
                }
            }
        }

        if let Ok(multiplier) = std::env::var("TRADE_PAYOUT_MULTIPLIER") {
            if let Ok(value) = multiplier.parse::<f64>() {
                if (1.0..=10.0).contains(&value) {
                    config.trade_payout_multiplier = value;
                }
            }
        }

        if let Ok(tolerance) = std::env::var("AMOUNT_TOLERANCE") {
            if let Ok(value) = tolerance.parse::<f64>() {
                if (0.0..=1.0).contains(&value) {
                    config.amount_tolerance = value;
                }
            }
        }

        if let Ok(bonus) = std::env::var("FIRST_DEPOSIT_BONUS_CENTS") {
            if let Ok(value) = bonus.parse::<i64>() {
                if value >= 0 {
                    config.first_deposit_bonus_cents = value;
                }
            }
        }

        if let Ok(secret) = std::env::var("PIXWAY_IPN_SECRET") {
            config.pixway_ipn_secret = secret;
        }

        if let Ok(url) = std::env::var("BRAVOPAY_REQUERY_URL") {
            if !url.trim().is_empty() {
                config.bravopay_requery_url = Some(url);
            }
        }

        if let Ok(interval) = std::env::var("ACCRUAL_INTERVAL_SECONDS") {
            if let Ok(value) = interval.parse::<u64>() {
                if (60..=604_800).contains(&value) {
                    config.accrual_interval_seconds = value;
                }
            }
        }

        if let Ok(timeout) = std::env::var("OUTBOUND_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse::<u64>() {
                if (1..=120).contains(&value) {
                    config.outbound_timeout_seconds = value;
                }
            }
        }

        config
    }
}
