/// Commission owed to one ancestor for a deposit, in cents, rounded to the
/// nearest cent.
pub fn commission_cents(deposit_cents: i64, percentage: f64) -> i64 {
    (deposit_cents as f64 * percentage / 100.0).round() as i64
}

/// Referral percentages are configuration data; reject values outside 0-100
/// at the edge so the cascade never has to.
pub fn valid_percentage(percentage: f64) -> bool {
    percentage.is_finite() && (0.0..=100.0).contains(&percentage)
}
