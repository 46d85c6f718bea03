//! Daily return math for the market accrual job.

/// Day-over-day percent change. A missing or non-positive previous price
/// degenerates to 0% (first-run case: today's price doubles as yesterday's).
pub fn percent_change(today: f64, yesterday: f64) -> f64 {
    if yesterday <= 0.0 || !yesterday.is_finite() || !today.is_finite() {
        return 0.0;
    }
    (today - yesterday) / yesterday * 100.0
}

/// Clamp a raw percent change into the package's configured return band.
pub fn clamp_return_rate(change: f64, min_rate: f64, max_rate: f64) -> f64 {
    change.clamp(min_rate, max_rate)
}
