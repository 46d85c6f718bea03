/// A strictly positive monetary amount in minor units (cents).
///
/// Every ledger mutation goes through this type, so a zero or negative
/// credit/debit cannot reach the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount(i64);

impl Amount {
    pub fn new(cents: i64) -> Result<Self, String> {
        if cents > 0 {
            Ok(Amount(cents))
        } else {
            Err(format!("amount must be positive, got {} cents", cents))
        }
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    /// Decimal major-unit representation, for comparison against
    /// gateway-reported amounts.
    pub fn as_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.as_decimal())
    }
}
