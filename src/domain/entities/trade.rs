/// Direction of a binary trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Up,
    Down,
}

impl TradeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeDirection::Up => "up",
            TradeDirection::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "up" => Some(TradeDirection::Up),
            "down" => Some(TradeDirection::Down),
            _ => None,
        }
    }
}

/// Binary trade lifecycle status. `Pending` transitions exactly once into
/// one of the three terminal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeStatus {
    Pending,
    Won,
    Lost,
    Draw,
}

impl TradeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeStatus::Pending => "pending",
            TradeStatus::Won => "won",
            TradeStatus::Lost => "lost",
            TradeStatus::Draw => "draw",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TradeStatus::Pending),
            "won" => Some(TradeStatus::Won),
            "lost" => Some(TradeStatus::Lost),
            "draw" => Some(TradeStatus::Draw),
            _ => None,
        }
    }
}

/// Settlement outcome chosen by the settler. Separate from `TradeStatus` so
/// that `Pending` can never be passed as an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeOutcome {
    Won,
    Lost,
    Draw,
}

impl TradeOutcome {
    pub fn status(&self) -> TradeStatus {
        match self {
            TradeOutcome::Won => TradeStatus::Won,
            TradeOutcome::Lost => TradeStatus::Lost,
            TradeOutcome::Draw => TradeStatus::Draw,
        }
    }
}

/// Credit owed to the account on settlement, in cents. The stake was already
/// debited at open time, so `Lost` pays nothing and `Draw` returns the stake.
pub fn settlement_credit_cents(
    outcome: TradeOutcome,
    stake_cents: i64,
    payout_multiplier: f64,
) -> i64 {
    match outcome {
        TradeOutcome::Won => (stake_cents as f64 * payout_multiplier).round() as i64,
        TradeOutcome::Lost => 0,
        TradeOutcome::Draw => stake_cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TradeStatus::Pending,
            TradeStatus::Won,
            TradeStatus::Lost,
            TradeStatus::Draw,
        ] {
            assert_eq!(TradeStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_direction_round_trip() {
        assert_eq!(TradeDirection::parse("up"), Some(TradeDirection::Up));
        assert_eq!(TradeDirection::parse("down"), Some(TradeDirection::Down));
        assert_eq!(TradeDirection::parse("sideways"), None);
    }

    #[test]
    fn test_settlement_credit_won_applies_multiplier() {
        assert_eq!(settlement_credit_cents(TradeOutcome::Won, 5_000, 2.0), 10_000);
        assert_eq!(settlement_credit_cents(TradeOutcome::Won, 333, 1.9), 633);
    }

    #[test]
    fn test_settlement_credit_lost_pays_nothing() {
        assert_eq!(settlement_credit_cents(TradeOutcome::Lost, 5_000, 2.0), 0);
    }

    #[test]
    fn test_settlement_credit_draw_returns_stake() {
        assert_eq!(settlement_credit_cents(TradeOutcome::Draw, 5_000, 2.0), 5_000);
    }
}
