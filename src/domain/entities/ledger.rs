/// Why a ledger entry exists. One entry per balance change, append-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryReason {
    Deposit,
    Withdrawal,
    Commission,
    TradeSettlement,
    Accrual,
    Bonus,
}

impl EntryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryReason::Deposit => "deposit",
            EntryReason::Withdrawal => "withdrawal",
            EntryReason::Commission => "commission",
            EntryReason::TradeSettlement => "trade_settlement",
            EntryReason::Accrual => "accrual",
            EntryReason::Bonus => "bonus",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(EntryReason::Deposit),
            "withdrawal" => Some(EntryReason::Withdrawal),
            "commission" => Some(EntryReason::Commission),
            "trade_settlement" => Some(EntryReason::TradeSettlement),
            "accrual" => Some(EntryReason::Accrual),
            "bonus" => Some(EntryReason::Bonus),
            _ => None,
        }
    }
}

/// Entry status. Amounts never change after insert; only a pending entry's
/// status may be finalized (trade-open debits complete or cancel at
/// settlement, withdrawal debits complete or cancel at payout).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Pending,
    Completed,
    Cancelled,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(EntryStatus::Pending),
            "completed" => Some(EntryStatus::Completed),
            "cancelled" => Some(EntryStatus::Cancelled),
            _ => None,
        }
    }
}

/// What a ledger entry points back at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceType {
    Deposit,
    Withdrawal,
    Trade,
    Investment,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Deposit => "deposit",
            ReferenceType::Withdrawal => "withdrawal",
            ReferenceType::Trade => "trade",
            ReferenceType::Investment => "investment",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_round_trip() {
        for reason in [
            EntryReason::Deposit,
            EntryReason::Withdrawal,
            EntryReason::Commission,
            EntryReason::TradeSettlement,
            EntryReason::Accrual,
            EntryReason::Bonus,
        ] {
            assert_eq!(EntryReason::parse(reason.as_str()), Some(reason));
        }
    }

    #[test]
    fn test_entry_status_round_trip() {
        for status in [
            EntryStatus::Pending,
            EntryStatus::Completed,
            EntryStatus::Cancelled,
        ] {
            assert_eq!(EntryStatus::parse(status.as_str()), Some(status));
        }
    }
}
