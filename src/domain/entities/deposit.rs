/// Deposit lifecycle status.
///
/// A deposit leaves `Pending` exactly once; every other state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepositStatus {
    Pending,
    Approved,
    Rejected,
    Canceled,
}

impl DepositStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositStatus::Pending => "pending",
            DepositStatus::Approved => "approved",
            DepositStatus::Rejected => "rejected",
            DepositStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DepositStatus::Pending),
            "approved" => Some(DepositStatus::Approved),
            "rejected" => Some(DepositStatus::Rejected),
            "canceled" => Some(DepositStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DepositStatus::Pending)
    }
}
