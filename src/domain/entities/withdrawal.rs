use crate::domain::errors::SettlementError;

/// Withdrawal lifecycle status.
///
/// `Approved` is reached only after the external payout call succeeds; a
/// failed payout leaves the withdrawal in `Processing` for manual retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalStatus {
    Pending,
    Processing,
    Approved,
    Rejected,
}

impl WithdrawalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WithdrawalStatus::Pending => "pending",
            WithdrawalStatus::Processing => "processing",
            WithdrawalStatus::Approved => "approved",
            WithdrawalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(WithdrawalStatus::Pending),
            "processing" => Some(WithdrawalStatus::Processing),
            "approved" => Some(WithdrawalStatus::Approved),
            "rejected" => Some(WithdrawalStatus::Rejected),
            _ => None,
        }
    }
}

/// Pix payout destination key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixKeyType {
    Cpf,
    Email,
    Phone,
    Random,
}

impl PixKeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PixKeyType::Cpf => "cpf",
            PixKeyType::Email => "email",
            PixKeyType::Phone => "phone",
            PixKeyType::Random => "random",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cpf" => Some(PixKeyType::Cpf),
            "email" => Some(PixKeyType::Email),
            "phone" => Some(PixKeyType::Phone),
            "random" => Some(PixKeyType::Random),
            _ => None,
        }
    }
}

/// Payout destination, validated before any external payout submission.
#[derive(Debug, Clone)]
pub struct PayoutDestination {
    pub pix_key: String,
    pub pix_key_type: PixKeyType,
    pub beneficiary_name: String,
}

impl PayoutDestination {
    pub fn new(
        pix_key: &str,
        pix_key_type: PixKeyType,
        beneficiary_name: &str,
    ) -> Result<Self, SettlementError> {
        let pix_key = pix_key.trim();
        let beneficiary_name = beneficiary_name.trim();

        if beneficiary_name.is_empty() {
            return Err(SettlementError::InvalidPayoutDestination(
                "beneficiary name is required".to_string(),
            ));
        }

        let key_ok = match pix_key_type {
            PixKeyType::Cpf => pix_key.len() == 11 && pix_key.chars().all(|c| c.is_ascii_digit()),
            PixKeyType::Email => pix_key.contains('@') && pix_key.len() >= 5,
            PixKeyType::Phone => {
                let digits = pix_key.strip_prefix('+').unwrap_or(pix_key);
                digits.len() >= 10 && digits.chars().all(|c| c.is_ascii_digit())
            }
            PixKeyType::Random => pix_key.len() >= 32,
        };

        if !key_ok {
            return Err(SettlementError::InvalidPayoutDestination(format!(
                "malformed {} pix key",
                pix_key_type.as_str()
            )));
        }

        Ok(PayoutDestination {
            pix_key: pix_key.to_string(),
            pix_key_type,
            beneficiary_name: beneficiary_name.to_string(),
        })
    }
}
