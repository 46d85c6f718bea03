pub mod deposit;
pub mod ledger;
pub mod referral;
pub mod trade;
pub mod withdrawal;
