//! Saldo settlement core: ledger store, deposit/withdrawal/trade state
//! machines, referral commission cascade, gateway webhook reconciliation
//! and the daily market return accrual job.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
