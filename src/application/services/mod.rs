pub mod accrual;
pub mod cascade;
pub mod notifier;
pub mod settlement;
