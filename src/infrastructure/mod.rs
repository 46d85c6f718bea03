pub mod gateway;
pub mod payout;
pub mod price_feed;
