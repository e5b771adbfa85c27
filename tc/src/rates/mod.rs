//! Shipping-rate reconciliation

mod cache;

pub use cache::{FetchOutcome, FetchStatus, INCOMPLETE_RESPONSE, ProfileRateCache};
