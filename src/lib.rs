//! Storefront - cart, promotion, checkout and payment-callback core.
//!
//! Services own no state of their own: every operation opens a unit of work
//! on a [`storage::Store`], and all coordination between concurrent requests
//! goes through the store's write lease and unique constraints.

pub mod cart;
pub mod checkout;
pub mod config;
pub mod model;
pub mod notify;
pub mod payment;
pub mod promotions;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod test_utils;
