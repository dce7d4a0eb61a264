//! Promotion evaluation.
//!
//! `matcher`, `stacking` and `pricing` are pure functions over model data.
//! `apply_code` is the transactional service for user-entered codes.

pub mod apply_code;
pub mod matcher;
pub mod pricing;
pub mod stacking;

pub use apply_code::{CodeResult, PromotionCodeError, PromotionCodeService};
pub use pricing::{cart_totals, PricedCart};
