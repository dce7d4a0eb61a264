//! Order number generation.

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;

/// Length of the random suffix.
pub const SUFFIX_LEN: usize = 6;

/// Source of candidate order numbers. Uniqueness is checked by the caller.
pub trait OrderNumberGenerator: Send + Sync {
    fn generate(&self, prefix: &str, now: DateTime<Utc>) -> String;
}

/// `{prefix}-{YYYYMMDD}-{6 uppercase alphanumerics}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomOrderNumbers;

impl OrderNumberGenerator for RandomOrderNumbers {
    fn generate(&self, prefix: &str, now: DateTime<Utc>) -> String {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(SUFFIX_LEN)
            .map(|b| char::from(b).to_ascii_uppercase())
            .collect();
        format!("{}-{}-{}", prefix, now.format("%Y%m%d"), suffix)
    }
}

/// Order number embedded in a gateway tracking reference
/// (`{order_number}--{unix_ts}`). A reference without the separator is
/// taken to be the order number itself.
pub fn order_number_from_reference(reference: &str) -> &str {
    match reference.rsplit_once("--") {
        Some((order_number, _)) => order_number,
        None => reference,
    }
}
