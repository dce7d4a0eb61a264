//! Bundle matching: how many complete sets of a bundle a cart holds.

use crate::model::{CartItem, ProductBundle, Promotion};

/// Number of complete bundle sets present in `items`.
///
/// Each rule contributes `floor(matching quantity / required quantity)`; the
/// result is the minimum over all rules. No rules, or a rule with nothing
/// matching, yields zero.
pub fn complete_sets(items: &[CartItem], rules: &[ProductBundle]) -> u32 {
    rules
        .iter()
        .map(|rule| {
            if rule.quantity == 0 {
                return 0;
            }
            let matching: u64 = items
                .iter()
                .filter(|item| rule.matches(item))
                .map(|item| u64::from(item.quantity))
                .sum();
            u32::try_from(matching / u64::from(rule.quantity)).unwrap_or(u32::MAX)
        })
        .min()
        .unwrap_or(0)
}

/// Discount granted for `sets` complete sets.
pub fn total_discount(promotion: &Promotion, sets: u32) -> i64 {
    promotion.discount_value.saturating_mul(i64::from(sets))
}

/// Whether a bundle promotion currently yields at least one complete set.
pub fn applicable(promotion: &Promotion, items: &[CartItem]) -> bool {
    promotion.is_bundle()
        && !promotion.bundles.is_empty()
        && complete_sets(items, &promotion.bundles) > 0
}
