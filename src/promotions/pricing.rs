//! Cart totals: subtotal, promotion discounts, shipping and tax.

use crate::config::CheckoutConfig;
use crate::model::{AppliedPromotion, CartItem, DiscountType, Promotion, Totals};

use super::matcher;

const BPS_DENOMINATOR: i64 = 10_000;

/// Totals for a cart together with the discount each promotion contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PricedCart {
    pub totals: Totals,
    pub applied: Vec<AppliedPromotion>,
}

/// Price `items` with `promotions` applied in order.
///
/// Percentage discounts apply to the undiscounted subtotal. Combined line
/// discounts never exceed the subtotal. Free-shipping promotions waive
/// shipping and contribute no line discount.
pub fn cart_totals(
    items: &[CartItem],
    promotions: &[Promotion],
    config: &CheckoutConfig,
) -> PricedCart {
    let subtotal: i64 = items.iter().map(CartItem::line_total).sum();
    let mut discount_total = 0i64;
    let mut free_shipping = false;
    let mut applied = Vec::with_capacity(promotions.len());

    for promotion in promotions {
        let wanted = match promotion.discount_type {
            DiscountType::Percentage => subtotal * promotion.discount_value.clamp(0, 100) / 100,
            DiscountType::FixedAmount => promotion.discount_value.max(0),
            DiscountType::Bundle => {
                let sets = matcher::complete_sets(items, &promotion.bundles);
                matcher::total_discount(promotion, sets).max(0)
            }
            DiscountType::FreeShipping => {
                free_shipping = true;
                0
            }
        };
        let discount = wanted.min(subtotal - discount_total);
        discount_total += discount;
        applied.push(AppliedPromotion {
            promotion_id: promotion.id,
            code: promotion.code.clone(),
            discount_type: promotion.discount_type,
            discount,
        });
    }

    let discounted = subtotal - discount_total;
    let over_threshold =
        config.free_shipping_threshold > 0 && discounted >= config.free_shipping_threshold;
    let shipping_total = if items.is_empty() || free_shipping || over_threshold {
        0
    } else {
        config.shipping_fee
    };
    let tax_total = discounted * config.tax_rate_bps / BPS_DENOMINATOR;

    PricedCart {
        totals: Totals {
            subtotal,
            discount_total,
            shipping_total,
            tax_total,
            total: discounted + shipping_total + tax_total,
        },
        applied,
    }
}
