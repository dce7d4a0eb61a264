use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::CartItem;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountType {
    /// `discount_value` is a percentage of the subtotal.
    Percentage,
    /// `discount_value` is an amount in minor units.
    FixedAmount,
    /// Waives shipping.
    FreeShipping,
    /// `discount_value` is granted once per complete bundle set.
    Bundle,
}

string_enum!(DiscountType, "discount type", {
    Percentage => "percentage",
    FixedAmount => "fixed_amount",
    FreeShipping => "free_shipping",
    Bundle => "bundle",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Promotion {
    pub id: Uuid,
    /// Unique, compared case-insensitively.
    pub code: String,
    pub name: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub stackable: bool,
    pub active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub usage_limit: Option<u32>,
    pub usage_count: u32,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Bundle rules; empty unless `discount_type` is `Bundle`.
    pub bundles: Vec<ProductBundle>,
    pub created_at: DateTime<Utc>,
}

impl Promotion {
    pub fn is_bundle(&self) -> bool {
        self.discount_type == DiscountType::Bundle
    }

    /// Active, not soft-deleted, and inside its window at `now`.
    pub fn applies_now(&self, now: DateTime<Utc>) -> bool {
        self.active
            && self.deleted_at.is_none()
            && self.starts_at.map_or(true, |starts| starts <= now)
            && self.ends_at.map_or(true, |ends| now <= ends)
    }

    pub fn used_up(&self) -> bool {
        self.usage_limit.is_some_and(|limit| self.usage_count >= limit)
    }

    pub fn matches_code(&self, code: &str) -> bool {
        self.code.eq_ignore_ascii_case(code.trim())
    }
}

/// One requirement of a bundle promotion: `quantity` units of a product
/// (optionally a specific variant) per set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductBundle {
    pub id: Uuid,
    pub promotion_id: Uuid,
    pub product_id: Uuid,
    /// `None` accepts any variant of the product.
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
}

impl ProductBundle {
    pub fn matches(&self, item: &CartItem) -> bool {
        item.product_id == self.product_id
            && self.variant_id.map_or(true, |variant| item.variant_id == Some(variant))
    }
}
