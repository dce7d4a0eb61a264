//! Read-only catalog snapshot consumed by the cart.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Draft,
    Archived,
}

string_enum!(ProductStatus, "product status", {
    Active => "active",
    Draft => "draft",
    Archived => "archived",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub status: ProductStatus,
    /// Listed but not yet purchasable.
    pub coming_soon: bool,
    pub price: i64,
    pub original_price: i64,
    pub currency: String,
    pub image_url: Option<String>,
}

impl Product {
    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub active: bool,
    /// Overrides the product price when set.
    pub price: Option<i64>,
    pub original_price: Option<i64>,
    pub image_url: Option<String>,
}
