use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Address, CartItem, DiscountType, Metadata};

/// Fulfilment status, independent from payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

string_enum!(OrderStatus, "order status", {
    Pending => "pending",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

/// Payment status. Only `Paid` is terminal; a later verified callback may
/// still settle a `Failed` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
}

string_enum!(PaymentStatus, "payment status", {
    Pending => "pending",
    Paid => "paid",
    Failed => "failed",
});

/// Monetary totals in integer minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: i64,
    pub discount_total: i64,
    pub shipping_total: i64,
    pub tax_total: i64,
    pub total: i64,
}

/// A promotion as it was applied to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPromotion {
    pub promotion_id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub cart_id: Uuid,
    pub user_id: Option<Uuid>,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    /// Paid through the installment credential set.
    pub installment: bool,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub note: Option<String>,
    pub currency: String,
    pub totals: Totals,
    pub applied_promotions: Vec<AppliedPromotion>,
    pub idempotency_key: Option<String>,
    pub metadata: Metadata,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_payment_pending(&self) -> bool {
        self.payment_status == PaymentStatus::Pending
    }
}

/// Immutable snapshot of a cart line taken at checkout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub image_url: Option<String>,
    pub quantity: u32,
    pub unit_price: i64,
    pub original_unit_price: i64,
    pub currency: String,
    pub line_total: i64,
}

impl OrderItem {
    /// Copy a cart line verbatim. Live catalog data is never consulted.
    pub fn snapshot(order_id: Uuid, item: &CartItem) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            product_id: item.product_id,
            variant_id: item.variant_id,
            product_name: item.product_name.clone(),
            variant_name: item.variant_name.clone(),
            image_url: item.image_url.clone(),
            quantity: item.quantity,
            unit_price: item.unit_price,
            original_unit_price: item.original_unit_price,
            currency: item.currency.clone(),
            line_total: item.line_total(),
        }
    }
}
