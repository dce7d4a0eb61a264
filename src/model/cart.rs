use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Metadata;

/// Metadata key holding the id of the order a cart was checked out into.
pub const CHECKED_OUT_ORDER_KEY: &str = "order_id";
/// Metadata key holding the checkout timestamp.
pub const CHECKED_OUT_AT_KEY: &str = "checked_out_at";

/// Lifecycle status of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Active,
    Expired,
    CheckedOut,
    Emailed,
    Abandoned,
    Merged,
}

string_enum!(CartStatus, "cart status", {
    Active => "active",
    Expired => "expired",
    CheckedOut => "checked_out",
    Emailed => "emailed",
    Abandoned => "abandoned",
    Merged => "merged",
});

impl CartStatus {
    /// Open carts accept mutations and are found by session/user lookups.
    ///
    /// An emailed cart received a recovery email but is still usable.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Emailed)
    }
}

/// Who owns a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartType {
    Anonymous,
    Authenticated,
}

string_enum!(CartType, "cart type", {
    Anonymous => "anonymous",
    Authenticated => "authenticated",
});

/// A shopping cart owned by a session token or a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: Uuid,
    pub session_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub status: CartStatus,
    pub cart_type: CartType,
    pub expires_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub guest_email: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// Create an active cart. A user id makes it authenticated; otherwise it
    /// belongs to the session.
    pub fn new(
        session_id: Option<&str>,
        user_id: Option<Uuid>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        let (session_id, cart_type) = match user_id {
            Some(_) => (None, CartType::Authenticated),
            None => (session_id.map(str::to_string), CartType::Anonymous),
        };
        Self {
            id: Uuid::new_v4(),
            session_id,
            user_id,
            status: CartStatus::Active,
            cart_type,
            expires_at: now + ttl,
            last_activity_at: now,
            guest_email: None,
            metadata: Metadata::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Record activity on the cart.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
        self.updated_at = now;
    }

    /// Hand a session-owned cart over to a user.
    pub fn claim(&mut self, user_id: Uuid, now: DateTime<Utc>) {
        self.user_id = Some(user_id);
        self.session_id = None;
        self.cart_type = CartType::Authenticated;
        self.touch(now);
    }

    /// Order this cart was checked out into, if any.
    pub fn checked_out_order_id(&self) -> Option<Uuid> {
        self.metadata
            .get(CHECKED_OUT_ORDER_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }

    /// Transition to `checked_out`, stamping the order reference.
    pub fn mark_checked_out(&mut self, order_id: Uuid, now: DateTime<Utc>) {
        self.status = CartStatus::CheckedOut;
        self.metadata.insert(
            CHECKED_OUT_ORDER_KEY.to_string(),
            serde_json::Value::String(order_id.to_string()),
        );
        self.metadata.insert(
            CHECKED_OUT_AT_KEY.to_string(),
            serde_json::Value::String(now.to_rfc3339()),
        );
        self.updated_at = now;
    }
}

/// One product line in a cart, with the price captured when it was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
    pub unit_price: i64,
    pub original_unit_price: i64,
    pub currency: String,
    pub product_name: String,
    pub variant_name: Option<String>,
    pub image_url: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartItem {
    pub fn line_total(&self) -> i64 {
        self.unit_price * i64::from(self.quantity)
    }

    /// Whether both items describe the same (product, variant) line.
    pub fn same_line(&self, other: &CartItem) -> bool {
        self.product_id == other.product_id && self.variant_id == other.variant_id
    }
}

/// Audit record of a guest checkout whose contact email was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailedCart {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub email: String,
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}
