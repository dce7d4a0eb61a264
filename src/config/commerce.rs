//! Cart, checkout and notification settings.

use chrono::Duration;
use serde::Deserialize;

/// Default channel capacity for queued notifications.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CartConfig {
    /// Lifetime of a newly created cart.
    pub ttl_days: i64,
    /// Lifetime of a cart line, refreshed whenever its quantity changes.
    pub item_ttl_days: i64,
    /// Open carts idle for longer than this are expired by the sweep.
    pub inactivity_days: i64,
    /// Seconds between sweeper runs. Zero runs a single sweep and exits.
    pub sweep_interval_secs: u64,
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            ttl_days: 7,
            item_ttl_days: 7,
            inactivity_days: 30,
            sweep_interval_secs: 3600,
        }
    }
}

impl CartConfig {
    pub fn ttl(&self) -> Duration {
        Duration::days(self.ttl_days)
    }

    pub fn item_ttl(&self) -> Duration {
        Duration::days(self.item_ttl_days)
    }

    pub fn inactivity(&self) -> Duration {
        Duration::days(self.inactivity_days)
    }
}

/// Pricing and order-numbering settings. Amounts are minor units.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    pub currency: String,
    /// Flat shipping fee charged below the free-shipping threshold.
    pub shipping_fee: i64,
    /// Discounted subtotal at or above which shipping is free. Zero disables.
    pub free_shipping_threshold: i64,
    /// Tax rate in basis points of the discounted subtotal.
    pub tax_rate_bps: i64,
    pub order_number_prefix: String,
    /// Attempts at generating an unused order number before giving up.
    pub max_order_number_attempts: u32,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: "VND".to_string(),
            shipping_fee: 30_000,
            free_shipping_threshold: 500_000,
            tax_rate_bps: 0,
            order_number_prefix: "ORD".to_string(),
            max_order_number_attempts: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Capacity of the in-process notification queue.
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}
