//! Storage interfaces and implementations.
//!
//! Services never issue ad hoc queries. They open a [`UnitOfWork`] from a
//! [`Store`], call typed repository methods on it, and commit or roll back.
//! A unit of work holds the backend's exclusive write lease for its whole
//! lifetime (`BEGIN IMMEDIATE` on SQLite, the state guard in memory), so
//! every `lock_*` read is stable until commit. Dropping an unfinished unit of
//! work discards its changes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::model::{
    Address, Cart, CartItem, EmailedCart, Order, OrderItem, PaymentTransaction, Product,
    ProductVariant, Promotion, UnknownVariant,
};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Record not found: {entity} {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Corrupt stored value: {0}")]
    Corrupt(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown storage type: {0}")]
    UnknownBackend(String),

    #[error("Injected failure: {0}")]
    Injected(String),
}

impl StorageError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return Self::UniqueViolation(db_err.message().to_string());
            }
        }
        Self::Database(err)
    }
}

impl From<UnknownVariant> for StorageError {
    fn from(err: UnknownVariant) -> Self {
        Self::Corrupt(err.to_string())
    }
}

impl From<chrono::ParseError> for StorageError {
    fn from(err: chrono::ParseError) -> Self {
        Self::Corrupt(format!("timestamp: {}", err))
    }
}

impl From<uuid::Error> for StorageError {
    fn from(err: uuid::Error) -> Self {
        Self::Corrupt(format!("uuid: {}", err))
    }
}

/// Carts, cart items and guest-checkout audit records.
#[async_trait]
pub trait CartRepository: Send {
    /// Load a cart for mutation. The row stays exclusive until the unit of
    /// work finishes.
    async fn lock_cart(&mut self, id: Uuid) -> Result<Option<Cart>>;

    /// The open (`active` or `emailed`) cart owned by a session.
    async fn find_open_cart_by_session(&mut self, session_id: &str) -> Result<Option<Cart>>;

    /// The open (`active` or `emailed`) cart owned by a user.
    async fn find_open_cart_by_user(&mut self, user_id: Uuid) -> Result<Option<Cart>>;

    async fn insert_cart(&mut self, cart: &Cart) -> Result<()>;

    async fn update_cart(&mut self, cart: &Cart) -> Result<()>;

    /// Delete a cart together with its items and promotion links.
    async fn delete_cart(&mut self, id: Uuid) -> Result<()>;

    /// Open carts whose last activity precedes `inactive_before` or whose
    /// expiry has passed at `now`.
    async fn stale_open_carts(
        &mut self,
        inactive_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Cart>>;

    /// Items of a cart, oldest first.
    async fn cart_items(&mut self, cart_id: Uuid) -> Result<Vec<CartItem>>;

    async fn find_cart_item(
        &mut self,
        cart_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Option<CartItem>>;

    async fn insert_cart_item(&mut self, item: &CartItem) -> Result<()>;

    /// Update quantity, price capture or parent cart of an item.
    async fn update_cart_item(&mut self, item: &CartItem) -> Result<()>;

    async fn delete_cart_item(&mut self, id: Uuid) -> Result<()>;

    /// Delete items whose own expiry has passed. Returns the number removed.
    async fn delete_expired_cart_items(&mut self, now: DateTime<Utc>) -> Result<u64>;

    async fn insert_emailed_cart(&mut self, record: &EmailedCart) -> Result<()>;
}

/// Promotions, their bundle rules and cart attachments.
///
/// Returned promotions always carry their bundle rules.
#[async_trait]
pub trait PromotionRepository: Send {
    /// Case-insensitive lookup, including inactive and soft-deleted rows.
    async fn find_promotion_by_code(&mut self, code: &str) -> Result<Option<Promotion>>;

    /// Load a promotion for mutation (usage counting).
    async fn lock_promotion(&mut self, id: Uuid) -> Result<Option<Promotion>>;

    /// Bundle promotions applicable at `now`.
    async fn active_bundle_promotions(&mut self, now: DateTime<Utc>) -> Result<Vec<Promotion>>;

    /// Promotions attached to a cart, in attachment order.
    async fn cart_promotions(&mut self, cart_id: Uuid) -> Result<Vec<Promotion>>;

    async fn attach_promotion(&mut self, cart_id: Uuid, promotion_id: Uuid) -> Result<()>;

    async fn detach_promotion(&mut self, cart_id: Uuid, promotion_id: Uuid) -> Result<()>;

    /// Insert or replace a promotion and its bundle rules.
    async fn save_promotion(&mut self, promotion: &Promotion) -> Result<()>;
}

/// Read access to the catalog. Writes exist for the admin side and fixtures.
#[async_trait]
pub trait CatalogRepository: Send {
    async fn product(&mut self, id: Uuid) -> Result<Option<Product>>;

    async fn variant(&mut self, id: Uuid) -> Result<Option<ProductVariant>>;

    async fn save_product(&mut self, product: &Product) -> Result<()>;

    async fn save_variant(&mut self, variant: &ProductVariant) -> Result<()>;
}

#[async_trait]
pub trait AddressRepository: Send {
    async fn address(&mut self, id: Uuid) -> Result<Option<Address>>;

    async fn insert_address(&mut self, address: &Address) -> Result<()>;
}

#[async_trait]
pub trait OrderRepository: Send {
    async fn order(&mut self, id: Uuid) -> Result<Option<Order>>;

    async fn order_by_number(&mut self, order_number: &str) -> Result<Option<Order>>;

    async fn order_by_idempotency_key(&mut self, key: &str) -> Result<Option<Order>>;

    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool>;

    /// Insert an order with its items. Fails with `UniqueViolation` on a
    /// duplicate order number or idempotency key.
    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<()>;

    async fn update_order(&mut self, order: &Order) -> Result<()>;

    async fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>>;
}

#[async_trait]
pub trait PaymentRepository: Send {
    async fn payment_transaction_exists(&mut self, gateway_transaction_id: &str) -> Result<bool>;

    /// Append an audit record. Fails with `UniqueViolation` when the gateway
    /// transaction id was already recorded.
    async fn insert_payment_transaction(&mut self, transaction: &PaymentTransaction) -> Result<()>;

    async fn payment_transactions(&mut self, order_id: Uuid) -> Result<Vec<PaymentTransaction>>;
}

/// One transaction over every repository.
#[async_trait]
pub trait UnitOfWork:
    CartRepository
    + PromotionRepository
    + CatalogRepository
    + AddressRepository
    + OrderRepository
    + PaymentRepository
{
    /// Publish every change made through this unit of work.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard every change made through this unit of work.
    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Entry point to a storage backend.
#[async_trait]
pub trait Store: Send + Sync {
    /// Begin a unit of work, waiting for the exclusive write lease.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Commit on success, roll back on failure, and pass the result through.
pub async fn finish<T, E>(
    uow: Box<dyn UnitOfWork>,
    result: std::result::Result<T, E>,
) -> std::result::Result<T, E>
where
    E: From<StorageError>,
{
    match result {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = uow.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Arc<dyn Store>> {
    info!("Storage: {} at {}", config.storage_type, config.path);

    match config.storage_type.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            if let Some(parent) = std::path::Path::new(&config.path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteStore::connect(&format!("sqlite:{}?mode=rwc", config.path)).await?;
            store.init().await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => {
            tracing::error!("SQLite storage requested but 'sqlite' feature is not enabled");
            Err(StorageError::UnknownBackend("sqlite (feature disabled)".to_string()))
        }
        other => {
            tracing::error!("Unknown storage type: {}", other);
            Err(StorageError::UnknownBackend(other.to_string()))
        }
    }
}
