//! In-memory storage backend.
//!
//! Units of work are serialised through one owned async mutex guard: a unit
//! of work stages its writes on a copy of the state and publishes the copy on
//! commit. Used for local development and as the reference backend in tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{
    AddressRepository, CartRepository, CatalogRepository, OrderRepository, PaymentRepository,
    PromotionRepository, Result, StorageError, Store, UnitOfWork,
};
use crate::model::{
    Address, Cart, CartItem, EmailedCart, Order, OrderItem, PaymentTransaction, Product,
    ProductVariant, Promotion,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    carts: HashMap<Uuid, Cart>,
    cart_items: HashMap<Uuid, CartItem>,
    promotions: HashMap<Uuid, Promotion>,
    /// (cart_id, promotion_id) in attachment order.
    cart_promotions: Vec<(Uuid, Uuid)>,
    products: HashMap<Uuid, Product>,
    variants: HashMap<Uuid, ProductVariant>,
    addresses: HashMap<Uuid, Address>,
    orders: HashMap<Uuid, Order>,
    order_items: Vec<OrderItem>,
    payment_transactions: Vec<PaymentTransaction>,
    emailed_carts: Vec<EmailedCart>,
}

impl MemoryState {
    fn open_cart_conflict(&self, cart: &Cart) -> Option<String> {
        if !cart.is_open() {
            return None;
        }
        self.carts
            .values()
            .filter(|other| other.id != cart.id && other.is_open())
            .find_map(|other| {
                if cart.user_id.is_some() && other.user_id == cart.user_id {
                    Some(format!("open cart already exists for user {:?}", cart.user_id))
                } else if cart.session_id.is_some() && other.session_id == cart.session_id {
                    Some(format!("open cart already exists for session {:?}", cart.session_id))
                } else {
                    None
                }
            })
    }
}

/// Failure injection for tests.
#[derive(Debug, Default)]
struct Faults {
    /// `payment_transaction_exists` always answers `false`, as a read that
    /// raced a concurrent writer would.
    stale_duplicate_checks: bool,
    /// `attach_promotion` fails for these promotion ids.
    fail_attach: HashSet<Uuid>,
}

/// In-memory store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<RwLock<Faults>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the duplicate-transaction pre-check miss existing rows, so only
    /// the unique constraint guards idempotency.
    pub async fn set_stale_duplicate_checks(&self, stale: bool) {
        self.faults.write().await.stale_duplicate_checks = stale;
    }

    /// Make attaching the given promotion fail.
    pub async fn set_fail_attach(&self, promotion_id: Uuid, fail: bool) {
        let mut faults = self.faults.write().await;
        if fail {
            faults.fail_attach.insert(promotion_id);
        } else {
            faults.fail_attach.remove(&promotion_id);
        }
    }

    /// Committed emailed-cart audit rows.
    pub async fn emailed_carts(&self) -> Vec<EmailedCart> {
        self.state.lock().await.emailed_carts.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged,
            faults: self.faults.clone(),
        }))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Unit of work over the in-memory state. Holding the guard is the lease.
pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    faults: Arc<RwLock<Faults>>,
}

#[async_trait]
impl CartRepository for MemoryUnitOfWork {
    async fn lock_cart(&mut self, id: Uuid) -> Result<Option<Cart>> {
        Ok(self.staged.carts.get(&id).cloned())
    }

    async fn find_open_cart_by_session(&mut self, session_id: &str) -> Result<Option<Cart>> {
        Ok(self
            .staged
            .carts
            .values()
            .find(|c| c.is_open() && c.session_id.as_deref() == Some(session_id))
            .cloned())
    }

    async fn find_open_cart_by_user(&mut self, user_id: Uuid) -> Result<Option<Cart>> {
        Ok(self
            .staged
            .carts
            .values()
            .find(|c| c.is_open() && c.user_id == Some(user_id))
            .cloned())
    }

    async fn insert_cart(&mut self, cart: &Cart) -> Result<()> {
        if self.staged.carts.contains_key(&cart.id) {
            return Err(StorageError::UniqueViolation(format!("cart {}", cart.id)));
        }
        if let Some(conflict) = self.staged.open_cart_conflict(cart) {
            return Err(StorageError::UniqueViolation(conflict));
        }
        self.staged.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn update_cart(&mut self, cart: &Cart) -> Result<()> {
        if !self.staged.carts.contains_key(&cart.id) {
            return Err(StorageError::NotFound {
                entity: "cart",
                id: cart.id.to_string(),
            });
        }
        if let Some(conflict) = self.staged.open_cart_conflict(cart) {
            return Err(StorageError::UniqueViolation(conflict));
        }
        self.staged.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn delete_cart(&mut self, id: Uuid) -> Result<()> {
        self.staged.carts.remove(&id);
        self.staged.cart_items.retain(|_, item| item.cart_id != id);
        self.staged.cart_promotions.retain(|(cart_id, _)| *cart_id != id);
        Ok(())
    }

    async fn stale_open_carts(
        &mut self,
        inactive_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Cart>> {
        let mut carts: Vec<Cart> = self
            .staged
            .carts
            .values()
            .filter(|c| {
                c.is_open() && (c.last_activity_at < inactive_before || c.expires_at <= now)
            })
            .cloned()
            .collect();
        carts.sort_by_key(|c| c.last_activity_at);
        Ok(carts)
    }

    async fn cart_items(&mut self, cart_id: Uuid) -> Result<Vec<CartItem>> {
        let mut items: Vec<CartItem> = self
            .staged
            .cart_items
            .values()
            .filter(|item| item.cart_id == cart_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn find_cart_item(
        &mut self,
        cart_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Option<CartItem>> {
        Ok(self
            .staged
            .cart_items
            .values()
            .find(|item| {
                item.cart_id == cart_id
                    && item.product_id == product_id
                    && item.variant_id == variant_id
            })
            .cloned())
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> Result<()> {
        let duplicate = self.staged.cart_items.values().any(|existing| {
            existing.id == item.id || (existing.cart_id == item.cart_id && existing.same_line(item))
        });
        if duplicate {
            return Err(StorageError::UniqueViolation(format!(
                "cart item ({}, {}, {:?})",
                item.cart_id, item.product_id, item.variant_id
            )));
        }
        self.staged.cart_items.insert(item.id, item.clone());
        Ok(())
    }

    async fn update_cart_item(&mut self, item: &CartItem) -> Result<()> {
        if !self.staged.cart_items.contains_key(&item.id) {
            return Err(StorageError::NotFound {
                entity: "cart item",
                id: item.id.to_string(),
            });
        }
        let duplicate = self.staged.cart_items.values().any(|existing| {
            existing.id != item.id && existing.cart_id == item.cart_id && existing.same_line(item)
        });
        if duplicate {
            return Err(StorageError::UniqueViolation(format!(
                "cart item ({}, {}, {:?})",
                item.cart_id, item.product_id, item.variant_id
            )));
        }
        self.staged.cart_items.insert(item.id, item.clone());
        Ok(())
    }

    async fn delete_cart_item(&mut self, id: Uuid) -> Result<()> {
        self.staged.cart_items.remove(&id);
        Ok(())
    }

    async fn delete_expired_cart_items(&mut self, now: DateTime<Utc>) -> Result<u64> {
        let before = self.staged.cart_items.len();
        self.staged.cart_items.retain(|_, item| item.expires_at > now);
        Ok((before - self.staged.cart_items.len()) as u64)
    }

    async fn insert_emailed_cart(&mut self, record: &EmailedCart) -> Result<()> {
        self.staged.emailed_carts.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl PromotionRepository for MemoryUnitOfWork {
    async fn find_promotion_by_code(&mut self, code: &str) -> Result<Option<Promotion>> {
        Ok(self
            .staged
            .promotions
            .values()
            .find(|p| p.matches_code(code))
            .cloned())
    }

    async fn lock_promotion(&mut self, id: Uuid) -> Result<Option<Promotion>> {
        Ok(self.staged.promotions.get(&id).cloned())
    }

    async fn active_bundle_promotions(&mut self, now: DateTime<Utc>) -> Result<Vec<Promotion>> {
        let mut promotions: Vec<Promotion> = self
            .staged
            .promotions
            .values()
            .filter(|p| p.is_bundle() && p.applies_now(now))
            .cloned()
            .collect();
        promotions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(promotions)
    }

    async fn cart_promotions(&mut self, cart_id: Uuid) -> Result<Vec<Promotion>> {
        Ok(self
            .staged
            .cart_promotions
            .iter()
            .filter(|(c, _)| *c == cart_id)
            .filter_map(|(_, promotion_id)| self.staged.promotions.get(promotion_id))
            .cloned()
            .collect())
    }

    async fn attach_promotion(&mut self, cart_id: Uuid, promotion_id: Uuid) -> Result<()> {
        if self.faults.read().await.fail_attach.contains(&promotion_id) {
            return Err(StorageError::Injected(format!("attach {}", promotion_id)));
        }
        if !self.staged.promotions.contains_key(&promotion_id) {
            return Err(StorageError::NotFound {
                entity: "promotion",
                id: promotion_id.to_string(),
            });
        }
        let link = (cart_id, promotion_id);
        if !self.staged.cart_promotions.contains(&link) {
            self.staged.cart_promotions.push(link);
        }
        Ok(())
    }

    async fn detach_promotion(&mut self, cart_id: Uuid, promotion_id: Uuid) -> Result<()> {
        self.staged
            .cart_promotions
            .retain(|link| *link != (cart_id, promotion_id));
        Ok(())
    }

    async fn save_promotion(&mut self, promotion: &Promotion) -> Result<()> {
        let code_taken = self
            .staged
            .promotions
            .values()
            .any(|p| p.id != promotion.id && p.matches_code(&promotion.code));
        if code_taken {
            return Err(StorageError::UniqueViolation(format!(
                "promotion code {}",
                promotion.code
            )));
        }
        self.staged.promotions.insert(promotion.id, promotion.clone());
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for MemoryUnitOfWork {
    async fn product(&mut self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.staged.products.get(&id).cloned())
    }

    async fn variant(&mut self, id: Uuid) -> Result<Option<ProductVariant>> {
        Ok(self.staged.variants.get(&id).cloned())
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        self.staged.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn save_variant(&mut self, variant: &ProductVariant) -> Result<()> {
        self.staged.variants.insert(variant.id, variant.clone());
        Ok(())
    }
}

#[async_trait]
impl AddressRepository for MemoryUnitOfWork {
    async fn address(&mut self, id: Uuid) -> Result<Option<Address>> {
        Ok(self.staged.addresses.get(&id).cloned())
    }

    async fn insert_address(&mut self, address: &Address) -> Result<()> {
        self.staged.addresses.insert(address.id, address.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryUnitOfWork {
    async fn order(&mut self, id: Uuid) -> Result<Option<Order>> {
        Ok(self.staged.orders.get(&id).cloned())
    }

    async fn order_by_number(&mut self, order_number: &str) -> Result<Option<Order>> {
        Ok(self
            .staged
            .orders
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn order_by_idempotency_key(&mut self, key: &str) -> Result<Option<Order>> {
        Ok(self
            .staged
            .orders
            .values()
            .find(|o| o.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool> {
        Ok(self
            .staged
            .orders
            .values()
            .any(|o| o.order_number == order_number))
    }

    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<()> {
        for existing in self.staged.orders.values() {
            if existing.order_number == order.order_number {
                return Err(StorageError::UniqueViolation(format!(
                    "order number {}",
                    order.order_number
                )));
            }
            if order.idempotency_key.is_some()
                && existing.idempotency_key == order.idempotency_key
            {
                return Err(StorageError::UniqueViolation(format!(
                    "idempotency key {:?}",
                    order.idempotency_key
                )));
            }
        }
        self.staged.orders.insert(order.id, order.clone());
        self.staged.order_items.extend(items.iter().cloned());
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        if !self.staged.orders.contains_key(&order.id) {
            return Err(StorageError::NotFound {
                entity: "order",
                id: order.id.to_string(),
            });
        }
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        Ok(self
            .staged
            .order_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl PaymentRepository for MemoryUnitOfWork {
    async fn payment_transaction_exists(&mut self, gateway_transaction_id: &str) -> Result<bool> {
        if self.faults.read().await.stale_duplicate_checks {
            return Ok(false);
        }
        Ok(self
            .staged
            .payment_transactions
            .iter()
            .any(|t| t.gateway_transaction_id.as_deref() == Some(gateway_transaction_id)))
    }

    async fn insert_payment_transaction(&mut self, transaction: &PaymentTransaction) -> Result<()> {
        if let Some(gateway_id) = transaction.gateway_transaction_id.as_deref() {
            let duplicate = self
                .staged
                .payment_transactions
                .iter()
                .any(|t| t.gateway_transaction_id.as_deref() == Some(gateway_id));
            if duplicate {
                return Err(StorageError::UniqueViolation(format!(
                    "gateway transaction {}",
                    gateway_id
                )));
            }
        }
        self.staged.payment_transactions.push(transaction.clone());
        Ok(())
    }

    async fn payment_transactions(&mut self, order_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        Ok(self
            .staged
            .payment_transactions
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
