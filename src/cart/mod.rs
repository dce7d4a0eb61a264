//! Cart lifecycle: lookup, claiming, item mutation, merging and expiry.
//!
//! Every operation runs in one unit of work. Mutations bump the cart's last
//! activity and re-evaluate bundle promotions before committing.

mod auto_apply;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::CartConfig;
use crate::model::{Cart, CartItem, CartStatus};
use crate::storage::{finish, StorageError, Store, UnitOfWork};

pub use auto_apply::{apply_bundles, AutoApplyFailure, AutoApplyReport};

/// Cart operation errors.
#[derive(Debug, thiserror::Error)]
pub enum CartError {
    #[error("A session id or user id is required")]
    MissingIdentity,

    #[error("Cart not found: {0}")]
    CartNotFound(Uuid),

    #[error("Cart {id} is {status} and cannot be changed")]
    CartClosed { id: Uuid, status: CartStatus },

    #[error("Cannot merge a cart into itself")]
    SameCart,

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Product is not active: {0}")]
    ProductInactive(Uuid),

    #[error("Product is not yet available: {0}")]
    ProductUnavailable(Uuid),

    #[error("Variant not found: {0}")]
    VariantNotFound(Uuid),

    #[error("Variant {variant_id} does not belong to product {product_id}")]
    VariantMismatch { variant_id: Uuid, product_id: Uuid },

    #[error("Variant is not active: {0}")]
    VariantInactive(Uuid),

    #[error("Quantity must be between 1 and {max}", max = u32::MAX)]
    InvalidQuantity,

    #[error("Cart item {item_id} not found in cart {cart_id}")]
    ItemNotFound { cart_id: Uuid, item_id: Uuid },

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Unexpected error")]
    Unexpected,
}

impl From<StorageError> for CartError {
    fn from(err: StorageError) -> Self {
        error!(error = %err, "Storage failure during cart operation");
        Self::Unexpected
    }
}

/// An added line and the bundle pass that followed it.
#[derive(Debug, Clone)]
pub struct ItemAdded {
    pub item: CartItem,
    pub auto_apply: AutoApplyReport,
}

/// The line after a quantity change; `None` when it was removed.
#[derive(Debug, Clone)]
pub struct ItemUpdated {
    pub item: Option<CartItem>,
    pub auto_apply: AutoApplyReport,
}

#[derive(Debug, Clone)]
pub struct Merged {
    pub cart: Cart,
    pub auto_apply: AutoApplyReport,
}

/// Outcome of an expiry sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_carts: usize,
    pub removed_items: u64,
}

pub struct CartLifecycleManager {
    store: Arc<dyn Store>,
    config: CartConfig,
}

impl CartLifecycleManager {
    pub fn new(store: Arc<dyn Store>, config: CartConfig) -> Self {
        Self { store, config }
    }

    /// Resolve the open cart for a session and/or user, creating one if none
    /// exists.
    ///
    /// A distinct session cart is merged into the user's cart; an unowned
    /// session cart is claimed by the user.
    pub async fn find_or_create(
        &self,
        session_id: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<Cart, CartError> {
        let session_id = session_id.map(str::trim).filter(|s| !s.is_empty());
        if session_id.is_none() && user_id.is_none() {
            return Err(CartError::MissingIdentity);
        }

        let mut uow = self.store.begin().await?;
        let result = self.find_or_create_in(uow.as_mut(), session_id, user_id).await;
        finish(uow, result).await
    }

    async fn find_or_create_in(
        &self,
        uow: &mut dyn UnitOfWork,
        session_id: Option<&str>,
        user_id: Option<Uuid>,
    ) -> Result<Cart, CartError> {
        let now = Utc::now();
        let session_cart = match session_id {
            Some(session_id) => uow.find_open_cart_by_session(session_id).await?,
            None => None,
        };
        let user_cart = match user_id {
            Some(user_id) => uow.find_open_cart_by_user(user_id).await?,
            None => None,
        };
        // A session cart owned by another user keeps the session id.
        let new_session = if session_cart.is_some() { None } else { session_id };

        match (session_cart, user_cart, user_id) {
            (Some(session_cart), Some(mut user_cart), _) if session_cart.id != user_cart.id => {
                info!(
                    source = %session_cart.id,
                    target = %user_cart.id,
                    "Merging session cart into user cart"
                );
                self.merge_in(uow, &mut user_cart, session_cart, now).await?;
                Ok(user_cart)
            }
            (Some(mut cart), None, Some(user_id))
                if cart.user_id.map_or(true, |owner| owner == user_id) =>
            {
                cart.claim(user_id, now);
                uow.update_cart(&cart).await?;
                info!(cart_id = %cart.id, %user_id, "Session cart claimed by user");
                Ok(cart)
            }
            (Some(mut cart), _, None) | (_, Some(mut cart), _) => {
                cart.touch(now);
                uow.update_cart(&cart).await?;
                Ok(cart)
            }
            _ => {
                let cart = Cart::new(new_session, user_id, now, self.config.ttl());
                uow.insert_cart(&cart).await?;
                info!(cart_id = %cart.id, "Cart created");
                Ok(cart)
            }
        }
    }

    /// Add `quantity` of a product (optionally a specific variant) to a cart.
    ///
    /// Re-adding an existing line increments it and refreshes its captured
    /// price. Bundle failures are reported, not returned as errors.
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: u32,
    ) -> Result<ItemAdded, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity);
        }
        let mut uow = self.store.begin().await?;
        let result = self
            .add_item_in(uow.as_mut(), cart_id, product_id, variant_id, quantity)
            .await;
        let result = finish(uow, result).await;

        if let Ok(added) = &result {
            info!(
                %cart_id,
                item_id = %added.item.id,
                quantity = added.item.quantity,
                "Cart item added"
            );
        }
        result
    }

    async fn add_item_in(
        &self,
        uow: &mut dyn UnitOfWork,
        cart_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
        quantity: u32,
    ) -> Result<ItemAdded, CartError> {
        let now = Utc::now();
        let mut cart = open_cart(uow, cart_id).await?;

        let product = uow
            .product(product_id)
            .await?
            .ok_or(CartError::ProductNotFound(product_id))?;
        if !product.is_active() {
            return Err(CartError::ProductInactive(product_id));
        }
        if product.coming_soon {
            return Err(CartError::ProductUnavailable(product_id));
        }
        let variant = match variant_id {
            Some(variant_id) => {
                let variant = uow
                    .variant(variant_id)
                    .await?
                    .ok_or(CartError::VariantNotFound(variant_id))?;
                if variant.product_id != product_id {
                    return Err(CartError::VariantMismatch { variant_id, product_id });
                }
                if !variant.active {
                    return Err(CartError::VariantInactive(variant_id));
                }
                Some(variant)
            }
            None => None,
        };

        let unit_price = variant.as_ref().and_then(|v| v.price).unwrap_or(product.price);
        let original_unit_price = variant
            .as_ref()
            .and_then(|v| v.original_price)
            .unwrap_or(product.original_price);
        let expires_at = now + self.config.item_ttl();

        let item = match uow.find_cart_item(cart_id, product_id, variant_id).await? {
            Some(mut item) => {
                item.quantity = item
                    .quantity
                    .checked_add(quantity)
                    .ok_or(CartError::InvalidQuantity)?;
                item.unit_price = unit_price;
                item.original_unit_price = original_unit_price;
                item.expires_at = expires_at;
                item.updated_at = now;
                uow.update_cart_item(&item).await?;
                item
            }
            None => {
                let item = CartItem {
                    id: Uuid::new_v4(),
                    cart_id,
                    product_id,
                    variant_id,
                    quantity,
                    unit_price,
                    original_unit_price,
                    currency: product.currency.clone(),
                    product_name: product.name.clone(),
                    variant_name: variant.as_ref().map(|v| v.name.clone()),
                    image_url: variant
                        .as_ref()
                        .and_then(|v| v.image_url.clone())
                        .or_else(|| product.image_url.clone()),
                    expires_at,
                    created_at: now,
                    updated_at: now,
                };
                uow.insert_cart_item(&item).await?;
                item
            }
        };

        cart.touch(now);
        uow.update_cart(&cart).await?;
        let auto_apply = apply_bundles(uow, &cart, now).await?;
        Ok(ItemAdded { item, auto_apply })
    }

    /// Set a line's quantity. Zero or less removes the line.
    pub async fn update_quantity(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: i64,
    ) -> Result<ItemUpdated, CartError> {
        let quantity = if quantity <= 0 {
            None
        } else {
            Some(u32::try_from(quantity).map_err(|_| CartError::InvalidQuantity)?)
        };

        let mut uow = self.store.begin().await?;
        let result = self.update_quantity_in(uow.as_mut(), cart_id, item_id, quantity).await;
        let result = finish(uow, result).await;

        if result.is_ok() {
            info!(%cart_id, %item_id, ?quantity, "Cart item quantity updated");
        }
        result
    }

    /// Remove a line from a cart.
    pub async fn remove_item(
        &self,
        cart_id: Uuid,
        item_id: Uuid,
    ) -> Result<AutoApplyReport, CartError> {
        let mut uow = self.store.begin().await?;
        let result = self.update_quantity_in(uow.as_mut(), cart_id, item_id, None).await;
        let result = finish(uow, result).await;

        if result.is_ok() {
            info!(%cart_id, %item_id, "Cart item removed");
        }
        result.map(|updated| updated.auto_apply)
    }

    async fn update_quantity_in(
        &self,
        uow: &mut dyn UnitOfWork,
        cart_id: Uuid,
        item_id: Uuid,
        quantity: Option<u32>,
    ) -> Result<ItemUpdated, CartError> {
        let now = Utc::now();
        let mut cart = open_cart(uow, cart_id).await?;

        let mut item = uow
            .cart_items(cart_id)
            .await?
            .into_iter()
            .find(|item| item.id == item_id)
            .ok_or(CartError::ItemNotFound { cart_id, item_id })?;

        let item = match quantity {
            Some(quantity) => {
                item.quantity = quantity;
                item.expires_at = now + self.config.item_ttl();
                item.updated_at = now;
                uow.update_cart_item(&item).await?;
                Some(item)
            }
            None => {
                uow.delete_cart_item(item_id).await?;
                None
            }
        };

        cart.touch(now);
        uow.update_cart(&cart).await?;
        let auto_apply = apply_bundles(uow, &cart, now).await?;
        Ok(ItemUpdated { item, auto_apply })
    }

    /// Merge `source` into `target`.
    ///
    /// Equivalent lines are summed, the rest move to the target. An emailed
    /// source is kept as `merged` for the recovery audit trail; any other
    /// source is deleted. Merging an already merged source is a no-op.
    pub async fn merge(&self, target_id: Uuid, source_id: Uuid) -> Result<Merged, CartError> {
        if target_id == source_id {
            return Err(CartError::SameCart);
        }

        let mut uow = self.store.begin().await?;
        let result = self.merge_by_id(uow.as_mut(), target_id, source_id).await;
        finish(uow, result).await
    }

    async fn merge_by_id(
        &self,
        uow: &mut dyn UnitOfWork,
        target_id: Uuid,
        source_id: Uuid,
    ) -> Result<Merged, CartError> {
        let now = Utc::now();
        let mut target = open_cart(uow, target_id).await?;
        let source = uow
            .lock_cart(source_id)
            .await?
            .ok_or(CartError::CartNotFound(source_id))?;

        if source.status == CartStatus::Merged {
            return Ok(Merged {
                cart: target,
                auto_apply: AutoApplyReport::default(),
            });
        }
        if !source.is_open() {
            return Err(CartError::CartClosed {
                id: source.id,
                status: source.status,
            });
        }

        let auto_apply = self.merge_in(uow, &mut target, source, now).await?;
        info!(target = %target_id, source = %source_id, "Carts merged");
        Ok(Merged {
            cart: target,
            auto_apply,
        })
    }

    async fn merge_in(
        &self,
        uow: &mut dyn UnitOfWork,
        target: &mut Cart,
        mut source: Cart,
        now: DateTime<Utc>,
    ) -> Result<AutoApplyReport, CartError> {
        if target.id == source.id {
            return Err(CartError::SameCart);
        }

        for mut item in uow.cart_items(source.id).await? {
            match uow.find_cart_item(target.id, item.product_id, item.variant_id).await? {
                Some(mut existing) => {
                    existing.quantity = existing.quantity.saturating_add(item.quantity);
                    existing.expires_at = existing.expires_at.max(item.expires_at);
                    existing.updated_at = now;
                    uow.update_cart_item(&existing).await?;
                    uow.delete_cart_item(item.id).await?;
                }
                None => {
                    item.cart_id = target.id;
                    item.updated_at = now;
                    uow.update_cart_item(&item).await?;
                }
            }
        }

        for promotion in uow.cart_promotions(source.id).await? {
            uow.detach_promotion(source.id, promotion.id).await?;
        }

        if source.status == CartStatus::Emailed {
            source.status = CartStatus::Merged;
            source.updated_at = now;
            uow.update_cart(&source).await?;
        } else {
            uow.delete_cart(source.id).await?;
        }

        target.touch(now);
        uow.update_cart(target).await?;
        Ok(apply_bundles(uow, target, now).await?)
    }

    /// Re-evaluate bundle promotions for a cart in its own unit of work.
    pub async fn auto_apply_bundle_promotions(
        &self,
        cart_id: Uuid,
    ) -> Result<AutoApplyReport, CartError> {
        let mut uow = self.store.begin().await?;
        let result: Result<AutoApplyReport, CartError> = async {
            let cart = open_cart(uow.as_mut(), cart_id).await?;
            Ok(apply_bundles(uow.as_mut(), &cart, Utc::now()).await?)
        }
        .await;
        let report = finish(uow, result).await?;

        if !report.is_success() {
            warn!(%cart_id, failures = report.errors.len(), "Bundle promotion pass had failures");
        }
        Ok(report)
    }

    /// Record the email a guest will check out with.
    pub async fn set_guest_email(&self, cart_id: Uuid, email: &str) -> Result<Cart, CartError> {
        let email = email.trim();
        if !valid_email(email) {
            return Err(CartError::InvalidEmail);
        }

        let mut uow = self.store.begin().await?;
        let result: Result<Cart, CartError> = async {
            let mut cart = open_cart(uow.as_mut(), cart_id).await?;
            cart.guest_email = Some(email.to_string());
            cart.touch(Utc::now());
            uow.update_cart(&cart).await?;
            Ok(cart)
        }
        .await;
        finish(uow, result).await
    }

    /// Flag an active cart as having been sent a recovery email. The cart
    /// stays open.
    pub async fn mark_emailed(&self, cart_id: Uuid) -> Result<Cart, CartError> {
        let mut uow = self.store.begin().await?;
        let result: Result<Cart, CartError> = async {
            let mut cart = open_cart(uow.as_mut(), cart_id).await?;
            if cart.status == CartStatus::Active {
                cart.status = CartStatus::Emailed;
                cart.updated_at = Utc::now();
                uow.update_cart(&cart).await?;
                info!(%cart_id, "Cart marked emailed");
            }
            Ok(cart)
        }
        .await;
        finish(uow, result).await
    }

    /// Delete expired lines and expire open carts idle past the inactivity
    /// window or past their own expiry.
    pub async fn expire_inactive(&self, now: DateTime<Utc>) -> Result<SweepReport, CartError> {
        let inactive_before = now - self.config.inactivity();
        let mut uow = self.store.begin().await?;
        let result: Result<SweepReport, CartError> = async {
            let removed_items = uow.delete_expired_cart_items(now).await?;
            let stale = uow.stale_open_carts(inactive_before, now).await?;
            for mut cart in stale.iter().cloned() {
                cart.status = CartStatus::Expired;
                cart.updated_at = now;
                uow.update_cart(&cart).await?;
            }
            Ok(SweepReport {
                expired_carts: stale.len(),
                removed_items,
            })
        }
        .await;
        let report = finish(uow, result).await?;

        info!(
            expired_carts = report.expired_carts,
            removed_items = report.removed_items,
            "Cart expiry sweep complete"
        );
        Ok(report)
    }
}

async fn open_cart(uow: &mut dyn UnitOfWork, cart_id: Uuid) -> Result<Cart, CartError> {
    let cart = uow.lock_cart(cart_id).await?.ok_or(CartError::CartNotFound(cart_id))?;
    if !cart.is_open() {
        return Err(CartError::CartClosed {
            id: cart.id,
            status: cart.status,
        });
    }
    Ok(cart)
}

/// Minimal shape check: a non-empty local part and a dotted domain.
pub(crate) fn valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests;
