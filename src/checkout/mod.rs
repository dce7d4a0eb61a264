//! Checkout: turn an open cart into an order exactly once.
//!
//! The whole checkout runs in one unit of work holding the store's write
//! lease, so the cart status read after locking is authoritative. A losing
//! concurrent request sees the cart already checked out and gets
//! [`CheckoutError::AlreadyCheckedOut`] with the winning order id.
//! Notifications are enqueued only after the commit succeeds.

mod order_number;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cart::valid_email;
use crate::config::CheckoutConfig;
use crate::model::{
    Address, Cart, CartItem, EmailedCart, Metadata, NewAddress, Order, OrderItem, OrderStatus,
    PaymentStatus, PaymentTransaction, Promotion,
};
use crate::notify::{notify_all, NotificationKind, Notifier};
use crate::promotions::{cart_totals, matcher, stacking, PricedCart};
use crate::storage::{finish, StorageError, Store, UnitOfWork};

pub use order_number::{order_number_from_reference, OrderNumberGenerator, RandomOrderNumbers};

/// Checkout failures. Everything except `Unexpected` is a domain error the
/// caller can act on.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Cart is empty")]
    EmptyCart,

    #[error("Cart not found: {0}")]
    CartNotFound(Uuid),

    #[error("Cart {0} can no longer be checked out")]
    CartClosed(Uuid),

    #[error("Cart was already checked out into order {order_id}")]
    AlreadyCheckedOut { order_id: Uuid },

    #[error("Invalid checkout request: {0}")]
    Validation(String),

    #[error("Address not found: {0}")]
    AddressNotFound(Uuid),

    #[error("Address {0} does not belong to this customer")]
    AddressForbidden(Uuid),

    #[error("Promotion {code} is no longer valid")]
    PromotionInvalid { code: String },

    #[error("Promotion {code} has reached its usage limit")]
    PromotionUsageLimitReached { code: String },

    #[error("Promotions on this cart cannot be combined")]
    PromotionConflict,

    #[error("Could not allocate a unique order number")]
    OrderNumberExhausted,

    #[error("Unexpected error")]
    Unexpected,
}

impl CheckoutError {
    /// Stable code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyCart => "EMPTY_CART",
            Self::CartNotFound(_) => "CART_NOT_FOUND",
            Self::CartClosed(_) => "CART_CLOSED",
            Self::AlreadyCheckedOut { .. } => "ALREADY_CHECKED_OUT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::AddressNotFound(_) => "ADDRESS_NOT_FOUND",
            Self::AddressForbidden(_) => "ADDRESS_FORBIDDEN",
            Self::PromotionInvalid { .. } => "PROMOTION_INVALID",
            Self::PromotionUsageLimitReached { .. } => "USAGE_LIMIT_REACHED",
            Self::PromotionConflict => "PROMOTION_CONFLICT",
            Self::OrderNumberExhausted => "ORDER_NUMBER_EXHAUSTED",
            Self::Unexpected => "UNEXPECTED_ERROR",
        }
    }
}

impl From<StorageError> for CheckoutError {
    fn from(err: StorageError) -> Self {
        error!(error = %err, "Storage failure during checkout");
        Self::Unexpected
    }
}

/// A saved address or one entered with the checkout.
#[derive(Debug, Clone)]
pub enum AddressInput {
    Existing(Uuid),
    New(NewAddress),
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub cart_id: Uuid,
    /// Authenticated customer, if any. Saved addresses must belong to them.
    pub user_id: Option<Uuid>,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub shipping: AddressInput,
    /// Defaults to the shipping address.
    pub billing: Option<AddressInput>,
    pub installment: bool,
    pub note: Option<String>,
    pub idempotency_key: Option<String>,
}

impl CheckoutRequest {
    fn validate(&self) -> Result<(), CheckoutError> {
        let mut problems = Vec::new();
        if self.customer_name.trim().is_empty() {
            problems.push("customer_name is required".to_string());
        }
        if !valid_email(self.email.trim()) {
            problems.push("email is invalid".to_string());
        }
        if self.phone.trim().is_empty() {
            problems.push("phone is required".to_string());
        }
        if matches!(&self.idempotency_key, Some(key) if key.trim().is_empty()) {
            problems.push("idempotency_key must not be blank".to_string());
        }
        let inputs = [("shipping", Some(&self.shipping)), ("billing", self.billing.as_ref())];
        for (label, input) in inputs {
            if let Some(AddressInput::New(address)) = input {
                for field in address.missing_fields() {
                    problems.push(format!("{} {} is required", label, field));
                }
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(CheckoutError::Validation(problems.join(", ")))
        }
    }
}

/// Result of a checkout. `created` is false when the idempotency key
/// matched an earlier order.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub created: bool,
}

pub struct OrderCreator {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    config: CheckoutConfig,
    numbers: Box<dyn OrderNumberGenerator>,
}

impl OrderCreator {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, config: CheckoutConfig) -> Self {
        Self::with_generator(store, notifier, config, Box::new(RandomOrderNumbers))
    }

    pub fn with_generator(
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        config: CheckoutConfig,
        numbers: Box<dyn OrderNumberGenerator>,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
            numbers,
        }
    }

    /// Check out a cart.
    pub async fn call(&self, request: CheckoutRequest) -> Result<CheckoutOutcome, CheckoutError> {
        request.validate()?;

        let mut uow = self.store.begin().await?;
        let result = self.call_in(uow.as_mut(), &request).await;
        let outcome = match finish(uow, result).await {
            Ok(outcome) => outcome,
            Err(e) => {
                info!(cart_id = %request.cart_id, reason = e.code(), "Checkout rejected");
                return Err(e);
            }
        };

        if outcome.created {
            info!(
                order_id = %outcome.order.id,
                order_number = %outcome.order.order_number,
                cart_id = %request.cart_id,
                total = outcome.order.totals.total,
                "Order created"
            );
            notify_all(
                self.notifier.as_ref(),
                outcome.order.id,
                &[NotificationKind::OrderConfirmation, NotificationKind::AdminNewOrder],
            )
            .await;
        } else {
            info!(
                order_id = %outcome.order.id,
                cart_id = %request.cart_id,
                "Checkout replayed by idempotency key"
            );
        }
        Ok(outcome)
    }

    async fn call_in(
        &self,
        uow: &mut dyn UnitOfWork,
        request: &CheckoutRequest,
    ) -> Result<CheckoutOutcome, CheckoutError> {
        let now = Utc::now();

        if let Some(key) = &request.idempotency_key {
            if let Some(order) = uow.order_by_idempotency_key(key.trim()).await? {
                let items = uow.order_items(order.id).await?;
                return Ok(CheckoutOutcome {
                    order,
                    items,
                    created: false,
                });
            }
        }

        let mut cart = uow
            .lock_cart(request.cart_id)
            .await?
            .ok_or(CheckoutError::CartNotFound(request.cart_id))?;
        if let Some(order_id) = cart.checked_out_order_id() {
            return Err(CheckoutError::AlreadyCheckedOut { order_id });
        }
        if !cart.is_open() {
            return Err(CheckoutError::CartClosed(cart.id));
        }
        if cart.user_id.is_some() && cart.user_id != request.user_id {
            return Err(CheckoutError::CartNotFound(cart.id));
        }

        let items = uow.cart_items(cart.id).await?;
        if items.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let shipping_address = self
            .resolve_address(uow, &request.shipping, request.user_id, &cart, now)
            .await?;
        let billing_address = match &request.billing {
            Some(input) => self.resolve_address(uow, input, request.user_id, &cart, now).await?,
            None => shipping_address.clone(),
        };

        let order_number = self.allocate_order_number(uow, now).await?;
        let promotions = redeem_promotions(uow, &cart, &items, now).await?;
        let PricedCart { totals, applied } = cart_totals(&items, &promotions, &self.config);

        let order = Order {
            id: Uuid::new_v4(),
            order_number,
            cart_id: cart.id,
            user_id: request.user_id,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            installment: request.installment,
            customer_name: request.customer_name.trim().to_string(),
            email: request.email.trim().to_string(),
            phone: request.phone.trim().to_string(),
            shipping_address,
            billing_address,
            note: request
                .note
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            currency: self.config.currency.clone(),
            totals,
            applied_promotions: applied,
            idempotency_key: request.idempotency_key.as_deref().map(|k| k.trim().to_string()),
            metadata: Metadata::new(),
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        let order_items: Vec<OrderItem> = items
            .iter()
            .map(|item| OrderItem::snapshot(order.id, item))
            .collect();
        uow.insert_order(&order, &order_items).await?;

        cart.mark_checked_out(order.id, now);
        uow.update_cart(&cart).await?;

        if let (None, Some(email)) = (request.user_id, cart.guest_email.clone()) {
            uow.insert_emailed_cart(&EmailedCart {
                id: Uuid::new_v4(),
                cart_id: cart.id,
                email,
                order_id: Some(order.id),
                created_at: now,
            })
            .await?;
        }

        Ok(CheckoutOutcome {
            order,
            items: order_items,
            created: true,
        })
    }

    async fn resolve_address(
        &self,
        uow: &mut dyn UnitOfWork,
        input: &AddressInput,
        user_id: Option<Uuid>,
        cart: &Cart,
        now: DateTime<Utc>,
    ) -> Result<Address, CheckoutError> {
        match input {
            AddressInput::Existing(id) => {
                let address = uow.address(*id).await?.ok_or(CheckoutError::AddressNotFound(*id))?;
                let owned = match user_id {
                    Some(user_id) => address.user_id == Some(user_id),
                    None => address.user_id.is_none() && address.cart_id == Some(cart.id),
                };
                if !owned {
                    warn!(
                        address_id = %id,
                        cart_id = %cart.id,
                        "Checkout referenced a foreign address"
                    );
                    return Err(CheckoutError::AddressForbidden(*id));
                }
                Ok(address)
            }
            AddressInput::New(fields) => {
                let address = fields.clone().into_address(user_id, Some(cart.id), now);
                uow.insert_address(&address).await?;
                Ok(address)
            }
        }
    }

    async fn allocate_order_number(
        &self,
        uow: &mut dyn UnitOfWork,
        now: DateTime<Utc>,
    ) -> Result<String, CheckoutError> {
        for attempt in 1..=self.config.max_order_number_attempts {
            let candidate = self.numbers.generate(&self.config.order_number_prefix, now);
            if !uow.order_number_exists(&candidate).await? {
                return Ok(candidate);
            }
            warn!(order_number = %candidate, attempt, "Order number collision");
        }
        Err(CheckoutError::OrderNumberExhausted)
    }

    /// Look up an order by its public number.
    pub async fn find_by_number(&self, order_number: &str) -> Result<Option<Order>, CheckoutError> {
        let mut uow = self.store.begin().await?;
        let result = uow.order_by_number(order_number.trim()).await.map_err(CheckoutError::from);
        finish(uow, result).await
    }

    pub async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, CheckoutError> {
        let mut uow = self.store.begin().await?;
        let result = uow.order_items(order_id).await.map_err(CheckoutError::from);
        finish(uow, result).await
    }

    /// Gateway responses recorded for an order, oldest first.
    pub async fn payment_transactions(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<PaymentTransaction>, CheckoutError> {
        let mut uow = self.store.begin().await?;
        let result = uow.payment_transactions(order_id).await.map_err(CheckoutError::from);
        finish(uow, result).await
    }
}

/// Re-validate every promotion on the cart and count one use of each.
///
/// All-or-nothing: any invalid promotion, or a non-stackable one next to
/// another, fails the checkout before any usage is counted.
async fn redeem_promotions(
    uow: &mut dyn UnitOfWork,
    cart: &Cart,
    items: &[CartItem],
    now: DateTime<Utc>,
) -> Result<Vec<Promotion>, CheckoutError> {
    let mut locked = Vec::new();
    for attached in uow.cart_promotions(cart.id).await? {
        let promotion = uow
            .lock_promotion(attached.id)
            .await?
            .ok_or_else(|| CheckoutError::PromotionInvalid {
                code: attached.code.clone(),
            })?;
        // Read under the lock, so a concurrent redemption is already counted.
        if promotion.used_up() {
            return Err(CheckoutError::PromotionUsageLimitReached { code: promotion.code });
        }
        let valid = promotion.applies_now(now)
            && (!promotion.is_bundle() || matcher::applicable(&promotion, items));
        if !valid {
            return Err(CheckoutError::PromotionInvalid { code: promotion.code });
        }
        locked.push(promotion);
    }

    if !stacking::compatible(&locked) {
        return Err(CheckoutError::PromotionConflict);
    }

    for promotion in &mut locked {
        promotion.usage_count = promotion.usage_count.saturating_add(1);
        uow.save_promotion(promotion).await?;
    }
    Ok(locked)
}
