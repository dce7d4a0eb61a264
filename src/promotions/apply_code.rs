//! User-entered promotion codes.
//!
//! Bundle promotions are attached automatically by the cart; this service
//! handles every other discount type. Each call runs in one unit of work, so
//! the promotion row read for the usage-limit check cannot change before the
//! attach commits.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cart::apply_bundles;
use crate::config::CheckoutConfig;
use crate::model::{Cart, Promotion};
use crate::storage::{finish, StorageError, Store, UnitOfWork};

use super::pricing::{cart_totals, PricedCart};
use super::stacking;

/// Reasons a code cannot be applied or removed.
#[derive(Debug, thiserror::Error)]
pub enum PromotionCodeError {
    #[error("Promotion code not found")]
    NotFound,

    #[error("Promotion is not active")]
    Inactive,

    #[error("Promotion usage limit reached")]
    UsageLimitReached,

    #[error("Promotion is already applied to this cart")]
    AlreadyApplied,

    #[error("Promotion cannot be combined with the promotions on this cart")]
    NotStackable,

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Unexpected error")]
    Unexpected,
}

impl PromotionCodeError {
    /// Stable code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Inactive => "INACTIVE",
            Self::UsageLimitReached => "USAGE_LIMIT_REACHED",
            Self::AlreadyApplied => "ALREADY_APPLIED",
            Self::NotStackable => "NOT_STACKABLE",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Unexpected => "UNEXPECTED_ERROR",
        }
    }
}

impl From<StorageError> for PromotionCodeError {
    fn from(err: StorageError) -> Self {
        error!(error = %err, "Storage failure while handling promotion code");
        Self::Unexpected
    }
}

/// Result of a successful apply or remove.
#[derive(Debug, Clone)]
pub struct CodeResult {
    pub promotion: Promotion,
    /// Promotions on the cart after the change, in attachment order.
    pub promotions: Vec<Promotion>,
    pub priced: PricedCart,
}

pub struct PromotionCodeService {
    store: Arc<dyn Store>,
    checkout: CheckoutConfig,
}

impl PromotionCodeService {
    pub fn new(store: Arc<dyn Store>, checkout: CheckoutConfig) -> Self {
        Self { store, checkout }
    }

    /// Attach the promotion named by `code` to a cart.
    pub async fn apply(&self, cart_id: Uuid, code: &str) -> Result<CodeResult, PromotionCodeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(PromotionCodeError::Validation("promotion code is required".to_string()));
        }

        let mut uow = self.store.begin().await?;
        let result = self.apply_in(uow.as_mut(), cart_id, code).await;
        let result = finish(uow, result).await;

        match &result {
            Ok(applied) => info!(
                %cart_id,
                promotion_id = %applied.promotion.id,
                code = %applied.promotion.code,
                "Promotion code applied"
            ),
            Err(e) => info!(%cart_id, code, reason = e.code(), "Promotion code rejected"),
        }
        result
    }

    async fn apply_in(
        &self,
        uow: &mut dyn UnitOfWork,
        cart_id: Uuid,
        code: &str,
    ) -> Result<CodeResult, PromotionCodeError> {
        let now = Utc::now();
        let mut cart = open_cart(uow, cart_id).await?;

        let found = uow
            .find_promotion_by_code(code)
            .await?
            .ok_or(PromotionCodeError::NotFound)?;
        let promotion = uow
            .lock_promotion(found.id)
            .await?
            .ok_or(PromotionCodeError::NotFound)?;

        if promotion.is_bundle() {
            return Err(PromotionCodeError::Validation(
                "bundle promotions are applied automatically".to_string(),
            ));
        }
        if !promotion.applies_now(now) {
            return Err(PromotionCodeError::Inactive);
        }
        if promotion.used_up() {
            return Err(PromotionCodeError::UsageLimitReached);
        }

        let applied = uow.cart_promotions(cart_id).await?;
        if applied.iter().any(|p| p.id == promotion.id) {
            return Err(PromotionCodeError::AlreadyApplied);
        }
        if !stacking::can_add(&promotion, &applied) {
            return Err(PromotionCodeError::NotStackable);
        }

        uow.attach_promotion(cart_id, promotion.id).await?;
        cart.touch(now);
        uow.update_cart(&cart).await?;

        let mut promotions = applied;
        promotions.push(promotion.clone());
        let items = uow.cart_items(cart_id).await?;
        let priced = cart_totals(&items, &promotions, &self.checkout);

        Ok(CodeResult {
            promotion,
            promotions,
            priced,
        })
    }

    /// Detach a previously applied code from a cart.
    pub async fn remove(
        &self,
        cart_id: Uuid,
        code: &str,
    ) -> Result<CodeResult, PromotionCodeError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(PromotionCodeError::Validation("promotion code is required".to_string()));
        }

        let mut uow = self.store.begin().await?;
        let result = self.remove_in(uow.as_mut(), cart_id, code).await;
        let result = finish(uow, result).await;

        if let Ok(removed) = &result {
            info!(%cart_id, promotion_id = %removed.promotion.id, "Promotion code removed");
        }
        result
    }

    async fn remove_in(
        &self,
        uow: &mut dyn UnitOfWork,
        cart_id: Uuid,
        code: &str,
    ) -> Result<CodeResult, PromotionCodeError> {
        let now = Utc::now();
        let mut cart = open_cart(uow, cart_id).await?;

        let mut attached = uow.cart_promotions(cart_id).await?;
        let position = attached
            .iter()
            .position(|p| !p.is_bundle() && p.matches_code(code))
            .ok_or(PromotionCodeError::NotFound)?;
        let promotion = attached.remove(position);

        uow.detach_promotion(cart_id, promotion.id).await?;
        cart.touch(now);
        uow.update_cart(&cart).await?;

        // A bundle the removed code excluded may now fit.
        let report = apply_bundles(uow, &cart, now).await?;
        if !report.is_success() {
            warn!(
                %cart_id,
                failures = report.errors.len(),
                "Bundle re-evaluation incomplete after code removal"
            );
        }

        let promotions = uow.cart_promotions(cart_id).await?;
        let items = uow.cart_items(cart_id).await?;
        let priced = cart_totals(&items, &promotions, &self.checkout);

        Ok(CodeResult {
            promotion,
            promotions,
            priced,
        })
    }
}

async fn open_cart(uow: &mut dyn UnitOfWork, cart_id: Uuid) -> Result<Cart, PromotionCodeError> {
    let cart = uow
        .lock_cart(cart_id)
        .await?
        .ok_or_else(|| PromotionCodeError::Validation(format!("cart {} not found", cart_id)))?;
    if !cart.is_open() {
        return Err(PromotionCodeError::Validation(format!("cart {} is {}", cart_id, cart.status)));
    }
    Ok(cart)
}

#[cfg(test)]
mod tests;
