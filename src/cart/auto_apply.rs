//! Bundle promotion re-evaluation for one cart.
//!
//! Runs inside the caller's unit of work after every cart mutation. Failures
//! are folded into the report per promotion so one bad promotion never stops
//! the others from being evaluated.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::{Cart, Promotion};
use crate::promotions::{matcher, stacking};
use crate::storage::{Result, UnitOfWork};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoApplyFailure {
    pub promotion_id: Uuid,
    pub message: String,
}

/// Attach/detach events produced by one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoApplyReport {
    pub attached: Vec<Uuid>,
    pub detached: Vec<Uuid>,
    pub errors: Vec<AutoApplyFailure>,
}

impl AutoApplyReport {
    /// False when any individual attach or detach failed.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn is_noop(&self) -> bool {
        self.attached.is_empty() && self.detached.is_empty() && self.errors.is_empty()
    }
}

/// Detach bundles the cart no longer satisfies, then attach every active
/// bundle it now satisfies that the stacking policy admits.
///
/// Detaching first means a broken bundle never blocks a newly satisfied one.
/// Only failures reading the cart or the promotion list abort the pass.
pub async fn apply_bundles(
    uow: &mut dyn UnitOfWork,
    cart: &Cart,
    now: DateTime<Utc>,
) -> Result<AutoApplyReport> {
    let mut report = AutoApplyReport::default();
    let items = uow.cart_items(cart.id).await?;
    let mut current: Vec<Promotion> = Vec::new();

    for promotion in uow.cart_promotions(cart.id).await? {
        let keep = !promotion.is_bundle()
            || (promotion.applies_now(now) && matcher::applicable(&promotion, &items));
        if keep {
            current.push(promotion);
            continue;
        }
        match uow.detach_promotion(cart.id, promotion.id).await {
            Ok(()) => {
                debug!(
                    cart_id = %cart.id,
                    promotion_id = %promotion.id,
                    "Bundle promotion detached"
                );
                report.detached.push(promotion.id);
            }
            Err(e) => {
                warn!(
                    cart_id = %cart.id,
                    promotion_id = %promotion.id,
                    error = %e,
                    "Failed to detach bundle promotion"
                );
                report.errors.push(AutoApplyFailure {
                    promotion_id: promotion.id,
                    message: e.to_string(),
                });
                current.push(promotion);
            }
        }
    }

    for promotion in uow.active_bundle_promotions(now).await? {
        if current.iter().any(|p| p.id == promotion.id) {
            continue;
        }
        if !matcher::applicable(&promotion, &items) || !stacking::can_add(&promotion, &current) {
            continue;
        }
        match uow.attach_promotion(cart.id, promotion.id).await {
            Ok(()) => {
                debug!(
                    cart_id = %cart.id,
                    promotion_id = %promotion.id,
                    "Bundle promotion attached"
                );
                report.attached.push(promotion.id);
                current.push(promotion);
            }
            Err(e) => {
                warn!(
                    cart_id = %cart.id,
                    promotion_id = %promotion.id,
                    error = %e,
                    "Failed to attach bundle promotion"
                );
                report.errors.push(AutoApplyFailure {
                    promotion_id: promotion.id,
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
