//! Stacking policy: may a promotion join the promotions already applied?

use crate::model::Promotion;

/// Rules in order: an empty set accepts anything; a non-stackable member
/// blocks everything; a non-stackable candidate is refused; otherwise allowed.
pub fn can_add(candidate: &Promotion, applied: &[Promotion]) -> bool {
    if applied.is_empty() {
        return true;
    }
    if applied.iter().any(|p| !p.stackable) {
        return false;
    }
    candidate.stackable
}

/// Whether a set of promotions may be applied together.
pub fn compatible(promotions: &[Promotion]) -> bool {
    promotions.len() <= 1 || promotions.iter().all(|p| p.stackable)
}
