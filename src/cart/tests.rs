use chrono::Duration;

use super::*;
use crate::model::{Product, ProductStatus, ProductVariant};
use crate::storage::MemoryStore;
use crate::test_utils::{bundle_promotion, product, seed_products, seed_promotions, variant};

fn manager(store: &MemoryStore) -> CartLifecycleManager {
    CartLifecycleManager::new(Arc::new(store.clone()), CartConfig::default())
}

async fn items(store: &MemoryStore, cart_id: Uuid) -> Vec<CartItem> {
    let mut uow = store.begin().await.unwrap();
    uow.cart_items(cart_id).await.unwrap()
}

async fn promotion_ids(store: &MemoryStore, cart_id: Uuid) -> Vec<Uuid> {
    let mut uow = store.begin().await.unwrap();
    uow.cart_promotions(cart_id)
        .await
        .unwrap()
        .into_iter()
        .map(|p| p.id)
        .collect()
}

async fn stored_cart(store: &MemoryStore, cart_id: Uuid) -> Option<Cart> {
    let mut uow = store.begin().await.unwrap();
    uow.lock_cart(cart_id).await.unwrap()
}

async fn catalog(store: &MemoryStore) -> (Product, ProductVariant) {
    let shirt = product("shirt", 100_000);
    let mut large = variant(&shirt, "L");
    large.price = Some(120_000);
    seed_products(store, &[shirt.clone()], &[large.clone()]).await;
    (shirt, large)
}

#[tokio::test]
async fn test_find_or_create_requires_identity() {
    let store = MemoryStore::new();
    let err = manager(&store).find_or_create(Some("  "), None).await.unwrap_err();
    assert!(matches!(err, CartError::MissingIdentity));
}

#[tokio::test]
async fn test_find_or_create_reuses_session_cart() {
    let store = MemoryStore::new();
    let manager = manager(&store);

    let first = manager.find_or_create(Some("sess"), None).await.unwrap();
    let second = manager.find_or_create(Some("sess"), None).await.unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.last_activity_at >= first.last_activity_at);
}

#[tokio::test]
async fn test_login_claims_session_cart() {
    let store = MemoryStore::new();
    let manager = manager(&store);
    let user = Uuid::new_v4();

    let guest = manager.find_or_create(Some("sess"), None).await.unwrap();
    let owned = manager.find_or_create(Some("sess"), Some(user)).await.unwrap();

    assert_eq!(owned.id, guest.id);
    assert_eq!(owned.user_id, Some(user));
    assert!(owned.session_id.is_none());
}

#[tokio::test]
async fn test_login_merges_session_cart_into_user_cart() {
    let store = MemoryStore::new();
    let (shirt, _) = catalog(&store).await;
    let manager = manager(&store);
    let user = Uuid::new_v4();

    let user_cart = manager.find_or_create(None, Some(user)).await.unwrap();
    manager.add_item(user_cart.id, shirt.id, None, 1).await.unwrap();
    let guest = manager.find_or_create(Some("sess"), None).await.unwrap();
    manager.add_item(guest.id, shirt.id, None, 2).await.unwrap();

    let cart = manager.find_or_create(Some("sess"), Some(user)).await.unwrap();

    assert_eq!(cart.id, user_cart.id);
    let lines = items(&store, cart.id).await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].quantity, 3);
    assert!(stored_cart(&store, guest.id).await.is_none());
}

#[tokio::test]
async fn test_add_item_captures_variant_price_and_increments() {
    let store = MemoryStore::new();
    let (shirt, large) = catalog(&store).await;
    let manager = manager(&store);
    let cart = manager.find_or_create(Some("sess"), None).await.unwrap();

    let added = manager.add_item(cart.id, shirt.id, Some(large.id), 1).await.unwrap();
    assert_eq!(added.item.unit_price, 120_000);
    assert_eq!(added.item.original_unit_price, 100_000);
    assert_eq!(added.item.variant_name.as_deref(), Some("L"));

    let again = manager.add_item(cart.id, shirt.id, Some(large.id), 2).await.unwrap();
    assert_eq!(again.item.id, added.item.id);
    assert_eq!(again.item.quantity, 3);

    manager.add_item(cart.id, shirt.id, None, 1).await.unwrap();
    assert_eq!(items(&store, cart.id).await.len(), 2);
}

#[tokio::test]
async fn test_add_item_rejects_unavailable_products() {
    let store = MemoryStore::new();
    let mut draft = product("draft", 1_000);
    draft.status = ProductStatus::Draft;
    let mut soon = product("soon", 1_000);
    soon.coming_soon = true;
    let other = product("other", 1_000);
    let foreign = variant(&other, "M");
    let mut retired = variant(&other, "S");
    retired.active = false;
    seed_products(
        &store,
        &[draft.clone(), soon.clone(), other.clone()],
        &[foreign.clone(), retired.clone()],
    )
    .await;

    let manager = manager(&store);
    let cart = manager.find_or_create(Some("sess"), None).await.unwrap();

    let err = manager.add_item(cart.id, Uuid::new_v4(), None, 1).await.unwrap_err();
    assert!(matches!(err, CartError::ProductNotFound(_)));
    let err = manager.add_item(cart.id, draft.id, None, 1).await.unwrap_err();
    assert!(matches!(err, CartError::ProductInactive(_)));
    let err = manager.add_item(cart.id, soon.id, None, 1).await.unwrap_err();
    assert!(matches!(err, CartError::ProductUnavailable(_)));
    let err = manager.add_item(cart.id, draft.id, Some(foreign.id), 1).await.unwrap_err();
    assert!(matches!(err, CartError::ProductInactive(_)));
    let err = manager.add_item(cart.id, other.id, Some(retired.id), 1).await.unwrap_err();
    assert!(matches!(err, CartError::VariantInactive(_)));
    let err = manager.add_item(cart.id, other.id, None, 0).await.unwrap_err();
    assert!(matches!(err, CartError::InvalidQuantity));

    assert!(items(&store, cart.id).await.is_empty());
}

#[tokio::test]
async fn test_variant_must_belong_to_product() {
    let store = MemoryStore::new();
    let (shirt, _) = catalog(&store).await;
    let hat = product("hat", 5_000);
    let hat_variant = variant(&hat, "one size");
    seed_products(&store, &[hat.clone()], &[hat_variant.clone()]).await;

    let manager = manager(&store);
    let cart = manager.find_or_create(Some("sess"), None).await.unwrap();
    let err = manager.add_item(cart.id, shirt.id, Some(hat_variant.id), 1).await.unwrap_err();
    assert!(matches!(err, CartError::VariantMismatch { .. }));
}

#[tokio::test]
async fn test_update_quantity_and_remove() {
    let store = MemoryStore::new();
    let (shirt, _) = catalog(&store).await;
    let manager = manager(&store);
    let cart = manager.find_or_create(Some("sess"), None).await.unwrap();
    let added = manager.add_item(cart.id, shirt.id, None, 1).await.unwrap();

    let updated = manager.update_quantity(cart.id, added.item.id, 5).await.unwrap();
    assert_eq!(updated.item.map(|i| i.quantity), Some(5));

    let removed = manager.update_quantity(cart.id, added.item.id, 0).await.unwrap();
    assert!(removed.item.is_none());
    assert!(items(&store, cart.id).await.is_empty());

    let err = manager.remove_item(cart.id, added.item.id).await.unwrap_err();
    assert!(matches!(err, CartError::ItemNotFound { .. }));
}

#[tokio::test]
async fn test_closed_cart_rejects_mutation() {
    let store = MemoryStore::new();
    let (shirt, _) = catalog(&store).await;
    let manager = manager(&store);
    let cart = manager.find_or_create(Some("sess"), None).await.unwrap();
    manager.expire_inactive(Utc::now() + Duration::days(60)).await.unwrap();

    let err = manager.add_item(cart.id, shirt.id, None, 1).await.unwrap_err();
    assert!(matches!(err, CartError::CartClosed { status: CartStatus::Expired, .. }));
}

#[tokio::test]
async fn test_bundle_attaches_and_detaches_with_cart_contents() {
    let store = MemoryStore::new();
    let shoe = product("shoe", 500_000);
    let sock = product("sock", 50_000);
    seed_products(&store, &[shoe.clone(), sock.clone()], &[]).await;
    let bundle = bundle_promotion("SHOE-SOCK", 10_000, &[(shoe.id, None, 1), (sock.id, None, 2)]);
    seed_promotions(&store, &[bundle.clone()]).await;

    let manager = manager(&store);
    let cart = manager.find_or_create(Some("sess"), None).await.unwrap();
    let first = manager.add_item(cart.id, shoe.id, None, 1).await.unwrap();
    assert!(first.auto_apply.is_noop());

    let socks = manager.add_item(cart.id, sock.id, None, 2).await.unwrap();
    assert_eq!(socks.auto_apply.attached, vec![bundle.id]);
    assert_eq!(promotion_ids(&store, cart.id).await, vec![bundle.id]);

    let report = manager.auto_apply_bundle_promotions(cart.id).await.unwrap();
    assert!(report.is_noop());
    assert_eq!(promotion_ids(&store, cart.id).await, vec![bundle.id]);

    let fewer = manager.update_quantity(cart.id, socks.item.id, 1).await.unwrap();
    assert_eq!(fewer.auto_apply.detached, vec![bundle.id]);
    assert!(promotion_ids(&store, cart.id).await.is_empty());
}

#[tokio::test]
async fn test_bundle_attach_failure_is_reported_not_raised() {
    let store = MemoryStore::new();
    let shoe = product("shoe", 500_000);
    seed_products(&store, &[shoe.clone()], &[]).await;
    let broken = bundle_promotion("BROKEN", 1_000, &[(shoe.id, None, 1)]);
    let working = bundle_promotion("WORKING", 2_000, &[(shoe.id, None, 1)]);
    store.set_fail_attach(broken.id, true).await;
    seed_promotions(&store, &[broken.clone(), working.clone()]).await;

    let manager = manager(&store);
    let cart = manager.find_or_create(Some("sess"), None).await.unwrap();
    let added = manager.add_item(cart.id, shoe.id, None, 1).await.unwrap();

    assert!(!added.auto_apply.is_success());
    assert_eq!(added.auto_apply.errors[0].promotion_id, broken.id);
    assert_eq!(added.auto_apply.attached, vec![working.id]);
    assert_eq!(items(&store, cart.id).await.len(), 1);
}

#[tokio::test]
async fn test_merge_keeps_emailed_source_as_merged() {
    let store = MemoryStore::new();
    let (shirt, large) = catalog(&store).await;
    let manager = manager(&store);

    let target = manager.find_or_create(None, Some(Uuid::new_v4())).await.unwrap();
    let source = manager.find_or_create(Some("other"), None).await.unwrap();
    manager.add_item(target.id, shirt.id, None, 1).await.unwrap();
    manager.add_item(source.id, shirt.id, None, 1).await.unwrap();
    manager.add_item(source.id, shirt.id, Some(large.id), 1).await.unwrap();
    manager.mark_emailed(source.id).await.unwrap();

    let merged = manager.merge(target.id, source.id).await.unwrap();
    assert_eq!(merged.cart.id, target.id);

    let mut lines = items(&store, target.id).await;
    lines.sort_by_key(|i| i.variant_id.is_some());
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].quantity, 2);
    assert_eq!(lines[1].variant_id, Some(large.id));

    let source = stored_cart(&store, source.id).await.unwrap();
    assert_eq!(source.status, CartStatus::Merged);
    assert!(items(&store, source.id).await.is_empty());

    let again = manager.merge(target.id, source.id).await.unwrap();
    assert!(again.auto_apply.is_noop());
    assert_eq!(items(&store, target.id).await.len(), 2);
}

#[tokio::test]
async fn test_merge_into_self_rejected() {
    let store = MemoryStore::new();
    let manager = manager(&store);
    let cart = manager.find_or_create(Some("sess"), None).await.unwrap();
    let err = manager.merge(cart.id, cart.id).await.unwrap_err();
    assert!(matches!(err, CartError::SameCart));
}

#[tokio::test]
async fn test_guest_email_and_emailed_cart_stays_open() {
    let store = MemoryStore::new();
    let manager = manager(&store);
    let cart = manager.find_or_create(Some("sess"), None).await.unwrap();

    let err = manager.set_guest_email(cart.id, "not-an-email").await.unwrap_err();
    assert!(matches!(err, CartError::InvalidEmail));

    let cart = manager.set_guest_email(cart.id, " guest@example.com ").await.unwrap();
    assert_eq!(cart.guest_email.as_deref(), Some("guest@example.com"));

    let cart = manager.mark_emailed(cart.id).await.unwrap();
    assert_eq!(cart.status, CartStatus::Emailed);
    let found = manager.find_or_create(Some("sess"), None).await.unwrap();
    assert_eq!(found.id, cart.id);
}

#[tokio::test]
async fn test_expire_inactive_sweeps_idle_carts_and_stale_items() {
    let store = MemoryStore::new();
    let (shirt, _) = catalog(&store).await;
    let manager = manager(&store);
    let idle = manager.find_or_create(Some("idle"), None).await.unwrap();
    manager.add_item(idle.id, shirt.id, None, 1).await.unwrap();

    let report = manager.expire_inactive(Utc::now()).await.unwrap();
    assert_eq!(report, SweepReport::default());

    let report = manager.expire_inactive(Utc::now() + Duration::days(31)).await.unwrap();
    assert_eq!(report.expired_carts, 1);
    assert_eq!(report.removed_items, 1);
    assert_eq!(stored_cart(&store, idle.id).await.unwrap().status, CartStatus::Expired);

    let fresh = manager.find_or_create(Some("idle"), None).await.unwrap();
    assert_ne!(fresh.id, idle.id);
}
