//! UnitOfWork interface tests.
//!
//! These tests verify the contract every `Store` backend must honor:
//! commit visibility, rollback on drop, and the uniqueness rules the
//! services rely on for idempotency.

use chrono::{Duration, Utc};
use uuid::Uuid;

use storefront::model::{CartStatus, DiscountType, OrderItem};
use storefront::storage::Store;

use crate::common::{bundle, cart, cart_item, order, product, promotion, transaction};

// =============================================================================
// Transaction boundaries
// =============================================================================

pub async fn test_commit_publishes_changes(store: &dyn Store) {
    let cart = cart("contract-commit");

    let mut uow = store.begin().await.expect("begin");
    uow.insert_cart(&cart).await.expect("insert cart");
    uow.commit().await.expect("commit");

    let mut uow = store.begin().await.expect("begin");
    let found = uow.lock_cart(cart.id).await.expect("lock cart");
    assert_eq!(found.map(|c| c.id), Some(cart.id), "committed cart should be visible");
}

pub async fn test_drop_discards_changes(store: &dyn Store) {
    let cart = cart("contract-drop");

    {
        let mut uow = store.begin().await.expect("begin");
        uow.insert_cart(&cart).await.expect("insert cart");
    }

    let mut uow = store.begin().await.expect("begin");
    assert!(uow.lock_cart(cart.id).await.unwrap().is_none(), "dropped work must not persist");
}

pub async fn test_rollback_discards_changes(store: &dyn Store) {
    let cart = cart("contract-rollback");

    let mut uow = store.begin().await.expect("begin");
    uow.insert_cart(&cart).await.expect("insert cart");
    uow.rollback().await.expect("rollback");

    let mut uow = store.begin().await.expect("begin");
    assert!(uow.lock_cart(cart.id).await.unwrap().is_none());
}

// =============================================================================
// Cart rules
// =============================================================================

pub async fn test_one_open_cart_per_session(store: &dyn Store) {
    let first = cart("contract-session");
    let second = cart("contract-session");

    let mut uow = store.begin().await.expect("begin");
    uow.insert_cart(&first).await.expect("first cart");
    let err = uow.insert_cart(&second).await.expect_err("second open cart must be rejected");
    assert!(err.is_unique_violation(), "unexpected error: {}", err);
    drop(uow);

    // Once the first cart closes, the session may open another.
    let mut uow = store.begin().await.expect("begin");
    let mut closed = first.clone();
    uow.insert_cart(&first).await.unwrap();
    closed.status = CartStatus::Expired;
    uow.update_cart(&closed).await.unwrap();
    uow.insert_cart(&second).await.expect("new open cart after close");
    let open = uow.find_open_cart_by_session("contract-session").await.unwrap();
    assert_eq!(open.map(|c| c.id), Some(second.id));
}

pub async fn test_cart_item_line_unique(store: &dyn Store) {
    let cart = cart("contract-line");
    let product_id = Uuid::new_v4();

    let mut uow = store.begin().await.expect("begin");
    uow.insert_cart(&cart).await.unwrap();
    uow.insert_cart_item(&cart_item(cart.id, product_id, 1, 1000)).await.unwrap();
    let err = uow
        .insert_cart_item(&cart_item(cart.id, product_id, 2, 1000))
        .await
        .expect_err("duplicate line must be rejected");
    assert!(err.is_unique_violation());

    let line = uow.find_cart_item(cart.id, product_id, None).await.unwrap();
    assert_eq!(line.map(|i| i.quantity), Some(1));
}

pub async fn test_delete_cart_removes_items_and_links(store: &dyn Store) {
    let cart = cart("contract-delete");
    let promo = promotion("CONTRACT-DELETE", DiscountType::FixedAmount, 100);

    let mut uow = store.begin().await.expect("begin");
    uow.insert_cart(&cart).await.unwrap();
    uow.insert_cart_item(&cart_item(cart.id, Uuid::new_v4(), 1, 1000)).await.unwrap();
    uow.save_promotion(&promo).await.unwrap();
    uow.attach_promotion(cart.id, promo.id).await.unwrap();
    uow.delete_cart(cart.id).await.unwrap();
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.expect("begin");
    assert!(uow.lock_cart(cart.id).await.unwrap().is_none());
    assert!(uow.cart_items(cart.id).await.unwrap().is_empty());
    assert!(uow.cart_promotions(cart.id).await.unwrap().is_empty());
}

pub async fn test_expired_items_and_stale_carts(store: &dyn Store) {
    let now = Utc::now();
    let mut idle = cart("contract-idle");
    idle.last_activity_at = now - Duration::days(40);
    let fresh = cart("contract-fresh");
    let mut old_item = cart_item(fresh.id, Uuid::new_v4(), 1, 1000);
    old_item.expires_at = now - Duration::minutes(1);
    let live_item = cart_item(fresh.id, Uuid::new_v4(), 1, 1000);

    let mut uow = store.begin().await.expect("begin");
    uow.insert_cart(&idle).await.unwrap();
    uow.insert_cart(&fresh).await.unwrap();
    uow.insert_cart_item(&old_item).await.unwrap();
    uow.insert_cart_item(&live_item).await.unwrap();

    assert_eq!(uow.delete_expired_cart_items(now).await.unwrap(), 1);
    let remaining = uow.cart_items(fresh.id).await.unwrap();
    assert_eq!(remaining.iter().map(|i| i.id).collect::<Vec<_>>(), vec![live_item.id]);

    let stale = uow.stale_open_carts(now - Duration::days(30), now).await.unwrap();
    assert_eq!(stale.iter().map(|c| c.id).collect::<Vec<_>>(), vec![idle.id]);
}

// =============================================================================
// Promotions
// =============================================================================

pub async fn test_promotion_code_lookup_case_insensitive(store: &dyn Store) {
    let shirt = product("contract-shirt", 1000);
    let promo = bundle("Contract-Bundle", 500, &[(shirt.id, 2)]);

    let mut uow = store.begin().await.expect("begin");
    uow.save_promotion(&promo).await.unwrap();

    let found = uow
        .find_promotion_by_code(" contract-BUNDLE ")
        .await
        .unwrap()
        .expect("code lookup ignores case and padding");
    assert_eq!(found.id, promo.id);
    assert_eq!(found.bundles.len(), 1, "bundle rules travel with the promotion");
    assert_eq!(found.bundles[0].quantity, 2);

    let clash = promotion("CONTRACT-BUNDLE", DiscountType::Percentage, 10);
    let err = uow.save_promotion(&clash).await.expect_err("codes are unique");
    assert!(err.is_unique_violation());
}

pub async fn test_cart_promotions_keep_attachment_order(store: &dyn Store) {
    let cart = cart("contract-attach");
    let first = promotion("CONTRACT-FIRST", DiscountType::Percentage, 10);
    let second = promotion("CONTRACT-SECOND", DiscountType::FreeShipping, 0);

    let mut uow = store.begin().await.expect("begin");
    uow.insert_cart(&cart).await.unwrap();
    uow.save_promotion(&second).await.unwrap();
    uow.save_promotion(&first).await.unwrap();
    uow.attach_promotion(cart.id, first.id).await.unwrap();
    uow.attach_promotion(cart.id, second.id).await.unwrap();
    uow.attach_promotion(cart.id, first.id).await.expect("attach is idempotent");

    let attached: Vec<Uuid> =
        uow.cart_promotions(cart.id).await.unwrap().iter().map(|p| p.id).collect();
    assert_eq!(attached, vec![first.id, second.id]);

    uow.detach_promotion(cart.id, first.id).await.unwrap();
    let attached: Vec<Uuid> =
        uow.cart_promotions(cart.id).await.unwrap().iter().map(|p| p.id).collect();
    assert_eq!(attached, vec![second.id]);

    let missing = uow.attach_promotion(cart.id, Uuid::new_v4()).await;
    assert!(missing.is_err(), "unknown promotion cannot be attached");
}

// =============================================================================
// Orders and payments
// =============================================================================

pub async fn test_order_lookups(store: &dyn Store) {
    let mut placed = order("ORD-20240101-CONTR1", 2000);
    placed.idempotency_key = Some("contract-key".to_string());
    let line = cart_item(placed.cart_id, Uuid::new_v4(), 2, 1000);
    let items = vec![OrderItem::snapshot(placed.id, &line)];

    let mut uow = store.begin().await.expect("begin");
    uow.insert_order(&placed, &items).await.unwrap();
    uow.commit().await.unwrap();

    let mut uow = store.begin().await.expect("begin");
    assert!(uow.order_number_exists("ORD-20240101-CONTR1").await.unwrap());
    assert!(!uow.order_number_exists("ORD-20240101-OTHER1").await.unwrap());

    let by_number = uow.order_by_number("ORD-20240101-CONTR1").await.unwrap().expect("by number");
    assert_eq!(by_number, placed);
    let by_key = uow.order_by_idempotency_key("contract-key").await.unwrap().expect("by key");
    assert_eq!(by_key.id, placed.id);

    let stored_items = uow.order_items(placed.id).await.unwrap();
    assert_eq!(stored_items.len(), 1);
    assert_eq!(stored_items[0].line_total, 2000);

    let mut duplicate = order("ORD-20240101-CONTR1", 1);
    duplicate.cart_id = Uuid::new_v4();
    let err = uow.insert_order(&duplicate, &[]).await.expect_err("order numbers are unique");
    assert!(err.is_unique_violation());
}

pub async fn test_payment_transaction_id_unique(store: &dyn Store) {
    let placed = order("ORD-20240101-CONTR2", 1000);

    let mut uow = store.begin().await.expect("begin");
    uow.insert_order(&placed, &[]).await.unwrap();
    uow.insert_payment_transaction(&transaction(placed.id, "CONTRACT-TX1")).await.unwrap();
    assert!(uow.payment_transaction_exists("CONTRACT-TX1").await.unwrap());

    let err = uow
        .insert_payment_transaction(&transaction(placed.id, "CONTRACT-TX1"))
        .await
        .expect_err("gateway transaction ids are unique");
    assert!(err.is_unique_violation());

    let mut anonymous = transaction(placed.id, "unused");
    anonymous.gateway_transaction_id = None;
    let mut another = anonymous.clone();
    another.id = Uuid::new_v4();
    uow.insert_payment_transaction(&anonymous).await.unwrap();
    uow.insert_payment_transaction(&another).await.expect("missing ids never collide");

    assert_eq!(uow.payment_transactions(placed.id).await.unwrap().len(), 3);
}

/// Run all UnitOfWork contract tests against a store.
#[macro_export]
macro_rules! run_unit_of_work_tests {
    ($store:expr) => {
        use $crate::storage::unit_of_work_tests::*;

        // transaction boundaries
        test_commit_publishes_changes($store).await;
        println!("  test_commit_publishes_changes: PASSED");

        test_drop_discards_changes($store).await;
        println!("  test_drop_discards_changes: PASSED");

        test_rollback_discards_changes($store).await;
        println!("  test_rollback_discards_changes: PASSED");

        // carts
        test_one_open_cart_per_session($store).await;
        println!("  test_one_open_cart_per_session: PASSED");

        test_cart_item_line_unique($store).await;
        println!("  test_cart_item_line_unique: PASSED");

        test_delete_cart_removes_items_and_links($store).await;
        println!("  test_delete_cart_removes_items_and_links: PASSED");

        test_expired_items_and_stale_carts($store).await;
        println!("  test_expired_items_and_stale_carts: PASSED");

        // promotions
        test_promotion_code_lookup_case_insensitive($store).await;
        println!("  test_promotion_code_lookup_case_insensitive: PASSED");

        test_cart_promotions_keep_attachment_order($store).await;
        println!("  test_cart_promotions_keep_attachment_order: PASSED");

        // orders and payments
        test_order_lookups($store).await;
        println!("  test_order_lookups: PASSED");

        test_payment_transaction_id_unique($store).await;
        println!("  test_payment_transaction_id_unique: PASSED");
    };
}
