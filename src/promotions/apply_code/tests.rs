use chrono::{Duration, Utc};

use super::*;
use crate::model::{Cart, CartStatus, DiscountType};
use crate::storage::MemoryStore;
use crate::test_utils::{bundle_promotion, cart_item, promotion, seed_promotions};

async fn cart_with_item(store: &MemoryStore, unit_price: i64) -> Cart {
    let cart = Cart::new(Some("session-1"), None, Utc::now(), Duration::days(7));
    let mut uow = store.begin().await.unwrap();
    uow.insert_cart(&cart).await.unwrap();
    uow.insert_cart_item(&cart_item(cart.id, Uuid::new_v4(), None, 1, unit_price))
        .await
        .unwrap();
    uow.commit().await.unwrap();
    cart
}

async fn attached(store: &MemoryStore, cart_id: Uuid) -> Vec<Promotion> {
    let mut uow = store.begin().await.unwrap();
    uow.cart_promotions(cart_id).await.unwrap()
}

fn service(store: &MemoryStore) -> PromotionCodeService {
    PromotionCodeService::new(Arc::new(store.clone()), CheckoutConfig::default())
}

#[tokio::test]
async fn test_apply_is_case_insensitive_and_prices_cart() {
    let store = MemoryStore::new();
    let cart = cart_with_item(&store, 200_000).await;
    seed_promotions(&store, &[promotion("SPRING10", DiscountType::Percentage, 10)]).await;

    let result = service(&store).apply(cart.id, "  spring10 ").await.unwrap();

    assert_eq!(result.promotion.code, "SPRING10");
    assert_eq!(result.priced.totals.discount_total, 20_000);
    assert_eq!(attached(&store, cart.id).await.len(), 1);
}

#[tokio::test]
async fn test_unknown_code() {
    let store = MemoryStore::new();
    let cart = cart_with_item(&store, 1_000).await;

    let err = service(&store).apply(cart.id, "NOPE").await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_blank_code_is_validation_error() {
    let store = MemoryStore::new();
    let err = service(&store).apply(Uuid::new_v4(), "   ").await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_expired_promotion_is_inactive() {
    let store = MemoryStore::new();
    let cart = cart_with_item(&store, 1_000).await;
    let mut promo = promotion("OLD", DiscountType::FixedAmount, 100);
    promo.ends_at = Some(Utc::now() - Duration::hours(1));
    seed_promotions(&store, &[promo]).await;

    let err = service(&store).apply(cart.id, "OLD").await.unwrap_err();
    assert_eq!(err.code(), "INACTIVE");
}

#[tokio::test]
async fn test_usage_limit_reached() {
    let store = MemoryStore::new();
    let cart = cart_with_item(&store, 1_000).await;
    let mut promo = promotion("ONCE", DiscountType::FixedAmount, 100);
    promo.usage_limit = Some(1);
    promo.usage_count = 1;
    seed_promotions(&store, &[promo]).await;

    let err = service(&store).apply(cart.id, "ONCE").await.unwrap_err();
    assert_eq!(err.code(), "USAGE_LIMIT_REACHED");
}

#[tokio::test]
async fn test_already_applied() {
    let store = MemoryStore::new();
    let cart = cart_with_item(&store, 1_000).await;
    seed_promotions(&store, &[promotion("TWICE", DiscountType::FixedAmount, 100)]).await;

    let service = service(&store);
    service.apply(cart.id, "TWICE").await.unwrap();
    let err = service.apply(cart.id, "twice").await.unwrap_err();
    assert_eq!(err.code(), "ALREADY_APPLIED");
}

#[tokio::test]
async fn test_non_stackable_second_code_leaves_cart_unchanged() {
    let store = MemoryStore::new();
    let cart = cart_with_item(&store, 1_000).await;
    let mut exclusive = promotion("EXCL", DiscountType::FixedAmount, 100);
    exclusive.stackable = false;
    seed_promotions(&store, &[promotion("FIRST", DiscountType::FixedAmount, 100), exclusive]).await;

    let service = service(&store);
    service.apply(cart.id, "FIRST").await.unwrap();
    let err = service.apply(cart.id, "EXCL").await.unwrap_err();

    assert_eq!(err.code(), "NOT_STACKABLE");
    let codes: Vec<String> = attached(&store, cart.id).await.into_iter().map(|p| p.code).collect();
    assert_eq!(codes, vec!["FIRST".to_string()]);
}

#[tokio::test]
async fn test_existing_non_stackable_blocks_stackable_code() {
    let store = MemoryStore::new();
    let cart = cart_with_item(&store, 1_000).await;
    let mut exclusive = promotion("EXCL", DiscountType::FixedAmount, 100);
    exclusive.stackable = false;
    seed_promotions(&store, &[exclusive, promotion("MORE", DiscountType::FixedAmount, 100)]).await;

    let service = service(&store);
    service.apply(cart.id, "EXCL").await.unwrap();
    let err = service.apply(cart.id, "MORE").await.unwrap_err();
    assert_eq!(err.code(), "NOT_STACKABLE");
}

#[tokio::test]
async fn test_bundle_code_rejected() {
    let store = MemoryStore::new();
    let cart = cart_with_item(&store, 1_000).await;
    seed_promotions(&store, &[bundle_promotion("BUNDLE", 100, &[(Uuid::new_v4(), None, 1)])]).await;

    let err = service(&store).apply(cart.id, "BUNDLE").await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_closed_cart_rejected() {
    let store = MemoryStore::new();
    let mut cart = cart_with_item(&store, 1_000).await;
    seed_promotions(&store, &[promotion("LATE", DiscountType::FixedAmount, 100)]).await;
    {
        let mut uow = store.begin().await.unwrap();
        cart.status = CartStatus::Expired;
        uow.update_cart(&cart).await.unwrap();
        uow.commit().await.unwrap();
    }

    let err = service(&store).apply(cart.id, "LATE").await.unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_storage_failure_is_opaque() {
    let store = MemoryStore::new();
    let cart = cart_with_item(&store, 1_000).await;
    let promo = promotion("BROKEN", DiscountType::FixedAmount, 100);
    store.set_fail_attach(promo.id, true).await;
    seed_promotions(&store, &[promo]).await;

    let err = service(&store).apply(cart.id, "BROKEN").await.unwrap_err();
    assert_eq!(err.code(), "UNEXPECTED_ERROR");
    assert_eq!(err.to_string(), "Unexpected error");
    assert!(attached(&store, cart.id).await.is_empty());
}

#[tokio::test]
async fn test_remove_code() {
    let store = MemoryStore::new();
    let cart = cart_with_item(&store, 100_000).await;
    seed_promotions(&store, &[promotion("GONE", DiscountType::FixedAmount, 5_000)]).await;

    let service = service(&store);
    service.apply(cart.id, "GONE").await.unwrap();
    let result = service.remove(cart.id, "gone").await.unwrap();

    assert!(result.promotions.is_empty());
    assert_eq!(result.priced.totals.discount_total, 0);
    assert!(attached(&store, cart.id).await.is_empty());

    let err = service.remove(cart.id, "GONE").await.unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[tokio::test]
async fn test_remove_code_reattaches_bundle_it_excluded() {
    let store = MemoryStore::new();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let cart = Cart::new(Some("session-1"), None, Utc::now(), Duration::days(7));
    {
        let mut uow = store.begin().await.unwrap();
        uow.insert_cart(&cart).await.unwrap();
        uow.insert_cart_item(&cart_item(cart.id, a, None, 1, 50_000)).await.unwrap();
        uow.insert_cart_item(&cart_item(cart.id, b, None, 1, 50_000)).await.unwrap();
        uow.commit().await.unwrap();
    }
    let mut exclusive = promotion("EXCL", DiscountType::FixedAmount, 1_000);
    exclusive.stackable = false;
    let pair = bundle_promotion("PAIR", 15_000, &[(a, None, 1), (b, None, 1)]);
    seed_promotions(&store, &[exclusive, pair.clone()]).await;

    let service = service(&store);
    service.apply(cart.id, "EXCL").await.unwrap();
    {
        let mut uow = store.begin().await.unwrap();
        let report = crate::cart::apply_bundles(uow.as_mut(), &cart, Utc::now()).await.unwrap();
        assert!(report.attached.is_empty(), "the exclusive code blocks the bundle");
    }

    let result = service.remove(cart.id, "EXCL").await.unwrap();

    let ids: Vec<Uuid> = result.promotions.iter().map(|p| p.id).collect();
    assert_eq!(ids, vec![pair.id]);
    assert_eq!(result.priced.totals.discount_total, 15_000);
    assert_eq!(attached(&store, cart.id).await.len(), 1);
}
