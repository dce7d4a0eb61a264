//! Test fixtures: catalog rows, promotions, cart lines and seeding helpers.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::model::{
    CartItem, DiscountType, Metadata, NewAddress, Order, OrderStatus, PaymentStatus, Product,
    ProductBundle, ProductStatus, ProductVariant, Promotion, Totals,
};
use crate::storage::Store;

pub fn product(name: &str, price: i64) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        status: ProductStatus::Active,
        coming_soon: false,
        price,
        original_price: price,
        currency: "VND".to_string(),
        image_url: Some(format!("https://cdn.example.com/{}.jpg", name)),
    }
}

pub fn variant(product: &Product, name: &str) -> ProductVariant {
    ProductVariant {
        id: Uuid::new_v4(),
        product_id: product.id,
        name: name.to_string(),
        active: true,
        price: None,
        original_price: None,
        image_url: None,
    }
}

pub fn promotion(code: &str, discount_type: DiscountType, value: i64) -> Promotion {
    Promotion {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: code.to_string(),
        discount_type,
        discount_value: value,
        stackable: true,
        active: true,
        starts_at: Some(Utc::now() - Duration::days(1)),
        ends_at: Some(Utc::now() + Duration::days(1)),
        usage_limit: None,
        usage_count: 0,
        deleted_at: None,
        bundles: Vec::new(),
        created_at: Utc::now(),
    }
}

/// Bundle promotion with `(product, variant, quantity)` rules.
pub fn bundle_promotion(code: &str, value: i64, rules: &[(Uuid, Option<Uuid>, u32)]) -> Promotion {
    let mut promo = promotion(code, DiscountType::Bundle, value);
    promo.bundles = rules
        .iter()
        .map(|&(product_id, variant_id, quantity)| ProductBundle {
            id: Uuid::new_v4(),
            promotion_id: promo.id,
            product_id,
            variant_id,
            quantity,
        })
        .collect();
    promo
}

pub fn cart_item(
    cart_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: u32,
    unit_price: i64,
) -> CartItem {
    let now = Utc::now();
    CartItem {
        id: Uuid::new_v4(),
        cart_id,
        product_id,
        variant_id,
        quantity,
        unit_price,
        original_unit_price: unit_price,
        currency: "VND".to_string(),
        product_name: "Item".to_string(),
        variant_name: None,
        image_url: None,
        expires_at: now + Duration::days(7),
        created_at: now,
        updated_at: now,
    }
}

pub fn new_address() -> NewAddress {
    NewAddress {
        full_name: "Nguyen Van A".to_string(),
        phone: "0900000000".to_string(),
        line1: "12 Le Loi".to_string(),
        line2: None,
        city: "Ho Chi Minh City".to_string(),
        region: None,
        postal_code: Some("700000".to_string()),
        country: "VN".to_string(),
    }
}

/// Pending order for a guest, without items.
pub fn order(order_number: &str, total: i64) -> Order {
    let now = Utc::now();
    let address = new_address().into_address(None, None, now);
    Order {
        id: Uuid::new_v4(),
        order_number: order_number.to_string(),
        cart_id: Uuid::new_v4(),
        user_id: None,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        installment: false,
        customer_name: address.full_name.clone(),
        email: "guest@example.com".to_string(),
        phone: address.phone.clone(),
        shipping_address: address.clone(),
        billing_address: address,
        note: None,
        currency: "VND".to_string(),
        totals: Totals {
            subtotal: total,
            total,
            ..Default::default()
        },
        applied_promotions: Vec::new(),
        idempotency_key: None,
        metadata: Metadata::new(),
        paid_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub async fn seed_order(store: &dyn Store, order: &Order) {
    let mut uow = store.begin().await.unwrap();
    uow.insert_order(order, &[]).await.unwrap();
    uow.commit().await.unwrap();
}

pub async fn seed_products(store: &dyn Store, products: &[Product], variants: &[ProductVariant]) {
    let mut uow = store.begin().await.unwrap();
    for product in products {
        uow.save_product(product).await.unwrap();
    }
    for variant in variants {
        uow.save_variant(variant).await.unwrap();
    }
    uow.commit().await.unwrap();
}

pub async fn seed_promotions(store: &dyn Store, promotions: &[Promotion]) {
    let mut uow = store.begin().await.unwrap();
    for promotion in promotions {
        uow.save_promotion(promotion).await.unwrap();
    }
    uow.commit().await.unwrap();
}
