//! Shared fixtures for integration tests.
//!
//! Builds catalog rows, promotions and checkout requests, and seeds them
//! through the public storage API.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use storefront::checkout::{AddressInput, CheckoutRequest};
use storefront::model::{
    Cart, CartItem, DiscountType, Metadata, NewAddress, Order, OrderStatus, PaymentStatus,
    PaymentTransaction, Product, ProductBundle, ProductStatus, Promotion, Totals, TransactionSource,
};
use storefront::storage::Store;

/// Hex secret accepted by config validation (16 bytes).
pub const SECRET: &str = "6D0870CDE5F24F34F3915FB0045120DB";

pub fn product(name: &str, price: i64) -> Product {
    Product {
        id: Uuid::new_v4(),
        name: name.to_string(),
        status: ProductStatus::Active,
        coming_soon: false,
        price,
        original_price: price,
        currency: "VND".to_string(),
        image_url: None,
    }
}

pub fn promotion(code: &str, discount_type: DiscountType, value: i64) -> Promotion {
    let now = Utc::now();
    Promotion {
        id: Uuid::new_v4(),
        code: code.to_string(),
        name: code.to_string(),
        discount_type,
        discount_value: value,
        stackable: true,
        active: true,
        starts_at: Some(now - Duration::days(1)),
        ends_at: Some(now + Duration::days(1)),
        usage_limit: None,
        usage_count: 0,
        deleted_at: None,
        bundles: Vec::new(),
        created_at: now,
    }
}

pub fn bundle(code: &str, value: i64, rules: &[(Uuid, u32)]) -> Promotion {
    let mut promo = promotion(code, DiscountType::Bundle, value);
    promo.bundles = rules
        .iter()
        .map(|&(product_id, quantity)| ProductBundle {
            id: Uuid::new_v4(),
            promotion_id: promo.id,
            product_id,
            variant_id: None,
            quantity,
        })
        .collect();
    promo
}

pub fn address() -> NewAddress {
    NewAddress {
        full_name: "Tran Thi B".to_string(),
        phone: "0911111111".to_string(),
        line1: "45 Nguyen Hue".to_string(),
        line2: None,
        city: "Ho Chi Minh City".to_string(),
        region: None,
        postal_code: None,
        country: "VN".to_string(),
    }
}

pub fn checkout_request(cart_id: Uuid) -> CheckoutRequest {
    CheckoutRequest {
        cart_id,
        user_id: None,
        customer_name: "Tran Thi B".to_string(),
        email: "b@example.com".to_string(),
        phone: "0911111111".to_string(),
        shipping: AddressInput::New(address()),
        billing: None,
        installment: false,
        note: None,
        idempotency_key: None,
    }
}

pub async fn seed(store: &Arc<dyn Store>, products: &[Product], promotions: &[Promotion]) {
    let mut uow = store.begin().await.expect("begin");
    for product in products {
        uow.save_product(product).await.expect("save product");
    }
    for promotion in promotions {
        uow.save_promotion(promotion).await.expect("save promotion");
    }
    uow.commit().await.expect("commit");
}

pub fn cart(session: &str) -> Cart {
    Cart::new(Some(session), None, Utc::now(), Duration::days(7))
}

pub fn cart_item(cart_id: Uuid, product_id: Uuid, quantity: u32, unit_price: i64) -> CartItem {
    let now = Utc::now();
    CartItem {
        id: Uuid::new_v4(),
        cart_id,
        product_id,
        variant_id: None,
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

/// Pending guest order without items.
pub fn order(order_number: &str, total: i64) -> Order {
    let now = Utc::now();
    let address = address().into_address(None, None, now);
    Order {
        id: Uuid::new_v4(),
        order_number: order_number.to_string(),
        cart_id: Uuid::new_v4(),
        user_id: None,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        installment: false,
        customer_name: address.full_name.clone(),
        email: "b@example.com".to_string(),
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

pub fn transaction(order_id: Uuid, gateway_id: &str) -> PaymentTransaction {
    PaymentTransaction {
        id: Uuid::new_v4(),
        order_id,
        gateway_transaction_id: Some(gateway_id.to_string()),
        merch_txn_ref: "ORD-1--1700000000".to_string(),
        response_code: "0".to_string(),
        amount: 1000,
        successful: true,
        source: TransactionSource::Callback,
        raw_params: Default::default(),
        created_at: Utc::now(),
    }
}
