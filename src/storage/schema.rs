//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Carts table schema.
#[derive(Iden)]
pub enum Carts {
    Table,
    Id,
    SessionId,
    UserId,
    Status,
    CartType,
    ExpiresAt,
    LastActivityAt,
    GuestEmail,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

/// Cart items table schema.
#[derive(Iden)]
pub enum CartItems {
    Table,
    Id,
    CartId,
    ProductId,
    VariantId,
    Quantity,
    UnitPrice,
    OriginalUnitPrice,
    Currency,
    ProductName,
    VariantName,
    ImageUrl,
    ExpiresAt,
    CreatedAt,
    UpdatedAt,
}

/// Promotions table schema.
#[derive(Iden)]
pub enum Promotions {
    Table,
    Id,
    Code,
    Name,
    DiscountType,
    DiscountValue,
    Stackable,
    Active,
    StartsAt,
    EndsAt,
    UsageLimit,
    UsageCount,
    DeletedAt,
    CreatedAt,
}

/// Bundle rules table schema.
#[derive(Iden)]
pub enum ProductBundles {
    Table,
    Id,
    PromotionId,
    ProductId,
    VariantId,
    Quantity,
}

/// Cart to promotion links.
#[derive(Iden)]
pub enum CartPromotions {
    Table,
    CartId,
    PromotionId,
    AttachedAt,
}

/// Products table schema.
#[derive(Iden)]
pub enum Products {
    Table,
    Id,
    Name,
    Status,
    ComingSoon,
    Price,
    OriginalPrice,
    Currency,
    ImageUrl,
}

/// Product variants table schema.
#[derive(Iden)]
pub enum ProductVariants {
    Table,
    Id,
    ProductId,
    Name,
    Active,
    Price,
    OriginalPrice,
    ImageUrl,
}

/// Addresses table schema.
#[derive(Iden)]
pub enum Addresses {
    Table,
    Id,
    UserId,
    CartId,
    FullName,
    Phone,
    #[iden = "line1"]
    Line1,
    #[iden = "line2"]
    Line2,
    City,
    Region,
    PostalCode,
    Country,
    CreatedAt,
}

/// Orders table schema.
#[derive(Iden)]
pub enum Orders {
    Table,
    Id,
    OrderNumber,
    CartId,
    UserId,
    Status,
    PaymentStatus,
    Installment,
    CustomerName,
    Email,
    Phone,
    ShippingAddress,
    BillingAddress,
    Note,
    Currency,
    Subtotal,
    DiscountTotal,
    ShippingTotal,
    TaxTotal,
    Total,
    AppliedPromotions,
    IdempotencyKey,
    Metadata,
    PaidAt,
    CreatedAt,
    UpdatedAt,
}

/// Order items table schema.
#[derive(Iden)]
pub enum OrderItems {
    Table,
    Id,
    OrderId,
    ProductId,
    VariantId,
    ProductName,
    VariantName,
    ImageUrl,
    Quantity,
    UnitPrice,
    OriginalUnitPrice,
    Currency,
    LineTotal,
}

/// Payment transactions table schema.
#[derive(Iden)]
pub enum PaymentTransactions {
    Table,
    Id,
    OrderId,
    GatewayTransactionId,
    MerchTxnRef,
    ResponseCode,
    Amount,
    Successful,
    Source,
    RawParams,
    CreatedAt,
}

/// Guest checkout audit table schema.
#[derive(Iden)]
pub enum EmailedCarts {
    Table,
    Id,
    CartId,
    Email,
    OrderId,
    CreatedAt,
}

/// DDL statements, applied in order by `SqliteStore::init`.
pub const CREATE_STATEMENTS: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS carts (
    id TEXT PRIMARY KEY,
    session_id TEXT,
    user_id TEXT,
    status TEXT NOT NULL,
    cart_type TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    last_activity_at TEXT NOT NULL,
    guest_email TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
    r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_carts_open_session ON carts(session_id)
    WHERE session_id IS NOT NULL AND status IN ('active', 'emailed')"#,
    r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_carts_open_user ON carts(user_id)
    WHERE user_id IS NOT NULL AND status IN ('active', 'emailed')"#,
    r#"
CREATE TABLE IF NOT EXISTS cart_items (
    id TEXT PRIMARY KEY,
    cart_id TEXT NOT NULL,
    product_id TEXT NOT NULL,
    variant_id TEXT,
    quantity INTEGER NOT NULL CHECK (quantity >= 1),
    unit_price INTEGER NOT NULL,
    original_unit_price INTEGER NOT NULL,
    currency TEXT NOT NULL,
    product_name TEXT NOT NULL,
    variant_name TEXT,
    image_url TEXT,
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
    r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_cart_items_line
    ON cart_items(cart_id, product_id, COALESCE(variant_id, ''))"#,
    r#"
CREATE TABLE IF NOT EXISTS promotions (
    id TEXT PRIMARY KEY,
    code TEXT NOT NULL COLLATE NOCASE UNIQUE,
    name TEXT NOT NULL,
    discount_type TEXT NOT NULL,
    discount_value INTEGER NOT NULL,
    stackable INTEGER NOT NULL,
    active INTEGER NOT NULL,
    starts_at TEXT,
    ends_at TEXT,
    usage_limit INTEGER,
    usage_count INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT,
    created_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS product_bundles (
    id TEXT PRIMARY KEY,
    promotion_id TEXT NOT NULL,
    product_id TEXT NOT NULL,
    variant_id TEXT,
    quantity INTEGER NOT NULL CHECK (quantity >= 1)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS cart_promotions (
    cart_id TEXT NOT NULL,
    promotion_id TEXT NOT NULL,
    attached_at TEXT NOT NULL,
    PRIMARY KEY (cart_id, promotion_id)
)"#,
    r#"
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    status TEXT NOT NULL,
    coming_soon INTEGER NOT NULL DEFAULT 0,
    price INTEGER NOT NULL,
    original_price INTEGER NOT NULL,
    currency TEXT NOT NULL,
    image_url TEXT
)"#,
    r#"
CREATE TABLE IF NOT EXISTS product_variants (
    id TEXT PRIMARY KEY,
    product_id TEXT NOT NULL,
    name TEXT NOT NULL,
    active INTEGER NOT NULL,
    price INTEGER,
    original_price INTEGER,
    image_url TEXT
)"#,
    r#"
CREATE TABLE IF NOT EXISTS addresses (
    id TEXT PRIMARY KEY,
    user_id TEXT,
    cart_id TEXT,
    full_name TEXT NOT NULL,
    phone TEXT NOT NULL,
    line1 TEXT NOT NULL,
    line2 TEXT,
    city TEXT NOT NULL,
    region TEXT,
    postal_code TEXT,
    country TEXT NOT NULL,
    created_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS orders (
    id TEXT PRIMARY KEY,
    order_number TEXT NOT NULL UNIQUE,
    cart_id TEXT NOT NULL,
    user_id TEXT,
    status TEXT NOT NULL,
    payment_status TEXT NOT NULL,
    installment INTEGER NOT NULL,
    customer_name TEXT NOT NULL,
    email TEXT NOT NULL,
    phone TEXT NOT NULL,
    shipping_address TEXT NOT NULL,
    billing_address TEXT NOT NULL,
    note TEXT,
    currency TEXT NOT NULL,
    subtotal INTEGER NOT NULL,
    discount_total INTEGER NOT NULL,
    shipping_total INTEGER NOT NULL,
    tax_total INTEGER NOT NULL,
    total INTEGER NOT NULL,
    applied_promotions TEXT NOT NULL DEFAULT '[]',
    idempotency_key TEXT UNIQUE,
    metadata TEXT NOT NULL DEFAULT '{}',
    paid_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS order_items (
    id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL,
    product_id TEXT NOT NULL,
    variant_id TEXT,
    product_name TEXT NOT NULL,
    variant_name TEXT,
    image_url TEXT,
    quantity INTEGER NOT NULL,
    unit_price INTEGER NOT NULL,
    original_unit_price INTEGER NOT NULL,
    currency TEXT NOT NULL,
    line_total INTEGER NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS payment_transactions (
    id TEXT PRIMARY KEY,
    order_id TEXT NOT NULL,
    gateway_transaction_id TEXT UNIQUE,
    merch_txn_ref TEXT NOT NULL,
    response_code TEXT NOT NULL,
    amount INTEGER NOT NULL,
    successful INTEGER NOT NULL,
    source TEXT NOT NULL,
    raw_params TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
)"#,
    r#"
CREATE TABLE IF NOT EXISTS emailed_carts (
    id TEXT PRIMARY KEY,
    cart_id TEXT NOT NULL,
    email TEXT NOT NULL,
    order_id TEXT,
    created_at TEXT NOT NULL
)"#,
];
