//! SQLite CartRepository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Asterisk, Cond, Expr, Order, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::{
    not_found, opt_uuid, parse_opt_uuid, parse_ts, parse_uuid, to_u32, ts, SqliteUnitOfWork,
};
use crate::model::{Cart, CartItem, EmailedCart};
use crate::storage::schema::{CartItems, CartPromotions, Carts, EmailedCarts};
use crate::storage::{CartRepository, Result};

const OPEN_STATUSES: [&str; 2] = ["active", "emailed"];

fn cart_from_row(row: &SqliteRow) -> Result<Cart> {
    let metadata: String = row.try_get("metadata")?;
    Ok(Cart {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        session_id: row.try_get("session_id")?,
        user_id: parse_opt_uuid(row.try_get("user_id")?)?,
        status: row.try_get::<String, _>("status")?.parse()?,
        cart_type: row.try_get::<String, _>("cart_type")?.parse()?,
        expires_at: parse_ts(&row.try_get::<String, _>("expires_at")?)?,
        last_activity_at: parse_ts(&row.try_get::<String, _>("last_activity_at")?)?,
        guest_email: row.try_get("guest_email")?,
        metadata: serde_json::from_str(&metadata)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<CartItem> {
    Ok(CartItem {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        cart_id: parse_uuid(&row.try_get::<String, _>("cart_id")?)?,
        product_id: parse_uuid(&row.try_get::<String, _>("product_id")?)?,
        variant_id: parse_opt_uuid(row.try_get("variant_id")?)?,
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: row.try_get("unit_price")?,
        original_unit_price: row.try_get("original_unit_price")?,
        currency: row.try_get("currency")?,
        product_name: row.try_get("product_name")?,
        variant_name: row.try_get("variant_name")?,
        image_url: row.try_get("image_url")?,
        expires_at: parse_ts(&row.try_get::<String, _>("expires_at")?)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

impl SqliteUnitOfWork {
    async fn open_cart_where(&mut self, cond: Cond) -> Result<Option<Cart>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Carts::Table)
            .cond_where(cond.add(Expr::col(Carts::Status).is_in(OPEN_STATUSES)))
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_optional(query).await?.as_ref().map(cart_from_row).transpose()
    }
}

#[async_trait]
impl CartRepository for SqliteUnitOfWork {
    async fn lock_cart(&mut self, id: Uuid) -> Result<Option<Cart>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Carts::Table)
            .and_where(Expr::col(Carts::Id).eq(id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_optional(query).await?.as_ref().map(cart_from_row).transpose()
    }

    async fn find_open_cart_by_session(&mut self, session_id: &str) -> Result<Option<Cart>> {
        self.open_cart_where(Cond::all().add(Expr::col(Carts::SessionId).eq(session_id)))
            .await
    }

    async fn find_open_cart_by_user(&mut self, user_id: Uuid) -> Result<Option<Cart>> {
        self.open_cart_where(Cond::all().add(Expr::col(Carts::UserId).eq(user_id.to_string())))
            .await
    }

    async fn insert_cart(&mut self, cart: &Cart) -> Result<()> {
        let query = Query::insert()
            .into_table(Carts::Table)
            .columns([
                Carts::Id,
                Carts::SessionId,
                Carts::UserId,
                Carts::Status,
                Carts::CartType,
                Carts::ExpiresAt,
                Carts::LastActivityAt,
                Carts::GuestEmail,
                Carts::Metadata,
                Carts::CreatedAt,
                Carts::UpdatedAt,
            ])
            .values_panic([
                cart.id.to_string().into(),
                cart.session_id.clone().into(),
                opt_uuid(&cart.user_id).into(),
                cart.status.as_str().into(),
                cart.cart_type.as_str().into(),
                ts(&cart.expires_at).into(),
                ts(&cart.last_activity_at).into(),
                cart.guest_email.clone().into(),
                serde_json::to_string(&cart.metadata)?.into(),
                ts(&cart.created_at).into(),
                ts(&cart.updated_at).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await?;
        Ok(())
    }

    async fn update_cart(&mut self, cart: &Cart) -> Result<()> {
        let query = Query::update()
            .table(Carts::Table)
            .values([
                (Carts::SessionId, cart.session_id.clone().into()),
                (Carts::UserId, opt_uuid(&cart.user_id).into()),
                (Carts::Status, cart.status.as_str().into()),
                (Carts::CartType, cart.cart_type.as_str().into()),
                (Carts::ExpiresAt, ts(&cart.expires_at).into()),
                (Carts::LastActivityAt, ts(&cart.last_activity_at).into()),
                (Carts::GuestEmail, cart.guest_email.clone().into()),
                (Carts::Metadata, serde_json::to_string(&cart.metadata)?.into()),
                (Carts::UpdatedAt, ts(&cart.updated_at).into()),
            ])
            .and_where(Expr::col(Carts::Id).eq(cart.id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        if self.execute(query).await? == 0 {
            return Err(not_found("cart", cart.id));
        }
        Ok(())
    }

    async fn delete_cart(&mut self, id: Uuid) -> Result<()> {
        let id = id.to_string();
        let items = Query::delete()
            .from_table(CartItems::Table)
            .and_where(Expr::col(CartItems::CartId).eq(id.as_str()))
            .build_sqlx(SqliteQueryBuilder);
        let links = Query::delete()
            .from_table(CartPromotions::Table)
            .and_where(Expr::col(CartPromotions::CartId).eq(id.as_str()))
            .build_sqlx(SqliteQueryBuilder);
        let cart = Query::delete()
            .from_table(Carts::Table)
            .and_where(Expr::col(Carts::Id).eq(id.as_str()))
            .build_sqlx(SqliteQueryBuilder);

        self.execute(items).await?;
        self.execute(links).await?;
        self.execute(cart).await?;
        Ok(())
    }

    async fn stale_open_carts(
        &mut self,
        inactive_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Cart>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Carts::Table)
            .cond_where(
                Cond::all().add(Expr::col(Carts::Status).is_in(OPEN_STATUSES)).add(
                    Cond::any()
                        .add(Expr::col(Carts::LastActivityAt).lt(ts(&inactive_before)))
                        .add(Expr::col(Carts::ExpiresAt).lte(ts(&now))),
                ),
            )
            .order_by(Carts::LastActivityAt, Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_all(query).await?.iter().map(cart_from_row).collect()
    }

    async fn cart_items(&mut self, cart_id: Uuid) -> Result<Vec<CartItem>> {
        let query = Query::select()
            .column(Asterisk)
            .from(CartItems::Table)
            .and_where(Expr::col(CartItems::CartId).eq(cart_id.to_string()))
            .order_by(CartItems::CreatedAt, Order::Asc)
            .order_by(CartItems::Id, Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_all(query).await?.iter().map(item_from_row).collect()
    }

    async fn find_cart_item(
        &mut self,
        cart_id: Uuid,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<Option<CartItem>> {
        let variant = match variant_id {
            Some(variant_id) => Expr::col(CartItems::VariantId).eq(variant_id.to_string()),
            None => Expr::col(CartItems::VariantId).is_null(),
        };
        let query = Query::select()
            .column(Asterisk)
            .from(CartItems::Table)
            .and_where(Expr::col(CartItems::CartId).eq(cart_id.to_string()))
            .and_where(Expr::col(CartItems::ProductId).eq(product_id.to_string()))
            .and_where(variant)
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_optional(query).await?.as_ref().map(item_from_row).transpose()
    }

    async fn insert_cart_item(&mut self, item: &CartItem) -> Result<()> {
        let query = Query::insert()
            .into_table(CartItems::Table)
            .columns([
                CartItems::Id,
                CartItems::CartId,
                CartItems::ProductId,
                CartItems::VariantId,
                CartItems::Quantity,
                CartItems::UnitPrice,
                CartItems::OriginalUnitPrice,
                CartItems::Currency,
                CartItems::ProductName,
                CartItems::VariantName,
                CartItems::ImageUrl,
                CartItems::ExpiresAt,
                CartItems::CreatedAt,
                CartItems::UpdatedAt,
            ])
            .values_panic([
                item.id.to_string().into(),
                item.cart_id.to_string().into(),
                item.product_id.to_string().into(),
                opt_uuid(&item.variant_id).into(),
                item.quantity.into(),
                item.unit_price.into(),
                item.original_unit_price.into(),
                item.currency.as_str().into(),
                item.product_name.as_str().into(),
                item.variant_name.clone().into(),
                item.image_url.clone().into(),
                ts(&item.expires_at).into(),
                ts(&item.created_at).into(),
                ts(&item.updated_at).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await?;
        Ok(())
    }

    async fn update_cart_item(&mut self, item: &CartItem) -> Result<()> {
        let query = Query::update()
            .table(CartItems::Table)
            .values([
                (CartItems::CartId, item.cart_id.to_string().into()),
                (CartItems::Quantity, item.quantity.into()),
                (CartItems::UnitPrice, item.unit_price.into()),
                (CartItems::OriginalUnitPrice, item.original_unit_price.into()),
                (CartItems::Currency, item.currency.as_str().into()),
                (CartItems::ProductName, item.product_name.as_str().into()),
                (CartItems::VariantName, item.variant_name.clone().into()),
                (CartItems::ImageUrl, item.image_url.clone().into()),
                (CartItems::ExpiresAt, ts(&item.expires_at).into()),
                (CartItems::UpdatedAt, ts(&item.updated_at).into()),
            ])
            .and_where(Expr::col(CartItems::Id).eq(item.id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        if self.execute(query).await? == 0 {
            return Err(not_found("cart item", item.id));
        }
        Ok(())
    }

    async fn delete_cart_item(&mut self, id: Uuid) -> Result<()> {
        let query = Query::delete()
            .from_table(CartItems::Table)
            .and_where(Expr::col(CartItems::Id).eq(id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await?;
        Ok(())
    }

    async fn delete_expired_cart_items(&mut self, now: DateTime<Utc>) -> Result<u64> {
        let query = Query::delete()
            .from_table(CartItems::Table)
            .and_where(Expr::col(CartItems::ExpiresAt).lte(ts(&now)))
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await
    }

    async fn insert_emailed_cart(&mut self, record: &EmailedCart) -> Result<()> {
        let query = Query::insert()
            .into_table(EmailedCarts::Table)
            .columns([
                EmailedCarts::Id,
                EmailedCarts::CartId,
                EmailedCarts::Email,
                EmailedCarts::OrderId,
                EmailedCarts::CreatedAt,
            ])
            .values_panic([
                record.id.to_string().into(),
                record.cart_id.to_string().into(),
                record.email.as_str().into(),
                opt_uuid(&record.order_id).into(),
                ts(&record.created_at).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await?;
        Ok(())
    }
}
