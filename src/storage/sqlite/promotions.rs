//! SQLite PromotionRepository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Asterisk, Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::{
    not_found, opt_ts, opt_uuid, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid, to_u32, ts,
    SqliteUnitOfWork,
};
use crate::model::{DiscountType, ProductBundle, Promotion};
use crate::storage::schema::{CartPromotions, ProductBundles, Promotions};
use crate::storage::{PromotionRepository, Result};

/// Map a promotion row. Bundle rules are loaded separately.
fn promotion_from_row(row: &SqliteRow) -> Result<Promotion> {
    let usage_limit: Option<i64> = row.try_get("usage_limit")?;
    Ok(Promotion {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        discount_type: row.try_get::<String, _>("discount_type")?.parse()?,
        discount_value: row.try_get("discount_value")?,
        stackable: row.try_get("stackable")?,
        active: row.try_get("active")?,
        starts_at: parse_opt_ts(row.try_get("starts_at")?)?,
        ends_at: parse_opt_ts(row.try_get("ends_at")?)?,
        usage_limit: usage_limit.map(|limit| to_u32(limit, "usage_limit")).transpose()?,
        usage_count: to_u32(row.try_get("usage_count")?, "usage_count")?,
        deleted_at: parse_opt_ts(row.try_get("deleted_at")?)?,
        bundles: Vec::new(),
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn bundle_from_row(row: &SqliteRow) -> Result<ProductBundle> {
    Ok(ProductBundle {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        promotion_id: parse_uuid(&row.try_get::<String, _>("promotion_id")?)?,
        product_id: parse_uuid(&row.try_get::<String, _>("product_id")?)?,
        variant_id: parse_opt_uuid(row.try_get("variant_id")?)?,
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
    })
}

impl SqliteUnitOfWork {
    async fn with_bundles(&mut self, mut promotion: Promotion) -> Result<Promotion> {
        let query = Query::select()
            .column(Asterisk)
            .from(ProductBundles::Table)
            .and_where(Expr::col(ProductBundles::PromotionId).eq(promotion.id.to_string()))
            .order_by_expr(Expr::cust("rowid"), Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        promotion.bundles = self
            .fetch_all(query)
            .await?
            .iter()
            .map(bundle_from_row)
            .collect::<Result<_>>()?;
        Ok(promotion)
    }

    async fn promotion_by_id(&mut self, id: Uuid) -> Result<Option<Promotion>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Promotions::Table)
            .and_where(Expr::col(Promotions::Id).eq(id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        match self.fetch_optional(query).await? {
            Some(row) => Ok(Some(self.with_bundles(promotion_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PromotionRepository for SqliteUnitOfWork {
    async fn find_promotion_by_code(&mut self, code: &str) -> Result<Option<Promotion>> {
        // The code column is declared COLLATE NOCASE.
        let query = Query::select()
            .column(Asterisk)
            .from(Promotions::Table)
            .and_where(Expr::col(Promotions::Code).eq(code.trim()))
            .build_sqlx(SqliteQueryBuilder);

        match self.fetch_optional(query).await? {
            Some(row) => Ok(Some(self.with_bundles(promotion_from_row(&row)?).await?)),
            None => Ok(None),
        }
    }

    async fn lock_promotion(&mut self, id: Uuid) -> Result<Option<Promotion>> {
        self.promotion_by_id(id).await
    }

    async fn active_bundle_promotions(&mut self, now: DateTime<Utc>) -> Result<Vec<Promotion>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Promotions::Table)
            .and_where(Expr::col(Promotions::DiscountType).eq(DiscountType::Bundle.as_str()))
            .and_where(Expr::col(Promotions::Active).eq(true))
            .and_where(Expr::col(Promotions::DeletedAt).is_null())
            .order_by(Promotions::CreatedAt, Order::Asc)
            .order_by(Promotions::Id, Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        let rows = self.fetch_all(query).await?;
        let mut promotions = Vec::with_capacity(rows.len());
        for row in &rows {
            let promotion = promotion_from_row(row)?;
            if promotion.applies_now(now) {
                promotions.push(self.with_bundles(promotion).await?);
            }
        }
        Ok(promotions)
    }

    async fn cart_promotions(&mut self, cart_id: Uuid) -> Result<Vec<Promotion>> {
        let query = Query::select()
            .column(CartPromotions::PromotionId)
            .from(CartPromotions::Table)
            .and_where(Expr::col(CartPromotions::CartId).eq(cart_id.to_string()))
            .order_by_expr(Expr::cust("rowid"), Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        let ids = self
            .fetch_all(query)
            .await?
            .iter()
            .map(|row| parse_uuid(&row.try_get::<String, _>("promotion_id")?))
            .collect::<Result<Vec<_>>>()?;

        let mut promotions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(promotion) = self.promotion_by_id(id).await? {
                promotions.push(promotion);
            }
        }
        Ok(promotions)
    }

    async fn attach_promotion(&mut self, cart_id: Uuid, promotion_id: Uuid) -> Result<()> {
        let exists = Query::select()
            .column(Promotions::Id)
            .from(Promotions::Table)
            .and_where(Expr::col(Promotions::Id).eq(promotion_id.to_string()))
            .build_sqlx(SqliteQueryBuilder);
        if self.fetch_optional(exists).await?.is_none() {
            return Err(not_found("promotion", promotion_id));
        }

        let query = Query::insert()
            .into_table(CartPromotions::Table)
            .columns([
                CartPromotions::CartId,
                CartPromotions::PromotionId,
                CartPromotions::AttachedAt,
            ])
            .values_panic([
                cart_id.to_string().into(),
                promotion_id.to_string().into(),
                ts(&Utc::now()).into(),
            ])
            .on_conflict(
                OnConflict::columns([CartPromotions::CartId, CartPromotions::PromotionId])
                    .do_nothing()
                    .to_owned(),
            )
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await?;
        Ok(())
    }

    async fn detach_promotion(&mut self, cart_id: Uuid, promotion_id: Uuid) -> Result<()> {
        let query = Query::delete()
            .from_table(CartPromotions::Table)
            .and_where(Expr::col(CartPromotions::CartId).eq(cart_id.to_string()))
            .and_where(Expr::col(CartPromotions::PromotionId).eq(promotion_id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await?;
        Ok(())
    }

    async fn save_promotion(&mut self, promotion: &Promotion) -> Result<()> {
        let query = Query::insert()
            .into_table(Promotions::Table)
            .columns([
                Promotions::Id,
                Promotions::Code,
                Promotions::Name,
                Promotions::DiscountType,
                Promotions::DiscountValue,
                Promotions::Stackable,
                Promotions::Active,
                Promotions::StartsAt,
                Promotions::EndsAt,
                Promotions::UsageLimit,
                Promotions::UsageCount,
                Promotions::DeletedAt,
                Promotions::CreatedAt,
            ])
            .values_panic([
                promotion.id.to_string().into(),
                promotion.code.as_str().into(),
                promotion.name.as_str().into(),
                promotion.discount_type.as_str().into(),
                promotion.discount_value.into(),
                promotion.stackable.into(),
                promotion.active.into(),
                opt_ts(&promotion.starts_at).into(),
                opt_ts(&promotion.ends_at).into(),
                promotion.usage_limit.into(),
                promotion.usage_count.into(),
                opt_ts(&promotion.deleted_at).into(),
                ts(&promotion.created_at).into(),
            ])
            .on_conflict(
                OnConflict::column(Promotions::Id)
                    .update_columns([
                        Promotions::Code,
                        Promotions::Name,
                        Promotions::DiscountType,
                        Promotions::DiscountValue,
                        Promotions::Stackable,
                        Promotions::Active,
                        Promotions::StartsAt,
                        Promotions::EndsAt,
                        Promotions::UsageLimit,
                        Promotions::UsageCount,
                        Promotions::DeletedAt,
                    ])
                    .to_owned(),
            )
            .build_sqlx(SqliteQueryBuilder);
        self.execute(query).await?;

        let clear = Query::delete()
            .from_table(ProductBundles::Table)
            .and_where(Expr::col(ProductBundles::PromotionId).eq(promotion.id.to_string()))
            .build_sqlx(SqliteQueryBuilder);
        self.execute(clear).await?;

        for bundle in &promotion.bundles {
            let insert = Query::insert()
                .into_table(ProductBundles::Table)
                .columns([
                    ProductBundles::Id,
                    ProductBundles::PromotionId,
                    ProductBundles::ProductId,
                    ProductBundles::VariantId,
                    ProductBundles::Quantity,
                ])
                .values_panic([
                    bundle.id.to_string().into(),
                    promotion.id.to_string().into(),
                    bundle.product_id.to_string().into(),
                    opt_uuid(&bundle.variant_id).into(),
                    bundle.quantity.into(),
                ])
                .build_sqlx(SqliteQueryBuilder);
            self.execute(insert).await?;
        }
        Ok(())
    }
}
