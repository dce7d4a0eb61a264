//! SQLite catalog and address repositories.

use async_trait::async_trait;
use sea_query::{Asterisk, Expr, OnConflict, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::{opt_uuid, parse_opt_uuid, parse_ts, parse_uuid, ts, SqliteUnitOfWork};
use crate::model::{Address, Product, ProductVariant};
use crate::storage::schema::{Addresses, ProductVariants, Products};
use crate::storage::{AddressRepository, CatalogRepository, Result};

fn product_from_row(row: &SqliteRow) -> Result<Product> {
    Ok(Product {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        name: row.try_get("name")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        coming_soon: row.try_get("coming_soon")?,
        price: row.try_get("price")?,
        original_price: row.try_get("original_price")?,
        currency: row.try_get("currency")?,
        image_url: row.try_get("image_url")?,
    })
}

fn variant_from_row(row: &SqliteRow) -> Result<ProductVariant> {
    Ok(ProductVariant {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        product_id: parse_uuid(&row.try_get::<String, _>("product_id")?)?,
        name: row.try_get("name")?,
        active: row.try_get("active")?,
        price: row.try_get("price")?,
        original_price: row.try_get("original_price")?,
        image_url: row.try_get("image_url")?,
    })
}

fn address_from_row(row: &SqliteRow) -> Result<Address> {
    Ok(Address {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        user_id: parse_opt_uuid(row.try_get("user_id")?)?,
        cart_id: parse_opt_uuid(row.try_get("cart_id")?)?,
        full_name: row.try_get("full_name")?,
        phone: row.try_get("phone")?,
        line1: row.try_get("line1")?,
        line2: row.try_get("line2")?,
        city: row.try_get("city")?,
        region: row.try_get("region")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

#[async_trait]
impl CatalogRepository for SqliteUnitOfWork {
    async fn product(&mut self, id: Uuid) -> Result<Option<Product>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Products::Table)
            .and_where(Expr::col(Products::Id).eq(id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_optional(query).await?.as_ref().map(product_from_row).transpose()
    }

    async fn variant(&mut self, id: Uuid) -> Result<Option<ProductVariant>> {
        let query = Query::select()
            .column(Asterisk)
            .from(ProductVariants::Table)
            .and_where(Expr::col(ProductVariants::Id).eq(id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_optional(query).await?.as_ref().map(variant_from_row).transpose()
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        let query = Query::insert()
            .into_table(Products::Table)
            .columns([
                Products::Id,
                Products::Name,
                Products::Status,
                Products::ComingSoon,
                Products::Price,
                Products::OriginalPrice,
                Products::Currency,
                Products::ImageUrl,
            ])
            .values_panic([
                product.id.to_string().into(),
                product.name.as_str().into(),
                product.status.as_str().into(),
                product.coming_soon.into(),
                product.price.into(),
                product.original_price.into(),
                product.currency.as_str().into(),
                product.image_url.clone().into(),
            ])
            .on_conflict(
                OnConflict::column(Products::Id)
                    .update_columns([
                        Products::Name,
                        Products::Status,
                        Products::ComingSoon,
                        Products::Price,
                        Products::OriginalPrice,
                        Products::Currency,
                        Products::ImageUrl,
                    ])
                    .to_owned(),
            )
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await?;
        Ok(())
    }

    async fn save_variant(&mut self, variant: &ProductVariant) -> Result<()> {
        let query = Query::insert()
            .into_table(ProductVariants::Table)
            .columns([
                ProductVariants::Id,
                ProductVariants::ProductId,
                ProductVariants::Name,
                ProductVariants::Active,
                ProductVariants::Price,
                ProductVariants::OriginalPrice,
                ProductVariants::ImageUrl,
            ])
            .values_panic([
                variant.id.to_string().into(),
                variant.product_id.to_string().into(),
                variant.name.as_str().into(),
                variant.active.into(),
                variant.price.into(),
                variant.original_price.into(),
                variant.image_url.clone().into(),
            ])
            .on_conflict(
                OnConflict::column(ProductVariants::Id)
                    .update_columns([
                        ProductVariants::ProductId,
                        ProductVariants::Name,
                        ProductVariants::Active,
                        ProductVariants::Price,
                        ProductVariants::OriginalPrice,
                        ProductVariants::ImageUrl,
                    ])
                    .to_owned(),
            )
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await?;
        Ok(())
    }
}

#[async_trait]
impl AddressRepository for SqliteUnitOfWork {
    async fn address(&mut self, id: Uuid) -> Result<Option<Address>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Addresses::Table)
            .and_where(Expr::col(Addresses::Id).eq(id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_optional(query).await?.as_ref().map(address_from_row).transpose()
    }

    async fn insert_address(&mut self, address: &Address) -> Result<()> {
        let query = Query::insert()
            .into_table(Addresses::Table)
            .columns([
                Addresses::Id,
                Addresses::UserId,
                Addresses::CartId,
                Addresses::FullName,
                Addresses::Phone,
                Addresses::Line1,
                Addresses::Line2,
                Addresses::City,
                Addresses::Region,
                Addresses::PostalCode,
                Addresses::Country,
                Addresses::CreatedAt,
            ])
            .values_panic([
                address.id.to_string().into(),
                opt_uuid(&address.user_id).into(),
                opt_uuid(&address.cart_id).into(),
                address.full_name.as_str().into(),
                address.phone.as_str().into(),
                address.line1.as_str().into(),
                address.line2.clone().into(),
                address.city.as_str().into(),
                address.region.clone().into(),
                address.postal_code.clone().into(),
                address.country.as_str().into(),
                ts(&address.created_at).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await?;
        Ok(())
    }
}
