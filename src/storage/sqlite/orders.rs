//! SQLite OrderRepository implementation.
//!
//! Address snapshots, applied promotions and metadata are stored as JSON
//! text so an order never changes when its source rows do.

use async_trait::async_trait;
use sea_query::{Asterisk, Expr, Order as SortOrder, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::{
    not_found, opt_ts, opt_uuid, parse_opt_ts, parse_opt_uuid, parse_ts, parse_uuid, to_u32, ts,
    SqliteUnitOfWork,
};
use crate::model::{Order, OrderItem, Totals};
use crate::storage::schema::{OrderItems, Orders};
use crate::storage::{OrderRepository, Result};

fn order_from_row(row: &SqliteRow) -> Result<Order> {
    let shipping_address: String = row.try_get("shipping_address")?;
    let billing_address: String = row.try_get("billing_address")?;
    let applied_promotions: String = row.try_get("applied_promotions")?;
    let metadata: String = row.try_get("metadata")?;
    Ok(Order {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        order_number: row.try_get("order_number")?,
        cart_id: parse_uuid(&row.try_get::<String, _>("cart_id")?)?,
        user_id: parse_opt_uuid(row.try_get("user_id")?)?,
        status: row.try_get::<String, _>("status")?.parse()?,
        payment_status: row.try_get::<String, _>("payment_status")?.parse()?,
        installment: row.try_get("installment")?,
        customer_name: row.try_get("customer_name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        shipping_address: serde_json::from_str(&shipping_address)?,
        billing_address: serde_json::from_str(&billing_address)?,
        note: row.try_get("note")?,
        currency: row.try_get("currency")?,
        totals: Totals {
            subtotal: row.try_get("subtotal")?,
            discount_total: row.try_get("discount_total")?,
            shipping_total: row.try_get("shipping_total")?,
            tax_total: row.try_get("tax_total")?,
            total: row.try_get("total")?,
        },
        applied_promotions: serde_json::from_str(&applied_promotions)?,
        idempotency_key: row.try_get("idempotency_key")?,
        metadata: serde_json::from_str(&metadata)?,
        paid_at: parse_opt_ts(row.try_get("paid_at")?)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn item_from_row(row: &SqliteRow) -> Result<OrderItem> {
    Ok(OrderItem {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        order_id: parse_uuid(&row.try_get::<String, _>("order_id")?)?,
        product_id: parse_uuid(&row.try_get::<String, _>("product_id")?)?,
        variant_id: parse_opt_uuid(row.try_get("variant_id")?)?,
        product_name: row.try_get("product_name")?,
        variant_name: row.try_get("variant_name")?,
        image_url: row.try_get("image_url")?,
        quantity: to_u32(row.try_get("quantity")?, "quantity")?,
        unit_price: row.try_get("unit_price")?,
        original_unit_price: row.try_get("original_unit_price")?,
        currency: row.try_get("currency")?,
        line_total: row.try_get("line_total")?,
    })
}

impl SqliteUnitOfWork {
    async fn order_where(&mut self, column: Orders, value: String) -> Result<Option<Order>> {
        let query = Query::select()
            .column(Asterisk)
            .from(Orders::Table)
            .and_where(Expr::col(column).eq(value))
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_optional(query).await?.as_ref().map(order_from_row).transpose()
    }
}

#[async_trait]
impl OrderRepository for SqliteUnitOfWork {
    async fn order(&mut self, id: Uuid) -> Result<Option<Order>> {
        self.order_where(Orders::Id, id.to_string()).await
    }

    async fn order_by_number(&mut self, order_number: &str) -> Result<Option<Order>> {
        self.order_where(Orders::OrderNumber, order_number.to_string()).await
    }

    async fn order_by_idempotency_key(&mut self, key: &str) -> Result<Option<Order>> {
        self.order_where(Orders::IdempotencyKey, key.to_string()).await
    }

    async fn order_number_exists(&mut self, order_number: &str) -> Result<bool> {
        let query = Query::select()
            .column(Orders::Id)
            .from(Orders::Table)
            .and_where(Expr::col(Orders::OrderNumber).eq(order_number))
            .build_sqlx(SqliteQueryBuilder);

        Ok(self.fetch_optional(query).await?.is_some())
    }

    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let query = Query::insert()
            .into_table(Orders::Table)
            .columns([
                Orders::Id,
                Orders::OrderNumber,
                Orders::CartId,
                Orders::UserId,
                Orders::Status,
                Orders::PaymentStatus,
                Orders::Installment,
                Orders::CustomerName,
                Orders::Email,
                Orders::Phone,
                Orders::ShippingAddress,
                Orders::BillingAddress,
                Orders::Note,
                Orders::Currency,
                Orders::Subtotal,
                Orders::DiscountTotal,
                Orders::ShippingTotal,
                Orders::TaxTotal,
                Orders::Total,
                Orders::AppliedPromotions,
                Orders::IdempotencyKey,
                Orders::Metadata,
                Orders::PaidAt,
                Orders::CreatedAt,
                Orders::UpdatedAt,
            ])
            .values_panic([
                order.id.to_string().into(),
                order.order_number.as_str().into(),
                order.cart_id.to_string().into(),
                opt_uuid(&order.user_id).into(),
                order.status.as_str().into(),
                order.payment_status.as_str().into(),
                order.installment.into(),
                order.customer_name.as_str().into(),
                order.email.as_str().into(),
                order.phone.as_str().into(),
                serde_json::to_string(&order.shipping_address)?.into(),
                serde_json::to_string(&order.billing_address)?.into(),
                order.note.clone().into(),
                order.currency.as_str().into(),
                order.totals.subtotal.into(),
                order.totals.discount_total.into(),
                order.totals.shipping_total.into(),
                order.totals.tax_total.into(),
                order.totals.total.into(),
                serde_json::to_string(&order.applied_promotions)?.into(),
                order.idempotency_key.clone().into(),
                serde_json::to_string(&order.metadata)?.into(),
                opt_ts(&order.paid_at).into(),
                ts(&order.created_at).into(),
                ts(&order.updated_at).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);
        self.execute(query).await?;

        for item in items {
            let insert = Query::insert()
                .into_table(OrderItems::Table)
                .columns([
                    OrderItems::Id,
                    OrderItems::OrderId,
                    OrderItems::ProductId,
                    OrderItems::VariantId,
                    OrderItems::ProductName,
                    OrderItems::VariantName,
                    OrderItems::ImageUrl,
                    OrderItems::Quantity,
                    OrderItems::UnitPrice,
                    OrderItems::OriginalUnitPrice,
                    OrderItems::Currency,
                    OrderItems::LineTotal,
                ])
                .values_panic([
                    item.id.to_string().into(),
                    item.order_id.to_string().into(),
                    item.product_id.to_string().into(),
                    opt_uuid(&item.variant_id).into(),
                    item.product_name.as_str().into(),
                    item.variant_name.clone().into(),
                    item.image_url.clone().into(),
                    item.quantity.into(),
                    item.unit_price.into(),
                    item.original_unit_price.into(),
                    item.currency.as_str().into(),
                    item.line_total.into(),
                ])
                .build_sqlx(SqliteQueryBuilder);
            self.execute(insert).await?;
        }
        Ok(())
    }

    async fn update_order(&mut self, order: &Order) -> Result<()> {
        let query = Query::update()
            .table(Orders::Table)
            .values([
                (Orders::Status, order.status.as_str().into()),
                (Orders::PaymentStatus, order.payment_status.as_str().into()),
                (Orders::Note, order.note.clone().into()),
                (Orders::Metadata, serde_json::to_string(&order.metadata)?.into()),
                (Orders::PaidAt, opt_ts(&order.paid_at).into()),
                (Orders::UpdatedAt, ts(&order.updated_at).into()),
            ])
            .and_where(Expr::col(Orders::Id).eq(order.id.to_string()))
            .build_sqlx(SqliteQueryBuilder);

        if self.execute(query).await? == 0 {
            return Err(not_found("order", order.id));
        }
        Ok(())
    }

    async fn order_items(&mut self, order_id: Uuid) -> Result<Vec<OrderItem>> {
        let query = Query::select()
            .column(Asterisk)
            .from(OrderItems::Table)
            .and_where(Expr::col(OrderItems::OrderId).eq(order_id.to_string()))
            .order_by_expr(Expr::cust("rowid"), SortOrder::Asc)
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_all(query).await?.iter().map(item_from_row).collect()
    }
}
