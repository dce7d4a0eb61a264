//! SQLite PaymentRepository implementation.

use async_trait::async_trait;
use sea_query::{Asterisk, Expr, Order, Query, SqliteQueryBuilder};
use sea_query_binder::SqlxBinder;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use super::{parse_ts, parse_uuid, ts, SqliteUnitOfWork};
use crate::model::PaymentTransaction;
use crate::storage::schema::PaymentTransactions;
use crate::storage::{PaymentRepository, Result};

fn transaction_from_row(row: &SqliteRow) -> Result<PaymentTransaction> {
    let raw_params: String = row.try_get("raw_params")?;
    Ok(PaymentTransaction {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        order_id: parse_uuid(&row.try_get::<String, _>("order_id")?)?,
        gateway_transaction_id: row.try_get("gateway_transaction_id")?,
        merch_txn_ref: row.try_get("merch_txn_ref")?,
        response_code: row.try_get("response_code")?,
        amount: row.try_get("amount")?,
        successful: row.try_get("successful")?,
        source: row.try_get::<String, _>("source")?.parse()?,
        raw_params: serde_json::from_str(&raw_params)?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

#[async_trait]
impl PaymentRepository for SqliteUnitOfWork {
    async fn payment_transaction_exists(&mut self, gateway_transaction_id: &str) -> Result<bool> {
        let query = Query::select()
            .column(PaymentTransactions::Id)
            .from(PaymentTransactions::Table)
            .and_where(
                Expr::col(PaymentTransactions::GatewayTransactionId).eq(gateway_transaction_id),
            )
            .build_sqlx(SqliteQueryBuilder);

        Ok(self.fetch_optional(query).await?.is_some())
    }

    async fn insert_payment_transaction(&mut self, transaction: &PaymentTransaction) -> Result<()> {
        let query = Query::insert()
            .into_table(PaymentTransactions::Table)
            .columns([
                PaymentTransactions::Id,
                PaymentTransactions::OrderId,
                PaymentTransactions::GatewayTransactionId,
                PaymentTransactions::MerchTxnRef,
                PaymentTransactions::ResponseCode,
                PaymentTransactions::Amount,
                PaymentTransactions::Successful,
                PaymentTransactions::Source,
                PaymentTransactions::RawParams,
                PaymentTransactions::CreatedAt,
            ])
            .values_panic([
                transaction.id.to_string().into(),
                transaction.order_id.to_string().into(),
                transaction.gateway_transaction_id.clone().into(),
                transaction.merch_txn_ref.as_str().into(),
                transaction.response_code.as_str().into(),
                transaction.amount.into(),
                transaction.successful.into(),
                transaction.source.as_str().into(),
                serde_json::to_string(&transaction.raw_params)?.into(),
                ts(&transaction.created_at).into(),
            ])
            .build_sqlx(SqliteQueryBuilder);

        self.execute(query).await?;
        Ok(())
    }

    async fn payment_transactions(&mut self, order_id: Uuid) -> Result<Vec<PaymentTransaction>> {
        let query = Query::select()
            .column(Asterisk)
            .from(PaymentTransactions::Table)
            .and_where(Expr::col(PaymentTransactions::OrderId).eq(order_id.to_string()))
            .order_by(PaymentTransactions::CreatedAt, Order::Asc)
            .build_sqlx(SqliteQueryBuilder);

        self.fetch_all(query).await?.iter().map(transaction_from_row).collect()
    }
}
