//! Inbound payment callback processing.
//!
//! A verified callback is recorded and may move the order from `pending` (or
//! `failed`) to `paid` or `failed`. An unverifiable callback is never trusted;
//! instead the gateway is asked directly through QueryDR. The unique gateway
//! transaction id is what makes repeated callbacks harmless.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::gateway::{
    PaymentGateway, QueryDrResponse, AMOUNT_KEY, MERCH_TXN_REF_KEY, RESPONSE_CODE_KEY, SUCCESS_CODE,
    TRANSACTION_NO_KEY,
};
use crate::checkout::order_number_from_reference;
use crate::model::{Order, OrderStatus, PaymentStatus, PaymentTransaction, TransactionSource};
use crate::notify::{notify_all, NotificationKind, Notifier};
use crate::storage::{finish, StorageError, Store, UnitOfWork};

#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Callback has no merchant transaction reference")]
    MissingReference,

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Unexpected error")]
    Unexpected,
}

impl From<StorageError> for CallbackError {
    fn from(err: StorageError) -> Self {
        error!(error = %err, "Storage failure during payment callback");
        Self::Unexpected
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// The order moved to `paid`.
    Paid,
    /// The order moved to `failed`.
    Failed,
    /// Nothing changed; this payment was handled before.
    AlreadyProcessed,
    /// The status could not be confirmed; the order stays `pending`.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedCallback {
    pub order_id: Uuid,
    pub order_number: String,
    pub outcome: CallbackOutcome,
}

pub struct PaymentCallbackProcessor {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    /// Factor between order minor units and the gateway's `vpc_Amount`.
    amount_multiplier: i64,
}

impl PaymentCallbackProcessor {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        amount_multiplier: i64,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            amount_multiplier: amount_multiplier.max(1),
        }
    }

    /// Handle one callback's parameters.
    pub async fn process(
        &self,
        params: BTreeMap<String, String>,
    ) -> Result<ProcessedCallback, CallbackError> {
        let merch_txn_ref = params
            .get(MERCH_TXN_REF_KEY)
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .ok_or(CallbackError::MissingReference)?;
        let order_number = order_number_from_reference(&merch_txn_ref).to_string();

        let processed = if self.gateway.verify_callback(&params) {
            self.process_verified(&order_number, &merch_txn_ref, params).await?
        } else {
            warn!(%order_number, %merch_txn_ref, "Callback hash did not verify; querying gateway");
            self.process_unverified(&order_number, &merch_txn_ref).await?
        };

        info!(
            order_id = %processed.order_id,
            order_number = %processed.order_number,
            %merch_txn_ref,
            outcome = ?processed.outcome,
            "Payment callback processed"
        );
        self.notify(&processed).await;
        Ok(processed)
    }

    async fn process_verified(
        &self,
        order_number: &str,
        merch_txn_ref: &str,
        params: BTreeMap<String, String>,
    ) -> Result<ProcessedCallback, CallbackError> {
        let mut uow = self.store.begin().await?;
        let result = self
            .record_verified(uow.as_mut(), order_number, merch_txn_ref, params, Utc::now())
            .await;
        finish(uow, result).await
    }

    async fn record_verified(
        &self,
        uow: &mut dyn UnitOfWork,
        order_number: &str,
        merch_txn_ref: &str,
        params: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<ProcessedCallback, CallbackError> {
        let mut order = uow
            .order_by_number(order_number)
            .await?
            .ok_or_else(|| CallbackError::OrderNotFound(order_number.to_string()))?;

        let field = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let transaction_no = field(TRANSACTION_NO_KEY);
        let response_code = field(RESPONSE_CODE_KEY).unwrap_or_default();
        let amount = self.order_amount(field(AMOUNT_KEY).as_deref());

        if let Some(transaction_no) = &transaction_no {
            if uow.payment_transaction_exists(transaction_no).await? {
                info!(order_id = %order.id, %transaction_no, "Duplicate callback ignored");
                return Ok(processed(&order, CallbackOutcome::AlreadyProcessed));
            }
        }

        let successful = response_code == SUCCESS_CODE;
        let transaction = PaymentTransaction {
            id: Uuid::new_v4(),
            order_id: order.id,
            gateway_transaction_id: transaction_no,
            merch_txn_ref: merch_txn_ref.to_string(),
            response_code,
            amount,
            successful,
            source: TransactionSource::Callback,
            raw_params: params,
            created_at: now,
        };
        if !self.record(uow, &order, &transaction).await? {
            return Ok(processed(&order, CallbackOutcome::AlreadyProcessed));
        }

        if order.payment_status == PaymentStatus::Paid {
            info!(order_id = %order.id, "Order already paid; callback recorded only");
            return Ok(processed(&order, CallbackOutcome::AlreadyProcessed));
        }

        let outcome = if successful {
            mark_paid(&mut order, now);
            CallbackOutcome::Paid
        } else {
            order.payment_status = PaymentStatus::Failed;
            order.updated_at = now;
            CallbackOutcome::Failed
        };
        uow.update_order(&order).await?;
        Ok(processed(&order, outcome))
    }

    async fn process_unverified(
        &self,
        order_number: &str,
        merch_txn_ref: &str,
    ) -> Result<ProcessedCallback, CallbackError> {
        // Read the order and release the lease before the network call.
        let mut uow = self.store.begin().await?;
        let result = uow.order_by_number(order_number).await.map_err(CallbackError::from);
        let order = finish(uow, result)
            .await?
            .ok_or_else(|| CallbackError::OrderNotFound(order_number.to_string()))?;

        if !order.is_payment_pending() {
            return Ok(processed(&order, CallbackOutcome::AlreadyProcessed));
        }

        let Some(response) = self
            .gateway
            .query_transaction_status(order_number, merch_txn_ref, order.installment)
            .await
        else {
            warn!(
                order_id = %order.id,
                %merch_txn_ref,
                "Payment status unknown; order left pending"
            );
            return Ok(processed(&order, CallbackOutcome::Pending));
        };
        if !response.exists() {
            info!(order_id = %order.id, %merch_txn_ref, "Gateway has no record of transaction");
            return Ok(processed(&order, CallbackOutcome::Pending));
        }

        let mut uow = self.store.begin().await?;
        let result = self
            .record_queried(uow.as_mut(), order_number, merch_txn_ref, response, Utc::now())
            .await;
        finish(uow, result).await
    }

    async fn record_queried(
        &self,
        uow: &mut dyn UnitOfWork,
        order_number: &str,
        merch_txn_ref: &str,
        response: QueryDrResponse,
        now: DateTime<Utc>,
    ) -> Result<ProcessedCallback, CallbackError> {
        let mut order = uow
            .order_by_number(order_number)
            .await?
            .ok_or_else(|| CallbackError::OrderNotFound(order_number.to_string()))?;
        if !order.is_payment_pending() {
            return Ok(processed(&order, CallbackOutcome::AlreadyProcessed));
        }

        let transaction_no = response.transaction_no().map(str::to_string);
        let already_recorded = match &transaction_no {
            Some(transaction_no) => uow.payment_transaction_exists(transaction_no).await?,
            None => false,
        };
        if !already_recorded {
            let transaction = PaymentTransaction {
                id: Uuid::new_v4(),
                order_id: order.id,
                gateway_transaction_id: transaction_no,
                merch_txn_ref: merch_txn_ref.to_string(),
                response_code: response.response_code().unwrap_or_default().to_string(),
                amount: self.order_amount(response.params.get(AMOUNT_KEY).map(String::as_str)),
                successful: response.is_success(),
                source: TransactionSource::QueryDr,
                raw_params: response.params.clone(),
                created_at: now,
            };
            self.record(uow, &order, &transaction).await?;
        }

        if !response.is_success() {
            info!(
                order_id = %order.id,
                response_code = response.response_code().unwrap_or_default(),
                "Gateway reports unsuccessful payment; order left pending"
            );
            return Ok(processed(&order, CallbackOutcome::Pending));
        }

        mark_paid(&mut order, now);
        uow.update_order(&order).await?;
        Ok(processed(&order, CallbackOutcome::Paid))
    }

    /// Insert an audit record. Returns false when the gateway transaction id
    /// was already recorded by a concurrent request.
    async fn record(
        &self,
        uow: &mut dyn UnitOfWork,
        order: &Order,
        transaction: &PaymentTransaction,
    ) -> Result<bool, CallbackError> {
        match uow.insert_payment_transaction(transaction).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_unique_violation() => {
                info!(
                    order_id = %order.id,
                    transaction_no = transaction
                        .gateway_transaction_id
                        .as_deref()
                        .unwrap_or_default(),
                    "Payment transaction recorded concurrently"
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn order_amount(&self, gateway_amount: Option<&str>) -> i64 {
        gateway_amount
            .and_then(|a| a.parse::<i64>().ok())
            .map_or(0, |a| a / self.amount_multiplier)
    }

    async fn notify(&self, processed: &ProcessedCallback) {
        let kinds: &[NotificationKind] = match processed.outcome {
            CallbackOutcome::Paid => {
                &[NotificationKind::PaymentSuccess, NotificationKind::AdminNewOrder]
            }
            CallbackOutcome::Failed => &[NotificationKind::PaymentFailure],
            CallbackOutcome::AlreadyProcessed | CallbackOutcome::Pending => &[],
        };
        notify_all(self.notifier.as_ref(), processed.order_id, kinds).await;
    }
}

fn mark_paid(order: &mut Order, now: DateTime<Utc>) {
    order.payment_status = PaymentStatus::Paid;
    order.status = OrderStatus::Processing;
    order.paid_at = Some(now);
    order.updated_at = now;
}

fn processed(order: &Order, outcome: CallbackOutcome) -> ProcessedCallback {
    ProcessedCallback {
        order_id: order.id,
        order_number: order.order_number.clone(),
        outcome,
    }
}
