use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a payment transaction record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    /// Inbound gateway callback with a verified hash.
    Callback,
    /// Fallback status query.
    QueryDr,
}

string_enum!(TransactionSource, "transaction source", {
    Callback => "callback",
    QueryDr => "query_dr",
});

/// Append-only audit record of a gateway response for an order.
///
/// `gateway_transaction_id` is unique when present; the uniqueness is the
/// idempotency boundary for callback processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: Uuid,
    pub order_id: Uuid,
    pub gateway_transaction_id: Option<String>,
    pub merch_txn_ref: String,
    pub response_code: String,
    /// Amount reported by the gateway, converted back to order minor units.
    pub amount: i64,
    pub successful: bool,
    pub source: TransactionSource,
    pub raw_params: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}
