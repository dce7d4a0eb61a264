//! Payment gateway client: redirect URLs, callback verification and the
//! QueryDR status fallback.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

use super::hash::{self, HashAlgorithm, HashError, SECURE_HASH_KEY, SECURE_HASH_TYPE_KEY};
use crate::config::{PaymentConfig, PaymentCredentials};
use crate::model::Order;

/// Gateway response code meaning the payment succeeded.
pub const SUCCESS_CODE: &str = "0";

pub const MERCHANT_KEY: &str = "vpc_Merchant";
pub const MERCH_TXN_REF_KEY: &str = "vpc_MerchTxnRef";
pub const RESPONSE_CODE_KEY: &str = "vpc_TxnResponseCode";
pub const TRANSACTION_NO_KEY: &str = "vpc_TransactionNo";
pub const AMOUNT_KEY: &str = "vpc_Amount";
const DR_EXISTS_KEY: &str = "vpc_DRExists";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0} payment credentials are not configured")]
    NotConfigured(&'static str),

    #[error("Hash error: {0}")]
    Hash(#[from] HashError),

    #[error("Invalid gateway URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Redirect target for one payment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub url: String,
    /// `{order_number}--{unix_ts}`; distinct per attempt.
    pub merch_txn_ref: String,
}

/// Parsed QueryDR response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDrResponse {
    pub params: BTreeMap<String, String>,
}

impl QueryDrResponse {
    fn field(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    /// The gateway knows the transaction. Anything else is inconclusive.
    pub fn exists(&self) -> bool {
        self.field(DR_EXISTS_KEY) == Some("Y")
    }

    pub fn response_code(&self) -> Option<&str> {
        self.field(RESPONSE_CODE_KEY)
    }

    pub fn is_success(&self) -> bool {
        self.exists() && self.response_code() == Some(SUCCESS_CODE)
    }

    pub fn transaction_no(&self) -> Option<&str> {
        self.field(TRANSACTION_NO_KEY)
    }
}

/// Operations the callback processor needs from the gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// True only when the callback's merchant is known and its hash matches.
    fn verify_callback(&self, params: &BTreeMap<String, String>) -> bool;

    /// Ask the gateway for a transaction's status. `None` means unknown
    /// (network error, timeout, non-2xx, unverifiable response).
    async fn query_transaction_status(
        &self,
        order_number: &str,
        merch_txn_ref: &str,
        installment: bool,
    ) -> Option<QueryDrResponse>;
}

pub struct PaymentGatewayClient {
    client: Client,
    config: PaymentConfig,
}

impl PaymentGatewayClient {
    pub fn new(config: PaymentConfig) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(config.query_timeout()).build()?;
        Ok(Self { client, config })
    }

    fn credentials(&self, installment: bool) -> Result<&PaymentCredentials, GatewayError> {
        let credentials = self.config.credentials(installment);
        if credentials.is_configured() {
            Ok(credentials)
        } else {
            Err(GatewayError::NotConfigured(if installment { "installment" } else { "regular" }))
        }
    }

    /// Build the signed redirect URL for an order.
    pub fn build_payment_url(
        &self,
        order: &Order,
        client_ip: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentRequest, GatewayError> {
        let credentials = self.credentials(order.installment)?;
        let merch_txn_ref = format!("{}--{}", order.order_number, now.timestamp());
        let amount = order.totals.total.saturating_mul(self.config.amount_multiplier);

        let mut params = BTreeMap::from([
            ("vpc_Version".to_string(), self.config.version.clone()),
            ("vpc_Command".to_string(), self.config.command.clone()),
            ("vpc_AccessCode".to_string(), credentials.access_code.clone()),
            (MERCHANT_KEY.to_string(), credentials.merchant_id.clone()),
            ("vpc_Locale".to_string(), self.config.locale.clone()),
            ("vpc_Currency".to_string(), self.config.currency.clone()),
            ("vpc_ReturnURL".to_string(), self.config.return_url.clone()),
            (MERCH_TXN_REF_KEY.to_string(), merch_txn_ref.clone()),
            ("vpc_OrderInfo".to_string(), order.order_number.clone()),
            (AMOUNT_KEY.to_string(), amount.to_string()),
            ("vpc_TicketNo".to_string(), client_ip.to_string()),
            ("vpc_Customer_Email".to_string(), order.email.clone()),
            ("vpc_Customer_Phone".to_string(), order.phone.clone()),
            ("AgainLink".to_string(), self.config.return_url.clone()),
            ("Title".to_string(), order.order_number.clone()),
        ]);
        if let Some(user_id) = order.user_id {
            params.insert("vpc_Customer_Id".to_string(), user_id.to_string());
        }
        if order.installment {
            params.extend(self.config.installment_params.clone());
        }

        let secure_hash =
            hash::secure_hash(&params, &credentials.secure_secret, HashAlgorithm::Sha256)?;
        let mut url = Url::parse_with_params(
            &self.config.payment_url,
            params.iter().filter(|(_, value)| !value.is_empty()),
        )?;
        url.query_pairs_mut().append_pair(SECURE_HASH_KEY, &secure_hash);

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            merch_txn_ref = %merch_txn_ref,
            installment = order.installment,
            "Payment URL built"
        );
        Ok(PaymentRequest {
            url: url.into(),
            merch_txn_ref,
        })
    }

    /// Credential set owning `merchant_id`.
    fn credentials_for_merchant(&self, merchant_id: &str) -> Option<&PaymentCredentials> {
        [&self.config.regular, &self.config.installment]
            .into_iter()
            .find(|credentials| {
                credentials.is_configured() && credentials.merchant_id == merchant_id
            })
    }

    async fn post_query(&self, body: String) -> Result<Option<String>, reqwest::Error> {
        let response = self
            .client
            .post(&self.config.query_url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                endpoint = %self.config.query_url,
                status = %status,
                "QueryDR returned non-success status"
            );
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }
}

#[async_trait]
impl PaymentGateway for PaymentGatewayClient {
    fn verify_callback(&self, params: &BTreeMap<String, String>) -> bool {
        let merchant_id = params.get(MERCHANT_KEY).map(|m| m.trim()).unwrap_or_default();
        let Some(credentials) = self.credentials_for_merchant(merchant_id) else {
            warn!(merchant_id, "Callback for unknown merchant");
            return false;
        };
        let received = params.get(SECURE_HASH_KEY).map(String::as_str).unwrap_or_default();
        hash::verify(params, received, &credentials.secure_secret, HashAlgorithm::Sha256)
    }

    async fn query_transaction_status(
        &self,
        order_number: &str,
        merch_txn_ref: &str,
        installment: bool,
    ) -> Option<QueryDrResponse> {
        let credentials = match self.credentials(installment) {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(order_number, error = %e, "Cannot query transaction status");
                return None;
            }
        };

        let mut params = BTreeMap::from([
            ("vpc_Command".to_string(), "queryDR".to_string()),
            ("vpc_Version".to_string(), self.config.version.clone()),
            (MERCHANT_KEY.to_string(), credentials.merchant_id.clone()),
            ("vpc_AccessCode".to_string(), credentials.access_code.clone()),
            (MERCH_TXN_REF_KEY.to_string(), merch_txn_ref.to_string()),
            ("vpc_User".to_string(), credentials.query_user.clone()),
            ("vpc_Password".to_string(), credentials.query_password.clone()),
        ]);
        let signed = hash::secure_hash(&params, &credentials.secure_secret, HashAlgorithm::Sha256);
        let secure_hash = match signed {
            Ok(hash) => hash,
            Err(e) => {
                warn!(order_number, error = %e, "Cannot sign QueryDR request");
                return None;
            }
        };
        params.insert(SECURE_HASH_KEY.to_string(), secure_hash);

        let body = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();

        debug!(order_number, merch_txn_ref, "Sending QueryDR");
        let text = match self.post_query(body).await {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                warn!(
                    order_number,
                    merch_txn_ref,
                    error = %e,
                    timeout = e.is_timeout(),
                    "QueryDR request failed"
                );
                return None;
            }
        };

        let response: BTreeMap<String, String> = form_urlencoded::parse(text.trim().as_bytes())
            .into_owned()
            .collect();
        if let Some(received) = response.get(SECURE_HASH_KEY) {
            let algorithm = match response.get(SECURE_HASH_TYPE_KEY).map(String::as_str) {
                Some("SHA512") => HashAlgorithm::Sha512,
                _ => HashAlgorithm::Sha256,
            };
            if !hash::verify(&response, received, &credentials.secure_secret, algorithm) {
                warn!(order_number, merch_txn_ref, "QueryDR response hash mismatch");
                return None;
            }
        }

        let response = QueryDrResponse { params: response };
        info!(
            order_number,
            merch_txn_ref,
            exists = response.exists(),
            response_code = response.response_code().unwrap_or_default(),
            "QueryDR answered"
        );
        Some(response)
    }
}
