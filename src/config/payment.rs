//! Payment gateway settings.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

/// Minimum decoded length of a secure-hash secret.
pub const MIN_SECRET_BYTES: usize = 16;

/// One merchant account at the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PaymentCredentials {
    pub merchant_id: String,
    pub access_code: String,
    /// Hex-encoded HMAC key.
    pub secure_secret: String,
    /// Status-query login.
    pub query_user: String,
    pub query_password: String,
}

impl PaymentCredentials {
    pub fn is_configured(&self) -> bool {
        !self.merchant_id.is_empty() && !self.secure_secret.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    /// Redirect endpoint customers are sent to.
    pub payment_url: String,
    /// Status-query (QueryDR) endpoint.
    pub query_url: String,
    pub return_url: String,
    pub version: String,
    pub command: String,
    pub locale: String,
    pub currency: String,
    /// Factor converting order minor units into `vpc_Amount`.
    pub amount_multiplier: i64,
    pub query_timeout_secs: u64,
    pub regular: PaymentCredentials,
    pub installment: PaymentCredentials,
    /// Extra parameters sent with installment payments.
    pub installment_params: BTreeMap<String, String>,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            payment_url: "https://mtf.onepay.vn/paygate/vpcpay.op".to_string(),
            query_url: "https://mtf.onepay.vn/msp/api/v1/vpc/invoices/queries".to_string(),
            return_url: "http://localhost:3000/payments/callback".to_string(),
            version: "2".to_string(),
            command: "pay".to_string(),
            locale: "vn".to_string(),
            currency: "VND".to_string(),
            amount_multiplier: 100,
            query_timeout_secs: 10,
            regular: PaymentCredentials::default(),
            installment: PaymentCredentials::default(),
            installment_params: BTreeMap::from([("vpc_Theme".to_string(), "ita".to_string())]),
        }
    }
}

impl PaymentConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Credential set for an order.
    pub fn credentials(&self, installment: bool) -> &PaymentCredentials {
        if installment {
            &self.installment
        } else {
            &self.regular
        }
    }
}
