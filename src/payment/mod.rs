//! Payment gateway integration.

pub mod callback;
pub mod gateway;
pub mod hash;

pub use callback::{CallbackError, CallbackOutcome, PaymentCallbackProcessor, ProcessedCallback};
pub use gateway::{
    GatewayError, PaymentGateway, PaymentGatewayClient, PaymentRequest, QueryDrResponse,
};
pub use hash::{HashAlgorithm, HashError};
