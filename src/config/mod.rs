//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod commerce;
mod payment;
mod storage;

pub use commerce::{CartConfig, CheckoutConfig, NotificationConfig, DEFAULT_NOTIFICATION_CAPACITY};
pub use payment::{PaymentConfig, PaymentCredentials, MIN_SECRET_BYTES};
pub use storage::StorageConfig;

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "storefront.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "STOREFRONT_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "STOREFRONT";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "STOREFRONT_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub cart: CartConfig,
    pub checkout: CheckoutConfig,
    pub payment: PaymentConfig,
    pub notifications: NotificationConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `storefront.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cart = &self.cart;
        if cart.ttl_days <= 0 || cart.item_ttl_days <= 0 || cart.inactivity_days <= 0 {
            return Err(ConfigError::Invalid("cart durations must be positive".to_string()));
        }
        if self.checkout.max_order_number_attempts == 0 {
            return Err(ConfigError::Invalid(
                "checkout.max_order_number_attempts must be at least 1".to_string(),
            ));
        }
        if self.payment.amount_multiplier <= 0 {
            return Err(ConfigError::Invalid(
                "payment.amount_multiplier must be positive".to_string(),
            ));
        }

        let credential_sets = [
            ("regular", &self.payment.regular),
            ("installment", &self.payment.installment),
        ];
        for (name, credentials) in credential_sets {
            if credentials.secure_secret.is_empty() {
                continue;
            }
            let key = hex::decode(&credentials.secure_secret).map_err(|e| {
                ConfigError::Invalid(format!("payment.{}.secure_secret is not hex: {}", name, e))
            })?;
            if key.len() < MIN_SECRET_BYTES {
                return Err(ConfigError::Invalid(format!(
                    "payment.{}.secure_secret must decode to at least {} bytes",
                    name, MIN_SECRET_BYTES
                )));
            }
        }

        // Callbacks are routed to a credential set by merchant id.
        let regular = &self.payment.regular;
        let installment = &self.payment.installment;
        if regular.is_configured()
            && installment.is_configured()
            && regular.merchant_id == installment.merchant_id
        {
            return Err(ConfigError::Invalid(
                "payment.regular and payment.installment share a merchant id".to_string(),
            ));
        }

        Ok(())
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.storage.storage_type = "memory".to_string();
        config
    }
}
