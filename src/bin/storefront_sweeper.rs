//! storefront-sweeper: expires idle carts and stale cart lines.
//!
//! Runs `CartLifecycleManager::expire_inactive` every
//! `cart.sweep_interval_secs` until interrupted. An interval of zero runs one
//! sweep and exits.
//!
//! ## Configuration
//! - STOREFRONT_CONFIG: config file path (default: ./storefront.yaml)
//! - STOREFRONT__STORAGE__PATH: SQLite database path
//! - STOREFRONT__CART__INACTIVITY_DAYS: inactivity window
//! - STOREFRONT_LOG: tracing filter (default: info)

use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use storefront::cart::CartLifecycleManager;
use storefront::config::Config;
use storefront::storage::init_storage;
use storefront::utils::bootstrap::{init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None)?;
    let store = init_storage(&config.storage).await?;
    let interval_secs = config.cart.sweep_interval_secs;
    info!(
        storage = %store.name(),
        inactivity_days = config.cart.inactivity_days,
        interval_secs,
        "Starting storefront-sweeper"
    );

    let manager = CartLifecycleManager::new(store, config.cart);

    if interval_secs == 0 {
        manager.expire_inactive(Utc::now()).await?;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = manager.expire_inactive(Utc::now()).await {
                    error!(error = %e, "Cart sweep failed");
                }
            }
            _ = &mut shutdown => break,
        }
    }

    info!("storefront-sweeper stopped");
    Ok(())
}
