use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;

use contracts_backend::{
    auth::jwt::JwtService, config::AppConfig, db, default_handlers, init_tracing,
    state::AppState, Worker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let webhook = config
        .delivery_webhook_url
        .clone()
        .context("DELIVERY_WEBHOOK_URL must be set for the worker")?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = 1,
        delivery_webhook = %webhook,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let jwt = JwtService::from_config(&config)?;

    let state = Arc::new(AppState::new(pool, config, jwt));
    let worker = Worker::new(state, default_handlers(), Duration::from_secs(2));

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}
