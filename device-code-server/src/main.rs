//! Device Code Server - binary entry point

use anyhow::Context;
use device_code_server::{create_router, db, store, AppState, Config};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "device_code_server=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!("Device code server starting ({})", config.environment);
    if config.is_production() && config.database_url.is_none() {
        tracing::warn!("Production without DATABASE_URL: device records will not survive a restart");
    }
    if !config.admin_enabled() {
        tracing::warn!("ADMIN_TOKEN not set, admin routes are disabled");
    }
    if !config.require_signature {
        tracing::warn!("REQUIRE_SIGNATURE is off, unsigned reports are accepted");
    }

    let device_store: Arc<dyn store::DeviceStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Database: {}", url.split('@').last().unwrap_or("***"));
            let pool = db::create_pool(url)
                .await
                .context("failed to create database pool")?;

            tracing::info!("Running database migrations...");
            db::run_migrations(&pool)
                .await
                .context("failed to run migrations")?;
            Arc::new(store::PgStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Arc::new(store::MemoryStore::new())
        }
    };

    let app = create_router(AppState::new(device_store, config.clone()));

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("server error")?;

    Ok(())
}
