//! Device Code Server
//!
//! Backend for device fingerprint reporting. Merchants report signed
//! fingerprints and receive a durable device code; the same fingerprint can
//! later be verified. A token-protected admin surface lists devices, updates
//! their review status and finds near-duplicates by signal similarity.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     DEVICE CODE SERVER                       │
//! ├──────────────────────────────────────────────────────────────┤
//! │  /device-code/report ──► signature middleware ──┐            │
//! │  /device-code/verify ───────────────────────────┤            │
//! │  /admin/*            ──► admin token middleware ┤            │
//! │                                                  ▼            │
//! │                                   ┌──────────────────────┐   │
//! │                                   │ DeviceStore          │   │
//! │                                   │ (Postgres | memory)  │   │
//! │                                   └──────────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod replay;
pub mod store;

#[cfg(test)]
mod testing;

use axum::{
    Router,
    routing::{get, post, put},
    middleware as axum_middleware,
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use std::sync::Arc;
use std::time::Duration;

pub use config::Config;
pub use error::{AppError, AppResult};

use replay::NonceCache;
use store::DeviceStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DeviceStore>,
    pub config: Config,
    pub nonces: Arc<NonceCache>,
}

impl AppState {
    pub fn new(store: Arc<dyn DeviceStore>, config: Config) -> Self {
        // A timestamp may sit up to the tolerance on either side of now
        let window = Duration::from_secs(config.signature_tolerance_secs.max(1) as u64 * 2);
        Self {
            store,
            config,
            nonces: Arc::new(NonceCache::new(window)),
        }
    }
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/health", get(handlers::health::check))
        .route("/device-code/verify", post(handlers::device_code::verify));

    // Signed merchant routes
    let report_routes = Router::new()
        .route("/device-code/report", post(handlers::device_code::report))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::signature::require_signed_report
        ));

    // Admin routes (static bearer token)
    let admin_routes = Router::new()
        .route("/admin/merchants", get(handlers::merchants::list).post(handlers::merchants::create))
        .route("/admin/devices", get(handlers::devices::list))
        .route("/admin/devices/:id", get(handlers::devices::get).delete(handlers::devices::delete))
        .route("/admin/devices/:id/status", put(handlers::devices::update_status))
        .route("/admin/devices/:id/similar", get(handlers::devices::similar))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin::require_admin
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(report_routes)
        .merge(admin_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_health() {
        let app = testing::app().await;
        let (status, body) = app.send(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"], "memory");
        assert_eq!(body["signatures_required"], true);
    }

    #[tokio::test]
    async fn test_admin_routes_require_token() {
        let app = testing::app().await;
        let (status, _) = app.send(Method::GET, "/admin/devices", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.send(Method::GET, "/admin/devices", None, Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app.admin(Method::GET, "/admin/devices", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_disabled_without_token() {
        let app = testing::app_with(|config| config.admin_token.clear()).await;
        let (status, body) = app.admin(Method::GET, "/admin/merchants", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "admin API disabled");
    }
}
