pub mod config;
pub mod database;
pub mod redis_client;
pub mod models;
pub mod controllers;
pub mod middleware;
pub mod cache;
pub mod services;
pub mod pagination;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;

use services::store::PgBookingStore;
use services::{BookingLedger, MediaStorage};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub db: database::Database,
    pub cache: cache::CacheService,
    pub config: config::Config,
    pub ledger: BookingLedger,
    pub media: MediaStorage,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;
        info!("Database connected");

        db.run_migrations().await?;

        let cache = cache::CacheService::connect(&config.redis).await?;
        if cache.is_enabled() {
            info!("Redis connected");
        }

        let ledger = BookingLedger::new(Arc::new(PgBookingStore::new(db.pool.clone())));
        let media = MediaStorage::new(&config.media);

        Ok(Arc::new(Self { db, cache, config, ledger, media }))
    }
}

/// Полный роутер приложения: API, статика картинок и общие слои.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/", get(|| async { "Planetarium API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes());

    let media_prefix = state.media.url_prefix();
    if media_prefix.starts_with('/') && media_prefix.len() > 1 {
        app = app.nest_service(media_prefix, ServeDir::new(state.media.root()));
    }

    app.layer(DefaultBodyLimit::max(state.config.media.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
