//! Ad-slot Admin API
//! 広告枠（オファー×ポジション×週）へのクリエイティブ割当を管理する API

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod services;
pub mod storage;
pub mod week;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use chrono::FixedOffset;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::storage::BlobStore;

// ========================================
// アプリケーション状態
// ========================================

pub struct AppState {
    pub db: DbPool,
    pub blobs: Arc<dyn BlobStore>,
    pub config: AppConfig,
    /// 「今日」を決めるタイムゾーン
    pub week_offset: FixedOffset,
}

impl AppState {
    pub fn new(db: DbPool, blobs: Arc<dyn BlobStore>, config: AppConfig) -> anyhow::Result<Self> {
        let week_offset = config.week_offset()?;
        Ok(Self {
            db,
            blobs,
            config,
            week_offset,
        })
    }
}

// ========================================
// ルーター
// ========================================

pub fn build_router(state: Arc<AppState>) -> Router {
    use handlers::{assignments, clients, creatives, logs, meta, publish, stats};

    let max_body_bytes = state.config.max_body_bytes;
    // ローカル配信用（本番は前段の Web サーバが配信）
    let public_files = ServeDir::new(&state.config.blob_root);

    Router::new()
        .route("/api/health", get(meta::health_check))
        .route("/api/catalog", get(meta::catalog))
        .route("/api/weeks", get(meta::week_of))
        .route("/api/weeks/current", get(meta::current_week))
        // Clients
        .route("/api/clients", get(clients::list_clients).post(clients::create_client))
        .route(
            "/api/clients/:id",
            get(clients::get_client).delete(clients::delete_client),
        )
        .route("/api/clients/:id/formats", post(clients::upload_format))
        .route("/api/clients/:id/formats/preview", post(clients::preview_format))
        .route("/api/clients/:id/missing-formats", get(clients::missing_formats))
        // Game images
        .route("/api/game-images", get(creatives::list_week).post(creatives::save))
        .route(
            "/api/game-images/:id",
            get(creatives::get)
                .patch(creatives::update)
                .delete(creatives::delete),
        )
        .route("/api/game-images/:id/exists", get(creatives::exists))
        // Publish
        .route("/api/upload", post(publish::partner_upload))
        .route("/api/make-public", post(publish::make_public))
        .route("/api/copy-image", post(publish::copy_image))
        // Stats / reservations
        .route("/api/offer-stats", get(stats::offer_stats))
        .route("/api/reservations", get(stats::reserved_offers))
        // Assignments
        .route("/api/assignments", get(assignments::ledger).post(assignments::run))
        .route("/api/assignments/retry", post(assignments::retry))
        // Logs
        .route("/api/logs", get(logs::list_logs))
        .nest_service("/public", public_files)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
