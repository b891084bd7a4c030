use std::sync::Arc;
use tracing::info;

use adslot_admin::{
    build_router, config::AppConfig, db, storage::LocalBlobStore, AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env（任意）
    let _ = dotenvy::dotenv();

    // ログ初期化
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = AppConfig::from_env()?;

    let pool = db::init_db(&config.database_path).await?;
    tokio::fs::create_dir_all(&config.blob_root).await?;
    let blobs = Arc::new(LocalBlobStore::new(&config.blob_root, &config.public_base_url));

    let addr = config.bind_addr.clone();
    let max_mb = config.max_body_bytes / (1024 * 1024);
    let state = Arc::new(AppState::new(pool, blobs, config)?);

    // ルーター構築
    let app = build_router(state);

    info!("🚀 Ad-slot Admin API listening on {}", addr);
    info!("📦 Max body size: {}MB", max_mb);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
