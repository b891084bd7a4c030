//! Database Module
//! SQLite を使用した clients / game_images / reservations / 割当台帳 / 操作ログ の管理

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use tracing::info;

/// データベース接続プール
pub type DbPool = Pool<Sqlite>;

/// データベースを初期化
pub async fn init_db(db_path: &str) -> Result<DbPool> {
    // SQLite接続文字列
    let db_url = format!("sqlite:{}?mode=rwc", db_path);

    info!("Initializing database: {}", db_path);

    if let Some(dir) = std::path::Path::new(db_path).parent() {
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir).await?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    create_schema(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// インメモリ DB（テスト用。接続が切れると消えるので 1 本だけ保持）
pub async fn init_memory_db() -> Result<DbPool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// スキーマ作成
async fn create_schema(pool: &DbPool) -> Result<()> {
    // clients テーブル（id = 名前の小文字・ハイフン化）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS clients (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            formats TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // game_images テーブル（id = week-<N>-<position>-<owner>）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS game_images (
            id TEXT PRIMARY KEY,
            image_url TEXT NOT NULL,
            public_url TEXT,
            offer_type TEXT NOT NULL,
            position TEXT NOT NULL,
            week_number INTEGER NOT NULL,
            company_name TEXT NOT NULL,
            country TEXT NOT NULL DEFAULT 'ALL',
            format TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // reservations テーブル（週×オファーの排他キー）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS reservations (
            week_number INTEGER NOT NULL,
            offer_type TEXT NOT NULL,
            company_name TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL,
            PRIMARY KEY (week_number, offer_type)
        )
    "#)
    .execute(pool)
    .await?;

    // assignment_positions テーブル（ポジション単位の割当結果）
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS assignment_positions (
            week_number INTEGER NOT NULL,
            position TEXT NOT NULL,
            offer_type TEXT NOT NULL,
            client_id TEXT NOT NULL,
            company_name TEXT NOT NULL,
            status TEXT NOT NULL,
            error TEXT,
            public_url TEXT,
            updated_at_ms INTEGER NOT NULL,
            PRIMARY KEY (week_number, position)
        )
    "#)
    .execute(pool)
    .await?;

    // activity_log テーブル
    sqlx::query(r#"
        CREATE TABLE IF NOT EXISTS activity_log (
            id TEXT PRIMARY KEY,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            target TEXT NOT NULL,
            created_at_ms INTEGER NOT NULL
        )
    "#)
    .execute(pool)
    .await?;

    // インデックス作成
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_game_images_week ON game_images(week_number)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_game_images_week_offer ON game_images(week_number, offer_type)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_clients_name ON clients(name)")
        .execute(pool).await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_activity_log_created ON activity_log(created_at_ms)")
        .execute(pool).await?;

    Ok(())
}
