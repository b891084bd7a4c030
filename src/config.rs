//! 設定
//! 環境変数（.env 可）から読み込み、未設定ならデフォルト値

use std::path::PathBuf;

use chrono::FixedOffset;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 待ち受けアドレス
    pub bind_addr: String,
    /// SQLite ファイル
    pub database_path: String,
    /// Blob（画像）保存ルート
    pub blob_root: PathBuf,
    /// 公開 URL のベース（`<base>/<path>` で公開 URL を作る）
    pub public_base_url: String,
    /// 週番号計算に使う「今日」のタイムゾーン（UTC からの分）
    pub week_utc_offset_minutes: i32,
    /// アップロード上限
    pub max_body_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            database_path: "/data/adslot/adslot.db".to_string(),
            blob_root: PathBuf::from("/data/adslot/blobs"),
            public_base_url: "http://localhost:3000/public".to_string(),
            week_utc_offset_minutes: 60,
            max_body_bytes: 50 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    /// | Env Var                   | Default                         |
    /// |---------------------------|---------------------------------|
    /// | `BIND_ADDR`               | `0.0.0.0:3000`                  |
    /// | `DATABASE_PATH`           | `/data/adslot/adslot.db`        |
    /// | `BLOB_ROOT`               | `/data/adslot/blobs`            |
    /// | `PUBLIC_BASE_URL`         | `http://localhost:3000/public`  |
    /// | `WEEK_UTC_OFFSET_MINUTES` | `60`                            |
    /// | `MAX_BODY_BYTES`          | `52428800`                      |
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let week_utc_offset_minutes = match std::env::var("WEEK_UTC_OFFSET_MINUTES") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.week_utc_offset_minutes,
        };
        let max_body_bytes = match std::env::var("MAX_BODY_BYTES") {
            Ok(v) => v.parse()?,
            Err(_) => defaults.max_body_bytes,
        };

        let config = Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_path: std::env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            blob_root: std::env::var("BLOB_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.blob_root),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .map(|s| s.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            week_utc_offset_minutes,
            max_body_bytes,
        };

        // 範囲外オフセットはここで弾く
        config.week_offset()?;
        Ok(config)
    }

    pub fn week_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.week_utc_offset_minutes * 60).ok_or_else(|| {
            anyhow::anyhow!(
                "WEEK_UTC_OFFSET_MINUTES out of range: {}",
                self.week_utc_offset_minutes
            )
        })
    }
}
