//! Domain Services
//! DB / BlobStore を跨ぐ業務ロジック（ハンドラはここを呼ぶだけ）

pub mod activity;
pub mod assignment;
pub mod clients;
pub mod creatives;
pub mod reservations;

/// 現在時刻（unix ミリ秒）
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
