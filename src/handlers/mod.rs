//! API Handlers
//! リソースごとの axum ハンドラ（業務ロジックは services 側）

pub mod assignments;
pub mod clients;
pub mod creatives;
pub mod logs;
pub mod meta;
pub mod publish;
pub mod stats;

use axum::http::HeaderMap;

use crate::error::{AppError, AppResult};

/// 操作者ヘッダ
pub const ACTOR_HEADER: &str = "x-user-email";

/// 操作ログ用の操作者（ヘッダが無ければ anonymous）
pub fn actor_from(headers: &HeaderMap) -> String {
    headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("anonymous")
        .to_string()
}

/// `weekNumber` クエリの必須チェック
pub fn require_week(week_number: Option<u32>) -> AppResult<u32> {
    match week_number {
        Some(week) if week > 0 => Ok(week),
        _ => Err(AppError::Validation("weekNumber is required".to_string())),
    }
}

pub(crate) fn multipart_error(e: impl std::fmt::Display) -> AppError {
    AppError::Validation(format!("Multipart error: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actor_defaults_to_anonymous() {
        let mut headers = HeaderMap::new();
        assert_eq!(actor_from(&headers), "anonymous");
        headers.insert(ACTOR_HEADER, "ops@example.com".parse().unwrap());
        assert_eq!(actor_from(&headers), "ops@example.com");
    }

    #[test]
    fn week_zero_is_rejected() {
        assert!(require_week(Some(0)).is_err());
        assert!(require_week(None).is_err());
        assert_eq!(require_week(Some(43)).unwrap(), 43);
    }
}
