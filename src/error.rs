//! Error Handling
//! ハンドラ共通のエラー型と JSON エラーレスポンス

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, warn};

use crate::models::MissingFormat;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// クライアント / クリエイティブが存在しない
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// クライアント ID の重複、予約済みオファー
    #[error("{0}")]
    Conflict(String),

    /// 必須フィールド欠落・不正なポジション/オファー
    #[error("{0}")]
    Validation(String),

    /// スロット割当のブロック（マスター画像の不足）
    #[error("Client {client} is missing {} required format(s)", .missing.len())]
    MissingFormats {
        client: String,
        missing: Vec<MissingFormat>,
    },

    /// Blob ストアの失敗
    #[error("Storage error: {0}")]
    Upstream(String),

    /// ドキュメントストア（SQLite）の失敗。Blob と同じく上流障害扱い
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        AppError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn upstream(err: impl std::fmt::Display) -> Self {
        AppError::Upstream(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Validation(_) | AppError::MissingFormats { .. } => StatusCode::BAD_REQUEST,
            AppError::Upstream(_) | AppError::Database(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::MissingFormats { .. } => "MISSING_FORMATS",
            AppError::Upstream(_) | AppError::Database(_) => "UPSTREAM_FAILURE",
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<MissingFormat>>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("❌ API Error: {}", self);
        } else {
            warn!("API Error: {}", self);
        }

        let missing = match &self {
            AppError::MissingFormats { missing, .. } => Some(missing.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
            code: self.code(),
            missing,
        };

        (status, Json(body)).into_response()
    }
}
