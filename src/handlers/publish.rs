//! Publish API Handlers
//! パートナーアップロード / 公開 / 単発コピー

use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    response::Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::catalog::{OfferType, PositionCode};
use crate::error::{AppError, AppResult};
use crate::extract::ApiJson;
use crate::models::{
    action, creative_id, CopyImageRequest, Creative, CreativeData, MakePublicRequest, OWNER_ALL,
};
use crate::services::{activity, assignment, creatives, reservations};
use crate::storage;
use crate::AppState;

use super::{actor_from, multipart_error};

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub path: String,
    pub public_url: String,
    pub image: Creative,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUrlResponse {
    pub success: bool,
    pub path: String,
    pub public_url: String,
}

// ========================================
// Handlers
// ========================================

/// POST /api/upload - パートナーによる週次画像アップロード
///
/// Parameters (multipart/form-data):
///   - file: 画像ファイル（必須）
///   - weekNumber: 週番号（必須）
///   - position: ポジションコード（必須）例: "G-1-2-3"
///   - company_name: 会社名（必須）
///   - offerType: 省略時はポジションの所属オファー（指定時は一致必須）
///   - country: 省略時 "ALL"
pub async fn partner_upload(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut week_number: Option<u32> = None;
    let mut position: Option<PositionCode> = None;
    let mut company_name: Option<String> = None;
    let mut offer_type: Option<OfferType> = None;
    let mut country = OWNER_ALL.to_string();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();
        info!("📦 Processing field: {}", name);

        match name.as_str() {
            "file" => {
                file_data = Some(field.bytes().await.map_err(multipart_error)?.to_vec());
            }
            "weekNumber" => {
                let text = field.text().await.map_err(multipart_error)?;
                week_number = Some(text.trim().parse().map_err(|_| {
                    AppError::Validation(format!("Invalid weekNumber: {}", text))
                })?);
            }
            "position" => {
                position = Some(field.text().await.map_err(multipart_error)?.parse()?);
            }
            "company_name" => {
                let text = field.text().await.map_err(multipart_error)?;
                company_name = Some(text.trim().to_string()).filter(|s| !s.is_empty());
            }
            "offerType" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    offer_type = Some(text.parse()?);
                }
            }
            "country" => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    country = text.trim().to_string();
                }
            }
            _ => {}
        }
    }

    let file_data = file_data
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::Validation("file is required".to_string()))?;
    let week_number = super::require_week(week_number)?;
    let position = position.ok_or_else(|| AppError::Validation("position is required".to_string()))?;
    let company_name =
        company_name.ok_or_else(|| AppError::Validation("company_name is required".to_string()))?;
    if country.contains('/') {
        return Err(AppError::Validation(format!("Invalid country: {}", country)));
    }

    let (content_type, ext) = storage::sniff_image(&file_data)
        .ok_or_else(|| AppError::Validation("Uploaded file is not a supported image".to_string()))?;

    // Blob を書く前にオファーの整合性を確認
    if let Some(offer) = offer_type {
        if offer != position.offer() {
            return Err(AppError::Validation(format!(
                "Position {} belongs to {}, not {}",
                position,
                position.offer(),
                offer
            )));
        }
    }

    // 他社が確保済みのオファーには Blob も書かない
    reservations::claim(&state.db, week_number, position.offer(), &company_name).await?;

    let path = storage::publication_path(&country, week_number, position, ext);
    state
        .blobs
        .save(&path, &file_data, content_type)
        .await
        .map_err(AppError::upstream)?;
    let public_url = state.blobs.make_public(&path).await.map_err(AppError::upstream)?;

    let doc_id = creative_id(week_number, position, &company_name);
    let data = CreativeData {
        image_url: public_url.clone(),
        public_url: Some(public_url.clone()),
        offer_type,
        position,
        week_number,
        company_name,
        country,
        format: None,
    };
    let image = creatives::put(&state.db, &doc_id, data).await?;

    activity::record(&state.db, &actor_from(&headers), action::IMAGE_UPLOADED, &path).await;
    info!("✅ Partner upload: {} -> {}", doc_id, public_url);

    Ok(Json(UploadResponse {
        success: true,
        path,
        public_url,
        image,
    }))
}

/// POST /api/make-public - `{imagePath}` を公開して URL を返す
pub async fn make_public(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<MakePublicRequest>,
) -> AppResult<Json<PublicUrlResponse>> {
    let path = req.image_path.trim().trim_start_matches('/').to_string();
    if path.is_empty() || path.split('/').any(|seg| seg == "..") {
        return Err(AppError::Validation(format!("Invalid imagePath: {}", req.image_path)));
    }

    if !state.blobs.exists(&path).await.map_err(AppError::upstream)? {
        return Err(AppError::not_found("Blob", path));
    }
    let public_url = state.blobs.make_public(&path).await.map_err(AppError::upstream)?;

    info!("🌐 Made public: {}", path);
    Ok(Json(PublicUrlResponse {
        success: true,
        path,
        public_url,
    }))
}

/// POST /api/copy-image - マスター画像を週×ポジションへ 1 件コピー
pub async fn copy_image(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CopyImageRequest>,
) -> AppResult<Json<PublicUrlResponse>> {
    let week_number = super::require_week(Some(req.week_number))?;
    let client_name = req.client_name.trim();
    if client_name.is_empty() || client_name.contains('/') {
        return Err(AppError::Validation(format!("Invalid clientName: {}", req.client_name)));
    }

    let (path, public_url) = assignment::copy_master_to_position(
        state.blobs.as_ref(),
        client_name,
        req.format,
        week_number,
        req.position,
    )
    .await?;

    info!("📋 Copied {} {} -> {}", client_name, req.format, path);
    Ok(Json(PublicUrlResponse {
        success: true,
        path,
        public_url,
    }))
}
