//! Game Images API Handlers
//! /api/game-images エンドポイント - 週次クリエイティブレコード

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::models::{action, Creative, CreativeFilter, SaveCreativeRequest, UpdateCreativeRequest};
use crate::services::{activity, creatives, reservations};
use crate::AppState;

use super::{actor_from, require_week};

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativeListResponse {
    pub success: bool,
    pub week_number: u32,
    pub images: Vec<Creative>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct CreativeResponse {
    pub success: bool,
    pub image: Creative,
}

#[derive(Serialize)]
pub struct ExistsResponse {
    pub success: bool,
    pub exists: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreativeDeleteResponse {
    pub success: bool,
    pub image: Creative,
    pub blob_deleted: bool,
    pub reservation_released: bool,
}

// ========================================
// Query Parameters
// ========================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListCreativesQuery {
    pub week_number: Option<u32>,
    pub q: Option<String>,
    pub country: Option<String>,
}

// ========================================
// Handlers
// ========================================

/// GET /api/game-images?weekNumber=&q=&country=
pub async fn list_week(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ListCreativesQuery>,
) -> AppResult<Json<CreativeListResponse>> {
    let week_number = require_week(query.week_number)?;
    let filter = CreativeFilter {
        q: query.q,
        country: query.country,
    };

    let images = creatives::list_for_week(&state.db, week_number, &filter).await?;
    let total = images.len();
    Ok(Json(CreativeListResponse {
        success: true,
        week_number,
        images,
        total,
    }))
}

/// POST /api/game-images - `{customDocId, imageData}` を保存（上書き）
pub async fn save(
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<SaveCreativeRequest>,
) -> AppResult<Json<CreativeResponse>> {
    let image = creatives::put(&state.db, &req.custom_doc_id, req.image_data).await?;
    Ok(Json(CreativeResponse {
        success: true,
        image,
    }))
}

/// GET /api/game-images/:id
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<CreativeResponse>> {
    let image = creatives::get(&state.db, &id).await?;
    Ok(Json(CreativeResponse {
        success: true,
        image,
    }))
}

/// GET /api/game-images/:id/exists
pub async fn exists(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ExistsResponse>> {
    let exists = creatives::exists(&state.db, &id).await?;
    Ok(Json(ExistsResponse {
        success: true,
        exists,
    }))
}

/// PATCH /api/game-images/:id - publicUrl の後埋め
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateCreativeRequest>,
) -> AppResult<Json<CreativeResponse>> {
    let image = creatives::set_public_url(&state.db, &id, &req.public_url).await?;
    info!("🔗 publicUrl set: {}", id);
    Ok(Json(CreativeResponse {
        success: true,
        image,
    }))
}

/// DELETE /api/game-images/:id - レコード削除 + 公開画像削除
pub async fn delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<CreativeDeleteResponse>> {
    let image = creatives::delete(&state.db, &id).await?;

    // Blob 側の失敗はログのみ
    let blob_deleted = match creatives::publication_blob_path(&image) {
        Some(path) => match state.blobs.delete(&path).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!("Failed to delete blob {} (ignored): {}", path, e);
                false
            }
        },
        None => {
            warn!("No blob path derivable for {} (imageUrl has no extension)", image.id);
            false
        }
    };

    let reservation_released =
        reservations::release_if_empty(&state.db, image.week_number, image.offer_type).await?;

    activity::record(&state.db, &actor_from(&headers), action::IMAGE_DELETED, &image.id).await;

    Ok(Json(CreativeDeleteResponse {
        success: true,
        image,
        blob_deleted,
        reservation_released,
    }))
}
