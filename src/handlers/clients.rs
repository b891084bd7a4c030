//! Clients API Handlers
//! /api/clients エンドポイント - クライアントとマスター画像

use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::catalog::{Format, OfferType};
use crate::error::{AppError, AppResult};
use crate::extract::{ApiJson, ApiQuery};
use crate::models::{action, Client, CreateClientRequest, MissingFormat};
use crate::services::{activity, clients};
use crate::AppState;

use super::{actor_from, multipart_error};

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct ClientListResponse {
    pub success: bool,
    pub clients: Vec<Client>,
    pub total: usize,
}

#[derive(Serialize)]
pub struct ClientResponse {
    pub success: bool,
    pub client: Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDeleteResponse {
    pub success: bool,
    pub client: Client,
    pub purged_assets: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatUploadResponse {
    pub success: bool,
    pub client: Client,
    pub path: String,
    pub public_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub success: bool,
    pub public_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingFormatsResponse {
    pub success: bool,
    pub offer_type: OfferType,
    pub missing: Vec<MissingFormat>,
}

// ========================================
// Request Types
// ========================================

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub format: Format,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingFormatsQuery {
    pub offer_type: Option<String>,
}

// ========================================
// Handlers
// ========================================

/// GET /api/clients - クライアント一覧
pub async fn list_clients(State(state): State<Arc<AppState>>) -> AppResult<Json<ClientListResponse>> {
    let clients = clients::list_clients(&state.db).await?;
    let total = clients.len();
    Ok(Json(ClientListResponse {
        success: true,
        clients,
        total,
    }))
}

/// POST /api/clients - クライアント登録
pub async fn create_client(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<CreateClientRequest>,
) -> AppResult<Json<ClientResponse>> {
    let client = clients::register_client(&state.db, &req.name).await?;

    activity::record(&state.db, &actor_from(&headers), action::CLIENT_CREATED, &client.id).await;
    info!("👤 Client created: {}", client.id);

    Ok(Json(ClientResponse {
        success: true,
        client,
    }))
}

/// GET /api/clients/:id
pub async fn get_client(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ClientResponse>> {
    let client = clients::get_client(&state.db, &id).await?;
    Ok(Json(ClientResponse {
        success: true,
        client,
    }))
}

/// DELETE /api/clients/:id - ドキュメント削除 + `client/<name>/` の後始末
pub async fn delete_client(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> AppResult<Json<ClientDeleteResponse>> {
    let client = clients::delete_client(&state.db, &id).await?;
    let purged_assets = clients::purge_client_assets(state.blobs.as_ref(), &client).await;

    activity::record(&state.db, &actor_from(&headers), action::CLIENT_DELETED, &client.id).await;

    Ok(Json(ClientDeleteResponse {
        success: true,
        client,
        purged_assets,
    }))
}

/// POST /api/clients/:id/formats - マスター画像アップロード
///
/// Parameters (multipart/form-data):
///   - file: 画像ファイル（必須）
///   - format: "1:1" | "16:9" | "9:16" | "3:9" | "9:3"（必須）
pub async fn upload_format(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> AppResult<Json<FormatUploadResponse>> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut format: Option<Format> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
                info!("📄 File field: {} bytes", bytes.len());
                file_data = Some(bytes);
            }
            "format" => {
                let text = field.text().await.map_err(multipart_error)?;
                format = Some(text.parse()?);
            }
            _ => {}
        }
    }

    let file_data = file_data
        .filter(|d| !d.is_empty())
        .ok_or_else(|| AppError::Validation("file is required".to_string()))?;
    let format = format.ok_or_else(|| AppError::Validation("format is required".to_string()))?;

    let upload =
        clients::upload_master_asset(&state.db, state.blobs.as_ref(), &id, format, &file_data).await?;

    activity::record(
        &state.db,
        &actor_from(&headers),
        action::IMAGE_UPLOADED,
        &upload.path,
    )
    .await;

    Ok(Json(FormatUploadResponse {
        success: true,
        client: upload.client,
        path: upload.path,
        public_url: upload.public_url,
    }))
}

/// POST /api/clients/:id/formats/preview - マスター画像の公開 URL
pub async fn preview_format(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<PreviewRequest>,
) -> AppResult<Json<PreviewResponse>> {
    let public_url =
        clients::preview_master_asset(&state.db, state.blobs.as_ref(), &id, req.format).await?;
    Ok(Json(PreviewResponse {
        success: true,
        public_url,
    }))
}

/// GET /api/clients/:id/missing-formats?offerType=
pub async fn missing_formats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<MissingFormatsQuery>,
) -> AppResult<Json<MissingFormatsResponse>> {
    let offer_type: OfferType = query
        .offer_type
        .ok_or_else(|| AppError::Validation("offerType is required".to_string()))?
        .parse()?;

    let client = clients::get_client(&state.db, &id).await?;
    let missing = clients::missing_formats(&client, offer_type);

    Ok(Json(MissingFormatsResponse {
        success: true,
        offer_type,
        missing,
    }))
}
