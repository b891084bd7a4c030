//! Meta API Handlers
//! ヘルスチェック / カタログ / 週番号

use axum::{
    extract::State,
    response::Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{Format, OfferType, PositionCode};
use crate::error::{AppError, AppResult};
use crate::extract::ApiQuery;
use crate::week::{self, WeekBounds};
use crate::AppState;

// ========================================
// Response Types
// ========================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct CatalogPosition {
    pub position: PositionCode,
    pub format: Format,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogOffer {
    pub offer_type: OfferType,
    pub default_position: PositionCode,
    pub positions: Vec<CatalogPosition>,
}

#[derive(Serialize)]
pub struct CatalogResponse {
    pub success: bool,
    pub formats: Vec<Format>,
    pub offers: Vec<CatalogOffer>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekResponse {
    pub success: bool,
    pub date: NaiveDate,
    pub week_number: u32,
    #[serde(flatten)]
    pub bounds: WeekBounds,
}

#[derive(Debug, Deserialize)]
pub struct WeekQuery {
    pub date: Option<String>,
}

// ========================================
// Handlers
// ========================================

/// GET /api/health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: "adslot-admin".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /api/catalog - オファー → ポジション → フォーマット
pub async fn catalog() -> Json<CatalogResponse> {
    let offers = OfferType::ALL
        .into_iter()
        .map(|offer| CatalogOffer {
            offer_type: offer,
            default_position: offer.default_position(),
            positions: offer
                .positions()
                .iter()
                .map(|&position| CatalogPosition {
                    position,
                    format: position.format(),
                })
                .collect(),
        })
        .collect();

    Json(CatalogResponse {
        success: true,
        formats: Format::ALL.to_vec(),
        offers,
    })
}

/// GET /api/weeks/current - 今週（月曜基準）
pub async fn current_week(State(state): State<Arc<AppState>>) -> Json<WeekResponse> {
    let today = week::today(state.week_offset);
    Json(WeekResponse {
        success: true,
        date: today,
        week_number: week::current_week(today),
        bounds: week::week_bounds_of(today),
    })
}

/// GET /api/weeks?date=YYYY-MM-DD - 指定日の週
pub async fn week_of(ApiQuery(query): ApiQuery<WeekQuery>) -> AppResult<Json<WeekResponse>> {
    let raw = query
        .date
        .ok_or_else(|| AppError::Validation("date is required".to_string()))?;
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| AppError::Validation(format!("Invalid date {}: {}", raw, e)))?;

    Ok(Json(WeekResponse {
        success: true,
        date,
        week_number: week::week_number_of(date),
        bounds: week::week_bounds_of(date),
    }))
}
