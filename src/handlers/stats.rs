//! Stats API Handlers
//! オファー別件数と予約状況

use axum::{
    extract::State,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalog::OfferType;
use crate::error::AppResult;
use crate::extract::ApiQuery;
use crate::models::{OfferCount, ReservedOffer};
use crate::services::reservations;
use crate::AppState;

use super::require_week;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfferStatsResponse {
    pub success: bool,
    pub week_number: u32,
    pub offers: BTreeMap<OfferType, OfferCount>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationsResponse {
    pub success: bool,
    pub week_number: u32,
    pub reserved: Vec<ReservedOffer>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekNumberQuery {
    pub week_number: Option<u32>,
}

/// GET /api/offer-stats?weekNumber=
pub async fn offer_stats(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<WeekNumberQuery>,
) -> AppResult<Json<OfferStatsResponse>> {
    let week_number = require_week(query.week_number)?;
    let offers = reservations::offer_counts(&state.db, week_number).await?;
    Ok(Json(OfferStatsResponse {
        success: true,
        week_number,
        offers,
    }))
}

/// GET /api/reservations?weekNumber=
pub async fn reserved_offers(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<WeekNumberQuery>,
) -> AppResult<Json<ReservationsResponse>> {
    let week_number = require_week(query.week_number)?;
    let reserved = reservations::reserved_offers(&state.db, week_number).await?;
    Ok(Json(ReservationsResponse {
        success: true,
        week_number,
        reserved,
    }))
}
