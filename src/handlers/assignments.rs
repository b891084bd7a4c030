//! Assignments API Handlers
//! /api/assignments エンドポイント - オファーの週次割当

use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::OfferType;
use crate::error::AppResult;
use crate::extract::{ApiJson, ApiQuery};
use crate::models::{action, AssignmentPosition, AssignmentReport, AssignmentRequest};
use crate::services::{activity, assignment};
use crate::AppState;

use super::{actor_from, require_week};

#[derive(Serialize)]
pub struct AssignmentResponse {
    /// 全ポジション成功時のみ true
    pub success: bool,
    pub report: AssignmentReport,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResponse {
    pub success: bool,
    pub week_number: u32,
    pub positions: Vec<AssignmentPosition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerQuery {
    pub week_number: Option<u32>,
    pub offer_type: Option<String>,
}

/// POST /api/assignments - `{clientId, offerType, weekNumber}`
pub async fn run(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<AssignmentRequest>,
) -> AppResult<Json<AssignmentResponse>> {
    let report = assignment::assign(&state.db, state.blobs.as_ref(), &req).await?;
    log_scheduled(&state, &headers, &report).await;
    Ok(Json(AssignmentResponse {
        success: report.is_complete(),
        report,
    }))
}

/// POST /api/assignments/retry - 未コピーのポジションのみ再実行
pub async fn retry(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<AssignmentRequest>,
) -> AppResult<Json<AssignmentResponse>> {
    let report = assignment::retry(&state.db, state.blobs.as_ref(), &req).await?;
    log_scheduled(&state, &headers, &report).await;
    Ok(Json(AssignmentResponse {
        success: report.is_complete(),
        report,
    }))
}

/// GET /api/assignments?weekNumber=&offerType=
pub async fn ledger(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<LedgerQuery>,
) -> AppResult<Json<LedgerResponse>> {
    let week_number = require_week(query.week_number)?;
    let offer = match query.offer_type.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<OfferType>()?),
        None => None,
    };

    let positions = assignment::ledger(&state.db, week_number, offer).await?;
    Ok(Json(LedgerResponse {
        success: true,
        week_number,
        positions,
    }))
}

async fn log_scheduled(state: &AppState, headers: &HeaderMap, report: &AssignmentReport) {
    if report.copied == 0 {
        return;
    }
    let target = format!(
        "{} / {} / week {}",
        report.client_id, report.offer_type, report.week_number
    );
    activity::record(&state.db, &actor_from(headers), action::OFFER_SCHEDULED, &target).await;
}
