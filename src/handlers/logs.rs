//! Logs API Handlers

use axum::{
    extract::State,
    response::Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::AppResult;
use crate::extract::ApiQuery;
use crate::models::{ActivityEntry, ActivityQuery};
use crate::services::activity;
use crate::AppState;

#[derive(Serialize)]
pub struct LogListResponse {
    pub success: bool,
    pub logs: Vec<ActivityEntry>,
    pub total: usize,
}

/// GET /api/logs?q=&action=
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> AppResult<Json<LogListResponse>> {
    let logs = activity::list(&state.db, &query).await?;
    let total = logs.len();
    Ok(Json(LogListResponse {
        success: true,
        logs,
        total,
    }))
}
