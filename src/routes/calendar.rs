// src/routes/calendar.rs

use axum::{extract::{Path, Query, State}, http::StatusCode, Json};
use block_analytics::models::BlockDaySummary;
use chrono::NaiveDate;
use serde::Deserialize;

use super::analytics_error;
use crate::AppState;

#[derive(Deserialize)]
pub struct BlockDayQ { pub date: NaiveDate, pub unit: String, pub room: String }

pub async fn get_block_day(
    State(state): State<AppState>,
    Query(q): Query<BlockDayQ>,
) -> Result<Json<BlockDaySummary>, (StatusCode, String)> {
    let summary = state
        .analytics
        .block_day(q.date, &q.unit, &q.room)
        .await
        .map_err(analytics_error)?;
    Ok(Json(summary))
}

#[derive(Deserialize)]
pub struct InactiveReq { pub inactive: bool }

pub async fn patch_block_inactive(
    State(state): State<AppState>,
    Path(block_id): Path<String>,
    Json(req): Json<InactiveReq>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let found = state
        .analytics
        .set_block_inactive(&block_id, req.inactive)
        .await
        .map_err(analytics_error)?;
    if !found {
        return Err((StatusCode::NOT_FOUND, format!("block {block_id} not found")));
    }
    Ok(Json(serde_json::json!({ "blockId": block_id, "inactive": req.inactive })))
}
