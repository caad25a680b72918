// src/routes/utilization.rs

use axum::{extract::{Query, State}, http::StatusCode, Json};
use block_analytics::models::BatchReport;

use super::{analytics_error, WindowQ};
use crate::AppState;

pub async fn run_block_utilization(
    State(state): State<AppState>,
    Query(q): Query<WindowQ>,
) -> Result<Json<BatchReport>, (StatusCode, String)> {
    let window = q.range()?;
    let report = state.analytics.block_utilization(window).await.map_err(analytics_error)?;
    Ok(Json(report))
}

pub async fn run_surgeon_day_utilization(
    State(state): State<AppState>,
    Query(q): Query<WindowQ>,
) -> Result<Json<BatchReport>, (StatusCode, String)> {
    let window = q.range()?;
    let report = state.analytics.surgeon_day_utilization(window).await.map_err(analytics_error)?;
    Ok(Json(report))
}

pub async fn run_room_day_utilization(
    State(state): State<AppState>,
    Query(q): Query<WindowQ>,
) -> Result<Json<BatchReport>, (StatusCode, String)> {
    let window = q.range()?;
    let report = state.analytics.room_day_utilization(window).await.map_err(analytics_error)?;
    Ok(Json(report))
}
