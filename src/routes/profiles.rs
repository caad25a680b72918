// src/routes/profiles.rs

use axum::{extract::{Path, Query, State}, http::StatusCode, Json};
use block_analytics::models::BatchReport;

use super::{analytics_error, WindowQ};
use crate::AppState;

pub async fn run_room_profiles(
    State(state): State<AppState>,
    Query(q): Query<WindowQ>,
) -> Result<Json<BatchReport>, (StatusCode, String)> {
    let report = state.analytics.room_profiles(q.range()?).await.map_err(analytics_error)?;
    Ok(Json(report))
}

pub async fn run_surgeon_profiles(
    State(state): State<AppState>,
    Query(q): Query<WindowQ>,
) -> Result<Json<BatchReport>, (StatusCode, String)> {
    let report = state.analytics.surgeon_profiles(q.range()?).await.map_err(analytics_error)?;
    Ok(Json(report))
}

pub async fn run_room_profile(
    State(state): State<AppState>,
    Path((unit, room)): Path<(String, String)>,
    Query(q): Query<WindowQ>,
) -> Result<Json<BatchReport>, (StatusCode, String)> {
    let report = state
        .analytics
        .room_profile(q.range()?, &unit, &room)
        .await
        .map_err(analytics_error)?;
    Ok(Json(report))
}

pub async fn run_surgeon_profile(
    State(state): State<AppState>,
    Path(surgeon_id): Path<String>,
    Query(q): Query<WindowQ>,
) -> Result<Json<BatchReport>, (StatusCode, String)> {
    let report = state
        .analytics
        .surgeon_profile(q.range()?, &surgeon_id)
        .await
        .map_err(analytics_error)?;
    Ok(Json(report))
}
