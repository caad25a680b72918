use axum::http::StatusCode;
use block_analytics::models::DateRange;
use block_analytics::AnalyticsError;
use serde::Deserialize;

pub mod calendar;
pub mod health;
pub mod profiles;
pub mod utilization;

// Common error mappers
pub fn internal_error<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("internal error: {e}"))
}

pub fn analytics_error(e: AnalyticsError) -> (StatusCode, String) {
    match e {
        AnalyticsError::InvalidParameter(msg) => (StatusCode::BAD_REQUEST, msg),
        other => internal_error(other),
    }
}

/// `?start_date=YYYY-MM-DD&end_date=YYYY-MM-DD`
#[derive(Debug, Deserialize)]
pub struct WindowQ {
    pub start_date: String,
    pub end_date: String,
}

impl WindowQ {
    pub fn range(&self) -> Result<DateRange, (StatusCode, String)> {
        DateRange::parse(&self.start_date, &self.end_date).map_err(analytics_error)
    }
}
