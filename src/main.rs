// src/main.rs

use std::sync::Arc;

use axum::{
    routing::{get, patch, post},
    Router,
};
use block_analytics::{config::AppConfig, db, logging, store::postgres::PgStore, BlockAnalytics};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

mod routes;

#[derive(Clone)]
pub struct AppState {
    pub analytics: Arc<BlockAnalytics>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env if present
    dotenvy::dotenv().ok();
    logging::init();

    let config = AppConfig::from_env()?;
    let pool = db::connect(&config).await?;

    let store = Arc::new(PgStore::new(pool, config.facility.zone));
    let analytics = BlockAnalytics::new(store.clone(), store.clone(), store, config.facility);
    let state = AppState { analytics: Arc::new(analytics) };

    // Very permissive CORS for local dev (tighten for prod)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // health
        .route("/health", get(routes::health::health))
        // utilization batches
        .route(
            "/api/v1/blocks/utilization",
            post(routes::utilization::run_block_utilization),
        )
        .route(
            "/api/v1/surgeons/day-utilization",
            post(routes::utilization::run_surgeon_day_utilization),
        )
        .route(
            "/api/v1/rooms/day-utilization",
            post(routes::utilization::run_room_day_utilization),
        )
        // profile batches
        .route("/api/v1/rooms/profiles", post(routes::profiles::run_room_profiles))
        .route("/api/v1/surgeons/profiles", post(routes::profiles::run_surgeon_profiles))
        .route(
            "/api/v1/rooms/:unit/:room/profile",
            post(routes::profiles::run_room_profile),
        )
        .route(
            "/api/v1/surgeons/:id/profile",
            post(routes::profiles::run_surgeon_profile),
        )
        // calendar
        .route("/api/v1/calendar/blocks", get(routes::calendar::get_block_day))
        .route(
            "/api/v1/blocks/:id/inactive",
            patch(routes::calendar::patch_block_inactive),
        )
        // state & middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "API listening");

    axum::serve(listener, api.into_make_service()).await?;
    Ok(())
}
