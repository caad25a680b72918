// src/db/mod.rs

use sqlx::{Pool, Postgres};
use tracing::info;

use crate::config::AppConfig;

pub async fn connect(config: &AppConfig) -> anyhow::Result<Pool<Postgres>> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    info!(max_connections = config.max_connections, "connected to PostgreSQL");
    Ok(pool)
}
