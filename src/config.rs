// src/config.rs

use anyhow::{anyhow, bail, Context};
use chrono::NaiveTime;
use chrono_tz::Tz;

use crate::models::FacilityDay;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub max_connections: u32,
    pub facility: FacilityDay,
}

impl AppConfig {
    /// Reads the process environment (after `.env`, if the caller loaded it).
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow!("DATABASE_URL must be set"))?;

        let port = match lookup("PORT") {
            Some(s) => s.trim().parse().with_context(|| format!("invalid PORT '{s}'"))?,
            None => 8080,
        };
        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(s) => s
                .trim()
                .parse()
                .with_context(|| format!("invalid DB_MAX_CONNECTIONS '{s}'"))?,
            None => 10,
        };

        let defaults = FacilityDay::default();
        let zone = match lookup("FACILITY_TZ") {
            Some(s) => parse_zone(&s)?,
            None => defaults.zone,
        };
        let start = match lookup("FACILITY_DAY_START") {
            Some(s) => parse_time("FACILITY_DAY_START", &s)?,
            None => defaults.start,
        };
        let end = match lookup("FACILITY_DAY_END") {
            Some(s) => parse_time("FACILITY_DAY_END", &s)?,
            None => defaults.end,
        };
        if end <= start {
            bail!("FACILITY_DAY_END ({end}) must be after FACILITY_DAY_START ({start})");
        }

        Ok(Self {
            database_url,
            port,
            max_connections,
            facility: FacilityDay { zone, start, end },
        })
    }
}

/// IANA zone name, e.g. `America/Chicago`.
fn parse_zone(raw: &str) -> anyhow::Result<Tz> {
    raw.trim()
        .parse::<Tz>()
        .map_err(|e| anyhow!("invalid FACILITY_TZ '{raw}': {e}"))
}

fn parse_time(key: &str, raw: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").with_context(|| format!("invalid {key} '{raw}'"))
}
