// src/store/postgres.rs

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use chrono_tz::Tz;
use sqlx::types::Json;
use sqlx::{query, query_as, FromRow, Pool, Postgres};
use tracing::debug;

use super::{AnalyticsSink, BlockQuery, BlockSource, CaseQuery, CaseSource, Fetched};
use crate::analytics::recurrence::local_instant;
use crate::error::{Diagnostics, StoreResult};
use crate::models::{
    BlockDefinition, CaseRecord, DateRange, FrequencyRule, Procedure, RoomDayUtilization, RoomProfile,
    SurgeonDayUtilization, SurgeonProfile, UtilizationRecord,
};

/// Postgres-backed store. Timestamps are read as UTC and converted to the
/// facility zone here, so the analytics core only sees local instants.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
    zone: Tz,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>, zone: Tz) -> Self {
        Self { pool, zone }
    }

    fn local(&self, ts: Option<DateTime<Utc>>) -> Option<DateTime<FixedOffset>> {
        ts.map(|t| to_local(t, self.zone))
    }

    /// `[start 00:00, end + 1 day 00:00)` in the facility zone, as UTC.
    fn bounds(&self, range: &DateRange) -> (DateTime<Utc>, DateTime<Utc>) {
        let midnight = NaiveTime::MIN;
        let after = range.end.succ_opt().unwrap_or(range.end);
        (
            local_instant(range.start, midnight, self.zone).with_timezone(&Utc),
            local_instant(after, midnight, self.zone).with_timezone(&Utc),
        )
    }
}

/// The instant in the facility zone, carrying the offset in force at that moment.
fn to_local(ts: DateTime<Utc>, zone: Tz) -> DateTime<FixedOffset> {
    let local = ts.with_timezone(&zone);
    local.with_timezone(&local.offset().fix())
}

// ───────────────────────────────────────
// Raw rows (validated into records below)
// ───────────────────────────────────────

#[derive(Debug, FromRow)]
struct BlockRow {
    block_id: i64,
    block_type: Option<String>,
    room: Option<String>,
    unit: Option<String>,
    facility_id: Option<String>,
    inactive: Option<bool>,
    owner_npis: Option<Vec<String>>,
}

#[derive(Debug, FromRow)]
struct FrequencyRow {
    block_id: i64,
    dow_applied: Option<i32>,
    weeks_of_month: Option<Vec<i32>>,
    rule_start: Option<NaiveDate>,
    rule_end: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    windows: Option<Json<Vec<DateRange>>>,
}

#[derive(Debug, FromRow)]
struct CaseRow {
    case_id: i64,
    facility_id: Option<String>,
    unit: Option<String>,
    room: Option<String>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    procedure_date: Option<DateTime<Utc>>,
    date_created: Option<DateTime<Utc>>,
    duration_minutes: Option<i32>,
}

#[derive(Debug, FromRow)]
struct ProcedureRow {
    case_id: i64,
    procedure_id: Option<String>,
    primary_npi: Option<String>,
    is_primary: Option<bool>,
}

fn to_rule(row: FrequencyRow, diagnostics: &mut Diagnostics) -> Option<FrequencyRule> {
    let subject = format!("block {} frequency", row.block_id);
    let (Some(dow), Some(rule_start), Some(rule_end), Some(start_time), Some(end_time)) =
        (row.dow_applied, row.rule_start, row.rule_end, row.start_time, row.end_time)
    else {
        diagnostics.malformed(subject, "missing weekday, active dates or time window");
        return None;
    };
    if !(0..=6).contains(&dow) {
        diagnostics.malformed(subject, format!("weekday {dow} outside 0..=6"));
        return None;
    }
    let weeks = row.weeks_of_month.unwrap_or_default();
    if let Some(bad) = weeks.iter().find(|w| !(1..=5).contains(*w)) {
        diagnostics.malformed(subject, format!("week of month {bad} outside 1..=5"));
        return None;
    }
    let Ok(active) = DateRange::new(rule_start, rule_end) else {
        diagnostics.malformed(subject, format!("active range {rule_start}..{rule_end} is inverted"));
        return None;
    };
    let windows = row.windows.map(|Json(w)| w).unwrap_or_default();
    // Such a rule never reserves anything.
    if weeks.is_empty() && windows.is_empty() {
        diagnostics.malformed(subject, "no weeks of month or explicit windows");
        return None;
    }

    Some(FrequencyRule {
        dow: dow as u32,
        weeks_of_month: weeks.into_iter().map(|w| w as u32).collect::<BTreeSet<_>>(),
        active,
        start_time,
        end_time,
        windows,
    })
}

fn to_block(row: BlockRow, rules: Vec<FrequencyRule>, diagnostics: &mut Diagnostics) -> Option<BlockDefinition> {
    let subject = format!("block {}", row.block_id);
    let (Some(room), Some(unit)) = (row.room.filter(|r| !r.is_empty()), row.unit) else {
        diagnostics.malformed(subject, "missing room or unit");
        return None;
    };
    Some(BlockDefinition {
        block_id: row.block_id.to_string(),
        block_type: row.block_type.unwrap_or_default(),
        physicians: row.owner_npis.unwrap_or_default(),
        room,
        unit,
        facility_id: row.facility_id,
        inactive: row.inactive.unwrap_or(false),
        rules,
    })
}

#[async_trait]
impl BlockSource for PgStore {
    async fn blocks(&self, q: &BlockQuery) -> StoreResult<Fetched<BlockDefinition>> {
        let rows = match q {
            BlockQuery::Surgeon => {
                query_as::<_, BlockRow>(
                    r#"SELECT block_id, block_type, room, unit, facility_id, inactive, owner_npis
                       FROM public.blocks
                       WHERE block_type = 'Surgeon'
                       ORDER BY block_id"#)
                    .fetch_all(&self.pool).await?
            }
            BlockQuery::Room { unit, room } => {
                query_as::<_, BlockRow>(
                    r#"SELECT block_id, block_type, room, unit, facility_id, inactive, owner_npis
                       FROM public.blocks
                       WHERE unit = $1 AND room = $2
                       ORDER BY block_id"#)
                    .bind(unit).bind(room)
                    .fetch_all(&self.pool).await?
            }
        };

        let ids: Vec<i64> = rows.iter().map(|r| r.block_id).collect();
        let freq_rows = query_as::<_, FrequencyRow>(
            r#"SELECT block_id, dow_applied, weeks_of_month, rule_start, rule_end,
                      start_time, end_time, windows
               FROM public.block_frequencies
               WHERE block_id = ANY($1)
               ORDER BY block_id, frequency_id"#)
            .bind(&ids)
            .fetch_all(&self.pool).await?;

        let mut diagnostics = Diagnostics::new();
        let mut rules_by_block: HashMap<i64, Vec<FrequencyRule>> = HashMap::new();
        for row in freq_rows {
            let block_id = row.block_id;
            if let Some(rule) = to_rule(row, &mut diagnostics) {
                rules_by_block.entry(block_id).or_default().push(rule);
            }
        }

        let records = rows
            .into_iter()
            .filter_map(|row| {
                let rules = rules_by_block.remove(&row.block_id).unwrap_or_default();
                to_block(row, rules, &mut diagnostics)
            })
            .collect::<Vec<_>>();
        debug!(blocks = records.len(), skipped = diagnostics.len(), "loaded blocks");
        Ok(Fetched { records, diagnostics })
    }

    async fn set_block_inactive(&self, block_id: &str, inactive: bool) -> StoreResult<bool> {
        let Ok(id) = block_id.parse::<i64>() else {
            return Ok(false);
        };
        let res = query(r#"UPDATE public.blocks SET inactive = $2 WHERE block_id = $1"#)
            .bind(id)
            .bind(inactive)
            .execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl CaseSource for PgStore {
    async fn cases(&self, q: &CaseQuery) -> StoreResult<Fetched<CaseRecord>> {
        let (from, to) = self.bounds(&q.range);
        let rows = query_as::<_, CaseRow>(
            r#"
            SELECT c.case_id, c.facility_id, c.unit, c.room, c.start_time, c.end_time,
                   c.procedure_date, c.date_created, c.duration_minutes
            FROM public.cases c
            WHERE COALESCE(c.start_time, c.procedure_date) >= $1
              AND COALESCE(c.start_time, c.procedure_date) <  $2
              AND ($3::text IS NULL OR c.unit = $3)
              AND ($4::text IS NULL OR c.room = $4)
              AND EXISTS (
                    SELECT 1 FROM public.case_procedures p
                    WHERE p.case_id = c.case_id
                      AND p.is_primary
                      AND ($5::text IS NULL OR p.primary_npi = $5))
            ORDER BY c.case_id
            "#)
            .bind(from)
            .bind(to)
            .bind(&q.unit)
            .bind(&q.room)
            .bind(&q.physician_id)
            .fetch_all(&self.pool).await?;

        let ids: Vec<i64> = rows.iter().map(|r| r.case_id).collect();
        let proc_rows = query_as::<_, ProcedureRow>(
            r#"SELECT case_id, procedure_id, primary_npi, is_primary
               FROM public.case_procedures
               WHERE case_id = ANY($1)
               ORDER BY case_id, seq"#)
            .bind(&ids)
            .fetch_all(&self.pool).await?;

        let mut procedures: HashMap<i64, Vec<Procedure>> = HashMap::new();
        for p in proc_rows {
            procedures.entry(p.case_id).or_default().push(Procedure {
                procedure_id: p.procedure_id,
                physician_id: p.primary_npi,
                primary: p.is_primary.unwrap_or(false),
            });
        }

        let records: Vec<CaseRecord> = rows
            .into_iter()
            .map(|r| CaseRecord {
                case_id: r.case_id.to_string(),
                facility_id: r.facility_id,
                unit: r.unit,
                room: r.room,
                start: self.local(r.start_time),
                end: self.local(r.end_time),
                scheduled_at: self.local(r.procedure_date),
                created_at: self.local(r.date_created),
                recorded_duration: r.duration_minutes.map(i64::from),
                procedures: procedures.remove(&r.case_id).unwrap_or_default(),
            })
            .collect();
        debug!(cases = records.len(), "loaded cases");
        Ok(Fetched::clean(records))
    }
}

#[async_trait]
impl AnalyticsSink for PgStore {
    async fn upsert_utilization(&self, records: &[UtilizationRecord]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        for r in records {
            query(
                r#"
                INSERT INTO public.block_utilization
                  (record_key, block_id, room, unit, date, surgeons, dow, week_of_month,
                   block_start_time, block_end_time, block_minutes, used_in_room, used_anywhere,
                   in_room_utilization, anywhere_utilization, updated_at)
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15, now())
                ON CONFLICT (record_key)
                DO UPDATE SET block_id = EXCLUDED.block_id,
                              unit = EXCLUDED.unit,
                              dow = EXCLUDED.dow,
                              week_of_month = EXCLUDED.week_of_month,
                              block_start_time = EXCLUDED.block_start_time,
                              block_end_time = EXCLUDED.block_end_time,
                              block_minutes = EXCLUDED.block_minutes,
                              used_in_room = EXCLUDED.used_in_room,
                              used_anywhere = EXCLUDED.used_anywhere,
                              in_room_utilization = EXCLUDED.in_room_utilization,
                              anywhere_utilization = EXCLUDED.anywhere_utilization,
                              updated_at = now()
                "#
            )
            .bind(r.natural_key())
            .bind(&r.block_id)
            .bind(&r.room)
            .bind(&r.unit)
            .bind(r.date)
            .bind(&r.surgeons)
            .bind(r.dow as i32)
            .bind(r.week_of_month as i32)
            .bind(&r.block_start_time)
            .bind(&r.block_end_time)
            .bind(r.block_minutes)
            .bind(r.used_in_room_minutes)
            .bind(r.used_anywhere_minutes)
            .bind(r.in_room_utilization)
            .bind(r.anywhere_utilization)
            .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    async fn upsert_surgeon_days(&self, records: &[SurgeonDayUtilization]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        for r in records {
            query(
                r#"
                INSERT INTO public.surgeon_day_utilization
                  (surgeon_id, date, blocks, block_minutes, used_in_room, used_anywhere,
                   in_room_utilization, anywhere_utilization)
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
                ON CONFLICT (surgeon_id, date)
                DO UPDATE SET blocks = EXCLUDED.blocks,
                              block_minutes = EXCLUDED.block_minutes,
                              used_in_room = EXCLUDED.used_in_room,
                              used_anywhere = EXCLUDED.used_anywhere,
                              in_room_utilization = EXCLUDED.in_room_utilization,
                              anywhere_utilization = EXCLUDED.anywhere_utilization
                "#
            )
            .bind(&r.surgeon_id)
            .bind(r.date)
            .bind(r.blocks as i64)
            .bind(r.block_minutes)
            .bind(r.used_in_room_minutes)
            .bind(r.used_anywhere_minutes)
            .bind(r.in_room_utilization)
            .bind(r.anywhere_utilization)
            .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    async fn upsert_room_days(&self, records: &[RoomDayUtilization]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        for r in records {
            query(
                r#"
                INSERT INTO public.room_day_utilization
                  (date, facility_id, unit, room, procedure_count, utilization_minutes,
                   available_minutes, utilization_rate)
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
                ON CONFLICT (date, facility_id, unit, room)
                DO UPDATE SET procedure_count = EXCLUDED.procedure_count,
                              utilization_minutes = EXCLUDED.utilization_minutes,
                              available_minutes = EXCLUDED.available_minutes,
                              utilization_rate = EXCLUDED.utilization_rate
                "#
            )
            .bind(r.date)
            .bind(r.facility_id.as_deref().unwrap_or(""))
            .bind(r.unit.as_deref().unwrap_or(""))
            .bind(&r.room)
            .bind(r.procedure_count as i64)
            .bind(r.utilization_minutes)
            .bind(r.available_minutes)
            .bind(r.utilization_rate)
            .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(records.len())
    }

    async fn upsert_room_profiles(&self, profiles: &[RoomProfile]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        for p in profiles {
            query(
                r#"
                INSERT INTO public.room_profiles (room, profile_month, usage_by_day_and_week, updated_at)
                VALUES ($1,$2,$3, now())
                ON CONFLICT (room, profile_month)
                DO UPDATE SET usage_by_day_and_week = EXCLUDED.usage_by_day_and_week,
                              updated_at = now()
                "#
            )
            .bind(&p.room)
            .bind(p.profile_month.to_string())
            .bind(Json(&p.usage_by_day_and_week))
            .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(profiles.len())
    }

    async fn upsert_surgeon_profiles(&self, profiles: &[SurgeonProfile]) -> StoreResult<usize> {
        let mut tx = self.pool.begin().await?;
        for p in profiles {
            query(
                r#"
                INSERT INTO public.surgeon_profiles
                  (surgeon_id, profile_month, primary_procedure_count, lead_time_by_procedure,
                   time_usage_by_day_and_week, procedure_frequency, updated_at)
                VALUES ($1,$2,$3,$4,$5,$6, now())
                ON CONFLICT (surgeon_id, profile_month)
                DO UPDATE SET primary_procedure_count = EXCLUDED.primary_procedure_count,
                              lead_time_by_procedure = EXCLUDED.lead_time_by_procedure,
                              time_usage_by_day_and_week = EXCLUDED.time_usage_by_day_and_week,
                              procedure_frequency = EXCLUDED.procedure_frequency,
                              updated_at = now()
                "#
            )
            .bind(&p.surgeon_id)
            .bind(p.profile_month.to_string())
            .bind(p.primary_procedure_count as i64)
            .bind(Json(&p.lead_time_by_procedure))
            .bind(Json(&p.time_usage_by_day_and_week))
            .bind(Json(&p.procedure_frequency))
            .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(profiles.len())
    }
}
