// src/analytics/pipeline.rs

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::analytics::calendar::{room_day_utilization, summarize_block_day};
use crate::analytics::matcher::CaseMatcher;
use crate::analytics::profiles::{build_room_profile, build_room_profiles, build_surgeon_profile, build_surgeon_profiles};
use crate::analytics::recurrence::expand_block;
use crate::analytics::utilization::{compute_utilization, fold_surgeon_days};
use crate::error::{AnalyticsError, Diagnostics};
use crate::models::{BatchReport, BlockDaySummary, DateRange, FacilityDay, ProfileMonth, UtilizationRecord};
use crate::store::{AnalyticsSink, BlockQuery, BlockSource, CaseQuery, CaseSource};

/// Batch entry points. Each run reads a consistent slice from the sources,
/// computes in memory and upserts the results in one call to the sink.
#[derive(Clone)]
pub struct BlockAnalytics {
    blocks: Arc<dyn BlockSource>,
    cases: Arc<dyn CaseSource>,
    sink: Arc<dyn AnalyticsSink>,
    facility: FacilityDay,
}

impl BlockAnalytics {
    pub fn new(
        blocks: Arc<dyn BlockSource>,
        cases: Arc<dyn CaseSource>,
        sink: Arc<dyn AnalyticsSink>,
        facility: FacilityDay,
    ) -> Self {
        Self { blocks, cases, sink, facility }
    }

    /// One record per surgeon-block occurrence in `window`.
    pub async fn block_utilization(&self, window: DateRange) -> Result<BatchReport, AnalyticsError> {
        info!(start = %window.start, end = %window.end, "block utilization batch");
        let (records, diagnostics) = self.utilization_records(&window).await?;
        let written = self.sink.upsert_utilization(&records).await?;
        info!(written, skipped = diagnostics.len(), "block utilization done");
        Ok(report(written, diagnostics))
    }

    /// Block utilization rolled up per surgeon and date.
    pub async fn surgeon_day_utilization(&self, window: DateRange) -> Result<BatchReport, AnalyticsError> {
        info!(start = %window.start, end = %window.end, "surgeon-day utilization batch");
        let (records, diagnostics) = self.utilization_records(&window).await?;
        let days = fold_surgeon_days(&records);
        let written = self.sink.upsert_surgeon_days(&days).await?;
        info!(written, skipped = diagnostics.len(), "surgeon-day utilization done");
        Ok(report(written, diagnostics))
    }

    /// Facility-day utilization for every room with primary cases in `window`.
    pub async fn room_day_utilization(&self, window: DateRange) -> Result<BatchReport, AnalyticsError> {
        info!(start = %window.start, end = %window.end, "room-day utilization batch");
        let fetched = self.cases.cases(&CaseQuery::between(window)).await?;
        let mut diagnostics = fetched.diagnostics;
        let rows = room_day_utilization(&fetched.records, &self.facility, &mut diagnostics);
        let written = self.sink.upsert_room_days(&rows).await?;
        info!(written, skipped = diagnostics.len(), "room-day utilization done");
        Ok(report(written, diagnostics))
    }

    /// Room profiles for the month containing `window.start`.
    pub async fn room_profiles(&self, window: DateRange) -> Result<BatchReport, AnalyticsError> {
        let month = ProfileMonth::of(window.start);
        info!(%month, start = %window.start, end = %window.end, "room profile batch");
        let fetched = self.cases.cases(&CaseQuery::between(window)).await?;
        let mut diagnostics = fetched.diagnostics;
        let profiles = build_room_profiles(&fetched.records, month, &self.facility, &mut diagnostics);
        let written = self.sink.upsert_room_profiles(&profiles).await?;
        info!(written, skipped = diagnostics.len(), "room profiles done");
        Ok(report(written, diagnostics))
    }

    /// Surgeon profiles for the month containing `window.start`.
    pub async fn surgeon_profiles(&self, window: DateRange) -> Result<BatchReport, AnalyticsError> {
        let month = ProfileMonth::of(window.start);
        info!(%month, start = %window.start, end = %window.end, "surgeon profile batch");
        let fetched = self.cases.cases(&CaseQuery::between(window)).await?;
        let mut diagnostics = fetched.diagnostics;
        let profiles = build_surgeon_profiles(&fetched.records, month, &mut diagnostics);
        let written = self.sink.upsert_surgeon_profiles(&profiles).await?;
        info!(written, skipped = diagnostics.len(), "surgeon profiles done");
        Ok(report(written, diagnostics))
    }

    /// Refreshes the profile of a single room for the month containing `window.start`.
    pub async fn room_profile(&self, window: DateRange, unit: &str, room: &str) -> Result<BatchReport, AnalyticsError> {
        if unit.is_empty() || room.is_empty() {
            return Err(AnalyticsError::InvalidParameter("unit and room are required".into()));
        }
        let month = ProfileMonth::of(window.start);
        info!(%month, unit, room, "room profile refresh");
        let fetched = self.cases.cases(&CaseQuery::between(window).in_room(unit, room)).await?;
        let mut diagnostics = fetched.diagnostics;
        let profile = build_room_profile(room, &fetched.records, month, &self.facility, &mut diagnostics);
        let written = self.sink.upsert_room_profiles(&[profile]).await?;
        Ok(report(written, diagnostics))
    }

    /// Refreshes the profile of a single surgeon for the month containing `window.start`.
    pub async fn surgeon_profile(&self, window: DateRange, surgeon_id: &str) -> Result<BatchReport, AnalyticsError> {
        if surgeon_id.is_empty() {
            return Err(AnalyticsError::InvalidParameter("surgeon id is required".into()));
        }
        let month = ProfileMonth::of(window.start);
        info!(%month, surgeon_id, "surgeon profile refresh");
        let fetched = self.cases.cases(&CaseQuery::between(window).by_physician(surgeon_id)).await?;
        let mut diagnostics = fetched.diagnostics;
        let profile = build_surgeon_profile(surgeon_id, &fetched.records, month, &mut diagnostics);
        let written = self.sink.upsert_surgeon_profiles(&[profile]).await?;
        Ok(report(written, diagnostics))
    }

    /// Block occurrences reserved on one room-day, with overlap flags.
    pub async fn block_day(&self, date: NaiveDate, unit: &str, room: &str) -> Result<BlockDaySummary, AnalyticsError> {
        if unit.is_empty() || room.is_empty() {
            return Err(AnalyticsError::InvalidParameter("unit and room are required".into()));
        }
        let query = BlockQuery::Room { unit: unit.to_string(), room: room.to_string() };
        let fetched = self.blocks.blocks(&query).await?;
        let day = DateRange::single(date);
        let occurrences: Vec<_> = fetched
            .records
            .iter()
            .flat_map(|block| expand_block(block, &day, self.facility.zone))
            .collect();
        Ok(summarize_block_day(date, unit, room, occurrences))
    }

    pub async fn set_block_inactive(&self, block_id: &str, inactive: bool) -> Result<bool, AnalyticsError> {
        let found = self.blocks.set_block_inactive(block_id, inactive).await?;
        info!(block_id, inactive, found, "block lifecycle toggled");
        Ok(found)
    }

    async fn utilization_records(
        &self,
        window: &DateRange,
    ) -> Result<(Vec<UtilizationRecord>, Diagnostics), AnalyticsError> {
        let blocks = self.blocks.blocks(&BlockQuery::Surgeon).await?;
        let cases = self.cases.cases(&CaseQuery::between(*window)).await?;

        let mut diagnostics = blocks.diagnostics;
        diagnostics.extend(cases.diagnostics);
        let matcher = CaseMatcher::new(&cases.records, &mut diagnostics);
        debug!(blocks = blocks.records.len(), procedures = matcher.len(), "inputs loaded");

        let mut records = Vec::new();
        for block in &blocks.records {
            if block.inactive {
                debug!(block_id = %block.block_id, "inactive block skipped");
                continue;
            }
            if block.physicians.is_empty() {
                diagnostics.malformed(format!("block {}", block.block_id), "no owning physician");
                continue;
            }
            for occurrence in expand_block(block, window, self.facility.zone) {
                if occurrence.duration_minutes <= 0 {
                    diagnostics.zero_capacity(
                        format!("block {} on {}", occurrence.block_id, occurrence.date),
                        format!("window {} minutes", occurrence.duration_minutes),
                    );
                }
                let matched = matcher.for_occurrence(&occurrence);
                let record = compute_utilization(&occurrence, &matched);
                debug!(
                    block_id = %record.block_id,
                    date = %record.date,
                    block_minutes = record.block_minutes,
                    in_room = record.used_in_room_minutes,
                    anywhere = record.used_anywhere_minutes,
                    "occurrence computed"
                );
                records.push(record);
            }
        }
        Ok((records, diagnostics))
    }
}

fn report(records_written: usize, diagnostics: Diagnostics) -> BatchReport {
    BatchReport { records_written, diagnostics: diagnostics.into_vec() }
}
