// src/analytics/calendar.rs

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::analytics::interval::{covered_minutes, has_overlap, merge, TimeInterval};
use crate::analytics::stats::ratio;
use crate::error::Diagnostics;
use crate::models::{BlockDaySummary, BlockOccurrence, CaseRecord, FacilityDay, RoomDayUtilization};

type RoomDayKey = (NaiveDate, Option<String>, Option<String>, String);

/// Facility-day utilization per `(date, facility, unit, room)`.
///
/// Every primary procedure contributes its case interval clipped to the
/// facility day; the clipped set is merged before counting so a case with
/// several primary procedures is only counted once.
pub fn room_day_utilization(
    cases: &[CaseRecord],
    facility: &FacilityDay,
    diagnostics: &mut Diagnostics,
) -> Vec<RoomDayUtilization> {
    let mut groups: BTreeMap<RoomDayKey, (usize, Vec<TimeInterval>)> = BTreeMap::new();

    for case in cases {
        let Some(room) = case.room.clone().filter(|r| !r.is_empty()) else {
            diagnostics.malformed(format!("case {}", case.case_id), "missing room");
            continue;
        };
        let (Some(interval), Some(date)) = (case.interval(), case.local_date()) else {
            diagnostics.malformed(format!("case {}", case.case_id), "missing start or end time");
            continue;
        };

        let primaries = case.primary_procedures().count();
        if primaries == 0 {
            continue;
        }
        let key = (date, case.facility_id.clone(), case.unit.clone(), room);
        let (count, intervals) = groups.entry(key).or_default();
        *count += primaries;
        let clipped = interval.clip(&facility.window_on(date));
        intervals.extend(std::iter::repeat(clipped).take(primaries));
    }

    let available = facility.capacity_minutes();
    groups
        .into_iter()
        .map(|((date, facility_id, unit, room), (procedure_count, intervals))| {
            let used = covered_minutes(&merge(intervals));
            RoomDayUtilization {
                date,
                facility_id,
                unit,
                room,
                procedure_count,
                utilization_minutes: used,
                available_minutes: available,
                utilization_rate: ratio(used, available),
            }
        })
        .collect()
}

/// Lists the block occurrences of one room-day ordered by start and flags
/// multiple or overlapping reservations. Overlap is reported, not resolved.
pub fn summarize_block_day(
    date: NaiveDate,
    unit: &str,
    room: &str,
    occurrences: impl IntoIterator<Item = BlockOccurrence>,
) -> BlockDaySummary {
    let mut blocks: Vec<BlockOccurrence> = occurrences
        .into_iter()
        .filter(|o| o.date == date && o.room == room && o.unit == unit)
        .collect();
    blocks.sort_by_key(|o| (o.start(), o.end()));

    let windows: Vec<TimeInterval> = blocks.iter().map(|o| o.window).collect();
    BlockDaySummary {
        date,
        unit: unit.to_string(),
        room: room.to_string(),
        has_multiple_blocks: blocks.len() > 1,
        has_block_overlap: has_overlap(&windows),
        blocks,
    }
}
