// src/analytics/utilization.rs

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::analytics::interval::{covered_minutes, merge, TimeInterval};
use crate::analytics::matcher::MatchedProcedure;
use crate::analytics::recurrence::{week_of_month, weekday_index};
use crate::analytics::stats::ratio;
use crate::models::{BlockOccurrence, SurgeonDayUtilization, UtilizationRecord};

/// Used minutes of one occurrence, in its own room and anywhere.
///
/// Each matched case is clipped to the block window first. In-room
/// intervals are a filtered subset of the anywhere intervals, and both
/// sets are merged independently, so overlapping cases are counted once
/// and `used_in_room_minutes <= used_anywhere_minutes` always holds.
pub fn compute_utilization(occurrence: &BlockOccurrence, matched: &[MatchedProcedure]) -> UtilizationRecord {
    let clipped: Vec<(TimeInterval, bool)> = matched
        .iter()
        .map(|m| {
            let in_room = m.room.as_deref() == Some(occurrence.room.as_str());
            (m.interval.clip(&occurrence.window), in_room)
        })
        .filter(|(iv, _)| !iv.is_empty())
        .collect();

    let anywhere = merge(clipped.iter().map(|(iv, _)| *iv));
    let in_room = merge(clipped.iter().filter(|(_, r)| *r).map(|(iv, _)| *iv));

    let block_minutes = occurrence.duration_minutes;
    let used_in_room_minutes = covered_minutes(&in_room);
    let used_anywhere_minutes = covered_minutes(&anywhere);

    UtilizationRecord {
        block_id: occurrence.block_id.clone(),
        room: occurrence.room.clone(),
        unit: occurrence.unit.clone(),
        date: occurrence.date,
        surgeons: occurrence.physicians.clone(),
        dow: weekday_index(occurrence.date),
        week_of_month: week_of_month(occurrence.date),
        block_start_time: occurrence.start().format("%H:%M").to_string(),
        block_end_time: occurrence.end().format("%H:%M").to_string(),
        block_minutes,
        used_in_room_minutes,
        used_anywhere_minutes,
        in_room_utilization: ratio(used_in_room_minutes, block_minutes),
        anywhere_utilization: ratio(used_anywhere_minutes, block_minutes),
    }
}

/// Rolls block-day records up to one record per surgeon and date.
pub fn fold_surgeon_days(records: &[UtilizationRecord]) -> Vec<SurgeonDayUtilization> {
    #[derive(Default)]
    struct Acc {
        blocks: usize,
        block_minutes: i64,
        in_room: i64,
        anywhere: i64,
    }

    let mut by_key: BTreeMap<(String, NaiveDate), Acc> = BTreeMap::new();
    for record in records {
        for surgeon in &record.surgeons {
            let acc = by_key.entry((surgeon.clone(), record.date)).or_default();
            acc.blocks += 1;
            acc.block_minutes += record.block_minutes.max(0);
            acc.in_room += record.used_in_room_minutes;
            acc.anywhere += record.used_anywhere_minutes;
        }
    }

    by_key
        .into_iter()
        .map(|((surgeon_id, date), acc)| SurgeonDayUtilization {
            surgeon_id,
            date,
            blocks: acc.blocks,
            block_minutes: acc.block_minutes,
            used_in_room_minutes: acc.in_room,
            used_anywhere_minutes: acc.anywhere,
            in_room_utilization: ratio(acc.in_room, acc.block_minutes),
            anywhere_utilization: ratio(acc.anywhere, acc.block_minutes),
        })
        .collect()
}
