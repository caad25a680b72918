// src/analytics/profiles.rs

use std::collections::BTreeMap;

use crate::analytics::recurrence::bucket_key;
use crate::analytics::stats::{ratio, FrequencyTable, Spread};
use crate::error::Diagnostics;
use crate::models::{
    CaseRecord, FacilityDay, LeadTimeStats, ProfileMonth, RoomProfile, RoomUsageStats, SurgeonProfile,
    TimeUsageStats,
};

// ─────────────────────────────────────────────────────────────────────────────
// Room profiles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct RoomBucket {
    durations: Vec<i64>,
    utilization_minutes: i64,
    surgeons: FrequencyTable,
    procedures: FrequencyTable,
}

/// Profile of one room over a month, bucketed by `"weekday-weekOfMonth"`.
///
/// `cases` should already be restricted to the room; cases that belong to
/// another room are ignored. Each case contributes one duration sample and
/// its minutes inside the facility day. Frequencies are relative to the
/// number of cases in the bucket.
pub fn build_room_profile(
    room: &str,
    cases: &[CaseRecord],
    month: ProfileMonth,
    facility: &FacilityDay,
    diagnostics: &mut Diagnostics,
) -> RoomProfile {
    let mut buckets: BTreeMap<String, RoomBucket> = BTreeMap::new();

    for case in cases.iter().filter(|c| c.room.as_deref() == Some(room)) {
        let (Some(interval), Some(date)) = (case.interval(), case.local_date()) else {
            diagnostics.malformed(format!("case {}", case.case_id), "missing start or end time");
            continue;
        };
        let Some(duration) = case.duration_minutes() else {
            diagnostics.malformed(format!("case {}", case.case_id), "missing duration");
            continue;
        };

        let bucket = buckets.entry(bucket_key(date)).or_default();
        bucket.durations.push(duration);
        bucket.utilization_minutes += interval.clip(&facility.window_on(date)).minutes();

        for proc in case.primary_procedures() {
            if let Some(npi) = proc.physician_id.as_deref() {
                bucket.surgeons.add(npi);
            }
            if let Some(pid) = proc.procedure_id.as_deref() {
                bucket.procedures.add(pid);
            }
        }
    }

    let capacity = facility.capacity_minutes();
    let usage_by_day_and_week = buckets
        .into_iter()
        .map(|(key, bucket)| {
            let case_count = bucket.durations.len();
            let spread = Spread::of_ints(&bucket.durations);
            let stats = RoomUsageStats {
                case_count,
                mean_minutes: spread.mean,
                std_minutes: spread.std,
                surgeon_frequency: bucket.surgeons.relative_to(case_count),
                procedure_frequency: bucket.procedures.relative_to(case_count),
                utilization_minutes: bucket.utilization_minutes,
                utilization_rate: ratio(bucket.utilization_minutes, case_count as i64 * capacity),
            };
            (key, stats)
        })
        .collect();

    RoomProfile {
        room: room.to_string(),
        profile_month: month,
        usage_by_day_and_week,
    }
}

/// One profile per room appearing in `cases`. Cases without a room are
/// skipped with a diagnostic.
pub fn build_room_profiles(
    cases: &[CaseRecord],
    month: ProfileMonth,
    facility: &FacilityDay,
    diagnostics: &mut Diagnostics,
) -> Vec<RoomProfile> {
    let mut by_room: BTreeMap<&str, Vec<CaseRecord>> = BTreeMap::new();
    for case in cases {
        match case.room.as_deref().filter(|r| !r.is_empty()) {
            Some(room) => by_room.entry(room).or_default().push(case.clone()),
            None => diagnostics.malformed(format!("case {}", case.case_id), "missing room"),
        }
    }

    by_room
        .into_iter()
        .map(|(room, room_cases)| build_room_profile(room, &room_cases, month, facility, diagnostics))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Surgeon profiles
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SurgeonAcc {
    lead_days: BTreeMap<String, Vec<i64>>,
    usage: BTreeMap<String, Vec<i64>>,
    procedures: FrequencyTable,
    primary_count: usize,
}

/// Profile of one surgeon over a month: lead time per procedure type,
/// time usage per `"weekday-weekOfMonth"` bucket and procedure mix.
pub fn build_surgeon_profile(
    surgeon_id: &str,
    cases: &[CaseRecord],
    month: ProfileMonth,
    diagnostics: &mut Diagnostics,
) -> SurgeonProfile {
    let acc = accumulate_surgeons(cases, Some(surgeon_id), diagnostics)
        .remove(surgeon_id)
        .unwrap_or_default();
    finish_surgeon(surgeon_id.to_string(), month, acc)
}

/// One profile per surgeon performing a primary procedure in `cases`.
pub fn build_surgeon_profiles(
    cases: &[CaseRecord],
    month: ProfileMonth,
    diagnostics: &mut Diagnostics,
) -> Vec<SurgeonProfile> {
    accumulate_surgeons(cases, None, diagnostics)
        .into_iter()
        .map(|(surgeon_id, acc)| finish_surgeon(surgeon_id, month, acc))
        .collect()
}

fn accumulate_surgeons(
    cases: &[CaseRecord],
    only: Option<&str>,
    diagnostics: &mut Diagnostics,
) -> BTreeMap<String, SurgeonAcc> {
    let mut by_surgeon: BTreeMap<String, SurgeonAcc> = BTreeMap::new();

    for case in cases {
        let subject = format!("case {}", case.case_id);

        // Filter by performer first so a single-surgeon profile only reports
        // problems with that surgeon's cases.
        let mut owned = Vec::new();
        for proc in case.primary_procedures() {
            match proc.physician_id.as_deref().filter(|s| !s.is_empty()) {
                Some(npi) if only.map_or(true, |wanted| wanted == npi) => owned.push((npi, proc)),
                Some(_) => {}
                None if only.is_none() => {
                    diagnostics.malformed(subject.clone(), "primary procedure has no performing physician")
                }
                None => {}
            }
        }
        if owned.is_empty() {
            continue;
        }

        let (Some(scheduled), Some(lead)) = (case.scheduled_at, case.lead_days()) else {
            diagnostics.malformed(subject, "missing procedure date or creation date");
            continue;
        };
        let duration = case.duration_minutes();
        if duration.is_none() {
            diagnostics.malformed(subject, "missing start, end and recorded duration");
        }
        let key = bucket_key(scheduled.date_naive());

        for (npi, proc) in owned {
            let acc = by_surgeon.entry(npi.to_string()).or_default();
            acc.primary_count += 1;
            if let Some(minutes) = duration {
                acc.usage.entry(key.clone()).or_default().push(minutes);
            }
            if let Some(pid) = proc.procedure_id.as_deref() {
                acc.lead_days.entry(pid.to_string()).or_default().push(lead);
                acc.procedures.add(pid);
            }
        }
    }

    by_surgeon
}

fn finish_surgeon(surgeon_id: String, month: ProfileMonth, acc: SurgeonAcc) -> SurgeonProfile {
    let lead_time_by_procedure = acc
        .lead_days
        .into_iter()
        .map(|(pid, days)| {
            let spread = Spread::of_ints(&days);
            (pid, LeadTimeStats { samples: spread.samples, mean_days: spread.mean, std_days: spread.std })
        })
        .collect();

    let time_usage_by_day_and_week = acc
        .usage
        .into_iter()
        .map(|(key, minutes)| {
            let spread = Spread::of_ints(&minutes);
            (key, TimeUsageStats { samples: spread.samples, mean_minutes: spread.mean, std_minutes: spread.std })
        })
        .collect();

    SurgeonProfile {
        surgeon_id,
        profile_month: month,
        primary_procedure_count: acc.primary_count,
        lead_time_by_procedure,
        time_usage_by_day_and_week,
        procedure_frequency: acc.procedures.relative_to(acc.primary_count),
    }
}
