// src/models/mod.rs

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::analytics::interval::TimeInterval;
use crate::analytics::recurrence::local_instant;
use crate::error::AnalyticsError;

/// Minutes in the standard facility day (07:00–15:30 local).
pub const STANDARD_DAY_MINUTES: i64 = 510;

// ───────────────────────────────────────
// Calendar primitives
// ───────────────────────────────────────

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, AnalyticsError> {
        if end < start {
            return Err(AnalyticsError::InvalidParameter(format!(
                "date range ends ({end}) before it starts ({start})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses a reporting window from `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, AnalyticsError> {
        Self::new(parse_day(start)?, parse_day(end)?)
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    pub fn intersect(&self, other: &DateRange) -> Option<DateRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DateRange { start, end })
    }

    /// Every calendar day in the range, in order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + Clone {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

fn parse_day(s: &str) -> Result<NaiveDate, AnalyticsError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| AnalyticsError::InvalidParameter(format!("invalid date '{s}': {e}")))
}

/// Month a profile is computed for, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProfileMonth {
    pub year: i32,
    pub month: u32,
}

impl ProfileMonth {
    pub fn of(day: NaiveDate) -> Self {
        Self { year: day.year(), month: day.month() }
    }
}

impl fmt::Display for ProfileMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl Serialize for ProfileMonth {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The facility's working day and local zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacilityDay {
    pub zone: Tz,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl FacilityDay {
    pub fn window_on(&self, day: NaiveDate) -> TimeInterval {
        TimeInterval::new(
            local_instant(day, self.start, self.zone),
            local_instant(day, self.end, self.zone),
        )
    }

    pub fn capacity_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes().max(0)
    }
}

impl Default for FacilityDay {
    fn default() -> Self {
        // US Central, 07:00–15:30
        Self {
            zone: chrono_tz::America::Chicago,
            start: NaiveTime::from_hms_opt(7, 0, 0).expect("static time"),
            end: NaiveTime::from_hms_opt(15, 30, 0).expect("static time"),
        }
    }
}

// ───────────────────────────────────────
// Source records: blocks
// ───────────────────────────────────────

/// A recurring room reservation owned by one or more physicians.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockDefinition {
    pub block_id: String,
    pub block_type: String,         // "Surgeon" | "Service" | ...
    pub physicians: Vec<String>,    // owner NPIs
    pub room: String,
    pub unit: String,
    pub facility_id: Option<String>,
    pub inactive: bool,
    pub rules: Vec<FrequencyRule>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyRule {
    pub dow: u32,                       // 0 = Monday .. 6 = Sunday
    pub weeks_of_month: BTreeSet<u32>,  // 1..=5
    pub active: DateRange,
    pub start_time: NaiveTime,          // facility-local
    pub end_time: NaiveTime,
    /// Ad hoc date windows; when non-empty they replace `weeks_of_month`.
    pub windows: Vec<DateRange>,
}

/// One dated instantiation of a frequency rule. Derived, never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockOccurrence {
    pub block_id: String,
    pub date: NaiveDate,
    pub room: String,
    pub unit: String,
    pub facility_id: Option<String>,
    pub physicians: Vec<String>,
    pub window: TimeInterval,
    pub duration_minutes: i64,
}

impl BlockOccurrence {
    pub fn start(&self) -> DateTime<FixedOffset> {
        self.window.start
    }

    pub fn end(&self) -> DateTime<FixedOffset> {
        self.window.end
    }
}

// ───────────────────────────────────────
// Source records: cases
// ───────────────────────────────────────

/// One surgical case, with instants already in the facility zone.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub case_id: String,
    pub facility_id: Option<String>,
    pub unit: Option<String>,
    pub room: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub scheduled_at: Option<DateTime<FixedOffset>>, // procedure date
    pub created_at: Option<DateTime<FixedOffset>>,
    pub recorded_duration: Option<i64>,
    pub procedures: Vec<Procedure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub procedure_id: Option<String>,
    pub physician_id: Option<String>,
    pub primary: bool,
}

impl CaseRecord {
    pub fn interval(&self) -> Option<TimeInterval> {
        Some(TimeInterval::new(self.start?, self.end?))
    }

    /// Local calendar day the case started on.
    pub fn local_date(&self) -> Option<NaiveDate> {
        self.start.map(|s| s.date_naive())
    }

    pub fn primary_procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.procedures.iter().filter(|p| p.primary)
    }

    /// Recorded duration, falling back to the whole minutes between start and end.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.recorded_duration
            .or_else(|| self.interval().map(|iv| iv.minutes()))
    }

    /// Whole days between creation and the scheduled date, floored.
    pub fn lead_days(&self) -> Option<i64> {
        let lead: Duration = self.scheduled_at? - self.created_at?;
        Some(lead.num_seconds().div_euclid(86_400))
    }
}

// ───────────────────────────────────────
// Derived records
// ───────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UtilizationRecord {
    pub block_id: String,
    pub room: String,
    pub unit: String,
    pub date: NaiveDate,
    pub surgeons: Vec<String>,
    pub dow: u32,
    pub week_of_month: u32,
    pub block_start_time: String, // HH:MM local
    pub block_end_time: String,
    pub block_minutes: i64,
    pub used_in_room_minutes: i64,
    pub used_anywhere_minutes: i64,
    pub in_room_utilization: f64,
    pub anywhere_utilization: f64,
}

impl UtilizationRecord {
    /// Stable identity for upserts: room, date and the sorted surgeon set.
    pub fn natural_key(&self) -> String {
        let mut surgeons = self.surgeons.clone();
        surgeons.sort();
        let mut hasher = Sha256::new();
        hasher.update(self.room.as_bytes());
        hasher.update(b"|");
        hasher.update(self.date.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(surgeons.join(",").as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurgeonDayUtilization {
    pub surgeon_id: String,
    pub date: NaiveDate,
    pub blocks: usize,
    pub block_minutes: i64,
    pub used_in_room_minutes: i64,
    pub used_anywhere_minutes: i64,
    pub in_room_utilization: f64,
    pub anywhere_utilization: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDayUtilization {
    pub date: NaiveDate,
    pub facility_id: Option<String>,
    pub unit: Option<String>,
    pub room: String,
    pub procedure_count: usize,
    pub utilization_minutes: i64,
    pub available_minutes: i64,
    pub utilization_rate: f64,
}

/// Block occurrences sharing one room-day, with overlap flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDaySummary {
    pub date: NaiveDate,
    pub unit: String,
    pub room: String,
    pub blocks: Vec<BlockOccurrence>,
    pub has_multiple_blocks: bool,
    pub has_block_overlap: bool,
}

// ───────────────────────────────────────
// Profiles
// ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FrequencyEntry {
    pub count: usize,
    pub relative: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomUsageStats {
    pub case_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_minutes: Option<f64>,
    pub surgeon_frequency: BTreeMap<String, FrequencyEntry>,
    pub procedure_frequency: BTreeMap<String, FrequencyEntry>,
    pub utilization_minutes: i64,
    pub utilization_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomProfile {
    pub room: String,
    pub profile_month: ProfileMonth,
    pub usage_by_day_and_week: BTreeMap<String, RoomUsageStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeUsageStats {
    pub samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_minutes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_minutes: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadTimeStats {
    pub samples: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_days: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurgeonProfile {
    pub surgeon_id: String,
    pub profile_month: ProfileMonth,
    pub primary_procedure_count: usize,
    pub lead_time_by_procedure: BTreeMap<String, LeadTimeStats>,
    pub time_usage_by_day_and_week: BTreeMap<String, TimeUsageStats>,
    pub procedure_frequency: BTreeMap<String, FrequencyEntry>,
}

// ───────────────────────────────────────
// DTOs
// ───────────────────────────────────────

/// Outcome of one batch invocation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub records_written: usize,
    pub diagnostics: Vec<crate::error::Diagnostic>,
}
