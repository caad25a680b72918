// src/analytics/recurrence.rs

use chrono::{DateTime, Datelike, Duration, FixedOffset, LocalResult, NaiveDate, NaiveTime, Offset, TimeZone};
use chrono_tz::Tz;

use crate::analytics::interval::TimeInterval;
use crate::models::{BlockDefinition, BlockOccurrence, DateRange, FrequencyRule};

/// Weekday index with Monday = 0.
pub fn weekday_index(day: NaiveDate) -> u32 {
    day.weekday().num_days_from_monday()
}

/// Week of month where week 1 always contains the 1st, whatever weekday
/// it falls on: `floor((day - 1 + weekday(first)) / 7) + 1`.
pub fn week_of_month(day: NaiveDate) -> u32 {
    let first = day - Duration::days(i64::from(day.day0()));
    (day.day0() + weekday_index(first)) / 7 + 1
}

/// `"weekday-weekOfMonth"` bucket key used by the profiles.
pub fn bucket_key(day: NaiveDate) -> String {
    format!("{}-{}", weekday_index(day), week_of_month(day))
}

/// Combines a calendar day and a wall-clock time in the facility zone.
///
/// On a fall-back day the earlier of the two instants is used. A wall time
/// skipped by a spring-forward transition lands the same distance past the
/// jump (02:30 becomes 03:30).
pub fn local_instant(day: NaiveDate, time: NaiveTime, zone: Tz) -> DateTime<FixedOffset> {
    let naive = day.and_time(time);
    let resolved = match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => {
            let before = zone.offset_from_utc_datetime(&naive).fix();
            zone.from_utc_datetime(&(naive - Duration::seconds(i64::from(before.local_minus_utc()))))
        }
    };
    resolved.with_timezone(&resolved.offset().fix())
}

impl FrequencyRule {
    /// Whether this rule reserves the room on `day`. Explicit windows, when
    /// present, take precedence over the week-of-month set.
    pub fn applies_on(&self, day: NaiveDate) -> bool {
        if !self.active.contains(day) || weekday_index(day) != self.dow {
            return false;
        }
        if self.windows.is_empty() {
            self.weeks_of_month.contains(&week_of_month(day))
        } else {
            self.windows.iter().any(|w| w.contains(day))
        }
    }

    /// Reserved days within `window`, lazily and in order.
    pub fn dates_in<'a>(&'a self, window: &DateRange) -> impl Iterator<Item = NaiveDate> + Clone + 'a {
        window
            .intersect(&self.active)
            .into_iter()
            .flat_map(|range| range.days())
            .filter(move |day| self.applies_on(*day))
    }
}

/// Materialises the occurrence of `rule` on `day` in the facility zone.
pub fn materialize(
    block: &BlockDefinition,
    rule: &FrequencyRule,
    day: NaiveDate,
    zone: Tz,
) -> BlockOccurrence {
    let window = TimeInterval::new(
        local_instant(day, rule.start_time, zone),
        local_instant(day, rule.end_time, zone),
    );
    BlockOccurrence {
        block_id: block.block_id.clone(),
        date: day,
        room: block.room.clone(),
        unit: block.unit.clone(),
        facility_id: block.facility_id.clone(),
        physicians: block.physicians.clone(),
        window,
        duration_minutes: window.minutes(),
    }
}

/// Expands one rule of `block` over a reporting window.
///
/// The sequence is lazy and finite. It holds no state beyond its borrowed
/// inputs, so calling `expand` again (or cloning the iterator) replays it.
pub fn expand<'a>(
    block: &'a BlockDefinition,
    rule: &'a FrequencyRule,
    window: &DateRange,
    zone: Tz,
) -> impl Iterator<Item = BlockOccurrence> + Clone + 'a {
    rule.dates_in(window)
        .map(move |day| materialize(block, rule, day, zone))
}

/// Every occurrence of every rule of `block`, unless the block is inactive.
pub fn expand_block<'a>(
    block: &'a BlockDefinition,
    window: &'a DateRange,
    zone: Tz,
) -> impl Iterator<Item = BlockOccurrence> + 'a {
    let rules: &'a [FrequencyRule] = if block.inactive { &[] } else { &block.rules };
    rules.iter().flat_map(move |rule| expand(block, rule, window, zone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn central() -> Tz {
        chrono_tz::America::Chicago
    }

    fn utc(dt: DateTime<FixedOffset>) -> String {
        dt.with_timezone(&chrono::Utc).to_rfc3339()
    }

    fn rule(dow: u32, weeks: &[u32], start: NaiveTime, end: NaiveTime) -> FrequencyRule {
        FrequencyRule {
            dow,
            weeks_of_month: weeks.iter().copied().collect::<BTreeSet<_>>(),
            active: DateRange::new(day(2025, 1, 1), day(2025, 12, 31)).unwrap(),
            start_time: start,
            end_time: end,
            windows: Vec::new(),
        }
    }

    fn block(rules: Vec<FrequencyRule>) -> BlockDefinition {
        BlockDefinition {
            block_id: "blk-1".into(),
            block_type: "Surgeon".into(),
            physicians: vec!["1234567890".into()],
            room: "OR-04".into(),
            unit: "MAIN-OR".into(),
            facility_id: Some("H1".into()),
            inactive: false,
            rules,
        }
    }

    #[test]
    fn week_one_contains_the_first() {
        // April 2025 starts on a Tuesday.
        assert_eq!(week_of_month(day(2025, 4, 1)), 1);
        assert_eq!(week_of_month(day(2025, 4, 6)), 1);
        assert_eq!(week_of_month(day(2025, 4, 7)), 2);
        assert_eq!(week_of_month(day(2025, 4, 16)), 3);
        assert_eq!(week_of_month(day(2025, 4, 30)), 5);
    }

    #[test]
    fn week_of_month_is_monotonic_and_resets() {
        let mut previous = 0;
        for d in DateRange::new(day(2025, 3, 1), day(2025, 6, 30)).unwrap().days() {
            let wom = week_of_month(d);
            if d.day() == 1 {
                assert_eq!(wom, 1);
            } else {
                assert!(wom >= previous);
            }
            previous = wom;
        }
    }

    #[test]
    fn bucket_key_uses_monday_based_weekday() {
        assert_eq!(bucket_key(day(2025, 4, 2)), "2-1");
        assert_eq!(bucket_key(day(2025, 4, 16)), "2-3");
    }

    #[test]
    fn wednesday_weeks_one_and_three_of_april() {
        let blk = block(vec![rule(2, &[1, 3], time(7, 0), time(15, 0))]);
        let april = DateRange::new(day(2025, 4, 1), day(2025, 4, 30)).unwrap();
        let occurrences: Vec<_> = expand(&blk, &blk.rules[0], &april, central()).collect();

        let dates: Vec<_> = occurrences.iter().map(|o| o.date).collect();
        assert_eq!(dates, vec![day(2025, 4, 2), day(2025, 4, 16)]);
        assert!(occurrences.iter().all(|o| o.duration_minutes == 480));
        assert_eq!(occurrences[0].start().to_rfc3339(), "2025-04-02T07:00:00-05:00");
    }

    #[test]
    fn expansion_is_restartable() {
        let blk = block(vec![rule(0, &[1, 2, 3, 4, 5], time(7, 0), time(12, 0))]);
        let april = DateRange::new(day(2025, 4, 1), day(2025, 4, 30)).unwrap();
        let first: Vec<_> = expand(&blk, &blk.rules[0], &april, central()).collect();
        let second: Vec<_> = expand(&blk, &blk.rules[0], &april, central()).collect();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[test]
    fn active_range_bounds_expansion() {
        let mut r = rule(2, &[1, 2, 3, 4, 5], time(7, 0), time(15, 0));
        r.active = DateRange::new(day(2025, 4, 10), day(2025, 4, 20)).unwrap();
        let april = DateRange::new(day(2025, 4, 1), day(2025, 4, 30)).unwrap();
        let dates: Vec<_> = r.dates_in(&april).collect();
        assert_eq!(dates, vec![day(2025, 4, 16)]);

        let may = DateRange::new(day(2025, 5, 1), day(2025, 5, 31)).unwrap();
        assert_eq!(r.dates_in(&may).count(), 0);
    }

    #[test]
    fn explicit_windows_override_weeks_of_month() {
        let mut r = rule(2, &[1], time(7, 0), time(15, 0));
        r.windows = vec![DateRange::new(day(2025, 4, 14), day(2025, 4, 27)).unwrap()];
        let april = DateRange::new(day(2025, 4, 1), day(2025, 4, 30)).unwrap();
        let dates: Vec<_> = r.dates_in(&april).collect();
        assert_eq!(dates, vec![day(2025, 4, 16), day(2025, 4, 23)]);
    }

    #[test]
    fn inverted_window_yields_zero_capacity() {
        let blk = block(vec![rule(2, &[1], time(15, 0), time(7, 0))]);
        let april = DateRange::new(day(2025, 4, 1), day(2025, 4, 30)).unwrap();
        let occ: Vec<_> = expand(&blk, &blk.rules[0], &april, central()).collect();
        assert_eq!(occ.len(), 1);
        assert_eq!(occ[0].duration_minutes, 0);
    }

    #[test]
    fn inactive_block_expands_to_nothing() {
        let mut blk = block(vec![rule(2, &[1, 3], time(7, 0), time(15, 0))]);
        let april = DateRange::new(day(2025, 4, 1), day(2025, 4, 30)).unwrap();
        assert_eq!(expand_block(&blk, &april, central()).count(), 2);
        blk.inactive = true;
        assert_eq!(expand_block(&blk, &april, central()).count(), 0);
    }

    #[test]
    fn winter_windows_use_standard_time() {
        let blk = block(vec![rule(2, &[2], time(7, 0), time(15, 0))]);
        let occ = materialize(&blk, &blk.rules[0], day(2025, 1, 8), central());
        assert_eq!(utc(occ.start()), "2025-01-08T13:00:00+00:00");
        assert_eq!(occ.start().to_rfc3339(), "2025-01-08T07:00:00-06:00");
        assert_eq!(occ.duration_minutes, 480);
    }

    #[test]
    fn summer_windows_use_daylight_time() {
        let blk = block(vec![rule(2, &[2], time(7, 0), time(15, 0))]);
        let occ = materialize(&blk, &blk.rules[0], day(2025, 7, 9), central());
        assert_eq!(utc(occ.start()), "2025-07-09T12:00:00+00:00");
        assert_eq!(occ.start().to_rfc3339(), "2025-07-09T07:00:00-05:00");
    }

    #[test]
    fn window_spanning_spring_forward_loses_an_hour() {
        // 2025-03-09: clocks jump from 02:00 CST to 03:00 CDT.
        let blk = block(vec![rule(6, &[2], time(1, 0), time(5, 0))]);
        let occ = materialize(&blk, &blk.rules[0], day(2025, 3, 9), central());
        assert_eq!(occ.duration_minutes, 180);
    }

    #[test]
    fn skipped_and_repeated_wall_times_resolve() {
        let skipped = local_instant(day(2025, 3, 9), time(2, 30), central());
        assert_eq!(skipped.to_rfc3339(), "2025-03-09T03:30:00-05:00");

        // 2025-11-02: 01:30 happens twice; the earlier (CDT) instant wins.
        let repeated = local_instant(day(2025, 11, 2), time(1, 30), central());
        assert_eq!(utc(repeated), "2025-11-02T06:30:00+00:00");
    }
}
