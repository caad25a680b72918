// tests/pipeline_test.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use block_analytics::models::{BlockDefinition, CaseRecord, DateRange, FacilityDay, FrequencyRule, Procedure};
use block_analytics::store::memory::MemoryStore;
use block_analytics::{logging, AnalyticsError, BlockAnalytics, DiagnosticKind};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn time(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<FixedOffset> {
    FixedOffset::west_opt(5 * 3600)
        .unwrap()
        .with_ymd_and_hms(y, mo, d, h, mi, 0)
        .unwrap()
}

fn april() -> DateRange {
    DateRange::new(day(2025, 4, 1), day(2025, 4, 30)).unwrap()
}

fn rule(weeks: &[u32], start: NaiveTime, end: NaiveTime) -> FrequencyRule {
    FrequencyRule {
        dow: 2,
        weeks_of_month: weeks.iter().copied().collect::<BTreeSet<_>>(),
        active: DateRange::new(day(2025, 1, 1), day(2025, 12, 31)).unwrap(),
        start_time: start,
        end_time: end,
        windows: Vec::new(),
    }
}

fn block(id: &str, block_type: &str, npi: &str, rules: Vec<FrequencyRule>) -> BlockDefinition {
    BlockDefinition {
        block_id: id.into(),
        block_type: block_type.into(),
        physicians: vec![npi.into()],
        room: "OR-04".into(),
        unit: "MAIN-OR".into(),
        facility_id: Some("H1".into()),
        inactive: false,
        rules,
    }
}

fn case(id: &str, room: &str, start: (u32, u32), end: Option<(u32, u32)>) -> CaseRecord {
    CaseRecord {
        case_id: id.into(),
        facility_id: Some("H1".into()),
        unit: Some("MAIN-OR".into()),
        room: Some(room.into()),
        start: Some(local(2025, 4, 2, start.0, start.1)),
        end: end.map(|(h, m)| local(2025, 4, 2, h, m)),
        scheduled_at: Some(local(2025, 4, 2, 7, 0)),
        created_at: Some(local(2025, 3, 20, 9, 0)),
        recorded_duration: None,
        procedures: vec![Procedure {
            procedure_id: Some("CABG".into()),
            physician_id: Some("111".into()),
            primary: true,
        }],
    }
}

/// Surgeon block B1 on Wednesdays of weeks 1 and 3 (07:00–15:00), a service
/// block B2 in the same room on week 1 only (14:00–16:00), and two cases by
/// the block owner on 2025-04-02, one of them in another room.
fn fixture() -> Arc<MemoryStore> {
    logging::init_test();
    let blocks = vec![
        block("B1", "Surgeon", "111", vec![rule(&[1, 3], time(7, 0), time(15, 0))]),
        block("B2", "Service", "222", vec![rule(&[1], time(14, 0), time(16, 0))]),
    ];
    let cases = vec![
        case("c1", "OR-04", (9, 0), Some((11, 0))),
        case("c2", "OR-07", (10, 30), Some((12, 0))),
    ];
    Arc::new(MemoryStore::new(blocks, cases))
}

fn analytics(store: &Arc<MemoryStore>) -> BlockAnalytics {
    BlockAnalytics::new(store.clone(), store.clone(), store.clone(), FacilityDay::default())
}

#[tokio::test]
async fn block_utilization_end_to_end() {
    let store = fixture();
    let report = analytics(&store).block_utilization(april()).await.unwrap();

    assert_eq!(report.records_written, 2);
    assert!(report.diagnostics.is_empty());

    let mut records = store.utilization().await;
    records.sort_by_key(|r| r.date);
    assert_eq!(records.len(), 2);

    let first = &records[0];
    assert_eq!(first.date, day(2025, 4, 2));
    assert_eq!(first.block_minutes, 480);
    assert_eq!(first.used_in_room_minutes, 120);
    assert_eq!(first.used_anywhere_minutes, 180);
    assert_eq!(first.in_room_utilization, 0.25);
    assert_eq!(first.anywhere_utilization, 0.375);
    assert_eq!(first.block_start_time, "07:00");
    assert_eq!(first.block_end_time, "15:00");
    assert_eq!((first.dow, first.week_of_month), (2, 1));

    let second = &records[1];
    assert_eq!(second.date, day(2025, 4, 16));
    assert_eq!(second.used_anywhere_minutes, 0);
    assert_eq!(second.anywhere_utilization, 0.0);
}

#[tokio::test]
async fn rerunning_a_batch_is_idempotent() {
    let store = fixture();
    let svc = analytics(&store);

    let first = svc.block_utilization(april()).await.unwrap();
    let snapshot = store.utilization().await;
    let second = svc.block_utilization(april()).await.unwrap();

    assert_eq!(first.records_written, second.records_written);
    assert_eq!(store.utilization().await, snapshot);

    svc.room_profiles(april()).await.unwrap();
    let profiles = store.room_profiles().await;
    svc.room_profiles(april()).await.unwrap();
    assert_eq!(store.room_profiles().await, profiles);
}

#[tokio::test]
async fn surgeon_days_fold_block_records() {
    let store = fixture();
    let report = analytics(&store).surgeon_day_utilization(april()).await.unwrap();
    assert_eq!(report.records_written, 2);

    let days = store.surgeon_days().await;
    let wed = days.iter().find(|d| d.date == day(2025, 4, 2)).unwrap();
    assert_eq!(wed.surgeon_id, "111");
    assert_eq!(wed.blocks, 1);
    assert_eq!(wed.used_in_room_minutes, 120);
    assert_eq!(wed.in_room_utilization, 0.25);
}

#[tokio::test]
async fn room_days_use_the_facility_day() {
    let store = fixture();
    let report = analytics(&store).room_day_utilization(april()).await.unwrap();
    assert_eq!(report.records_written, 2);

    let rows = store.room_days().await;
    let or4 = rows.iter().find(|r| r.room == "OR-04").unwrap();
    assert_eq!(or4.utilization_minutes, 120);
    assert_eq!(or4.available_minutes, 510);
    assert_eq!(or4.utilization_rate, 0.235);
    let or7 = rows.iter().find(|r| r.room == "OR-07").unwrap();
    assert_eq!(or7.utilization_minutes, 90);
    assert_eq!(or7.utilization_rate, 0.176);
}

#[tokio::test]
async fn profiles_are_written_per_room_and_surgeon() {
    let store = fixture();
    let svc = analytics(&store);

    assert_eq!(svc.room_profiles(april()).await.unwrap().records_written, 2);
    assert_eq!(svc.surgeon_profiles(april()).await.unwrap().records_written, 1);

    let surgeon = store.surgeon_profiles().await.remove(0);
    assert_eq!(surgeon.profile_month.to_string(), "2025-04");
    assert_eq!(surgeon.primary_procedure_count, 2);
    let lead = &surgeon.lead_time_by_procedure["CABG"];
    assert_eq!(lead.samples, 2);
    assert_eq!(lead.mean_days, Some(12.0));
    assert_eq!(surgeon.procedure_frequency["CABG"].relative, 1.0);

    let rooms = store.room_profiles().await;
    let or4 = rooms.iter().find(|p| p.room == "OR-04").unwrap();
    let bucket = &or4.usage_by_day_and_week["2-1"];
    assert_eq!(bucket.case_count, 1);
    assert_eq!(bucket.mean_minutes, None);
    assert_eq!(bucket.surgeon_frequency["111"].relative, 1.0);
}

#[tokio::test]
async fn malformed_cases_are_reported_not_fatal() {
    let store = Arc::new(MemoryStore::new(
        vec![block("B1", "Surgeon", "111", vec![rule(&[1], time(7, 0), time(15, 0))])],
        vec![case("c1", "OR-04", (9, 0), Some((11, 0))), case("c3", "OR-04", (12, 0), None)],
    ));
    let report = analytics(&store).block_utilization(april()).await.unwrap();

    assert_eq!(report.records_written, 1);
    assert_eq!(report.diagnostics.len(), 1);
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::MalformedRecord);
    assert_eq!(store.utilization().await[0].used_in_room_minutes, 120);
}

#[tokio::test]
async fn zero_length_blocks_are_flagged() {
    let store = Arc::new(MemoryStore::new(
        vec![block("B9", "Surgeon", "111", vec![rule(&[1], time(15, 0), time(15, 0))])],
        vec![case("c1", "OR-04", (9, 0), Some((11, 0)))],
    ));
    let report = analytics(&store).block_utilization(april()).await.unwrap();

    assert_eq!(report.records_written, 1);
    assert_eq!(report.diagnostics[0].kind, DiagnosticKind::ZeroCapacity);
    let record = &store.utilization().await[0];
    assert_eq!(record.in_room_utilization, 0.0);
    assert_eq!(record.anywhere_utilization, 0.0);
}

#[tokio::test]
async fn unavailable_store_fails_the_batch() {
    let store = fixture();
    store.set_offline(true);
    let err = analytics(&store).block_utilization(april()).await.unwrap_err();
    assert!(matches!(err, AnalyticsError::Store(_)));
}

#[test]
fn inverted_window_is_an_invalid_parameter() {
    let err = DateRange::parse("2025-04-30", "2025-04-01").unwrap_err();
    assert!(matches!(err, AnalyticsError::InvalidParameter(_)));
    assert!(DateRange::parse("April", "2025-04-30").is_err());
}

#[tokio::test]
async fn inactive_blocks_are_not_expanded() {
    let store = fixture();
    let svc = analytics(&store);

    assert!(svc.set_block_inactive("B1", true).await.unwrap());
    assert!(!svc.set_block_inactive("missing", true).await.unwrap());
    assert!(store.block("B1").await.unwrap().inactive);

    let report = svc.block_utilization(april()).await.unwrap();
    assert_eq!(report.records_written, 0);
    assert!(report.diagnostics.is_empty());
}

#[tokio::test]
async fn block_day_lists_and_flags_overlap() {
    let store = fixture();
    let svc = analytics(&store);

    let wed = svc.block_day(day(2025, 4, 2), "MAIN-OR", "OR-04").await.unwrap();
    assert_eq!(wed.blocks.len(), 2);
    assert_eq!(wed.blocks[0].block_id, "B1");
    assert!(wed.has_multiple_blocks);
    assert!(wed.has_block_overlap);

    let third = svc.block_day(day(2025, 4, 16), "MAIN-OR", "OR-04").await.unwrap();
    assert_eq!(third.blocks.len(), 1);
    assert!(!third.has_block_overlap);

    let err = svc.block_day(day(2025, 4, 2), "", "OR-04").await.unwrap_err();
    assert!(matches!(err, AnalyticsError::InvalidParameter(_)));
}

#[tokio::test]
async fn batch_report_serializes_in_camel_case() {
    let store = fixture();
    let report = analytics(&store).room_day_utilization(april()).await.unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["recordsWritten"], 2);
    assert!(json["diagnostics"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn single_room_profile_refresh() {
    let store = fixture();
    let svc = analytics(&store);

    let report = svc.room_profile(april(), "MAIN-OR", "OR-04").await.unwrap();
    assert_eq!(report.records_written, 1);
    assert!(report.diagnostics.is_empty());

    let rooms = store.room_profiles().await;
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].room, "OR-04");
    assert_eq!(rooms[0].usage_by_day_and_week["2-1"].case_count, 1);

    let err = svc.room_profile(april(), "MAIN-OR", "").await.unwrap_err();
    assert!(matches!(err, AnalyticsError::InvalidParameter(_)));
}

#[tokio::test]
async fn single_surgeon_profile_refresh() {
    let mut other = case("c9", "OR-04", (13, 0), Some((14, 0)));
    other.created_at = None;
    other.procedures[0].physician_id = Some("222".into());
    let store = Arc::new(MemoryStore::new(
        Vec::new(),
        vec![case("c1", "OR-04", (9, 0), Some((11, 0))), case("c2", "OR-07", (10, 30), Some((12, 0))), other],
    ));
    let svc = analytics(&store);

    let report = svc.surgeon_profile(april(), "111").await.unwrap();
    assert_eq!(report.records_written, 1);
    assert!(report.diagnostics.is_empty());

    let profile = store.surgeon_profiles().await.remove(0);
    assert_eq!(profile.surgeon_id, "111");
    assert_eq!(profile.primary_procedure_count, 2);

    assert!(svc.surgeon_profile(april(), "").await.is_err());
}

#[tokio::test]
async fn winter_blocks_follow_central_standard_time() {
    let cst = FixedOffset::west_opt(6 * 3600).unwrap();
    let mut late = case("c1", "OR-04", (9, 0), None);
    late.start = Some(cst.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap());
    late.end = Some(cst.with_ymd_and_hms(2025, 1, 1, 15, 30, 0).unwrap());
    late.scheduled_at = late.start;
    let store = Arc::new(MemoryStore::new(
        vec![block("B1", "Surgeon", "111", vec![rule(&[1], time(7, 0), time(15, 0))])],
        vec![late],
    ));
    let january = DateRange::new(day(2025, 1, 1), day(2025, 1, 31)).unwrap();
    analytics(&store).block_utilization(january).await.unwrap();

    let record = &store.utilization().await[0];
    assert_eq!(record.date, day(2025, 1, 1));
    assert_eq!(record.block_minutes, 480);
    assert_eq!(record.used_in_room_minutes, 60);
    assert_eq!(record.block_start_time, "07:00");
}
