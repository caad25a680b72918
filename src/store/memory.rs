// src/store/memory.rs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::{AnalyticsSink, BlockQuery, BlockSource, CaseQuery, CaseSource, Fetched};
use crate::error::{StoreError, StoreResult};
use crate::models::{
    BlockDefinition, CaseRecord, RoomDayUtilization, RoomProfile, SurgeonDayUtilization, SurgeonProfile,
    UtilizationRecord,
};

type RoomDayKey = (NaiveDate, String, String, String);

/// In-process store for tests and local runs. Writes are keyed exactly like
/// the Postgres tables so re-running a batch replaces rows in place.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<Vec<BlockDefinition>>,
    cases: RwLock<Vec<CaseRecord>>,
    utilization: RwLock<BTreeMap<String, UtilizationRecord>>,
    surgeon_days: RwLock<BTreeMap<(String, NaiveDate), SurgeonDayUtilization>>,
    room_days: RwLock<BTreeMap<RoomDayKey, RoomDayUtilization>>,
    room_profiles: RwLock<BTreeMap<(String, String), RoomProfile>>,
    surgeon_profiles: RwLock<BTreeMap<(String, String), SurgeonProfile>>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new(blocks: Vec<BlockDefinition>, cases: Vec<CaseRecord>) -> Self {
        Self {
            blocks: RwLock::new(blocks),
            cases: RwLock::new(cases),
            ..Self::default()
        }
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }

    pub async fn utilization(&self) -> Vec<UtilizationRecord> {
        self.utilization.read().await.values().cloned().collect()
    }

    pub async fn surgeon_days(&self) -> Vec<SurgeonDayUtilization> {
        self.surgeon_days.read().await.values().cloned().collect()
    }

    pub async fn room_days(&self) -> Vec<RoomDayUtilization> {
        self.room_days.read().await.values().cloned().collect()
    }

    pub async fn room_profiles(&self) -> Vec<RoomProfile> {
        self.room_profiles.read().await.values().cloned().collect()
    }

    pub async fn surgeon_profiles(&self) -> Vec<SurgeonProfile> {
        self.surgeon_profiles.read().await.values().cloned().collect()
    }

    pub async fn block(&self, block_id: &str) -> Option<BlockDefinition> {
        self.blocks.read().await.iter().find(|b| b.block_id == block_id).cloned()
    }
}

fn case_matches(case: &CaseRecord, query: &CaseQuery) -> bool {
    let Some(date) = case.local_date().or_else(|| case.scheduled_at.map(|s| s.date_naive())) else {
        return false;
    };
    if !query.range.contains(date) {
        return false;
    }
    if query.unit.is_some() && case.unit != query.unit {
        return false;
    }
    if query.room.is_some() && case.room != query.room {
        return false;
    }
    case.primary_procedures().any(|p| {
        query
            .physician_id
            .as_deref()
            .map_or(true, |npi| p.physician_id.as_deref() == Some(npi))
    })
}

#[async_trait]
impl BlockSource for MemoryStore {
    async fn blocks(&self, query: &BlockQuery) -> StoreResult<Fetched<BlockDefinition>> {
        self.check()?;
        let blocks = self.blocks.read().await;
        let selected = blocks
            .iter()
            .filter(|b| match query {
                BlockQuery::Surgeon => b.block_type == "Surgeon",
                BlockQuery::Room { unit, room } => &b.unit == unit && &b.room == room,
            })
            .cloned()
            .collect();
        Ok(Fetched::clean(selected))
    }

    async fn set_block_inactive(&self, block_id: &str, inactive: bool) -> StoreResult<bool> {
        self.check()?;
        let mut blocks = self.blocks.write().await;
        match blocks.iter_mut().find(|b| b.block_id == block_id) {
            Some(block) => {
                block.inactive = inactive;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl CaseSource for MemoryStore {
    async fn cases(&self, query: &CaseQuery) -> StoreResult<Fetched<CaseRecord>> {
        self.check()?;
        let cases = self.cases.read().await;
        let selected = cases.iter().filter(|c| case_matches(c, query)).cloned().collect();
        Ok(Fetched::clean(selected))
    }
}

#[async_trait]
impl AnalyticsSink for MemoryStore {
    async fn upsert_utilization(&self, records: &[UtilizationRecord]) -> StoreResult<usize> {
        self.check()?;
        let mut table = self.utilization.write().await;
        for r in records {
            table.insert(r.natural_key(), r.clone());
        }
        Ok(records.len())
    }

    async fn upsert_surgeon_days(&self, records: &[SurgeonDayUtilization]) -> StoreResult<usize> {
        self.check()?;
        let mut table = self.surgeon_days.write().await;
        for r in records {
            table.insert((r.surgeon_id.clone(), r.date), r.clone());
        }
        Ok(records.len())
    }

    async fn upsert_room_days(&self, records: &[RoomDayUtilization]) -> StoreResult<usize> {
        self.check()?;
        let mut table = self.room_days.write().await;
        for r in records {
            let key = (
                r.date,
                r.facility_id.clone().unwrap_or_default(),
                r.unit.clone().unwrap_or_default(),
                r.room.clone(),
            );
            table.insert(key, r.clone());
        }
        Ok(records.len())
    }

    async fn upsert_room_profiles(&self, profiles: &[RoomProfile]) -> StoreResult<usize> {
        self.check()?;
        let mut table = self.room_profiles.write().await;
        for p in profiles {
            table.insert((p.room.clone(), p.profile_month.to_string()), p.clone());
        }
        Ok(profiles.len())
    }

    async fn upsert_surgeon_profiles(&self, profiles: &[SurgeonProfile]) -> StoreResult<usize> {
        self.check()?;
        let mut table = self.surgeon_profiles.write().await;
        for p in profiles {
            table.insert((p.surgeon_id.clone(), p.profile_month.to_string()), p.clone());
        }
        Ok(profiles.len())
    }
}
