// src/store/mod.rs

use async_trait::async_trait;

use crate::error::{Diagnostics, StoreResult};
use crate::models::{
    BlockDefinition, CaseRecord, DateRange, RoomDayUtilization, RoomProfile, SurgeonDayUtilization,
    SurgeonProfile, UtilizationRecord,
};

pub mod memory;
pub mod postgres;

/// Records read from the store plus whatever failed boundary validation.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub records: Vec<T>,
    pub diagnostics: Diagnostics,
}

impl<T> Fetched<T> {
    pub fn clean(records: Vec<T>) -> Self {
        Self { records, diagnostics: Diagnostics::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockQuery {
    /// Every block of type "Surgeon".
    Surgeon,
    Room { unit: String, room: String },
}

/// Cases whose local start date falls in `range`. Only cases carrying at
/// least one primary procedure (by `physician_id`, when given) qualify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseQuery {
    pub range: DateRange,
    pub unit: Option<String>,
    pub room: Option<String>,
    pub physician_id: Option<String>,
}

impl CaseQuery {
    pub fn between(range: DateRange) -> Self {
        Self { range, unit: None, room: None, physician_id: None }
    }

    pub fn in_room(mut self, unit: impl Into<String>, room: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self.room = Some(room.into());
        self
    }

    pub fn by_physician(mut self, physician_id: impl Into<String>) -> Self {
        self.physician_id = Some(physician_id.into());
        self
    }
}

#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn blocks(&self, query: &BlockQuery) -> StoreResult<Fetched<BlockDefinition>>;

    /// Returns whether a block with that id existed.
    async fn set_block_inactive(&self, block_id: &str, inactive: bool) -> StoreResult<bool>;
}

#[async_trait]
pub trait CaseSource: Send + Sync {
    async fn cases(&self, query: &CaseQuery) -> StoreResult<Fetched<CaseRecord>>;
}

/// Idempotent writes keyed by natural identity; last write wins.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn upsert_utilization(&self, records: &[UtilizationRecord]) -> StoreResult<usize>;
    async fn upsert_surgeon_days(&self, records: &[SurgeonDayUtilization]) -> StoreResult<usize>;
    async fn upsert_room_days(&self, records: &[RoomDayUtilization]) -> StoreResult<usize>;
    async fn upsert_room_profiles(&self, profiles: &[RoomProfile]) -> StoreResult<usize>;
    async fn upsert_surgeon_profiles(&self, profiles: &[SurgeonProfile]) -> StoreResult<usize>;
}
