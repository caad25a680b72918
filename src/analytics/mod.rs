// src/analytics/mod.rs

pub mod calendar;
pub mod interval;
pub mod matcher;
pub mod pipeline;
pub mod profiles;
pub mod recurrence;
pub mod stats;
pub mod utilization;

pub use pipeline::BlockAnalytics;
