// src/lib.rs

pub mod analytics;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod store;

pub use analytics::BlockAnalytics;
pub use error::{AnalyticsError, Diagnostic, DiagnosticKind, Diagnostics, StoreError};
