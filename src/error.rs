// src/error.rs

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

// ───────────────────────────────────────
// Fatal errors (abort the whole batch)
// ───────────────────────────────────────

/// Failure of an external collaborator (the record store).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The only errors an analytics batch raises. Data-quality problems are
/// reported as [`Diagnostic`]s instead.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

// ───────────────────────────────────────
// Skip diagnostics (never abort the batch)
// ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticKind {
    /// Missing or unparseable timestamp, identifier or recurrence field.
    MalformedRecord,
    /// A block or bucket with no capacity; ratios were reported as zero.
    ZeroCapacity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub subject: String,
    pub detail: String,
}

/// Collector for skip diagnostics. Every entry is also logged at `warn`.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn malformed(&mut self, subject: impl Into<String>, detail: impl Into<String>) {
        self.push(DiagnosticKind::MalformedRecord, subject.into(), detail.into());
    }

    pub fn zero_capacity(&mut self, subject: impl Into<String>, detail: impl Into<String>) {
        self.push(DiagnosticKind::ZeroCapacity, subject.into(), detail.into());
    }

    fn push(&mut self, kind: DiagnosticKind, subject: String, detail: String) {
        warn!(?kind, %subject, %detail, "skipping record");
        self.0.push(Diagnostic { kind, subject, detail });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.0.iter().filter(|d| d.kind == kind).count()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.0
    }
}
