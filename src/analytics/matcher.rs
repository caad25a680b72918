// src/analytics/matcher.rs

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::analytics::interval::TimeInterval;
use crate::error::Diagnostics;
use crate::models::{BlockOccurrence, CaseRecord};

/// A matched primary procedure, reduced to its parent case's room and times.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedProcedure {
    pub case_id: String,
    pub room: Option<String>,
    pub interval: TimeInterval,
}

/// Index of primary procedures by local case date and performing physician.
///
/// Matching is exact on both keys. Cases without start/end and primary
/// procedures without a physician are dropped with a diagnostic.
#[derive(Debug, Default)]
pub struct CaseMatcher {
    index: HashMap<(NaiveDate, String), Vec<MatchedProcedure>>,
}

impl CaseMatcher {
    pub fn new(cases: &[CaseRecord], diagnostics: &mut Diagnostics) -> Self {
        let mut index: HashMap<(NaiveDate, String), Vec<MatchedProcedure>> = HashMap::new();

        for case in cases {
            let (Some(interval), Some(date)) = (case.interval(), case.local_date()) else {
                if case.primary_procedures().next().is_some() {
                    diagnostics.malformed(
                        format!("case {}", case.case_id),
                        "missing start or end time",
                    );
                }
                continue;
            };

            for (i, proc) in case.procedures.iter().enumerate() {
                if !proc.primary {
                    continue;
                }
                let Some(npi) = proc.physician_id.as_deref().filter(|s| !s.is_empty()) else {
                    diagnostics.malformed(
                        format!("case {} procedure #{i}", case.case_id),
                        "primary procedure has no performing physician",
                    );
                    continue;
                };
                index.entry((date, npi.to_string())).or_default().push(MatchedProcedure {
                    case_id: case.case_id.clone(),
                    room: case.room.clone(),
                    interval,
                });
            }
        }

        Self { index }
    }

    /// Primary procedures performed by `physician_id` on `date`, optionally
    /// restricted to cases in `room`.
    pub fn matching<'a>(
        &'a self,
        date: NaiveDate,
        room: Option<&'a str>,
        physician_id: &str,
    ) -> impl Iterator<Item = &'a MatchedProcedure> + 'a {
        self.index
            .get(&(date, physician_id.to_string()))
            .into_iter()
            .flatten()
            .filter(move |m| room.map_or(true, |r| m.room.as_deref() == Some(r)))
    }

    /// Everything any owner of `occurrence` performed on its date, in any room.
    pub fn for_occurrence(&self, occurrence: &BlockOccurrence) -> Vec<MatchedProcedure> {
        occurrence
            .physicians
            .iter()
            .flat_map(|npi| self.matching(occurrence.date, None, npi))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
