// src/analytics/stats.rs

use std::collections::BTreeMap;

use crate::models::FrequencyEntry;

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `used / capacity` rounded to 3 places; zero when there is no capacity.
pub fn ratio(used: i64, capacity: i64) -> f64 {
    if capacity <= 0 {
        return 0.0;
    }
    round_to(used as f64 / capacity as f64, 3)
}

/// Mean and sample standard deviation, only reported with two or more
/// samples. Both are rounded to 2 places.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spread {
    pub samples: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
}

impl Spread {
    pub fn of(values: &[f64]) -> Self {
        let samples = values.len();
        if samples < 2 {
            return Spread { samples, mean: None, std: None };
        }
        let n = samples as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
        Spread {
            samples,
            mean: Some(round_to(mean, 2)),
            std: Some(round_to(variance.sqrt(), 2)),
        }
    }

    pub fn of_ints(values: &[i64]) -> Self {
        let as_f64: Vec<f64> = values.iter().map(|v| *v as f64).collect();
        Self::of(&as_f64)
    }
}

/// Occurrence counts keyed by identifier.
#[derive(Debug, Clone, Default)]
pub struct FrequencyTable {
    counts: BTreeMap<String, usize>,
}

impl FrequencyTable {
    pub fn add(&mut self, key: &str) {
        *self.counts.entry(key.to_string()).or_insert(0) += 1;
    }

    /// `{count, relative = count / total}`; relative is zero when `total` is.
    pub fn relative_to(&self, total: usize) -> BTreeMap<String, FrequencyEntry> {
        self.counts
            .iter()
            .map(|(key, &count)| {
                let relative = if total == 0 { 0.0 } else { round_to(count as f64 / total as f64, 3) };
                (key.clone(), FrequencyEntry { count, relative })
            })
            .collect()
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}
