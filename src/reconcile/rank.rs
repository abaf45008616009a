//! Filtering and ranking of integrated records.
//!
//! The default ranking is a composite sort: country ascending, then
//! mappable modules descending, then semester-1 spots descending, then CGPA
//! floor ascending; remaining ties break on the university name so the
//! order is deterministic. Rank is positional (1-based) after the sort and
//! never carried over from a previous run.
//!
//! The weighted-score variant is a separate, optional presentation path for
//! exploratory ranking; it must not leak into the default ordering rules.

use super::IntegratedUniversityRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Drop records below `min_mappable`, sort the rest by the composite key,
/// and assign 1-based ranks.
pub fn filter_and_rank(
    records: Vec<IntegratedUniversityRecord>,
    min_mappable: usize,
) -> Vec<IntegratedUniversityRecord> {
    let mut kept: Vec<_> = records
        .into_iter()
        .filter(|r| r.mappable_count >= min_mappable)
        .collect();

    kept.sort_by(compare_records);

    for (i, record) in kept.iter_mut().enumerate() {
        record.rank = Some(i as u32 + 1);
    }
    kept
}

fn compare_records(a: &IntegratedUniversityRecord, b: &IntegratedUniversityRecord) -> Ordering {
    a.country
        .cmp(&b.country)
        .then_with(|| b.mappable_count.cmp(&a.mappable_count))
        .then_with(|| b.sem1_spots.cmp(&a.sem1_spots))
        .then_with(|| a.min_cgpa.total_cmp(&b.min_cgpa))
        .then_with(|| a.name.cmp(&b.name))
}

/// Top N records overall, ignoring country grouping.
pub fn top_n(
    records: Vec<IntegratedUniversityRecord>,
    n: usize,
) -> Vec<IntegratedUniversityRecord> {
    let mut sorted = records;
    sorted.sort_by(|a, b| {
        b.mappable_count
            .cmp(&a.mappable_count)
            .then_with(|| b.sem1_spots.cmp(&a.sem1_spots))
            .then_with(|| a.min_cgpa.total_cmp(&b.min_cgpa))
            .then_with(|| a.name.cmp(&b.name))
    });
    sorted.truncate(n);
    sorted
}

/// Component breakdown of the exploratory weighted score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightedScore {
    pub mappable_score: f64,
    pub spots_score: f64,
    pub cgpa_score: f64,
    pub total: f64,
}

/// Weighted composite scores (40/30/30), normalized against the observed
/// maxima of the given result set. An absent CGPA floor (0.0) scores the
/// full CGPA component since it constrains nothing.
pub fn weighted_scores(
    records: &[IntegratedUniversityRecord],
) -> BTreeMap<String, WeightedScore> {
    const CGPA_SCALE: f64 = 5.0;

    let max_mappable = records.iter().map(|r| r.mappable_count).max().unwrap_or(0);
    let max_spots = records.iter().map(|r| r.sem1_spots).max().unwrap_or(0);

    records
        .iter()
        .map(|r| {
            let mappable_score = if max_mappable > 0 {
                r.mappable_count as f64 / max_mappable as f64 * 40.0
            } else {
                0.0
            };
            let spots_score = if max_spots > 0 {
                f64::from(r.sem1_spots) / f64::from(max_spots) * 30.0
            } else {
                0.0
            };
            let cgpa_score = if r.min_cgpa > 0.0 {
                (CGPA_SCALE - r.min_cgpa) / CGPA_SCALE * 30.0
            } else {
                30.0
            };
            (
                r.id.clone(),
                WeightedScore {
                    mappable_score,
                    spots_score,
                    cgpa_score,
                    total: mappable_score + spots_score + cgpa_score,
                },
            )
        })
        .collect()
}

/// Country-level aggregates over a result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CountrySummary {
    pub count: usize,
    pub total_spots: u32,
    pub avg_mappable: f64,
    pub avg_cgpa: f64,
    /// Lowest positive CGPA floor seen, 0.0 when none.
    pub min_cgpa: f64,
    pub max_cgpa: f64,
    pub universities: Vec<String>,
}

/// Summarize records per country. University lists come back sorted.
pub fn summarize_by_country(
    records: &[IntegratedUniversityRecord],
) -> BTreeMap<String, CountrySummary> {
    let mut summary: BTreeMap<String, CountrySummary> = BTreeMap::new();

    for record in records {
        let entry = summary.entry(record.country.clone()).or_default();
        entry.count += 1;
        entry.total_spots += record.sem1_spots;
        entry.universities.push(record.name.clone());
        entry.avg_mappable += record.mappable_count as f64;

        if record.min_cgpa > 0.0 {
            entry.avg_cgpa += record.min_cgpa;
            entry.max_cgpa = entry.max_cgpa.max(record.min_cgpa);
            entry.min_cgpa = if entry.min_cgpa == 0.0 {
                record.min_cgpa
            } else {
                entry.min_cgpa.min(record.min_cgpa)
            };
        }
    }

    for (country, entry) in summary.iter_mut() {
        let positive_cgpas = records
            .iter()
            .filter(|r| &r.country == country && r.min_cgpa > 0.0)
            .count();
        entry.avg_mappable /= entry.count as f64;
        if positive_cgpas > 0 {
            entry.avg_cgpa /= positive_cgpas as f64;
        }
        entry.universities.sort();
    }

    summary
}
