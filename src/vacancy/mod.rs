//! Vacancy-list extraction — parse the exchange vacancy PDF into typed
//! records and filter them down to the universities a student can apply to.
//!
//! The PDF is one fixed tabular layout; nothing here generalizes to other
//! documents. Extraction is split in two: [`extract::parse_document`] is a
//! pure function over already-extracted text (testable without a PDF
//! fixture), and [`extract_records`] wires it to `pdf-extract` for real
//! files.

pub mod extract;

use crate::config::Config;
use crate::error::ScoutError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One data row of the vacancy PDF, immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VacancyRecord {
    pub continent: String,
    pub country: String,
    pub university_code: String,
    pub university_sub_code: String,
    pub university_name: String,
    pub status: String,
    /// The "For" column: which colleges may apply ("All" is a wildcard).
    pub eligible_colleges: String,
    pub full_year_spots: u32,
    pub sem1_spots: u32,
    pub sem2_spots: u32,
    pub min_cgpa: f64,
    pub remarks: String,
}

impl VacancyRecord {
    /// Identity key: `code` or `code_subcode` when a sub-code exists.
    pub fn identity_key(&self) -> String {
        if self.university_sub_code.is_empty() {
            self.university_code.clone()
        } else {
            format!("{}_{}", self.university_code, self.university_sub_code)
        }
    }
}

/// A university surviving the filter step, ready for grouping and
/// reconciliation. Starts as a 1:1 projection of a [`VacancyRecord`];
/// [`crate::normalize::group_variations`] later folds campus variations into
/// one profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversityProfile {
    pub name: String,
    pub country: String,
    pub university_code: String,
    pub university_sub_code: String,
    pub sem1_spots: u32,
    pub min_cgpa: f64,
    pub remarks: String,
    /// All codes folded into this profile (one entry before grouping).
    pub all_codes: Vec<String>,
    pub all_sub_codes: Vec<String>,
    /// How many raw rows were merged into this profile.
    pub variation_count: u32,
    /// Identity keys of the merged source rows, for traceability.
    pub merged_keys: Vec<String>,
}

impl From<&VacancyRecord> for UniversityProfile {
    fn from(rec: &VacancyRecord) -> Self {
        Self {
            name: rec.university_name.clone(),
            country: rec.country.clone(),
            university_code: rec.university_code.clone(),
            university_sub_code: rec.university_sub_code.clone(),
            sem1_spots: rec.sem1_spots,
            min_cgpa: rec.min_cgpa,
            remarks: rec.remarks.clone(),
            all_codes: vec![rec.university_code.clone()],
            all_sub_codes: if rec.university_sub_code.is_empty() {
                Vec::new()
            } else {
                vec![rec.university_sub_code.clone()]
            },
            variation_count: 1,
            merged_keys: vec![rec.identity_key()],
        }
    }
}

/// Extract every parseable vacancy row from the PDF at `path`.
///
/// A missing file is a fatal precondition, reported before any parsing.
pub fn extract_records(path: &Path) -> Result<Vec<VacancyRecord>> {
    if !path.exists() {
        return Err(ScoutError::MissingInput(path.to_path_buf()).into());
    }

    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read vacancy PDF: {}", path.display()))?;
    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| anyhow::anyhow!("failed to extract text from {}: {e}", path.display()))?;

    let records = extract::parse_document(&text);
    tracing::info!(
        "extracted {} vacancy rows from {}",
        records.len(),
        path.display()
    );
    Ok(records)
}

/// Filter extracted rows by target countries, college eligibility, and
/// spot availability, keyed by identity key.
///
/// Rows failing a filter are dropped silently; this narrows, it never
/// errors.
pub fn filter_records(
    records: &[VacancyRecord],
    config: &Config,
) -> BTreeMap<String, UniversityProfile> {
    let college = config.student_college.to_lowercase();

    let mut filtered = BTreeMap::new();
    for rec in records {
        if !config
            .target_countries
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&rec.country))
        {
            continue;
        }

        let eligible = rec.eligible_colleges.to_lowercase();
        if !eligible.contains(&college) && !eligible.contains("all") {
            continue;
        }

        if rec.sem1_spots < config.min_sem1_spots {
            continue;
        }

        filtered.insert(rec.identity_key(), UniversityProfile::from(rec));
    }

    tracing::debug!(
        "vacancy filter kept {}/{} rows",
        filtered.len(),
        records.len()
    );
    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(country: &str, code: &str, colleges: &str, sem1: u32) -> VacancyRecord {
        VacancyRecord {
            continent: "Oceania".to_string(),
            country: country.to_string(),
            university_code: code.to_string(),
            university_sub_code: String::new(),
            university_name: format!("{code} University"),
            status: "Active".to_string(),
            eligible_colleges: colleges.to_string(),
            full_year_spots: 1,
            sem1_spots: sem1,
            sem2_spots: 0,
            min_cgpa: 3.5,
            remarks: String::new(),
        }
    }

    fn test_config() -> Config {
        Config {
            target_countries: vec!["Australia".to_string(), "Denmark".to_string()],
            student_college: "CCDS".to_string(),
            min_sem1_spots: 1,
            ..Config::default()
        }
    }

    #[test]
    fn test_identity_key_with_and_without_subcode() {
        let mut rec = record("Australia", "AU-UQ", "All", 2);
        assert_eq!(rec.identity_key(), "AU-UQ");
        rec.university_sub_code = "SL".to_string();
        assert_eq!(rec.identity_key(), "AU-UQ_SL");
    }

    #[test]
    fn test_filter_by_country() {
        let records = vec![
            record("Australia", "AU-UQ", "All", 2),
            record("Germany", "DE-TUM", "All", 2),
        ];
        let filtered = filter_records(&records, &test_config());
        assert!(filtered.contains_key("AU-UQ"));
        assert!(!filtered.contains_key("DE-TUM"));
    }

    #[test]
    fn test_filter_college_wildcard_and_containment() {
        let records = vec![
            record("Australia", "AU-A", "All", 2),
            record("Australia", "AU-B", "CCDS, NBS", 2),
            record("Australia", "AU-C", "NBS only", 2),
        ];
        let filtered = filter_records(&records, &test_config());
        assert!(filtered.contains_key("AU-A"));
        assert!(filtered.contains_key("AU-B"));
        assert!(!filtered.contains_key("AU-C"));
    }

    #[test]
    fn test_filter_by_spots() {
        let records = vec![
            record("Denmark", "DK-DTU", "All", 0),
            record("Denmark", "DK-KU", "All", 3),
        ];
        let filtered = filter_records(&records, &test_config());
        assert!(!filtered.contains_key("DK-DTU"));
        assert_eq!(filtered["DK-KU"].sem1_spots, 3);
    }

    #[test]
    fn test_missing_file_is_fatal_precondition() {
        let err = extract_records(Path::new("/definitely/not/here.pdf")).unwrap_err();
        assert!(err.downcast_ref::<ScoutError>().is_some());
    }
}
