//! Record reconciliation — join vacancy profiles with scraped mappings.
//!
//! For each filtered vacancy profile, the mapping group under the same
//! identity key (absent key = empty group) is partitioned into mappable
//! (≥ 1 retained mapping) and unmappable module codes. `mappable_count` and
//! `coverage_score` are derived here on every query and nowhere else; no
//! code path sets them independently.

pub mod rank;

use crate::navigator::ModuleMapping;
use crate::orchestrator::MappingData;
use crate::vacancy::UniversityProfile;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The integrated view of one institution: vacancy data plus mapping
/// coverage, recomputed on every query and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegratedUniversityRecord {
    pub id: String,
    pub name: String,
    pub country: String,
    pub sem1_spots: u32,
    pub min_cgpa: f64,
    pub university_code: String,
    pub university_sub_code: String,
    pub remarks: String,
    /// Modules with at least one retained mapping, with their mappings.
    pub mappable_modules: BTreeMap<String, Vec<ModuleMapping>>,
    pub mappable_count: usize,
    /// Requested modules the portal had no retained mapping for.
    pub unmappable_modules: Vec<String>,
    /// `mappable / requested * 100`, 0.0 when nothing was requested.
    pub coverage_score: f64,
    pub all_codes: Vec<String>,
    pub variation_count: u32,
    /// 1-based position assigned by ranking; `None` until ranked.
    pub rank: Option<u32>,
}

/// Join vacancy profiles with mapping data by identity key.
pub fn combine(
    profiles: &BTreeMap<String, UniversityProfile>,
    mapping_data: &MappingData,
) -> Vec<IntegratedUniversityRecord> {
    static EMPTY: BTreeMap<String, Vec<ModuleMapping>> = BTreeMap::new();

    profiles
        .iter()
        .map(|(id, profile)| {
            let group = mapping_data.get(id).unwrap_or(&EMPTY);

            let mut mappable_modules = BTreeMap::new();
            let mut unmappable_modules = Vec::new();
            for (module, mappings) in group {
                if mappings.is_empty() {
                    unmappable_modules.push(module.clone());
                } else {
                    mappable_modules.insert(module.clone(), mappings.clone());
                }
            }

            let total = group.len();
            let mappable_count = mappable_modules.len();
            let coverage_score = if total > 0 {
                mappable_count as f64 / total as f64 * 100.0
            } else {
                0.0
            };

            IntegratedUniversityRecord {
                id: id.clone(),
                name: profile.name.clone(),
                country: profile.country.clone(),
                sem1_spots: profile.sem1_spots,
                min_cgpa: profile.min_cgpa,
                university_code: profile.university_code.clone(),
                university_sub_code: profile.university_sub_code.clone(),
                remarks: profile.remarks.clone(),
                mappable_modules,
                mappable_count,
                unmappable_modules,
                coverage_score,
                all_codes: profile.all_codes.clone(),
                variation_count: profile.variation_count,
                rank: None,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, country: &str, spots: u32, cgpa: f64) -> UniversityProfile {
        UniversityProfile {
            name: name.to_string(),
            country: country.to_string(),
            university_code: String::new(),
            university_sub_code: String::new(),
            sem1_spots: spots,
            min_cgpa: cgpa,
            remarks: String::new(),
            all_codes: Vec::new(),
            all_sub_codes: Vec::new(),
            variation_count: 1,
            merged_keys: Vec::new(),
        }
    }

    fn mapping(code: &str) -> ModuleMapping {
        ModuleMapping {
            home_module_code: code.to_string(),
            home_module_name: String::new(),
            home_module_type: String::new(),
            partner_module_code: "P100".to_string(),
            partner_module_name: String::new(),
            academic_units: "3".to_string(),
            status: "Approved".to_string(),
            approval_year: "2024".to_string(),
            semester: "1".to_string(),
        }
    }

    #[test]
    fn test_combine_partitions_mappable_and_unmappable() {
        let mut profiles = BTreeMap::new();
        profiles.insert("AU-UQ".to_string(), profile("UQ", "Australia", 3, 3.5));

        let mut mapping_data = MappingData::new();
        let entry = mapping_data.entry("AU-UQ".to_string()).or_default();
        entry.insert("SC4001".to_string(), vec![mapping("SC4001")]);
        entry.insert("SC4002".to_string(), vec![mapping("SC4002"), mapping("SC4002")]);
        entry.insert("SC4003".to_string(), Vec::new());
        entry.insert("SC4021".to_string(), Vec::new());

        let records = combine(&profiles, &mapping_data);
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.mappable_count, 2);
        assert_eq!(rec.unmappable_modules, vec!["SC4003", "SC4021"]);
        assert!((rec.coverage_score - 50.0).abs() < 1e-9);
        assert!(rec.rank.is_none());
    }

    #[test]
    fn test_absent_mapping_group_means_zero_coverage() {
        let mut profiles = BTreeMap::new();
        profiles.insert("DK-DTU".to_string(), profile("DTU", "Denmark", 2, 3.7));

        let records = combine(&profiles, &MappingData::new());
        assert_eq!(records[0].mappable_count, 0);
        assert_eq!(records[0].coverage_score, 0.0);
    }

    #[test]
    fn test_coverage_score_stays_in_bounds() {
        let mut profiles = BTreeMap::new();
        profiles.insert("A".to_string(), profile("A", "Australia", 1, 3.0));
        let mut mapping_data = MappingData::new();
        let entry = mapping_data.entry("A".to_string()).or_default();
        for code in ["M1", "M2", "M3"] {
            entry.insert(code.to_string(), vec![mapping(code)]);
        }

        let records = combine(&profiles, &mapping_data);
        let score = records[0].coverage_score;
        assert!((0.0..=100.0).contains(&score));
        assert_eq!(score, 100.0);
    }
}
