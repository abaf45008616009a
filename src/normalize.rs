//! Institution-name canonicalization and variation grouping.
//!
//! The vacancy PDF and the portal dropdowns spell the same institution
//! differently ("The University of Queensland (St Lucia Campus)" vs
//! "Univ. of Queensland"). Raw names are never compared directly for joins;
//! both sides go through [`Normalizer::normalize`] first so records
//! referring to one physical institution collide to one key.

use crate::vacancy::UniversityProfile;
use regex::Regex;
use std::collections::BTreeMap;

/// Abbreviation table expanded with word-boundary matching, so "univ."
/// becomes "university" without corrupting words that merely contain the
/// abbreviation.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("univ.", "university"),
    ("univ", "university"),
    ("coll.", "college"),
    ("coll", "college"),
    ("inst.", "institute"),
    ("inst", "institute"),
    ("tech.", "technology"),
    ("tech", "technology"),
    ("u.", "university"),
    ("uc", "university college"),
];

/// Deterministic, pure name normalizer. Construct once and reuse; the
/// regexes are compiled in `new()`.
pub struct Normalizer {
    leading_the: Regex,
    remove_patterns: Vec<Regex>,
    abbreviations: Vec<(Regex, &'static str)>,
    whitespace: Regex,
    dashes: Regex,
}

impl Normalizer {
    pub fn new() -> Self {
        let remove_patterns = [
            r"(?i)\([^)]*campus[^)]*\)",
            r"\([^)]*\)",
            r"(?i)\s*-\s*main\s*campus",
            r"(?i)\s*-\s*[^-]*\s*campus",
        ]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect();

        let abbreviations = ABBREVIATIONS
            .iter()
            .map(|(abbr, full)| {
                let pattern = format!(r"(?i)\b{}(\s|$)", regex::escape(abbr));
                (Regex::new(&pattern).unwrap(), *full)
            })
            .collect();

        Self {
            leading_the: Regex::new(r"^the\s+").unwrap(),
            remove_patterns,
            abbreviations,
            whitespace: Regex::new(r"\s+").unwrap(),
            dashes: Regex::new(r"\s*-\s*").unwrap(),
        }
    }

    /// Canonicalize an institution name.
    ///
    /// Lowercase, strip a leading "the ", drop parenthesized campus
    /// qualifiers and "- … campus" suffixes, expand abbreviations, collapse
    /// whitespace, and turn remaining dash separators into spaces.
    /// Idempotent: normalizing an already-normalized name is a no-op.
    pub fn normalize(&self, name: &str) -> String {
        if name.is_empty() {
            return String::new();
        }

        let mut out = name.to_lowercase().trim().to_string();
        out = self.leading_the.replace(&out, "").into_owned();

        for pattern in &self.remove_patterns {
            out = pattern.replace_all(&out, "").into_owned();
        }

        for (pattern, full) in &self.abbreviations {
            out = pattern
                .replace_all(&out, format!("{full}$1"))
                .into_owned();
        }

        out = self.whitespace.replace_all(&out, " ").trim().to_string();
        self.dashes.replace_all(&out, " ").trim().to_string()
    }

    /// Base name used for grouping. Currently an alias of [`normalize`];
    /// kept as a separate entry point so location-qualifier stripping can
    /// diverge later without touching join-key callers.
    ///
    /// [`normalize`]: Normalizer::normalize
    pub fn get_base_name(&self, name: &str) -> String {
        self.normalize(name)
    }
}

/// Fold campus variations of one institution into a single profile.
///
/// Profiles whose names normalize to the same key are merged: campuses pool
/// their semester-1 quota, the most permissive positive CGPA floor wins,
/// codes and sub-codes are unioned, and distinct remarks are joined. The
/// shortest original name is kept as the canonical display name, and the
/// first source key (in input order) remains the merged profile's key.
pub fn group_variations(
    profiles: &BTreeMap<String, UniversityProfile>,
) -> BTreeMap<String, UniversityProfile> {
    let normalizer = Normalizer::new();

    // Normalized name → source keys, preserving the map's iteration order.
    let mut name_to_keys: BTreeMap<String, Vec<&String>> = BTreeMap::new();
    for (key, profile) in profiles {
        name_to_keys
            .entry(normalizer.normalize(&profile.name))
            .or_default()
            .push(key);
    }

    let mut merged = BTreeMap::new();
    for keys in name_to_keys.values() {
        let primary = keys[0].clone();
        if keys.len() == 1 {
            merged.insert(primary, profiles[keys[0]].clone());
            continue;
        }
        let variations: Vec<&UniversityProfile> = keys.iter().map(|k| &profiles[*k]).collect();
        merged.insert(primary, merge_variations(&variations, keys));
    }
    merged
}

fn merge_variations(variations: &[&UniversityProfile], keys: &[&String]) -> UniversityProfile {
    let mut out = variations[0].clone();

    // Shortest original name is usually the canonical one.
    out.name = variations
        .iter()
        .map(|v| v.name.clone())
        .min_by_key(String::len)
        .unwrap_or_default();

    out.sem1_spots = variations.iter().map(|v| v.sem1_spots).sum();

    let mut cgpas: Vec<f64> = variations
        .iter()
        .map(|v| v.min_cgpa)
        .filter(|c| *c > 0.0)
        .collect();
    cgpas.sort_by(f64::total_cmp);
    out.min_cgpa = cgpas.first().copied().unwrap_or(0.0);

    out.all_codes = dedup_preserving_order(
        variations
            .iter()
            .map(|v| v.university_code.clone())
            .filter(|c| !c.is_empty()),
    );
    out.all_sub_codes = dedup_preserving_order(
        variations
            .iter()
            .map(|v| v.university_sub_code.clone())
            .filter(|c| !c.is_empty()),
    );
    out.remarks = dedup_preserving_order(
        variations
            .iter()
            .map(|v| v.remarks.clone())
            .filter(|r| !r.is_empty()),
    )
    .join(" | ");

    out.variation_count = variations.len() as u32;
    out.merged_keys = keys.iter().map(|k| (**k).clone()).collect();
    out
}

fn dedup_preserving_order(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, code: &str, sub: &str, spots: u32, cgpa: f64) -> UniversityProfile {
        UniversityProfile {
            name: name.to_string(),
            country: "Australia".to_string(),
            university_code: code.to_string(),
            university_sub_code: sub.to_string(),
            sem1_spots: spots,
            min_cgpa: cgpa,
            remarks: String::new(),
            all_codes: vec![code.to_string()],
            all_sub_codes: Vec::new(),
            variation_count: 1,
            merged_keys: Vec::new(),
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = Normalizer::new();
        for name in [
            "The University of Queensland (St Lucia Campus)",
            "Univ. of Queensland",
            "Trinity Coll. Dublin",
            "Tech. Univ. Denmark (DTU)",
        ] {
            let once = n.normalize(name);
            assert_eq!(n.normalize(&once), once, "not idempotent for {name:?}");
        }
    }

    #[test]
    fn test_variant_spellings_collide() {
        let n = Normalizer::new();
        let canonical = n.normalize("University of Queensland");
        assert_eq!(n.normalize("The University of Queensland"), canonical);
        assert_eq!(
            n.normalize("University of Queensland (St Lucia Campus)"),
            canonical
        );
        assert_eq!(n.normalize("Univ. of Queensland"), canonical);
    }

    #[test]
    fn test_abbreviations_respect_word_boundaries() {
        let n = Normalizer::new();
        // "tech" inside "Technical" must not be expanded.
        assert_eq!(
            n.normalize("Technical University of Denmark"),
            "technical university of denmark"
        );
        assert_eq!(n.normalize("Tech Univ Denmark"), "technology university denmark");
    }

    #[test]
    fn test_dashes_become_spaces() {
        let n = Normalizer::new();
        assert_eq!(
            n.normalize("Aalto University - Espoo"),
            "aalto university espoo"
        );
    }

    #[test]
    fn test_get_base_name_is_alias() {
        let n = Normalizer::new();
        let name = "The Univ. of Sydney";
        assert_eq!(n.get_base_name(name), n.normalize(name));
    }

    #[test]
    fn test_grouping_sums_spots_and_takes_min_positive_cgpa() {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "AU-UQ".to_string(),
            profile("University of Queensland", "AU-UQ", "", 2, 3.5),
        );
        profiles.insert(
            "AU-UQ_SL".to_string(),
            profile("University of Queensland (St Lucia)", "AU-UQ", "SL", 1, 3.7),
        );

        let grouped = group_variations(&profiles);
        assert_eq!(grouped.len(), 1);
        let merged = grouped.values().next().unwrap();
        assert_eq!(merged.sem1_spots, 3);
        assert_eq!(merged.min_cgpa, 3.5);
        assert_eq!(merged.name, "University of Queensland");
        assert_eq!(merged.variation_count, 2);
        assert_eq!(merged.merged_keys.len(), 2);
        assert_eq!(merged.all_sub_codes, vec!["SL"]);
    }

    #[test]
    fn test_grouping_ignores_zero_cgpa_floors() {
        let mut profiles = BTreeMap::new();
        profiles.insert("A".to_string(), profile("Aalto University", "FI-A", "", 1, 0.0));
        profiles.insert(
            "B".to_string(),
            profile("Aalto University (Espoo)", "FI-A", "E", 1, 3.2),
        );

        let grouped = group_variations(&profiles);
        assert_eq!(grouped.values().next().unwrap().min_cgpa, 3.2);
    }

    #[test]
    fn test_distinct_institutions_stay_separate() {
        let mut profiles = BTreeMap::new();
        profiles.insert(
            "AU-UQ".to_string(),
            profile("University of Queensland", "AU-UQ", "", 2, 3.5),
        );
        profiles.insert(
            "AU-MELB".to_string(),
            profile("University of Melbourne", "AU-MELB", "", 2, 3.6),
        );
        assert_eq!(group_variations(&profiles).len(), 2);
    }
}
