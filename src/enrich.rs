//! Vacancy-data enrichment for store-backed search results.
//!
//! The persistent store only knows what the portal says (countries,
//! universities, mappings). Spots, CGPA floors, and remarks live in the
//! vacancy PDF. This service indexes the extracted vacancy rows for lookup
//! by code or by normalized name + country, with a fuzzy fallback for the
//! inevitable spelling drift between the two sources.
//!
//! The service is an explicitly constructed value — build it once at startup
//! and pass it by reference. There is deliberately no process-wide instance.
//!
//! # Match confidence
//!
//! Fuzzy matches are heuristic keyword/substring scoring against a fixed
//! minimum score; institutions with similar names in one country can be
//! mis-attributed. Every lookup therefore reports how it matched, and
//! callers should present `Fuzzy` results as best-effort rather than
//! authoritative.

use crate::normalize::Normalizer;
use crate::vacancy::VacancyRecord;
use std::collections::HashMap;

/// Country spellings that differ between the PDF and the portal.
const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("uk", "united kingdom"),
    ("usa", "united states"),
    ("united states of america", "united states"),
    ("turkiye", "turkey"),
    ("south korea", "korea"),
    ("republic of korea", "korea"),
    ("czech republic", "czechia"),
    ("hong kong sar", "hong kong"),
];

/// Minimum fuzzy score for a match to be reported at all.
const MIN_FUZZY_SCORE: u32 = 2;

/// How a lookup found its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchConfidence {
    /// Code or normalized name+country matched exactly.
    Exact,
    /// Keyword/substring scoring matched above the minimum threshold.
    /// Carries the raw score; treat as best-effort.
    Fuzzy(u32),
}

/// A matched vacancy record plus how confidently it was matched.
#[derive(Debug, Clone)]
pub struct EnrichmentMatch<'a> {
    pub record: &'a VacancyRecord,
    pub confidence: MatchConfidence,
}

/// In-memory index over extracted vacancy rows.
pub struct VacancyDataService {
    records: Vec<VacancyRecord>,
    by_code: HashMap<String, usize>,
    by_name_country: HashMap<String, usize>,
    normalizer: Normalizer,
}

impl VacancyDataService {
    /// Index the given records. Rows without a university name are skipped.
    pub fn new(records: Vec<VacancyRecord>) -> Self {
        let normalizer = Normalizer::new();
        let mut by_code = HashMap::new();
        let mut by_name_country = HashMap::new();

        for (idx, rec) in records.iter().enumerate() {
            if rec.university_name.is_empty() {
                continue;
            }
            if !rec.university_code.is_empty() {
                by_code.entry(rec.university_code.clone()).or_insert(idx);
            }
            by_name_country
                .entry(name_country_key(
                    &normalizer,
                    &rec.university_name,
                    &rec.country,
                ))
                .or_insert(idx);
        }

        tracing::debug!(
            "vacancy enrichment index: {} records, {} codes, {} name keys",
            records.len(),
            by_code.len(),
            by_name_country.len()
        );

        Self {
            records,
            by_code,
            by_name_country,
            normalizer,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up by university code.
    pub fn by_code(&self, code: &str) -> Option<EnrichmentMatch<'_>> {
        self.by_code.get(code).map(|&idx| EnrichmentMatch {
            record: &self.records[idx],
            confidence: MatchConfidence::Exact,
        })
    }

    /// Look up by portal-side university name and country.
    ///
    /// Tries the exact normalized name+country key first, then falls back to
    /// fuzzy scoring. `None` means no candidate reached the minimum score.
    pub fn lookup(&self, university_name: &str, country: &str) -> Option<EnrichmentMatch<'_>> {
        let key = name_country_key(&self.normalizer, university_name, country);
        if let Some(&idx) = self.by_name_country.get(&key) {
            return Some(EnrichmentMatch {
                record: &self.records[idx],
                confidence: MatchConfidence::Exact,
            });
        }
        self.fuzzy_match(university_name, country)
    }

    /// Keyword + substring scoring over records in the same country.
    fn fuzzy_match(&self, university_name: &str, country: &str) -> Option<EnrichmentMatch<'_>> {
        let target = university_name.to_lowercase();
        let country_variants = country_variants(country);
        let keywords: Vec<&str> = target.split_whitespace().filter(|w| w.len() > 3).collect();

        let mut best: Option<(u32, usize)> = None;
        for (idx, rec) in self.records.iter().enumerate() {
            if !country_variants.is_empty() {
                let rec_country = rec.country.to_lowercase();
                if !country_variants.iter().any(|v| rec_country.contains(v)) {
                    continue;
                }
            }

            let stored = rec.university_name.to_lowercase();
            let mut score = keywords.iter().filter(|kw| stored.contains(**kw)).count() as u32;
            if stored.contains(&target) || target.contains(&stored) {
                score += 3;
            }

            if score >= MIN_FUZZY_SCORE && best.map_or(true, |(s, _)| score > s) {
                best = Some((score, idx));
            }
        }

        best.map(|(score, idx)| EnrichmentMatch {
            record: &self.records[idx],
            confidence: MatchConfidence::Fuzzy(score),
        })
    }
}

fn name_country_key(normalizer: &Normalizer, name: &str, country: &str) -> String {
    format!("{}_{}", country.to_lowercase(), normalizer.normalize(name))
}

/// All accepted spellings of a country, lowercase.
fn country_variants(country: &str) -> Vec<String> {
    if country.is_empty() {
        return Vec::new();
    }
    let lower = country.to_lowercase();
    let mut variants = vec![lower.clone()];
    for (a, b) in COUNTRY_ALIASES {
        if lower == *a {
            variants.push((*b).to_string());
        } else if lower == *b {
            variants.push((*a).to_string());
        }
    }
    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, country: &str, code: &str, spots: u32) -> VacancyRecord {
        VacancyRecord {
            continent: String::new(),
            country: country.to_string(),
            university_code: code.to_string(),
            university_sub_code: String::new(),
            university_name: name.to_string(),
            status: String::new(),
            eligible_colleges: "All".to_string(),
            full_year_spots: 0,
            sem1_spots: spots,
            sem2_spots: 0,
            min_cgpa: 3.5,
            remarks: String::new(),
        }
    }

    fn service() -> VacancyDataService {
        VacancyDataService::new(vec![
            record("University of Queensland", "Australia", "AU-UQ", 3),
            record("University of Melbourne", "Australia", "AU-MELB", 2),
            record("Technical University of Denmark", "Denmark", "DK-DTU", 2),
        ])
    }

    #[test]
    fn test_lookup_by_code() {
        let svc = service();
        let m = svc.by_code("DK-DTU").unwrap();
        assert_eq!(m.record.sem1_spots, 2);
        assert_eq!(m.confidence, MatchConfidence::Exact);
        assert!(svc.by_code("XX-NOPE").is_none());
    }

    #[test]
    fn test_exact_name_match_survives_spelling_variants() {
        let svc = service();
        let m = svc
            .lookup("The University of Queensland (St Lucia Campus)", "Australia")
            .unwrap();
        assert_eq!(m.record.university_code, "AU-UQ");
        assert_eq!(m.confidence, MatchConfidence::Exact);
    }

    #[test]
    fn test_fuzzy_match_reports_score() {
        let svc = service();
        let m = svc.lookup("Queensland University", "Australia").unwrap();
        assert_eq!(m.record.university_code, "AU-UQ");
        assert!(matches!(m.confidence, MatchConfidence::Fuzzy(s) if s >= MIN_FUZZY_SCORE));
    }

    #[test]
    fn test_fuzzy_match_respects_country() {
        let svc = service();
        // Right keywords, wrong country: no match.
        assert!(svc.lookup("Queensland University", "Denmark").is_none());
    }

    #[test]
    fn test_below_threshold_is_none() {
        let svc = service();
        assert!(svc.lookup("Institute of Advanced Studies", "Australia").is_none());
    }
}
