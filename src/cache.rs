//! Filesystem JSON cache with day-granularity TTLs.
//!
//! Three cache families live under the cache directory:
//!
//! - **search results** (`mappings/<key>.json`, 30-day TTL) keyed by a
//!   deterministic digest of the sorted (countries, modules, identity)
//!   triple, so different searches and different identities never collide;
//! - **the country/university index** (`countries_universities.json`,
//!   30-day TTL) — partnerships change slowly, so tens of days is fresh
//!   enough;
//! - **the filtered vacancy set** (`universities.json`, 365-day TTL; the
//!   vacancy list changes yearly) with the filter config echoed into the
//!   payload so a changed country set or college invalidates it.

use crate::navigator::CountryUniversityIndex;
use crate::orchestrator::MappingData;
use crate::vacancy::UniversityProfile;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const SEARCH_TTL_DAYS: i64 = 30;
const INDEX_TTL_DAYS: i64 = 30;
const VACANCY_TTL_DAYS: i64 = 365;

/// On-disk envelope: payload plus the timestamp the TTL is judged against.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    cached_at: DateTime<Utc>,
    data: T,
}

/// A payload and when it was cached, as handed back to callers.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

/// Vacancy-set cache payload with the config echo used for invalidation.
#[derive(Debug, Serialize, Deserialize)]
struct VacancyPayload {
    target_countries: Vec<String>,
    student_college: String,
    universities: BTreeMap<String, UniversityProfile>,
}

pub struct SearchCache {
    cache_dir: PathBuf,
}

impl SearchCache {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(cache_dir.join("mappings"))
            .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    /// Deterministic cache key over sorted inputs, so argument order never
    /// produces a different key.
    pub fn search_key(countries: &[String], modules: &[String], identity: &str) -> String {
        let mut countries: Vec<_> = countries.to_vec();
        let mut modules: Vec<_> = modules.to_vec();
        countries.sort();
        modules.sort();

        let mut hasher = Sha256::new();
        hasher.update(countries.join(",").as_bytes());
        hasher.update(b"|");
        hasher.update(modules.join(",").as_bytes());
        hasher.update(b"|");
        hasher.update(identity.as_bytes());
        hex_digest(hasher)
    }

    // ── Search results ───────────────────────────────────────────────

    pub fn get_search(
        &self,
        countries: &[String],
        modules: &[String],
        identity: &str,
    ) -> Option<Cached<MappingData>> {
        let key = Self::search_key(countries, modules, identity);
        self.read_fresh(&self.search_path(&key), SEARCH_TTL_DAYS)
    }

    pub fn put_search(
        &self,
        countries: &[String],
        modules: &[String],
        identity: &str,
        data: &MappingData,
    ) -> Result<()> {
        let key = Self::search_key(countries, modules, identity);
        self.write(&self.search_path(&key), data)
    }

    // ── Country/university index ─────────────────────────────────────

    pub fn get_index(&self) -> Option<Cached<CountryUniversityIndex>> {
        self.read_fresh(&self.index_path(), INDEX_TTL_DAYS)
    }

    pub fn put_index(&self, index: &CountryUniversityIndex) -> Result<()> {
        self.write(&self.index_path(), index)
    }

    // ── Filtered vacancy set ─────────────────────────────────────────

    /// The cached vacancy set, but only when the filter config that
    /// produced it matches the current one.
    pub fn get_vacancies(
        &self,
        target_countries: &[String],
        student_college: &str,
    ) -> Option<Cached<BTreeMap<String, UniversityProfile>>> {
        let cached: Cached<VacancyPayload> =
            self.read_fresh(&self.vacancy_path(), VACANCY_TTL_DAYS)?;
        if cached.data.target_countries != target_countries
            || cached.data.student_college != student_college
        {
            tracing::debug!("vacancy cache config changed, treating as absent");
            return None;
        }
        Some(Cached {
            data: cached.data.universities,
            cached_at: cached.cached_at,
        })
    }

    pub fn put_vacancies(
        &self,
        target_countries: &[String],
        student_college: &str,
        universities: &BTreeMap<String, UniversityProfile>,
    ) -> Result<()> {
        let payload = VacancyPayload {
            target_countries: target_countries.to_vec(),
            student_college: student_college.to_string(),
            universities: universities.clone(),
        };
        self.write(&self.vacancy_path(), &payload)
    }

    // ── Maintenance ──────────────────────────────────────────────────

    /// Remove every cache file. Returns how many were deleted.
    pub fn clear_all(&self) -> Result<usize> {
        let mut cleared = 0;
        for path in [self.index_path(), self.vacancy_path()] {
            if path.exists() {
                std::fs::remove_file(&path)?;
                cleared += 1;
            }
        }
        cleared += self.clear_searches()?;
        Ok(cleared)
    }

    /// Remove only cached search results.
    pub fn clear_searches(&self) -> Result<usize> {
        let mut cleared = 0;
        let dir = self.cache_dir.join("mappings");
        for entry in std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read {}", dir.display()))?
            .flatten()
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                std::fs::remove_file(&path)?;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn search_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join("mappings").join(format!("{key}.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.cache_dir.join("countries_universities.json")
    }

    fn vacancy_path(&self) -> PathBuf {
        self.cache_dir.join("universities.json")
    }

    fn read_fresh<T: DeserializeOwned>(&self, path: &Path, ttl_days: i64) -> Option<Cached<T>> {
        let raw = std::fs::read_to_string(path).ok()?;
        let envelope: Envelope<T> = serde_json::from_str(&raw).ok()?;
        if Utc::now() >= envelope.cached_at + Duration::days(ttl_days) {
            tracing::debug!("cache expired: {}", path.display());
            return None;
        }
        Some(Cached {
            data: envelope.data,
            cached_at: envelope.cached_at,
        })
    }

    fn write<T: Serialize>(&self, path: &Path, data: &T) -> Result<()> {
        let envelope = Envelope {
            cached_at: Utc::now(),
            data,
        };
        let body = serde_json::to_vec_pretty(&envelope)?;
        std::fs::write(path, body)
            .with_context(|| format!("failed to write cache file: {}", path.display()))
    }
}

fn hex_digest(hasher: Sha256) -> String {
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
