//! Persistent mapping store contract.
//!
//! The orchestrator writes through this trait and the query side reads from
//! it; nothing else touches the tables. Job rows are the one piece of
//! durable, crash-recoverable state in the system — hence the terminal-state
//! protection and the stale-job recovery operation on the trait itself.

pub mod sqlite;

use crate::navigator::ModuleMapping;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle of a scrape job. Transitions are monotonic:
/// `Pending → Running → {Completed | Failed | Cancelled}`; nothing ever
/// leaves a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One crawl job's durable status record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeJob {
    pub id: i64,
    pub status: JobStatus,
    pub total_countries: u32,
    pub completed_countries: u32,
    pub total_universities: u32,
    pub completed_universities: u32,
    pub current_country: Option<String>,
    pub current_university: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

/// Partial update applied to a job row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub total_countries: Option<u32>,
    pub completed_countries: Option<u32>,
    pub total_universities: Option<u32>,
    pub completed_universities: Option<u32>,
    pub current_country: Option<String>,
    pub current_university: Option<String>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// One university's stored mappings, grouped by home module code, as
/// returned by module queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredUniversityMappings {
    pub country: String,
    pub university: String,
    pub university_id: i64,
    pub mappings: BTreeMap<String, Vec<ModuleMapping>>,
}

/// Aggregate store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub populated: bool,
    pub total_countries: u32,
    pub total_universities: u32,
    pub total_mappings: u32,
    pub unique_modules: u32,
    pub last_completed_crawl: Option<DateTime<Utc>>,
}

/// The persistent store the crawl populates and queries read from.
pub trait MappingStore: Send + Sync {
    /// Insert a country if new; either way return its id.
    fn upsert_country(&self, name: &str) -> Result<i64>;
    /// Insert a university under a country if new; either way return its id.
    fn upsert_university(&self, country_id: i64, name: &str) -> Result<i64>;
    /// Insert a batch of mappings for a university, returning the count.
    fn bulk_insert_mappings(&self, university_id: i64, mappings: &[ModuleMapping]) -> Result<usize>;
    /// All stored mappings for the given module codes, optionally narrowed
    /// to countries, grouped per university.
    fn query_by_modules(
        &self,
        module_codes: &[String],
        countries: Option<&[String]>,
    ) -> Result<Vec<StoredUniversityMappings>>;

    /// Create a job in `Running` state, stamping `started_at`.
    fn create_job(&self) -> Result<i64>;
    fn get_job(&self, id: i64) -> Result<Option<ScrapeJob>>;
    /// Apply a partial update. A status change away from a terminal state is
    /// refused (the rest of the update still applies); entering a terminal
    /// state stamps `completed_at`.
    fn update_job(&self, id: i64, update: &JobUpdate) -> Result<()>;
    /// The most recent job still marked `Running`, if any.
    fn running_job(&self) -> Result<Option<ScrapeJob>>;
    /// Force-cancel every job stuck in `Running` — recovery for workers that
    /// died without updating their row. Returns how many were cancelled.
    fn force_cancel_stale_running_jobs(&self) -> Result<usize>;

    /// Whether any mappings have been stored at all.
    fn is_populated(&self) -> Result<bool>;
    /// Wipe countries, universities, and mappings. Job history is kept.
    fn clear_all_data(&self) -> Result<()>;
    fn stats(&self) -> Result<StoreStats>;
}
